//! Shared render progress and cooperative cancellation state (spec §4.I).
//!
//! Ported field-for-field from the status/substatus/cancel/error model the
//! session and build driver both report into: two status-string pairs, a
//! kernel-load status, monotonic sample/tile counters, and cancel/error
//! flags. All string and timing fields live behind one mutex; the update
//! callback runs under a *separate* mutex so a callback that turns around
//! and calls back into `Progress` can never deadlock on the state lock it
//! would otherwise still be holding.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};

struct StatusState {
    status: String,
    substatus: String,
    sync_status: String,
    sync_substatus: String,
    kernel_status: String,
    cancel_message: String,
    error_message: String,
    start_time: Instant,
    render_start_time: Option<Instant>,
    end_time: Option<Instant>,
    skip_time: Duration,
}

impl StatusState {
    fn new() -> Self {
        Self {
            status: String::new(),
            substatus: String::new(),
            sync_status: String::new(),
            sync_substatus: String::new(),
            kernel_status: String::new(),
            cancel_message: String::new(),
            error_message: String::new(),
            start_time: Instant::now(),
            render_start_time: None,
            end_time: None,
            skip_time: Duration::ZERO,
        }
    }
}

type UpdateCallback = Box<dyn FnMut() + Send>;
type CancelProbe = Box<dyn Fn() -> bool + Send>;

/// Shared, thread-safe render progress. Cloned handles (`Arc<Progress>`)
/// are shared between the session thread, the build driver, and the UI.
pub struct Progress {
    state: Mutex<StatusState>,

    pixel_samples: AtomicU64,
    total_pixel_samples: AtomicU64,
    current_tile_sample: AtomicU64,
    rendered_tiles: AtomicU64,
    denoised_tiles: AtomicU64,

    cancel: AtomicBool,
    error: AtomicBool,

    update_callback: Mutex<Option<UpdateCallback>>,
    cancel_probe: Mutex<Option<CancelProbe>>,
}

impl Default for Progress {
    fn default() -> Self {
        Self::new()
    }
}

impl Progress {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(StatusState::new()),
            pixel_samples: AtomicU64::new(0),
            total_pixel_samples: AtomicU64::new(0),
            current_tile_sample: AtomicU64::new(0),
            rendered_tiles: AtomicU64::new(0),
            denoised_tiles: AtomicU64::new(0),
            cancel: AtomicBool::new(false),
            error: AtomicBool::new(false),
            update_callback: Mutex::new(None),
            cancel_probe: Mutex::new(None),
        }
    }

    pub fn set_update_callback(&self, callback: impl FnMut() + Send + 'static) {
        *self.update_callback.lock().unwrap() = Some(Box::new(callback));
    }

    /// Registers a callback consulted opportunistically from `get_cancel`,
    /// for an outer application (e.g. a UI) to fold its own cancel state
    /// into the build/render's cooperative checks.
    pub fn set_cancel_callback(&self, probe: impl Fn() -> bool + Send + 'static) {
        *self.cancel_probe.lock().unwrap() = Some(Box::new(probe));
    }

    fn notify_update(&self) {
        if let Ok(mut guard) = self.update_callback.lock() {
            if let Some(callback) = guard.as_mut() {
                callback();
            }
        }
    }

    pub fn set_status(&self, status: impl Into<String>, substatus: impl Into<String>) {
        {
            let mut state = self.state.lock().unwrap();
            state.status = status.into();
            state.substatus = substatus.into();
        }
        self.notify_update();
    }

    pub fn set_sync_status(&self, status: impl Into<String>, substatus: impl Into<String>) {
        {
            let mut state = self.state.lock().unwrap();
            state.sync_status = status.into();
            state.sync_substatus = substatus.into();
        }
        self.notify_update();
    }

    pub fn clear_sync_status(&self) {
        self.set_sync_status("", "")
    }

    pub fn set_kernel_status(&self, status: impl Into<String>) {
        {
            let mut state = self.state.lock().unwrap();
            state.kernel_status = status.into();
        }
        self.notify_update();
    }

    /// Readers see the sync status/substatus when one is set, otherwise
    /// the main status/substatus (spec §4.I).
    pub fn status_strings(&self) -> (String, String) {
        let state = self.state.lock().unwrap();
        if !state.sync_status.is_empty() {
            (state.sync_status.clone(), state.sync_substatus.clone())
        } else {
            (state.status.clone(), state.substatus.clone())
        }
    }

    pub fn kernel_status(&self) -> String {
        self.state.lock().unwrap().kernel_status.clone()
    }

    pub fn reset_sample(&self, total_pixel_samples: u64) {
        self.pixel_samples.store(0, Ordering::SeqCst);
        self.total_pixel_samples.store(total_pixel_samples, Ordering::SeqCst);
        self.current_tile_sample.store(0, Ordering::SeqCst);
        self.rendered_tiles.store(0, Ordering::SeqCst);
        self.denoised_tiles.store(0, Ordering::SeqCst);
        let mut state = self.state.lock().unwrap();
        state.start_time = Instant::now();
        state.render_start_time = None;
        state.end_time = None;
        state.skip_time = Duration::ZERO;
    }

    pub fn add_samples(&self, pixel_sample_count: u64) {
        self.pixel_samples.fetch_add(pixel_sample_count, Ordering::SeqCst);
        self.notify_update();
    }

    pub fn pixel_samples(&self) -> u64 {
        self.pixel_samples.load(Ordering::SeqCst)
    }

    pub fn set_current_tile_sample(&self, sample: u64) {
        self.current_tile_sample.store(sample, Ordering::SeqCst);
    }

    pub fn current_tile_sample(&self) -> u64 {
        self.current_tile_sample.load(Ordering::SeqCst)
    }

    pub fn add_rendered_tile(&self) {
        self.rendered_tiles.fetch_add(1, Ordering::SeqCst);
    }

    pub fn add_denoised_tile(&self) {
        self.denoised_tiles.fetch_add(1, Ordering::SeqCst);
    }

    pub fn rendered_tiles(&self) -> u64 {
        self.rendered_tiles.load(Ordering::SeqCst)
    }

    pub fn denoised_tiles(&self) -> u64 {
        self.denoised_tiles.load(Ordering::SeqCst)
    }

    /// `pixel_samples / total_pixel_samples`, or `0.0` when the total is
    /// unset (an unbounded/interactive render).
    pub fn progress_fraction(&self) -> f64 {
        let total = self.total_pixel_samples.load(Ordering::SeqCst);
        if total == 0 {
            0.0
        } else {
            self.pixel_samples.load(Ordering::SeqCst) as f64 / total as f64
        }
    }

    pub fn start_render(&self) {
        let mut state = self.state.lock().unwrap();
        if state.render_start_time.is_none() {
            state.render_start_time = Some(Instant::now());
        }
    }

    /// Freezes elapsed-time reporting by recording an end time once.
    pub fn finish(&self) {
        let mut state = self.state.lock().unwrap();
        if state.end_time.is_none() {
            state.end_time = Some(Instant::now());
        }
        drop(state);
        self.set_status("Finished", "");
    }

    pub fn elapsed_time(&self) -> Duration {
        let state = self.state.lock().unwrap();
        let end = state.end_time.unwrap_or_else(Instant::now);
        end.saturating_duration_since(state.start_time).saturating_sub(state.skip_time)
    }

    pub fn render_elapsed_time(&self) -> Duration {
        let state = self.state.lock().unwrap();
        let Some(render_start) = state.render_start_time else {
            return Duration::ZERO;
        };
        let end = state.end_time.unwrap_or_else(Instant::now);
        end.saturating_duration_since(render_start)
    }

    fn add_skip_time(&self, duration: Duration) {
        self.state.lock().unwrap().skip_time += duration;
    }

    /// `set_cancel(msg)` sets the cancel flag and message; cooperative
    /// producers poll [`Progress::get_cancel`] at the points documented in
    /// spec §5.
    pub fn set_cancel(&self, message: impl Into<String>) {
        self.cancel.store(true, Ordering::SeqCst);
        let message = message.into();
        {
            let mut state = self.state.lock().unwrap();
            state.cancel_message = message.clone();
        }
        self.set_status("Cancel", message);
    }

    /// Returns true if cancelled, opportunistically consulting the
    /// registered cancel-probe callback (e.g. an outer UI's own cancel
    /// state) and latching its result.
    pub fn get_cancel(&self) -> bool {
        if self.cancel.load(Ordering::SeqCst) {
            return true;
        }
        let probe_fired = self
            .cancel_probe
            .lock()
            .unwrap()
            .as_ref()
            .map(|probe| probe())
            .unwrap_or(false);
        if probe_fired {
            self.set_cancel("Cancelled");
            true
        } else {
            false
        }
    }

    pub fn cancel_message(&self) -> String {
        self.state.lock().unwrap().cancel_message.clone()
    }

    /// Records an error and triggers cancellation, per spec §7: errors
    /// always unwind through the same cooperative-cancel path.
    pub fn set_error(&self, message: impl Into<String>) {
        let message = message.into();
        self.error.store(true, Ordering::SeqCst);
        self.state.lock().unwrap().error_message = message.clone();
        self.set_cancel(message);
    }

    pub fn get_error(&self) -> Option<String> {
        if self.error.load(Ordering::SeqCst) {
            Some(self.state.lock().unwrap().error_message.clone())
        } else {
            None
        }
    }
}

/// Scoped timer that folds its own elapsed wall time into `progress`'s
/// skip time on drop — used to exclude time spent paused or doing scene
/// sync from elapsed-time reporting.
pub struct SkipTimer<'a> {
    progress: &'a Progress,
    started: Instant,
}

impl<'a> SkipTimer<'a> {
    pub fn start(progress: &'a Progress) -> Self {
        Self { progress, started: Instant::now() }
    }
}

impl Drop for SkipTimer<'_> {
    fn drop(&mut self) {
        self.progress.add_skip_time(self.started.elapsed());
    }
}
