//! The render session (spec §4.K): owns the tile manager, the render and
//! display buffers, the progress object, and the session thread that
//! drives the CPU run loop. Lock order follows spec §5 exactly:
//! `delayed_reset` → `buffers` → `display` → `tile_manager` → `pause`
//! → `Progress`'s own internal mutex. Never acquire an earlier lock while
//! holding a later one.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use render_progress::{Progress, SkipTimer};
use render_tiles::{ImageParams, ResumableChunk, TileManager, TileManagerConfig};

use crate::buffers::{DisplayBuffer, RenderBuffers};
use crate::device::{DeviceKernel, RenderTile, TileTask};
use crate::error::SessionError;
use crate::params::SessionParams;

struct BuffersState {
    persistent: RenderBuffers,
    transient: HashMap<usize, RenderBuffers>,
}

type WriteTileCallback = Box<dyn FnMut(usize) + Send>;
type UpdateTileCallback = Box<dyn FnMut(usize, bool) + Send>;

pub struct Session {
    params: Mutex<SessionParams>,
    delayed_reset: Mutex<Option<SessionParams>>,
    buffers: Mutex<BuffersState>,
    display: Mutex<DisplayBuffer>,
    tile_manager: Mutex<TileManager>,
    pause: Mutex<bool>,
    pause_condvar: Condvar,
    progress: Arc<Progress>,
    kernel: Arc<dyn DeviceKernel>,
    finished: AtomicBool,
    worker: Mutex<Option<JoinHandle<()>>>,
    on_write_tile: Mutex<Option<WriteTileCallback>>,
    on_update_tile: Mutex<Option<UpdateTileCallback>>,
}

fn validate(params: &SessionParams) -> Result<(), SessionError> {
    if params.image_width == 0 || params.image_height == 0 {
        return Err(SessionError::EmptyImage {
            width: params.image_width,
            height: params.image_height,
        });
    }
    if params.tile_width == 0 || params.tile_height == 0 {
        return Err(SessionError::EmptyTileSize {
            width: params.tile_width,
            height: params.tile_height,
        });
    }
    Ok(())
}

fn tile_manager_config(params: &SessionParams) -> Result<TileManagerConfig, SessionError> {
    let chunk = ResumableChunk::new(
        params.resumable_chunk.num_chunks,
        params.resumable_chunk.chunk_index,
    )
    .map_err(|e| SessionError::Device(e.to_string()))?;
    Ok(TileManagerConfig {
        image: ImageParams {
            full_width: params.image_width,
            full_height: params.image_height,
            offset_x: 0,
            offset_y: 0,
            tile_width: params.tile_width,
            tile_height: params.tile_height,
        },
        resolution_divider: params.resolution_divider,
        order: params.tile_order,
        schedule_denoising: params.denoise.enabled,
        progressive_refine: params.progressive_refine,
        chunk,
        target_samples: params.target_samples,
    })
}

fn scaled_dims(params: &SessionParams) -> (u32, u32) {
    let divider = params.resolution_divider.max(1);
    let width = params.image_width.div_ceil(divider).max(1);
    let height = params.image_height.div_ceil(divider).max(1);
    (width, height)
}

impl Session {
    pub fn new(params: SessionParams, kernel: Arc<dyn DeviceKernel>) -> Result<Arc<Self>, SessionError> {
        validate(&params)?;
        let tm_config = tile_manager_config(&params)?;
        let (width, height) = scaled_dims(&params);

        let progress = Arc::new(Progress::new());
        progress.reset_sample((width as u64) * (height as u64) * tm_config.target_samples.max(1) as u64);
        progress.set_status("Waiting", "");

        Ok(Arc::new(Session {
            params: Mutex::new(params),
            delayed_reset: Mutex::new(None),
            buffers: Mutex::new(BuffersState {
                persistent: RenderBuffers::new(width, height),
                transient: HashMap::new(),
            }),
            display: Mutex::new(DisplayBuffer::new(width, height)),
            tile_manager: Mutex::new(TileManager::new(tm_config)),
            pause: Mutex::new(false),
            pause_condvar: Condvar::new(),
            progress,
            kernel,
            finished: AtomicBool::new(false),
            worker: Mutex::new(None),
            on_write_tile: Mutex::new(None),
            on_update_tile: Mutex::new(None),
        }))
    }

    pub fn progress(&self) -> &Arc<Progress> {
        &self.progress
    }

    pub fn is_finished(&self) -> bool {
        self.finished.load(Ordering::SeqCst)
    }

    pub fn set_write_tile_callback(&self, callback: impl FnMut(usize) + Send + 'static) {
        *self.on_write_tile.lock().unwrap() = Some(Box::new(callback));
    }

    pub fn set_update_tile_callback(&self, callback: impl FnMut(usize, bool) + Send + 'static) {
        *self.on_update_tile.lock().unwrap() = Some(Box::new(callback));
    }

    /// Spawns the session thread running the CPU loop (spec §4.K.2). A
    /// no-op if already started.
    pub fn start(self: &Arc<Self>) {
        let mut worker = self.worker.lock().unwrap();
        if worker.is_some() {
            return;
        }
        let session = Arc::clone(self);
        *worker = Some(thread::spawn(move || session.run_cpu_loop()));
    }

    pub fn join(&self) {
        let handle = self.worker.lock().unwrap().take();
        if let Some(handle) = handle {
            let _ = handle.join();
        }
    }

    /// Spec §4.K.2: the requester writes new params into `delayed_reset`
    /// and signals the session thread, which applies it at the top of its
    /// next loop iteration. This keeps render buffers from being mutated
    /// while a device task might still be using them.
    pub fn reset(&self, new_params: SessionParams) -> Result<(), SessionError> {
        validate(&new_params)?;
        tile_manager_config(&new_params)?;
        *self.delayed_reset.lock().unwrap() = Some(new_params);
        self.pause_condvar.notify_all();
        Ok(())
    }

    fn apply_delayed_reset_if_any(&self) {
        let new_params = self.delayed_reset.lock().unwrap().take();
        let Some(new_params) = new_params else {
            return;
        };
        let tm_config = tile_manager_config(&new_params).expect("validated in reset()");
        let (width, height) = scaled_dims(&new_params);

        let mut buffers = self.buffers.lock().unwrap();
        *buffers = BuffersState {
            persistent: RenderBuffers::new(width, height),
            transient: HashMap::new(),
        };
        let mut display = self.display.lock().unwrap();
        *display = DisplayBuffer::new(width, height);
        let mut tile_manager = self.tile_manager.lock().unwrap();
        tile_manager.reset(tm_config);
        drop(tile_manager);
        drop(display);
        drop(buffers);

        self.progress
            .reset_sample((width as u64) * (height as u64) * new_params.target_samples.max(1) as u64);
        *self.params.lock().unwrap() = new_params;
        self.progress.set_status("Rendering", "");
        tracing::info!("session reset applied");
    }

    /// Samples may only increase while running (spec §4.K.5); a decrease
    /// is a silent no-op.
    pub fn set_samples(&self, n: u32) {
        let mut params = self.params.lock().unwrap();
        if n <= params.target_samples {
            return;
        }
        params.target_samples = n;
        let (width, height) = scaled_dims(&params);
        drop(params);

        self.tile_manager.lock().unwrap().set_target_samples(n);
        self.progress
            .reset_sample((width as u64) * (height as u64) * n as u64);
        self.pause_condvar.notify_all();
    }

    pub fn set_pause(&self, paused: bool) {
        *self.pause.lock().unwrap() = paused;
        self.progress.set_status(if paused { "Paused" } else { "Rendering" }, "");
        self.pause_condvar.notify_all();
    }

    fn is_paused(&self) -> bool {
        *self.pause.lock().unwrap()
    }

    /// Spec §4.K.3 `acquire_tile`.
    pub fn acquire_tile(&self, device_index: u32) -> Option<RenderTile> {
        let handle = {
            let mut tile_manager = self.tile_manager.lock().unwrap();
            tile_manager.next_tile(device_index)?
        };

        let params = self.params.lock().unwrap();
        let resolution_divider = params.resolution_divider;
        let persistent = params.uses_persistent_buffers();
        drop(params);

        // Transient buffers persist across visits (progressive refine) by
        // being keyed on the tile's grid index: a tile already in the map
        // keeps its buffer instead of being reallocated.
        if !persistent {
            let mut buffers = self.buffers.lock().unwrap();
            buffers.transient.entry(handle.index).or_insert_with(|| {
                RenderBuffers::new(handle.rect.width, handle.rect.height)
            });
        }

        self.progress.set_current_tile_sample(handle.start_sample as u64);

        Some(RenderTile {
            x: handle.rect.x,
            y: handle.rect.y,
            width: handle.rect.width,
            height: handle.rect.height,
            start_sample: handle.start_sample,
            num_samples: handle.num_samples,
            resolution_divider,
            tile_index: handle.index,
            task: TileTask::Render,
            rng_state: splitmix64(handle.index as u64),
        })
    }

    /// Spec §4.K.3 `release_tile`.
    pub fn release_tile(&self, tile: &RenderTile) {
        let mut release_buffers = false;
        let left_pipeline = self
            .tile_manager
            .lock()
            .unwrap()
            .finish_tile(tile.tile_index, &mut release_buffers);

        if left_pipeline {
            if let Some(cb) = self.on_write_tile.lock().unwrap().as_mut() {
                cb(tile.tile_index);
            }
            if release_buffers {
                self.buffers.lock().unwrap().transient.remove(&tile.tile_index);
            }
            self.progress.add_rendered_tile();
        } else if let Some(cb) = self.on_update_tile.lock().unwrap().as_mut() {
            cb(tile.tile_index, true);
        }
        self.progress.add_samples((tile.width as u64) * (tile.height as u64) * tile.num_samples as u64);
    }

    /// Spec §4.J "neighbor mapping": the 3x3 block around `tile_index`,
    /// `None` for entries outside the image.
    pub fn map_neighbor_tiles(&self, tile_index: usize) -> [Option<usize>; 9] {
        self.tile_manager.lock().unwrap().neighbor_tiles(tile_index)
    }

    /// No-op here: CPU tiles have no mapped GPU resource to release.
    pub fn unmap_neighbor_tiles(&self, _tiles: &[Option<usize>; 9]) {}

    /// Tonemaps the session-wide persistent buffer into the display buffer
    /// and returns a copy. Only meaningful when
    /// `SessionParams::uses_persistent_buffers` is true; transient-buffer
    /// runs write their own output through the write-tile callback instead.
    pub fn tonemap_display(&self) -> DisplayBuffer {
        let buffers = self.buffers.lock().unwrap();
        let mut display = self.display.lock().unwrap();
        display.tonemap_from(&buffers.persistent);
        display.clone()
    }

    fn render_and_release_tile(&self, tile: &mut RenderTile) {
        let persistent = self.params.lock().unwrap().uses_persistent_buffers();
        let mut buffers = self.buffers.lock().unwrap();
        if persistent {
            self.kernel.render_tile(tile, &mut buffers.persistent);
        } else {
            let tile_buffers = buffers
                .transient
                .get_mut(&tile.tile_index)
                .expect("acquire_tile allocates the transient buffer before render");
            self.kernel.render_tile(tile, tile_buffers);
        }
        drop(buffers);
        self.kernel.task_wait();
        self.release_tile(tile);
    }

    /// Spec §4.K.2: the CPU run loop.
    fn run_cpu_loop(self: Arc<Self>) {
        self.progress.start_render();
        self.progress.set_status("Rendering", "");
        loop {
            self.apply_delayed_reset_if_any();

            let background = self.params.lock().unwrap().background;
            let no_more_tiles = self.tile_manager.lock().unwrap().no_pending_tiles();

            if no_more_tiles && background {
                break;
            }

            if !background && (self.is_paused() || no_more_tiles) {
                let _skip = SkipTimer::start(&self.progress);
                loop {
                    if self.progress.get_cancel() || self.delayed_reset.lock().unwrap().is_some() {
                        break;
                    }
                    let still_blocked = self.is_paused() || self.tile_manager.lock().unwrap().no_pending_tiles();
                    if !still_blocked {
                        break;
                    }
                    let pause_guard = self.pause.lock().unwrap();
                    let _ = self
                        .pause_condvar
                        .wait_timeout(pause_guard, Duration::from_millis(20))
                        .unwrap();
                }
                continue;
            }

            if self.progress.get_cancel() {
                break;
            }

            if let Some(mut tile) = self.acquire_tile(0) {
                self.render_and_release_tile(&mut tile);
            }

            if self.progress.get_cancel() {
                break;
            }
        }

        self.finished.store(true, Ordering::SeqCst);
        if self.progress.get_cancel() {
            tracing::info!("session stopped: {}", self.progress.cancel_message());
        } else {
            self.progress.finish();
            tracing::info!("session finished");
        }
    }
}

fn splitmix64(mut seed: u64) -> u64 {
    seed = seed.wrapping_add(0x9E3779B97F4A7C15);
    let mut z = seed;
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58476D1CE4E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D049BB133111EB);
    z ^ (z >> 31)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration as StdDuration;

    fn flat_kernel() -> Arc<dyn DeviceKernel> {
        Arc::new(crate::device::FlatColorKernel { rgb: [1.0, 1.0, 1.0] })
    }

    /// Scenario E: a 2x2 tile grid, one sample, background mode. Every
    /// tile is written exactly once, progress reaches 1.0, and the
    /// session finishes without being cancelled.
    #[test]
    fn background_render_writes_every_tile_once_and_finishes() {
        let params = SessionParams {
            background: true,
            target_samples: 1,
            image_width: 4,
            image_height: 4,
            tile_width: 2,
            tile_height: 2,
            ..SessionParams::default()
        };
        let session = Session::new(params, flat_kernel()).unwrap();

        let written = Arc::new(AtomicUsize::new(0));
        let written_cb = Arc::clone(&written);
        session.set_write_tile_callback(move |_tile_index| {
            written_cb.fetch_add(1, Ordering::SeqCst);
        });

        session.start();
        session.join();

        assert_eq!(written.load(Ordering::SeqCst), 4);
        assert!(!session.progress.get_cancel());
        assert!(session.is_finished());
        assert_eq!(session.progress.progress_fraction(), 1.0);
    }

    /// Scenario F: an interactive (non-background) session that is reset
    /// mid-render picks up the new params and keeps running rather than
    /// exiting the loop.
    #[test]
    fn interactive_reset_applies_new_params_without_stopping() {
        let params = SessionParams {
            background: false,
            target_samples: 1,
            image_width: 4,
            image_height: 4,
            tile_width: 4,
            tile_height: 4,
            ..SessionParams::default()
        };
        let session = Session::new(params, flat_kernel()).unwrap();
        session.start();

        let reset_params = SessionParams {
            background: false,
            target_samples: 1,
            image_width: 2,
            image_height: 2,
            tile_width: 2,
            tile_height: 2,
            ..SessionParams::default()
        };
        session.reset(reset_params).unwrap();

        // Give the session thread a moment to apply the reset and idle
        // once its (now tiny) tile grid drains.
        thread::sleep(StdDuration::from_millis(100));
        {
            let buffers = session.buffers.lock().unwrap();
            assert_eq!(buffers.persistent.width, 2);
            assert_eq!(buffers.persistent.height, 2);
        }

        session.progress.set_cancel("test teardown");
        session.join();
    }

    #[test]
    fn acquire_tile_is_none_once_tiles_are_exhausted_in_background_mode() {
        let params = SessionParams {
            background: true,
            target_samples: 1,
            image_width: 2,
            image_height: 2,
            tile_width: 2,
            tile_height: 2,
            ..SessionParams::default()
        };
        let session = Session::new(params, flat_kernel()).unwrap();
        assert!(session.acquire_tile(0).is_some());
        assert!(session.acquire_tile(0).is_none());
    }

    #[test]
    fn pause_then_unpause_lets_a_background_render_finish() {
        let params = SessionParams {
            background: false,
            target_samples: 1,
            image_width: 2,
            image_height: 2,
            tile_width: 2,
            tile_height: 2,
            ..SessionParams::default()
        };
        let session = Session::new(params, flat_kernel()).unwrap();
        session.set_pause(true);
        session.start();
        thread::sleep(StdDuration::from_millis(50));
        assert!(!session.is_finished());

        session.set_pause(false);
        thread::sleep(StdDuration::from_millis(50));
        session.progress.set_cancel("test teardown");
        session.join();
    }
}
