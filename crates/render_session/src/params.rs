//! Session-wide configuration (spec §3 "Session params"): immutable for
//! the duration of one run, replaced wholesale by `reset()`.

use render_tiles::TileOrder;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DenoiseParams {
    pub enabled: bool,
    pub radius: u32,
}

impl Default for DenoiseParams {
    fn default() -> Self {
        DenoiseParams {
            enabled: false,
            radius: 8,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResumableChunkParams {
    pub num_chunks: u32,
    pub chunk_index: u32,
}

impl Default for ResumableChunkParams {
    fn default() -> Self {
        ResumableChunkParams {
            num_chunks: 1,
            chunk_index: 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionParams {
    pub background: bool,
    pub progressive_refine: bool,
    pub target_samples: u32,
    pub image_width: u32,
    pub image_height: u32,
    pub tile_width: u32,
    pub tile_height: u32,
    pub tile_order: TileOrder,
    pub resolution_divider: u32,
    pub num_worker_threads: u32,
    pub display_buffer_linear: bool,
    pub denoise: DenoiseParams,
    pub pause_timeout: Duration,
    pub cancel_timeout: Duration,
    pub reset_timeout: Duration,
    pub progressive_update_timeout: Duration,
    pub resumable_chunk: ResumableChunkParams,
    /// `Some(path)` selects the "transient" per-tile buffer path (spec
    /// §4.K.3 step 4: background render writing to a file); `None` means
    /// persistent session-wide buffers (viewport, or background with no
    /// file output).
    pub output_path: Option<String>,
}

impl Default for SessionParams {
    fn default() -> Self {
        SessionParams {
            background: true,
            progressive_refine: false,
            target_samples: 1,
            image_width: 64,
            image_height: 64,
            tile_width: 64,
            tile_height: 64,
            tile_order: TileOrder::Center,
            resolution_divider: 1,
            num_worker_threads: 1,
            display_buffer_linear: false,
            denoise: DenoiseParams::default(),
            pause_timeout: Duration::from_millis(100),
            cancel_timeout: Duration::from_millis(100),
            reset_timeout: Duration::from_millis(100),
            progressive_update_timeout: Duration::from_millis(100),
            resumable_chunk: ResumableChunkParams::default(),
            output_path: None,
        }
    }
}

impl SessionParams {
    /// True in the viewport/async sense: a run that never naturally runs
    /// out of tiles and instead waits on `set_pause`/`set_samples`.
    pub fn is_interactive(&self) -> bool {
        !self.background
    }

    /// Spec §4.K.3 step 4: persistent session-wide buffers are used for
    /// viewport mode or background renders with no file output; any
    /// other combination uses a per-tile transient buffer.
    pub fn uses_persistent_buffers(&self) -> bool {
        self.is_interactive() || self.output_path.is_none()
    }
}
