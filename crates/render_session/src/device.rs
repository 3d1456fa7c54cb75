//! The device kernel interface (spec §6): the session's only contract
//! with whatever renders a tile's pixels. Kernels themselves (path
//! tracing, shading, denoising) are explicitly out of scope (spec §1) —
//! this crate only needs a trait boundary so the session's scheduling can
//! be exercised without a real renderer attached.

use crate::buffers::RenderBuffers;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TileTask {
    Render,
    Denoise,
}

/// Render-tile struct handed to a device for one unit of work (spec
/// §4.K.3 step 3).
#[derive(Debug)]
pub struct RenderTile {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
    pub start_sample: u32,
    pub num_samples: u32,
    pub resolution_divider: u32,
    pub tile_index: usize,
    pub task: TileTask,
    pub rng_state: u64,
}

/// What the session expects from any render device. Devices that process
/// work asynchronously (the "GPU-like" path, spec §4.K.1) report
/// `is_gpu_like() == true`; the CPU path runs `render_tile` inline on the
/// session thread instead.
pub trait DeviceKernel: Send + Sync {
    fn is_gpu_like(&self) -> bool {
        false
    }

    /// Renders `tile.num_samples` samples into `buffers`, starting at
    /// `tile.start_sample`. For the GPU-like path this only needs to
    /// *submit* work; `task_wait` is where the session blocks for it to
    /// land.
    fn render_tile(&self, tile: &RenderTile, buffers: &mut RenderBuffers);

    /// Blocks until the most recently submitted `render_tile` call's
    /// samples are visible in `buffers`. A no-op for synchronous (CPU)
    /// kernels.
    fn task_wait(&self) {}

    /// Devices may poll their own cancellation source (e.g. a lost GPU
    /// context) independent of `Progress::get_cancel`.
    fn get_cancel(&self) -> bool {
        false
    }
}

/// A deterministic, synchronous CPU kernel used by tests and the CLI's
/// `--device cpu` path: writes a flat color derived from the tile index
/// so tests can assert on exact pixel values without a real renderer.
pub struct FlatColorKernel {
    pub rgb: [f32; 3],
}

impl DeviceKernel for FlatColorKernel {
    fn render_tile(&self, tile: &RenderTile, buffers: &mut RenderBuffers) {
        for dy in 0..tile.height {
            for dx in 0..tile.width {
                let x = tile.x + dx as i32;
                let y = tile.y + dy as i32;
                if x < 0 || y < 0 || x as u32 >= buffers.width || y as u32 >= buffers.height {
                    continue;
                }
                for _ in 0..tile.num_samples {
                    buffers.add_sample(x as u32, y as u32, self.rgb);
                }
            }
        }
    }
}
