//! The render session (spec §4.K): the owner of the tile manager, render
//! buffers, and the session thread that drives a render to completion or
//! to an interactive pause/reset cycle.

mod buffers;
mod device;
mod error;
mod params;
mod session;

pub use buffers::{DisplayBuffer, RenderBuffers};
pub use device::{DeviceKernel, FlatColorKernel, RenderTile, TileTask};
pub use error::SessionError;
pub use params::{DenoiseParams, ResumableChunkParams, SessionParams};
pub use session::Session;
