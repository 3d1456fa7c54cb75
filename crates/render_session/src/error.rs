//! Error taxonomy (spec §7): the builder and the cancellation path never
//! return `Err` — cancellation is reported through `Progress`. `Session`
//! construction is the one place caller-supplied configuration can be
//! rejected outright.

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SessionError {
    #[error("device error: {0}")]
    Device(String),
    #[error("image dimensions must be nonzero, got {width}x{height}")]
    EmptyImage { width: u32, height: u32 },
    #[error("tile size must be nonzero, got {width}x{height}")]
    EmptyTileSize { width: u32, height: u32 },
}
