//! Output image writing. Image codecs are out of scope (spec §1: "image
//! I/O" is explicitly excluded from the core); this writes the simplest
//! format that needs no external crate, binary PPM, so `--output` has
//! something real to produce.

use std::fs::File;
use std::io::Write;
use std::path::Path;

use render_session::DisplayBuffer;

use crate::error::CliConfigError;

pub fn write_ppm(path: &Path, display: &DisplayBuffer) -> Result<(), CliConfigError> {
    let write = || -> std::io::Result<()> {
        let mut file = File::create(path)?;
        write!(file, "P6\n{} {}\n255\n", display.width, display.height)?;
        let mut rgb = Vec::with_capacity((display.width as usize) * (display.height as usize) * 3);
        for pixel in display.rgba.chunks_exact(4) {
            rgb.extend_from_slice(&pixel[..3]);
        }
        file.write_all(&rgb)
    };
    write().map_err(|source| CliConfigError::OutputWrite { path: path.display().to_string(), source })
}
