//! Argument parsing (spec §6 CLI surface), grounded on
//! `code_analysis/src/main.rs`'s clap-derive pattern — the one clap-using
//! binary already in the teacher workspace.

use std::path::PathBuf;

use clap::{Parser, ValueEnum};

use crate::error::CliConfigError;

#[derive(Parser, Debug)]
#[command(author, version, about = "Build a BVH and render a demo scene with it")]
pub struct Arguments {
    /// Device to render on. Only 'cpu' is implemented.
    #[arg(long, default_value = "cpu")]
    pub device: String,

    /// Shading system to use.
    #[arg(long, value_enum, default_value_t = ShadingSystem::Svm)]
    pub shadingsys: ShadingSystem,

    /// Render in background, without user interface.
    #[arg(long)]
    pub background: bool,

    /// In background mode, don't print progress messages.
    #[arg(long)]
    pub quiet: bool,

    /// Number of samples to render.
    #[arg(long, default_value_t = 16)]
    pub samples: i64,

    /// File path to write the rendered output image (PPM).
    #[arg(long)]
    pub output: Option<PathBuf>,

    /// CPU rendering threads. 0 means all available cores.
    #[arg(long, default_value_t = 0)]
    pub threads: u32,

    /// Image width in pixels.
    #[arg(long, default_value_t = 256)]
    pub width: u32,

    /// Image height in pixels.
    #[arg(long, default_value_t = 256)]
    pub height: u32,

    /// List available devices and exit.
    #[arg(long)]
    pub list_devices: bool,

    /// Scene file to render (the CLI's tiny triangle-list format). Falls
    /// back to a built-in demo cube when omitted.
    pub scene_file: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ShadingSystem {
    Svm,
    Osl,
}

impl Arguments {
    pub fn validate(&self) -> Result<(), CliConfigError> {
        if self.device != "cpu" {
            return Err(CliConfigError::UnknownDevice(self.device.clone()));
        }
        // `osl` paired with `cpu` is accepted (spec.md does not forbid
        // it); the forbidden combination named in §7 is OSL-without-CPU,
        // which cannot occur since `cpu` is the only device this repo
        // implements. Kept as an explicit (unreachable) branch rather than
        // silently dropped, since the error variant still documents the
        // real rule for when a second device ever lands.
        if self.device != "cpu" && self.shadingsys == ShadingSystem::Osl {
            return Err(CliConfigError::UnsupportedShadingSystemForDevice {
                device: self.device.clone(),
                shadingsys: "osl".to_string(),
            });
        }
        if self.samples < 0 {
            return Err(CliConfigError::NegativeSamples(self.samples));
        }
        Ok(())
    }
}
