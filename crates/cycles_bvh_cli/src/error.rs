//! Configuration errors (spec §7 `CliConfigError`): everything `main` can
//! reject before a session ever starts, surfaced as a nonzero exit via
//! `anyhow`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CliConfigError {
    #[error("unknown device '{0}': only 'cpu' is implemented")]
    UnknownDevice(String),
    #[error("shading system '{shadingsys}' is not supported on device '{device}'")]
    UnsupportedShadingSystemForDevice { device: String, shadingsys: String },
    #[error("number of samples must not be negative, got {0}")]
    NegativeSamples(i64),
    #[error("failed to read scene file {path}: {source}")]
    SceneRead { path: String, source: std::io::Error },
    #[error("malformed scene file {path} at line {line}")]
    SceneParse { path: String, line: usize },
    #[error("failed to write output image {path}: {source}")]
    OutputWrite { path: String, source: std::io::Error },
}
