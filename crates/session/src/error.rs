//! Session-level error type.

use contracts::FusionError;
use pipeline::PipelineError;
use thiserror::Error;

/// Failure creating or operating a session
///
/// All variants are fatal for the session being created: no worker is left
/// running and no event is ever delivered after one of these is returned.
#[derive(Debug, Error)]
pub enum SessionError {
    /// Rejected configuration, before the device is touched
    #[error("invalid session configuration: {0}")]
    Config(#[from] validator::ValidationErrors),

    /// Device or stream failure from the camera backend
    #[error(transparent)]
    Device(#[from] FusionError),

    /// Pipeline wiring failure
    #[error(transparent)]
    Pipeline(#[from] PipelineError),
}
