//! Layered error definitions
//!
//! Categorized by source: device / calibration / capture / backend

use thiserror::Error;

/// Unified error type
#[derive(Debug, Error)]
pub enum FusionError {
    // ===== Device Errors (fatal at initialization) =====
    /// No matching capture device
    #[error("device not found: {device}")]
    DeviceNotFound { device: String },

    /// Requested stream configuration is not supported by the device
    #[error("unsupported stream config for '{stream}': {message}")]
    UnsupportedStreamConfig { stream: String, message: String },

    /// Device calibration is missing or unusable for projection
    #[error("invalid calibration: {message}")]
    InvalidCalibration { message: String },

    /// Driver-level failure surfaced at the callback boundary
    #[error("driver error: {message}")]
    Driver { message: String },

    // ===== Backend Errors =====
    /// External backend (odometry / mapping) failure
    #[error("backend '{backend}' error: {message}")]
    Backend { backend: String, message: String },
}

impl FusionError {
    /// Create device-not-found error
    pub fn device_not_found(device: impl Into<String>) -> Self {
        Self::DeviceNotFound {
            device: device.into(),
        }
    }

    /// Create unsupported-stream-config error
    pub fn unsupported_stream(stream: impl Into<String>, message: impl Into<String>) -> Self {
        Self::UnsupportedStreamConfig {
            stream: stream.into(),
            message: message.into(),
        }
    }

    /// Create invalid-calibration error
    pub fn invalid_calibration(message: impl Into<String>) -> Self {
        Self::InvalidCalibration {
            message: message.into(),
        }
    }

    /// Create driver error
    pub fn driver(message: impl Into<String>) -> Self {
        Self::Driver {
            message: message.into(),
        }
    }

    /// Create backend error
    pub fn backend(backend: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Backend {
            backend: backend.into(),
            message: message.into(),
        }
    }

    /// Whether this error is fatal at session initialization
    pub fn is_fatal_at_init(&self) -> bool {
        matches!(
            self,
            Self::DeviceNotFound { .. }
                | Self::UnsupportedStreamConfig { .. }
                | Self::InvalidCalibration { .. }
        )
    }
}
