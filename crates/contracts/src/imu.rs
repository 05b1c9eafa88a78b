//! Inertial sample types
//!
//! Raw samples as delivered by the driver callback, plus the fused
//! (interpolated) composite attached to synchronized frames.

use nalgebra::Vector3;
use serde::{Deserialize, Serialize};

/// Inertial stream identity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImuStream {
    /// Accelerometer (m/s²)
    Accel,
    /// Gyroscope (rad/s)
    Gyro,
}

/// One raw inertial reading on the device clock
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ImuSample {
    /// Device clock timestamp (milliseconds)
    pub timestamp_ms: f64,

    /// 3-axis reading
    pub v: Vector3<f32>,
}

impl ImuSample {
    /// Create a new sample
    pub fn new(timestamp_ms: f64, v: Vector3<f32>) -> Self {
        Self { timestamp_ms, v }
    }
}

/// Fused inertial sample
///
/// A single reconstructed accelerometer + gyroscope reading for an arbitrary
/// requested timestamp, derived by interpolation rather than direct
/// measurement.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FusedImu {
    /// Interpolation target timestamp (device clock, milliseconds)
    pub timestamp_ms: f64,

    /// Accelerometer estimate (m/s²)
    pub accel: Vector3<f32>,

    /// Gyroscope estimate (rad/s)
    pub gyro: Vector3<f32>,
}
