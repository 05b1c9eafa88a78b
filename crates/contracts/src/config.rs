//! Session configuration contracts shared across crates.

use serde::{Deserialize, Serialize};
use validator::Validate;

/// One stream profile (resolution + rate)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Validate)]
pub struct StreamProfile {
    /// Width in pixels
    #[validate(range(min = 1))]
    pub width: u32,

    /// Height in pixels
    #[validate(range(min = 1))]
    pub height: u32,

    /// Frames per second
    #[validate(range(min = 1, max = 120))]
    pub fps: u32,
}

impl Default for StreamProfile {
    fn default() -> Self {
        Self {
            width: 640,
            height: 480,
            fps: 30,
        }
    }
}

/// Stream configuration handed to the driver at open time
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct StreamConfig {
    /// Color stream profile
    pub color: StreamProfile,

    /// Infrared + depth stream profile
    pub ir_depth: StreamProfile,

    /// Ask the device to align its clock with the host
    pub global_time_sync: bool,
}

/// Inertial attachment mode for the capture stage
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImuAttachment {
    /// One fused estimate per frame
    #[default]
    Single,
    /// One discrete inertial event per native gyro sample between frames
    InterFrame,
}

fn default_true() -> bool {
    true
}

fn default_imu_max_wait_ms() -> u64 {
    35
}

fn default_imu_poll_interval_ms() -> u64 {
    1
}

fn default_frame_timeout_s() -> f64 {
    2.0
}

fn default_frame_poll_ms() -> u64 {
    100
}

fn default_imu_buffer_capacity() -> usize {
    1000
}

fn default_stage_queue_capacity() -> usize {
    16
}

/// Session configuration
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct SessionConfig {
    /// Color stream profile
    #[validate(nested)]
    #[serde(default)]
    pub color: StreamProfile,

    /// Infrared + depth stream profile
    #[validate(nested)]
    #[serde(default)]
    pub ir_depth: StreamProfile,

    /// Global time sync: only return inertial estimates backed by data
    /// observed at or after the requested timestamp
    #[serde(default = "default_true")]
    pub global_time_sync: bool,

    /// Inertial attachment mode
    #[serde(default)]
    pub imu_attachment: ImuAttachment,

    /// Bounded wait for inertial interpolation (milliseconds)
    #[validate(range(max = 1000))]
    #[serde(default = "default_imu_max_wait_ms")]
    pub imu_max_wait_ms: u64,

    /// Poll resolution inside the bounded inertial wait (milliseconds)
    #[validate(range(min = 1, max = 100))]
    #[serde(default = "default_imu_poll_interval_ms")]
    pub imu_poll_interval_ms: u64,

    /// Overall frame synchronization timeout (seconds)
    #[validate(range(min = 0.1, max = 30.0))]
    #[serde(default = "default_frame_timeout_s")]
    pub frame_timeout_s: f64,

    /// Single wait-for-frame-set poll timeout (milliseconds)
    #[validate(range(min = 1, max = 1000))]
    #[serde(default = "default_frame_poll_ms")]
    pub frame_poll_ms: u64,

    /// Per-stream inertial window capacity (most recent samples retained)
    #[validate(range(min = 2, max = 100_000))]
    #[serde(default = "default_imu_buffer_capacity")]
    pub imu_buffer_capacity: usize,

    /// Inbound queue capacity per pipeline stage
    #[validate(range(min = 1, max = 4096))]
    #[serde(default = "default_stage_queue_capacity")]
    pub stage_queue_capacity: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            color: StreamProfile::default(),
            ir_depth: StreamProfile::default(),
            global_time_sync: true,
            imu_attachment: ImuAttachment::Single,
            imu_max_wait_ms: default_imu_max_wait_ms(),
            imu_poll_interval_ms: default_imu_poll_interval_ms(),
            frame_timeout_s: default_frame_timeout_s(),
            frame_poll_ms: default_frame_poll_ms(),
            imu_buffer_capacity: default_imu_buffer_capacity(),
            stage_queue_capacity: default_stage_queue_capacity(),
        }
    }
}

impl SessionConfig {
    /// Stream portion handed to the driver at open time
    pub fn stream_config(&self) -> StreamConfig {
        StreamConfig {
            color: self.color,
            ir_depth: self.ir_depth,
            global_time_sync: self.global_time_sync,
        }
    }
}
