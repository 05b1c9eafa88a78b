//! SyncedFrame - Capture Stage output
//!
//! One timestamp-aligned sensor frame per capture cycle. Immutable after
//! creation; ownership moves into the pipeline on emission.

use serde::{Deserialize, Serialize};

use crate::{CameraIntrinsics, FusedImu, ImageData};

/// Synchronized sensor frame
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncedFrame {
    /// Frame sequence number (monotonically increasing)
    pub frame_id: u64,

    /// Host-normalized timestamp (seconds)
    pub timestamp_s: f64,

    /// Infrared image (mandatory)
    pub infrared: ImageData,

    /// Depth image (mandatory)
    pub depth: ImageData,

    /// Most recent color image; may be older than `timestamp_s`
    pub color: Option<ImageData>,

    /// Intrinsic model of the infrared/depth sensor
    pub intrinsics: CameraIntrinsics,

    /// Fused inertial sample for this instant (single-sample mode)
    pub imu: Option<FusedImu>,

    /// Inter-frame inertial samples, ascending by timestamp
    /// (high-rate mode; each was also published as a discrete event)
    pub inter_imu: Vec<FusedImu>,
}
