//! Event types flowing over the pipeline bus.
//!
//! Events are dispatched by class name; handlers downcast to the concrete
//! type they care about and ignore everything else.

use std::any::Any;
use std::sync::Arc;

use contracts::{FusedImu, ImageData, Pose, SyncedFrame};

/// Class name of [`SensorFrameEvent`]
pub const SENSOR_FRAME_EVENT: &str = "SensorFrameEvent";
/// Class name of [`InterImuEvent`]
pub const INTER_IMU_EVENT: &str = "InterImuEvent";
/// Class name of [`PoseEstimateEvent`]
pub const POSE_ESTIMATE_EVENT: &str = "PoseEstimateEvent";

/// An event routable by the pipeline bus
pub trait BusEvent: Any + Send + Sync {
    /// Class identity used for pipe routing and handler branching
    fn class_name(&self) -> &'static str;

    /// Downcast support
    fn as_any(&self) -> &dyn Any;
}

/// Downcast a bus event to a concrete type
pub fn downcast_event<T: BusEvent>(event: &Arc<dyn BusEvent>) -> Option<&T> {
    event.as_any().downcast_ref::<T>()
}

/// A completed synchronized sensor frame leaving the capture stage
#[derive(Debug, Clone)]
pub struct SensorFrameEvent {
    /// The frame; shared so broadcast subscribers avoid deep copies
    pub frame: Arc<SyncedFrame>,
}

impl BusEvent for SensorFrameEvent {
    fn class_name(&self) -> &'static str {
        SENSOR_FRAME_EVENT
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// One inter-frame fused inertial sample (high-rate mode)
#[derive(Debug, Clone, Copy)]
pub struct InterImuEvent {
    /// The fused sample
    pub sample: FusedImu,
}

impl BusEvent for InterImuEvent {
    fn class_name(&self) -> &'static str {
        INTER_IMU_EVENT
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Pose estimate produced by the odometry stage
///
/// `pose` is `None` when the stage could not localize this frame; the event
/// still carries the frame's images so downstream consumers stay in step.
#[derive(Debug, Clone)]
pub struct PoseEstimateEvent {
    /// Originating frame id
    pub frame_id: u64,

    /// Originating frame timestamp (host-normalized seconds)
    pub timestamp_s: f64,

    /// Estimated pose, if localized
    pub pose: Option<Pose>,

    /// Color image of the originating frame
    pub color: ImageData,

    /// Depth image of the originating frame
    pub depth: ImageData,
}

impl BusEvent for PoseEstimateEvent {
    fn class_name(&self) -> &'static str {
        POSE_ESTIMATE_EVENT
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
