//! # Pipeline
//!
//! Event-driven wiring between independently threaded stages.
//!
//! Responsibilities:
//! - [`PipelineBus`]: named publish/subscribe registry with direct pipes
//! - [`StageHandle`]: one worker task per stage draining a bounded inbox
//! - Odometry and mapping stages around their external-collaborator seams
//! - [`PoseBridge`]: converts pose events into boundary-safe values and
//!   invokes the registered external callback
//!
//! ## Dispatch model
//!
//! `publish` runs handlers synchronously on the publisher's thread. Stage
//! handlers only enqueue into their inbound queue (`try_send`, never
//! blocking), so a slow stage cannot stall the publisher; the stage's own
//! worker task drains the queue. A handler's boolean return marks the event
//! consumed (stops further broadcast) or propagating.

mod bridge;
mod bus;
mod error;
mod event;
mod mapping;
pub mod mock;
mod odometry;
mod stage;

pub use bridge::{PoseBridge, PoseCallback, PoseUpdate, POSE_BRIDGE};
pub use bus::{EventHandler, PipelineBus};
pub use error::PipelineError;
pub use event::{
    downcast_event, BusEvent, InterImuEvent, PoseEstimateEvent, SensorFrameEvent,
    INTER_IMU_EVENT, POSE_ESTIMATE_EVENT, SENSOR_FRAME_EVENT,
};
pub use mapping::{LocalMappingBackend, MappingBackend, MappingStage, MAPPING_STAGE};
pub use odometry::{LocalOdometryEstimator, OdometryEstimator, OdometryStage, ODOMETRY_STAGE};
pub use stage::{LocalPipelineStage, PipelineStage, StageHandle, StageInbox};

/// Source name the capture stage publishes under (it has no inbound queue,
/// so it is a bus source rather than a registered handler).
pub const CAPTURE_STAGE: &str = "capture";
