//! # Capture
//!
//! The producing end of the pipeline: drives one camera through its
//! synchronization cycle and publishes [`pipeline::SensorFrameEvent`]s
//! (plus discrete inertial events in inter-frame mode).
//!
//! The worker owns the driver for its whole lifetime; shutdown is
//! cooperative through a shared running flag, after which the driver's
//! streams are stopped from the worker itself.

mod stage;

pub mod mock;

pub use stage::{CaptureHandle, CaptureMetrics, CaptureSnapshot, CaptureStage};
