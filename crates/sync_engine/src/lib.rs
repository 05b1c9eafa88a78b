//! # Sync Engine
//!
//! Multi-rate sensor synchronization: bounded inertial sample windows,
//! timestamp interpolation with bounded-latency waits, and frame-set
//! assembly with clock-anomaly handling.
//!
//! Responsibilities:
//! - Time-ordered accel/gyro windows written by driver callback threads
//! - On-demand fused inertial estimates for arbitrary timestamps
//! - Collecting color/infrared/depth frames into one synchronized instant
//!
//! ## Usage
//!
//! ```ignore
//! use sync_engine::{ImuBufferPair, ImuInterpolator, InterpolatorConfig};
//!
//! let buffers = Arc::new(ImuBufferPair::new(1000));
//! // driver callback threads: buffers.record(stream, sample)
//!
//! let interp = ImuInterpolator::new(buffers.clone(), InterpolatorConfig::default());
//! if let Some(fused) = interp.estimate(stamp_ms, Duration::from_millis(35)).await {
//!     // attach to frame
//! }
//! ```

mod buffer;
mod interpolator;
mod synchronizer;

pub use buffer::ImuBufferPair;
pub use interpolator::{ImuInterpolator, InterpolatorConfig};
pub use synchronizer::{host_now_s, FrameSynchronizer, RawFrames, SyncTiming};

// Re-export contract types used in this crate's API
pub use contracts::{FusedImu, ImuSample, ImuStream};
