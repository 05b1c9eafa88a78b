//! CameraDriver trait - capture device abstraction
//!
//! Defines a unified capability interface for the vendor camera driver,
//! decoupling the capture stage from a concrete SDK. One concrete adapter per
//! backend implements this; no deep hierarchy.
//!
//! IMU delivery is callback-based (the SDK's native pattern): once streams
//! are started, the driver invokes the registered callback from its own
//! threads, one call per raw sample, in delivery order per stream.

use std::sync::Arc;
use std::time::Duration;

use crate::{CameraIntrinsics, FrameSet, FusionError, ImuSample, ImuStream, StreamConfig};

/// IMU sample callback type
///
/// Invoked from driver-owned threads. Implementations must be cheap and must
/// not block; errors are caught and logged at the callback boundary, never
/// propagated into the driver.
pub type ImuCallback = Arc<dyn Fn(ImuStream, ImuSample) + Send + Sync>;

/// Capture device capability interface
#[trait_variant::make(CameraDriver: Send)]
pub trait LocalCameraDriver {
    /// Human-readable device identity (used for logging/errors)
    fn device_name(&self) -> &str;

    /// Open the device and configure stream profiles
    ///
    /// # Errors
    /// `DeviceNotFound` when no matching device exists,
    /// `UnsupportedStreamConfig` when a requested profile cannot be served.
    async fn open(&mut self, config: &StreamConfig) -> Result<(), FusionError>;

    /// Intrinsic models of the (color, infrared/depth) sensors
    ///
    /// Only valid after a successful `open`.
    fn intrinsics(&self) -> Result<(CameraIntrinsics, CameraIntrinsics), FusionError>;

    /// Start streaming; IMU samples flow through `imu` from driver threads
    async fn start_streams(&mut self, imu: ImuCallback) -> Result<(), FusionError>;

    /// Wait up to `timeout` for the next frame set
    ///
    /// `None` on timeout; not an error, the caller polls in a loop.
    async fn wait_for_frame_set(&mut self, timeout: Duration) -> Option<FrameSet>;

    /// Stop streaming and release the device (idempotent)
    fn stop(&mut self);
}
