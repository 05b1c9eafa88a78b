//! # Session
//!
//! Top-level lifecycle: opens the camera, wires the pipeline stages onto a
//! fresh [`PipelineBus`], and tears everything down deterministically.
//!
//! ## Lifecycle
//!
//! `Session::create` walks construction start to finish: validate the
//! configuration, open the device and query calibration, start the sensor
//! streams, then bring up stages in dependency order (mapping, odometry,
//! bridge, capture) so every consumer exists before its producer emits.
//! Any failure before the capture worker starts stops the driver and
//! returns with no threads left running.
//!
//! `Session::destroy` is the reverse: unregister every bus handler first
//! (no late deliveries), then join capture, odometry, and mapping workers.

mod error;

pub use error::SessionError;

pub use capture::mock::{MockCameraDriver, MockDriverConfig};
pub use contracts::{
    CameraIntrinsics, ImuAttachment, SessionConfig, StreamProfile, SyncedFrame,
};
pub use pipeline::mock::{NullMapping, ScriptedOdometry};
pub use pipeline::{PoseCallback, PoseUpdate};
pub use observability::StatsReport;

use std::sync::{Arc, Mutex, PoisonError};

use tracing::{debug, info, instrument, warn};
use validator::Validate;

use capture::{CaptureHandle, CaptureMetrics, CaptureStage};
use contracts::{CameraDriver, ImuCallback};
use pipeline::{
    MappingBackend, MappingStage, OdometryEstimator, OdometryStage, PipelineBus, PoseBridge,
    StageHandle, CAPTURE_STAGE, MAPPING_STAGE, ODOMETRY_STAGE, POSE_BRIDGE,
    POSE_ESTIMATE_EVENT, SENSOR_FRAME_EVENT,
};
use observability::SessionStatsAggregator;
use sync_engine::ImuBufferPair;

/// Lifecycle phases of a [`Session`], attached to transition logs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Nothing opened yet
    Uninitialized,
    /// Device opening and stream startup in progress
    DeviceOpening,
    /// All workers up, frames flowing
    Running,
    /// Teardown in progress
    Closing,
    /// All workers joined
    Closed,
    /// Creation aborted; terminal
    Failed,
}

/// One running camera + pipeline instance
///
/// Multiple sessions are independent; each owns its bus, buffers, and
/// workers.
pub struct Session {
    bus: Arc<PipelineBus>,
    bridge: Arc<PoseBridge>,
    buffers: Arc<ImuBufferPair>,
    capture: CaptureHandle,
    odometry: StageHandle,
    mapping: StageHandle,
    intrinsics: (CameraIntrinsics, CameraIntrinsics),
    stats: Arc<Mutex<SessionStatsAggregator>>,
}

impl Session {
    /// Open the device and start the full pipeline.
    ///
    /// # Errors
    /// Configuration, device, and calibration failures are fatal: the
    /// driver is stopped and no worker survives the error return.
    #[instrument(skip_all, fields(device = driver.device_name()))]
    pub async fn create<D, E, M>(
        config: SessionConfig,
        mut driver: D,
        estimator: E,
        mapping: M,
    ) -> Result<Self, SessionError>
    where
        D: CameraDriver + 'static,
        E: OdometryEstimator + 'static,
        M: MappingBackend + 'static,
    {
        debug!(state = ?SessionState::Uninitialized, "validating configuration");
        config.validate()?;

        debug!(state = ?SessionState::DeviceOpening, "opening device");
        if let Err(error) = driver.open(&config.stream_config()).await {
            warn!(state = ?SessionState::Failed, %error, "device open failed");
            return Err(error.into());
        }

        let intrinsics = match driver.intrinsics() {
            Ok((color, depth))
                if !color.is_valid_for_projection() || !depth.is_valid_for_projection() =>
            {
                driver.stop();
                warn!(state = ?SessionState::Failed, "degenerate intrinsics");
                return Err(contracts::FusionError::invalid_calibration(
                    "device reported degenerate intrinsics",
                )
                .into());
            }
            Ok(pair) => pair,
            Err(error) => {
                driver.stop();
                warn!(state = ?SessionState::Failed, %error, "calibration query failed");
                return Err(error.into());
            }
        };
        debug!(
            color_w = intrinsics.0.width,
            depth_w = intrinsics.1.width,
            "calibration loaded"
        );

        let buffers = Arc::new(ImuBufferPair::new(config.imu_buffer_capacity));
        let sink = Arc::clone(&buffers);
        let imu_callback: ImuCallback =
            Arc::new(move |stream, sample| sink.record(stream, sample));
        if let Err(error) = driver.start_streams(imu_callback).await {
            driver.stop();
            warn!(state = ?SessionState::Failed, %error, "stream startup failed");
            return Err(error.into());
        }

        // Consumers come up before their producers
        let bus = Arc::new(PipelineBus::new());
        let stats = Arc::new(Mutex::new(SessionStatsAggregator::new()));

        let (mapping_handle, mapping_inbox) = StageHandle::spawn(
            MappingStage::new(mapping),
            vec![POSE_ESTIMATE_EVENT],
            false,
            config.stage_queue_capacity,
        );
        bus.register(MAPPING_STAGE, mapping_inbox)?;

        let (odometry_handle, odometry_inbox) = StageHandle::spawn(
            OdometryStage::new(estimator, Arc::clone(&bus), Arc::clone(&stats)),
            vec![SENSOR_FRAME_EVENT],
            true,
            config.stage_queue_capacity,
        );
        bus.register(ODOMETRY_STAGE, odometry_inbox)?;
        bus.create_pipe(CAPTURE_STAGE, ODOMETRY_STAGE, SENSOR_FRAME_EVENT)?;

        let bridge = Arc::new(PoseBridge::new());
        bus.register(POSE_BRIDGE, Arc::clone(&bridge) as _)?;

        let capture = CaptureStage::new(
            driver,
            Arc::clone(&buffers),
            Arc::clone(&bus),
            intrinsics.1,
            &config,
            Arc::clone(&stats),
        )
        .spawn();

        info!(state = ?SessionState::Running, "session running");
        Ok(Self {
            bus,
            bridge,
            buffers,
            capture,
            odometry: odometry_handle,
            mapping: mapping_handle,
            intrinsics,
            stats,
        })
    }

    /// Install the external pose subscriber, replacing any previous one
    pub fn register_pose_callback(&self, callback: PoseCallback) {
        self.bridge.set_callback(callback);
    }

    /// Drop the external pose subscriber
    pub fn clear_pose_callback(&self) {
        self.bridge.clear_callback();
    }

    /// Calibration models as (color, depth)
    pub fn intrinsics(&self) -> (CameraIntrinsics, CameraIntrinsics) {
        self.intrinsics
    }

    /// Capture worker counters
    pub fn capture_metrics(&self) -> Arc<CaptureMetrics> {
        self.capture.metrics()
    }

    /// Buffered inertial sample count, per stream
    pub fn imu_buffer_len(&self, stream: contracts::ImuStream) -> usize {
        self.buffers.len(stream)
    }

    /// Aggregate statistics collected so far
    pub fn stats_report(&self) -> StatsReport {
        self.stats
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .report()
    }

    /// Cooperative shutdown; blocks until every worker has joined.
    ///
    /// Handlers leave the bus before any worker stops, so no callback
    /// fires after this returns.
    #[instrument(skip_all)]
    pub async fn destroy(self) {
        debug!(state = ?SessionState::Closing, "unregistering handlers");
        self.bus.unregister(POSE_BRIDGE);
        self.bus.unregister(ODOMETRY_STAGE);
        self.bus.unregister(MAPPING_STAGE);

        self.capture.stop().await;
        self.odometry.shutdown().await;
        self.mapping.shutdown().await;

        let report = self
            .stats
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .report();
        info!(
            state = ?SessionState::Closed,
            frames = report.total_frames,
            poses_lost = report.poses_lost,
            imu_miss_rate = report.imu_miss_rate,
            "session destroyed"
        );
    }
}
