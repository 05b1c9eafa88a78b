//! Odometry stage: pose estimation over synchronized frames.
//!
//! Receives [`SensorFrameEvent`]s through a direct pipe from the capture
//! stage, asks the estimator for a pose, and republishes the result as a
//! [`PoseEstimateEvent`] broadcast. Estimation failures still produce an
//! event (with `pose: None`) so downstream consumers observe every frame.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::{SystemTime, UNIX_EPOCH};

use tracing::{debug, instrument, warn};

use contracts::{ImageData, ImageFormat, Pose, SyncedFrame};
use observability::SessionStatsAggregator;

use crate::bus::PipelineBus;
use crate::error::PipelineError;
use crate::event::{downcast_event, BusEvent, PoseEstimateEvent, SensorFrameEvent};
use crate::stage::PipelineStage;

/// Registration name of the odometry stage
pub const ODOMETRY_STAGE: &str = "odometry";

/// Pose estimation backend
#[trait_variant::make(OdometryEstimator: Send)]
pub trait LocalOdometryEstimator {
    /// Backend name, for logs
    fn name(&self) -> &'static str;

    /// Estimate the camera pose for one frame; `None` means tracking lost
    async fn estimate(&mut self, frame: &SyncedFrame) -> Option<Pose>;
}

/// Pipeline stage wrapping an [`OdometryEstimator`]
pub struct OdometryStage<E> {
    estimator: E,
    bus: Arc<PipelineBus>,
    stats: Arc<Mutex<SessionStatsAggregator>>,
    frames_in: u64,
    poses_out: u64,
}

impl<E: OdometryEstimator> OdometryStage<E> {
    pub fn new(
        estimator: E,
        bus: Arc<PipelineBus>,
        stats: Arc<Mutex<SessionStatsAggregator>>,
    ) -> Self {
        Self {
            estimator,
            bus,
            stats,
            frames_in: 0,
            poses_out: 0,
        }
    }

    /// Pose events always carry a color image; frames captured without one
    /// get a black placeholder sized like the depth image.
    fn color_or_placeholder(frame: &SyncedFrame) -> ImageData {
        match &frame.color {
            Some(color) => color.clone(),
            None => ImageData::zeroed(frame.depth.width, frame.depth.height, ImageFormat::Rgb8),
        }
    }
}

impl<E: OdometryEstimator> PipelineStage for OdometryStage<E> {
    fn name(&self) -> &'static str {
        ODOMETRY_STAGE
    }

    #[instrument(skip_all, fields(backend = self.estimator.name()))]
    async fn on_event(&mut self, event: Arc<dyn BusEvent>) -> Result<(), PipelineError> {
        let Some(SensorFrameEvent { frame }) = downcast_event(&event) else {
            return Ok(());
        };
        self.frames_in += 1;

        let pose = self.estimator.estimate(frame).await;
        if pose.is_some() {
            self.poses_out += 1;
        } else {
            warn!(frame_id = frame.frame_id, "pose estimation failed");
        }

        // Frame stamps share the host epoch once normalized, so wall clock
        // minus frame stamp is the capture-to-pose latency.
        let now_s = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs_f64())
            .unwrap_or(0.0);
        let latency_ms = (now_s - frame.timestamp_s) * 1000.0;
        observability::record_pose_result(pose.is_some());
        if latency_ms.is_finite() && latency_ms >= 0.0 {
            observability::record_pose_latency_ms(latency_ms);
        }
        self.stats
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .update_pose(pose.is_some(), latency_ms.max(0.0));

        self.bus.publish(
            ODOMETRY_STAGE,
            Arc::new(PoseEstimateEvent {
                frame_id: frame.frame_id,
                timestamp_s: frame.timestamp_s,
                pose,
                color: Self::color_or_placeholder(frame),
                depth: frame.depth.clone(),
            }),
        );
        Ok(())
    }

    async fn on_shutdown(&mut self) -> Result<(), PipelineError> {
        debug!(
            frames = self.frames_in,
            poses = self.poses_out,
            "odometry stage stopping"
        );
        Ok(())
    }
}
