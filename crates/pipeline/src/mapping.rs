//! Mapping stage: map integration downstream of odometry.
//!
//! Subscribes to broadcast [`PoseEstimateEvent`]s and feeds frames with a
//! valid pose into the backend. Frames whose pose estimation failed are
//! skipped; the map only grows from localized data.

use std::sync::Arc;

use tracing::{debug, instrument};

use contracts::{ImageData, Pose};

use crate::error::PipelineError;
use crate::event::{downcast_event, BusEvent, PoseEstimateEvent};
use crate::stage::PipelineStage;

/// Registration name of the mapping stage
pub const MAPPING_STAGE: &str = "mapping";

/// Map construction backend
#[trait_variant::make(MappingBackend: Send)]
pub trait LocalMappingBackend {
    /// Backend name, for logs
    fn name(&self) -> &'static str;

    /// Integrate one localized frame into the map
    async fn integrate(
        &mut self,
        pose: &Pose,
        color: &ImageData,
        depth: &ImageData,
    ) -> Result<(), PipelineError>;

    /// Persist or finalize the map before shutdown
    async fn flush(&mut self) -> Result<(), PipelineError>;
}

/// Pipeline stage wrapping a [`MappingBackend`]
pub struct MappingStage<M> {
    backend: M,
    integrated: u64,
    skipped: u64,
}

impl<M: MappingBackend> MappingStage<M> {
    pub fn new(backend: M) -> Self {
        Self {
            backend,
            integrated: 0,
            skipped: 0,
        }
    }
}

impl<M: MappingBackend> PipelineStage for MappingStage<M> {
    fn name(&self) -> &'static str {
        MAPPING_STAGE
    }

    #[instrument(skip_all, fields(backend = self.backend.name()))]
    async fn on_event(&mut self, event: Arc<dyn BusEvent>) -> Result<(), PipelineError> {
        let Some(estimate) = downcast_event::<PoseEstimateEvent>(&event) else {
            return Ok(());
        };
        let Some(pose) = &estimate.pose else {
            self.skipped += 1;
            metrics::counter!("pipeline_map_frames_skipped_total").increment(1);
            return Ok(());
        };

        self.backend
            .integrate(pose, &estimate.color, &estimate.depth)
            .await?;
        self.integrated += 1;
        metrics::counter!("pipeline_map_frames_integrated_total").increment(1);
        Ok(())
    }

    async fn on_shutdown(&mut self) -> Result<(), PipelineError> {
        debug!(
            integrated = self.integrated,
            skipped = self.skipped,
            "mapping stage stopping, flushing backend"
        );
        self.backend.flush().await
    }
}
