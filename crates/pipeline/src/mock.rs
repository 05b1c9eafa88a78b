//! Deterministic stand-ins for the odometry and mapping backends.
//!
//! Used by unit tests here and by the end-to-end tests; exported so
//! downstream crates can run the full pipeline without real estimation.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use contracts::{ImageData, Pose, SyncedFrame};

use crate::error::PipelineError;
use crate::mapping::MappingBackend;
use crate::odometry::OdometryEstimator;

/// Estimator replaying a pre-scripted sequence of pose results
///
/// Once the script runs out, every further frame yields `None`
/// (tracking lost).
pub struct ScriptedOdometry {
    script: VecDeque<Option<Pose>>,
    exhausted: Option<Pose>,
    frames_seen: u64,
}

impl ScriptedOdometry {
    pub fn new(script: Vec<Option<Pose>>) -> Self {
        Self {
            script: script.into(),
            exhausted: None,
            frames_seen: 0,
        }
    }

    /// Estimator that localizes every frame at the identity pose
    pub fn always_identity() -> Self {
        Self {
            script: VecDeque::new(),
            exhausted: Some(Pose::identity()),
            frames_seen: 0,
        }
    }

    pub fn frames_seen(&self) -> u64 {
        self.frames_seen
    }
}

impl OdometryEstimator for ScriptedOdometry {
    fn name(&self) -> &'static str {
        "scripted"
    }

    async fn estimate(&mut self, _frame: &SyncedFrame) -> Option<Pose> {
        self.frames_seen += 1;
        self.script
            .pop_front()
            .unwrap_or_else(|| self.exhausted.clone())
    }
}

/// Shared counters exposed by [`NullMapping`]
#[derive(Default)]
pub struct MappingCounters {
    integrated: AtomicU64,
    flushes: AtomicU64,
}

impl MappingCounters {
    pub fn integrated(&self) -> u64 {
        self.integrated.load(Ordering::Relaxed)
    }

    pub fn flushes(&self) -> u64 {
        self.flushes.load(Ordering::Relaxed)
    }
}

/// Mapping backend that discards data and counts calls
#[derive(Default)]
pub struct NullMapping {
    counters: Arc<MappingCounters>,
}

impl NullMapping {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn counters(&self) -> Arc<MappingCounters> {
        Arc::clone(&self.counters)
    }
}

impl MappingBackend for NullMapping {
    fn name(&self) -> &'static str {
        "null"
    }

    async fn integrate(
        &mut self,
        _pose: &Pose,
        _color: &ImageData,
        _depth: &ImageData,
    ) -> Result<(), PipelineError> {
        self.counters.integrated.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    async fn flush(&mut self) -> Result<(), PipelineError> {
        self.counters.flushes.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}
