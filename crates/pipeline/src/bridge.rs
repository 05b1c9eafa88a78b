//! Pose-event bridge: taps odometry output for an external consumer.
//!
//! Registered as a broadcast observer, never a consumer, so the mapping
//! stage keeps seeing every pose event. Each delivered [`PoseUpdate`]
//! carries two independently owned [`ImageHandle`]s whose release is the
//! callback's responsibility.

use std::sync::{Arc, Mutex, PoisonError};

use tracing::trace;

use contracts::ImageHandle;

use crate::bus::EventHandler;
use crate::event::{downcast_event, BusEvent, PoseEstimateEvent};

/// Registration name of the bridge handler
pub const POSE_BRIDGE: &str = "pose_bridge";

/// External pose subscriber, invoked synchronously on the bus dispatch
/// thread. Must be fast; heavy work belongs on the caller's side.
pub type PoseCallback = Box<dyn Fn(PoseUpdate) + Send + Sync>;

/// Flat boundary value handed to the external callback
///
/// `rotation_wxyz` stores the quaternion scalar part first. When the
/// odometry stage could not localize the frame, every translation and
/// rotation component is NaN; components are never mixed real/NaN.
pub struct PoseUpdate {
    pub frame_id: u64,
    pub timestamp_s: f64,
    pub translation: [f32; 3],
    pub rotation_wxyz: [f32; 4],
    pub color: ImageHandle,
    pub depth: ImageHandle,
}

impl PoseUpdate {
    /// Whether this update carries a real pose (not the NaN sentinel)
    pub fn is_localized(&self) -> bool {
        !self.translation[0].is_nan()
    }
}

/// Bus handler converting [`PoseEstimateEvent`]s into callback invocations
#[derive(Default)]
pub struct PoseBridge {
    callback: Mutex<Option<PoseCallback>>,
}

impl PoseBridge {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install the single active subscriber, replacing any previous one
    pub fn set_callback(&self, callback: PoseCallback) {
        *self
            .callback
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(callback);
    }

    /// Remove the subscriber; subsequent pose events are dropped
    pub fn clear_callback(&self) {
        *self
            .callback
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = None;
    }

    fn convert(estimate: &PoseEstimateEvent) -> PoseUpdate {
        let (translation, rotation_wxyz) = match &estimate.pose {
            Some(pose) => (
                [pose.translation.x, pose.translation.y, pose.translation.z],
                [
                    pose.rotation.w,
                    pose.rotation.i,
                    pose.rotation.j,
                    pose.rotation.k,
                ],
            ),
            None => ([f32::NAN; 3], [f32::NAN; 4]),
        };
        PoseUpdate {
            frame_id: estimate.frame_id,
            timestamp_s: estimate.timestamp_s,
            translation,
            rotation_wxyz,
            color: ImageHandle::copy_from(&estimate.color),
            depth: ImageHandle::copy_from(&estimate.depth),
        }
    }
}

impl EventHandler for PoseBridge {
    fn handle_event(&self, event: &Arc<dyn BusEvent>) -> bool {
        let Some(estimate) = downcast_event::<PoseEstimateEvent>(event) else {
            return false;
        };
        let guard = self.callback.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(callback) = guard.as_ref() {
            trace!(frame_id = estimate.frame_id, "bridging pose event");
            metrics::counter!("pipeline_pose_callbacks_total").increment(1);
            callback(Self::convert(estimate));
        }
        // Observer only: mapping and other subscribers still get the event
        false
    }
}
