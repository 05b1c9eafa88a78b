//! Pose value type

use nalgebra::{UnitQuaternion, Vector3};
use serde::{Deserialize, Serialize};

/// Rigid-body pose estimated by the odometry stage
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Pose {
    /// Translation (meters)
    pub translation: Vector3<f32>,

    /// Rotation as a unit quaternion
    pub rotation: UnitQuaternion<f32>,
}

impl Pose {
    /// Create a pose from translation and rotation
    pub fn new(translation: Vector3<f32>, rotation: UnitQuaternion<f32>) -> Self {
        Self {
            translation,
            rotation,
        }
    }

    /// Identity pose (origin, no rotation)
    pub fn identity() -> Self {
        Self {
            translation: Vector3::zeros(),
            rotation: UnitQuaternion::identity(),
        }
    }
}
