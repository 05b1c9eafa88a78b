//! Camera intrinsic model
//!
//! Captured once at session initialization from the color and depth/infrared
//! sensors; immutable for the lifetime of the session.

use serde::{Deserialize, Serialize};

/// Pinhole camera intrinsics
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct CameraIntrinsics {
    /// Focal length, x (pixels)
    pub fx: f64,
    /// Focal length, y (pixels)
    pub fy: f64,
    /// Principal point, x (pixels)
    pub cx: f64,
    /// Principal point, y (pixels)
    pub cy: f64,
    /// Image width (pixels)
    pub width: u32,
    /// Image height (pixels)
    pub height: u32,
}

impl CameraIntrinsics {
    /// Whether this model can be used for 3D projection
    pub fn is_valid_for_projection(&self) -> bool {
        self.fx > 0.0
            && self.fy > 0.0
            && self.cx >= 0.0
            && self.cy >= 0.0
            && self.width > 0
            && self.height > 0
    }
}
