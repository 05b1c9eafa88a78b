//! # Contracts
//!
//! Frozen interface contracts (ICD), defining inter-module data structures and traits.
//! All business crates can only depend on this crate, reverse dependencies are prohibited.
//!
//! ## Time Model
//! - IMU samples carry the device clock in milliseconds (`f64`)
//! - Synchronized frames carry host-normalized seconds (`f64`)
//! - `frame_id` is a monotonic counter assigned by the capture stage

mod config;
mod driver;
mod error;
mod frame;
mod handle;
mod image;
mod imu;
mod intrinsics;
mod pose;

pub use config::*;
pub use driver::{CameraDriver, ImuCallback, LocalCameraDriver};
pub use error::*;
pub use frame::*;
pub use handle::ImageHandle;
pub use image::*;
pub use imu::*;
pub use intrinsics::CameraIntrinsics;
pub use pose::*;
