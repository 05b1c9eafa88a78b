//! Image payloads and driver frame sets

use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// Pixel format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImageFormat {
    /// 8-bit RGB color
    Rgb8,
    /// 8-bit grayscale (infrared)
    Luma8,
    /// 16-bit depth in device units
    Depth16,
}

impl ImageFormat {
    /// Bytes per pixel for this format
    pub fn bytes_per_pixel(&self) -> u32 {
        match self {
            ImageFormat::Rgb8 => 3,
            ImageFormat::Luma8 => 1,
            ImageFormat::Depth16 => 2,
        }
    }
}

/// Image data
///
/// `stride` is the byte length of one row and may exceed
/// `width * bytes_per_pixel` when the underlying buffer carries row padding.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageData {
    /// Image width in pixels
    pub width: u32,

    /// Image height in pixels
    pub height: u32,

    /// Bytes per row
    pub stride: u32,

    /// Pixel format
    pub format: ImageFormat,

    /// Raw pixel data (zero-copy clone across stages)
    pub data: Bytes,
}

impl ImageData {
    /// Create a tightly packed image (stride = width * bytes_per_pixel)
    pub fn packed(width: u32, height: u32, format: ImageFormat, data: Bytes) -> Self {
        Self {
            width,
            height,
            stride: width * format.bytes_per_pixel(),
            format,
            data,
        }
    }

    /// Create a zero-filled packed image
    pub fn zeroed(width: u32, height: u32, format: ImageFormat) -> Self {
        let len = (width * format.bytes_per_pixel() * height) as usize;
        Self::packed(width, height, format, Bytes::from(vec![0u8; len]))
    }

    /// Total byte size (stride × rows, not width × bpp × rows)
    pub fn byte_len(&self) -> usize {
        (self.stride * self.height) as usize
    }

    /// Whether rows carry no padding
    pub fn is_packed(&self) -> bool {
        self.stride == self.width * self.format.bytes_per_pixel()
    }
}

/// One wait-for-frames result from the camera driver
///
/// Streams arrive independently; any subset may be present in a single set.
#[derive(Debug, Clone)]
pub struct FrameSet {
    /// Device clock timestamp (milliseconds)
    pub timestamp_ms: f64,

    /// Color frame, if part of this set
    pub color: Option<ImageData>,

    /// Infrared frame, if part of this set
    pub infrared: Option<ImageData>,

    /// Depth frame, if part of this set
    pub depth: Option<ImageData>,
}
