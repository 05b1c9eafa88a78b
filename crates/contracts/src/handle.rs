//! Move-only image handle for the external boundary
//!
//! Pose events hand two independently heap-allocated images to the external
//! consumer. Each handle is a single-owner resource: it is released exactly
//! once, either explicitly via [`ImageHandle::release`] or by dropping it.
//! There is no shared ownership and no copy-on-clone; the type is
//! deliberately neither `Clone` nor `Copy`.

use std::fmt;

use crate::ImageData;

/// Independently owned image buffer crossing the session boundary
pub struct ImageHandle {
    width: u32,
    height: u32,
    stride: u32,
    data: Box<[u8]>,
}

impl fmt::Debug for ImageHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ImageHandle")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("stride", &self.stride)
            .field("byte_len", &self.byte_len())
            .finish()
    }
}

impl ImageHandle {
    /// Deep-copy an image payload into a new independently owned handle
    pub fn copy_from(image: &ImageData) -> Self {
        Self {
            width: image.width,
            height: image.height,
            stride: image.stride,
            data: image.data.to_vec().into_boxed_slice(),
        }
    }

    /// Image width in pixels
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Image height in pixels
    pub fn height(&self) -> u32 {
        self.height
    }

    /// Bytes per row
    pub fn stride(&self) -> u32 {
        self.stride
    }

    /// Total byte size: stride × rows
    ///
    /// Not necessarily `width × bpp × height` when rows carry padding.
    pub fn byte_len(&self) -> usize {
        (self.stride * self.height) as usize
    }

    /// Raw data pointer, valid until the handle is released
    pub fn as_ptr(&self) -> *const u8 {
        self.data.as_ptr()
    }

    /// Borrow the raw bytes
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    /// Explicitly release the buffer
    ///
    /// Consuming the handle by value makes a second release unrepresentable.
    pub fn release(self) {}

    /// Leak the handle as a flat pointer for a foreign boundary
    ///
    /// The pointee must be reclaimed exactly once with [`ImageHandle::from_raw`];
    /// anything else leaks the buffer.
    pub fn into_raw(self) -> *mut ImageHandle {
        Box::into_raw(Box::new(self))
    }

    /// Reclaim a handle previously leaked with [`ImageHandle::into_raw`]
    ///
    /// # Safety
    /// `ptr` must come from `into_raw` and must not have been reclaimed before.
    pub unsafe fn from_raw(ptr: *mut ImageHandle) -> ImageHandle {
        *Box::from_raw(ptr)
    }
}
