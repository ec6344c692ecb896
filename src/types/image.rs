// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! Raw pixel buffers.

use serde::{Deserialize, Serialize};

use crate::error::{KernelError, Result};
use crate::types::enums::PixelFormat;

/// Geometry of a pixel buffer. Part of every instruction sequence so a
/// sequence can be checked against the buffer it is replayed on.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ImageShape {
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
}

impl ImageShape {
    pub fn new(width: u32, height: u32, format: PixelFormat) -> Self {
        Self { width, height, format }
    }

    pub fn channels(&self) -> usize {
        self.format.channels()
    }

    pub fn pixel_count(&self) -> usize {
        self.width as usize * self.height as usize
    }

    pub fn byte_len(&self) -> usize {
        self.pixel_count() * self.channels()
    }

    pub fn validate(&self) -> Result<()> {
        if self.width == 0 || self.height == 0 {
            return Err(KernelError::configuration(format!(
                "image dimensions must be non-zero, got {}x{}",
                self.width, self.height
            )));
        }
        // Pixel offsets are carried as u32 inside operations.
        if self.pixel_count() > u32::MAX as usize {
            return Err(KernelError::configuration("image has too many pixels"));
        }
        Ok(())
    }
}

/// Interleaved 8-bit pixel data, row-major.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageBuffer {
    shape: ImageShape,
    data: Vec<u8>,
}

impl ImageBuffer {
    /// Wraps `data`, rejecting buffers whose length disagrees with the shape.
    pub fn new(shape: ImageShape, data: Vec<u8>) -> Result<Self> {
        shape.validate()?;
        if data.len() != shape.byte_len() {
            return Err(KernelError::application(format!(
                "pixel data is {} bytes, shape {}x{} {:?} needs {}",
                data.len(),
                shape.width,
                shape.height,
                shape.format,
                shape.byte_len()
            )));
        }
        Ok(Self { shape, data })
    }

    pub fn shape(&self) -> ImageShape {
        self.shape
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub(crate) fn bytes_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}
