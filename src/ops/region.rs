// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! Pixel spans an operation is confined to.

use core::ops::Range;
use serde::{Deserialize, Serialize};

use crate::error::{KernelError, Result};
use crate::types::image::ImageShape;

/// A run of `len` pixels starting at pixel index `start` (row-major).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Region {
    pub start: u32,
    pub len: u32,
}

impl Region {
    pub fn new(start: u32, len: u32) -> Self {
        Self { start, len }
    }

    pub fn check(&self, shape: &ImageShape) -> Result<()> {
        if self.len == 0 {
            return Err(KernelError::configuration("region length must be at least 1 pixel"));
        }
        let end = self.start as u64 + self.len as u64;
        if end > shape.pixel_count() as u64 {
            return Err(KernelError::configuration(format!(
                "region {}..{} exceeds {} pixels",
                self.start,
                end,
                shape.pixel_count()
            )));
        }
        Ok(())
    }
}

/// Pixel index range covered by `region`, or the whole image for `None`.
pub fn pixel_range(region: Option<&Region>, shape: &ImageShape) -> Result<Range<usize>> {
    match region {
        None => Ok(0..shape.pixel_count()),
        Some(r) => {
            r.check(shape)?;
            Ok(r.start as usize..(r.start as usize + r.len as usize))
        }
    }
}
