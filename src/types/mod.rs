// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
pub mod id;
pub mod enums;
pub mod image;

pub use enums::{PixelFormat, VariantStatus};
pub use id::{ImageId, RecordId, VariantId};
pub use image::{ImageBuffer, ImageShape};
