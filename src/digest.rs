// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! Canonical BLAKE3 digests.
//!
//! Two things are hashed in this crate:
//! - pixel buffers, for hash-based comparison of a reversed variant against
//!   an original that is only retained as a digest;
//! - canonical sequence encodings, so a verification record can name the
//!   exact instruction sequence it replayed.
//!
//! # Content hash input
//! ```text
//! domain tag  b"reverso/pixels/v1"
//! width       (u32 LE)
//! height      (u32 LE)
//! format      (u8)
//! pixel bytes
//! ```
//! The shape is part of the input so two buffers with identical bytes but
//! different geometry never compare equal.

use core::fmt;
use core::str::FromStr;
use serde::{Deserialize, Serialize};

use crate::error::KernelError;
use crate::types::image::ImageBuffer;

const PIXEL_DOMAIN: &[u8] = b"reverso/pixels/v1";

#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContentHash(pub [u8; 32]);

impl ContentHash {
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Debug for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ContentHash({})", self.to_hex())
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl FromStr for ContentHash {
    type Err = KernelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut out = [0u8; 32];
        hex::decode_to_slice(s.trim(), &mut out)
            .map_err(|e| KernelError::Encoding(format!("content hash: {}", e)))?;
        Ok(ContentHash(out))
    }
}

/// Shape-tagged BLAKE3 hash of a pixel buffer.
pub fn content_hash(buffer: &ImageBuffer) -> ContentHash {
    let shape = buffer.shape();
    let mut hasher = blake3::Hasher::new();
    hasher.update(PIXEL_DOMAIN);
    hasher.update(&shape.width.to_le_bytes());
    hasher.update(&shape.height.to_le_bytes());
    hasher.update(&[shape.format as u8]);
    hasher.update(buffer.as_bytes());
    ContentHash(*hasher.finalize().as_bytes())
}

/// BLAKE3 of raw bytes.
pub fn hash_bytes(data: &[u8]) -> ContentHash {
    ContentHash(*blake3::hash(data).as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ImageShape, PixelFormat};

    #[test]
    fn test_content_hash_is_shape_tagged() {
        let data = vec![7u8; 12];
        let a = ImageBuffer::new(ImageShape::new(4, 1, PixelFormat::Rgb8), data.clone()).unwrap();
        let b = ImageBuffer::new(ImageShape::new(2, 2, PixelFormat::Rgb8), data.clone()).unwrap();
        let c = ImageBuffer::new(ImageShape::new(4, 1, PixelFormat::Rgb8), data).unwrap();
        assert_ne!(content_hash(&a), content_hash(&b));
        assert_eq!(content_hash(&a), content_hash(&c));
    }

    #[test]
    fn test_hex_round_trip() {
        let h = hash_bytes(b"reverso");
        let parsed: ContentHash = h.to_hex().parse().unwrap();
        assert_eq!(parsed, h);
        assert_eq!(h.to_hex(), h.to_hex().to_lowercase());
        assert_eq!(format!(" {} ", h.to_hex().to_uppercase()).parse::<ContentHash>().unwrap(), h);
        assert!("zz".parse::<ContentHash>().is_err());
        assert!(h.to_hex()[..62].parse::<ContentHash>().is_err());
        assert!(format!("{}00", h.to_hex()).parse::<ContentHash>().is_err());
        assert!(format!("{}g0", &h.to_hex()[..62]).parse::<ContentHash>().is_err());
    }
}
