pub mod sequence_tests;
pub mod verify_tests;

use crate::ops::prng::Pcg32;
use crate::types::{ImageBuffer, ImageShape, PixelFormat};

/// Buffer of `shape` filled from a seeded stream.
pub(crate) fn noise(shape: ImageShape, seed: u64) -> ImageBuffer {
    let mut rng = Pcg32::new(seed, 0x7465_7374);
    let data = (0..shape.byte_len()).map(|_| rng.next_u32() as u8).collect();
    ImageBuffer::new(shape, data).unwrap()
}

pub(crate) fn format_from_index(i: u8) -> PixelFormat {
    PixelFormat::from_u8(i % 4).unwrap()
}
