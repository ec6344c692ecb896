// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! Seeded repeating XOR key. Self-inverse.

use crate::config::MAX_KEY_LENGTH;
use crate::error::{KernelError, Result};
use crate::ops::prng::{Pcg32, STREAM_XOR};
use crate::ops::region::{pixel_range, Region};
use crate::types::image::ImageShape;

pub(crate) fn validate(key_length: u32, region: Option<&Region>, shape: &ImageShape) -> Result<()> {
    if key_length == 0 || key_length > MAX_KEY_LENGTH {
        return Err(KernelError::configuration(format!(
            "XorMask key_length {} outside 1..={}",
            key_length, MAX_KEY_LENGTH
        )));
    }
    if let Some(r) = region {
        r.check(shape)?;
    }
    Ok(())
}

pub(crate) fn key_stream(seed: u64, key_length: u32) -> Vec<u8> {
    let mut rng = Pcg32::new(seed, STREAM_XOR);
    (0..key_length).map(|_| rng.next_u32() as u8).collect()
}

pub(crate) fn apply(
    seed: u64,
    key_length: u32,
    region: Option<&Region>,
    shape: &ImageShape,
    bytes: &mut [u8],
) -> Result<()> {
    validate(key_length, region, shape)?;
    let range = pixel_range(region, shape)?;
    let c = shape.channels();
    let key = key_stream(seed, key_length);

    // The key restarts at the first byte of the region.
    for (b, k) in bytes[range.start * c..range.end * c]
        .iter_mut()
        .zip(key.iter().cycle())
    {
        *b ^= k;
    }
    Ok(())
}
