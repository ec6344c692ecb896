// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! Seeded block permutation.
//!
//! Pixels are shuffled inside consecutive blocks of `block_size` pixels.
//! Because `block_size` divides the image width, every block lies inside a
//! single row. All blocks use the same permutation, derived from the seed by
//! Fisher-Yates over the PCG32 permute stream, so the inverse is recomputed
//! from the seed alone.

use crate::config::MAX_BLOCK_SIZE;
use crate::error::{KernelError, Result};
use crate::ops::prng::{Pcg32, STREAM_PERMUTE};
use crate::ops::region::{pixel_range, Region};
use crate::types::image::ImageShape;

pub(crate) fn validate(block_size: u32, region: Option<&Region>, shape: &ImageShape) -> Result<()> {
    if block_size == 0 || block_size > MAX_BLOCK_SIZE {
        return Err(KernelError::configuration(format!(
            "PermuteBlock block_size {} outside 1..={}",
            block_size, MAX_BLOCK_SIZE
        )));
    }
    if shape.width % block_size != 0 {
        return Err(KernelError::configuration(format!(
            "PermuteBlock block_size {} does not divide image width {}",
            block_size, shape.width
        )));
    }
    if let Some(r) = region {
        r.check(shape)?;
        if r.start % block_size != 0 || r.len % block_size != 0 {
            return Err(KernelError::configuration(format!(
                "PermuteBlock region {}+{} is not aligned to block_size {}",
                r.start, r.len, block_size
            )));
        }
    }
    Ok(())
}

/// Permutation of `0..block_size` for `seed`.
pub(crate) fn permutation(seed: u64, block_size: u32) -> Vec<u32> {
    let mut perm: Vec<u32> = (0..block_size).collect();
    let mut rng = Pcg32::new(seed, STREAM_PERMUTE);
    for i in (1..perm.len()).rev() {
        let j = rng.below(i as u32 + 1) as usize;
        perm.swap(i, j);
    }
    perm
}

pub(crate) fn apply(
    seed: u64,
    block_size: u32,
    region: Option<&Region>,
    inverted: bool,
    shape: &ImageShape,
    bytes: &mut [u8],
) -> Result<()> {
    validate(block_size, region, shape)?;
    if block_size == 1 {
        return Ok(());
    }

    let range = pixel_range(region, shape)?;
    let c = shape.channels();
    let bs = block_size as usize;
    let perm = permutation(seed, block_size);
    let mut scratch = vec![0u8; bs * c];

    for block_start in range.step_by(bs) {
        let block = &mut bytes[block_start * c..(block_start + bs) * c];
        scratch.copy_from_slice(block);
        for (i, &p) in perm.iter().enumerate() {
            let p = p as usize;
            if inverted {
                // out[i] = in[perm[i]]
                block[i * c..(i + 1) * c].copy_from_slice(&scratch[p * c..(p + 1) * c]);
            } else {
                // out[perm[i]] = in[i]
                block[p * c..(p + 1) * c].copy_from_slice(&scratch[i * c..(i + 1) * c]);
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_permutation_is_bijection() {
        for seed in 0..32u64 {
            let mut perm = permutation(seed, 16);
            perm.sort_unstable();
            assert_eq!(perm, (0..16).collect::<Vec<u32>>());
        }
    }

    #[test]
    fn test_permutation_depends_on_seed() {
        assert_ne!(permutation(1, 32), permutation(2, 32));
        assert_eq!(permutation(9, 32), permutation(9, 32));
    }
}
