// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! Randomized but reproducible operation draws.
//!
//! Generation picks a per-variant seed; everything else (how many operations,
//! which kinds, their seeds, key lengths, block sizes and regions) is drawn
//! from a [`Pcg32`] seeded with it. A variant can therefore be regenerated
//! bit-for-bit from its seed, although verification never needs to: the
//! drawn parameters are stored in the sequence.

use serde::{Deserialize, Serialize};

use crate::config::{MAX_BLOCK_SIZE, MAX_KEY_LENGTH, MAX_SAMPLED_REGION, MIN_OPS_PER_VARIANT};
use crate::error::{KernelError, Result};
use crate::ops::prng::{Pcg32, STREAM_SAMPLER};
use crate::ops::{Operation, OperationKind, Region};
use crate::sequence::InstructionSequence;
use crate::types::id::ImageId;
use crate::types::image::ImageShape;

/// Inclusive range of operation counts per variant.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpCountRange {
    pub min: usize,
    pub max: usize,
}

impl OpCountRange {
    pub fn new(min: usize, max: usize) -> Result<Self> {
        if min == 0 || min > max {
            return Err(KernelError::configuration(format!(
                "operation count range {}..={} is empty or starts at zero",
                min, max
            )));
        }
        Ok(Self { min, max })
    }

    /// Range for an image: at least [`MIN_OPS_PER_VARIANT`] and at most one
    /// operation per pixel. Images smaller than the minimum get
    /// `max(1, pixels / 2)..=pixels`. `cap` lowers the upper bound for large
    /// images but never below the lower bound.
    pub fn for_image(shape: &ImageShape, cap: Option<usize>) -> Self {
        let pixels = shape.pixel_count().max(1);
        let (min, mut max) = if pixels < MIN_OPS_PER_VARIANT {
            ((pixels / 2).max(1), pixels)
        } else {
            (MIN_OPS_PER_VARIANT, pixels)
        };
        if let Some(cap) = cap {
            max = max.min(cap).max(min);
        }
        Self { min, max }
    }

    pub fn draw(&self, rng: &mut Pcg32) -> usize {
        rng.range_inclusive(self.min as u64, self.max as u64) as usize
    }
}

/// Draws operations that are valid for one image shape.
#[derive(Clone, Debug)]
pub struct OperationSampler {
    shape: ImageShape,
    block_sizes: Vec<u32>,
    kinds: Vec<OperationKind>,
}

impl OperationSampler {
    pub fn new(shape: ImageShape) -> Result<Self> {
        shape.validate()?;
        // Block sizes worth shuffling: divisors of the width, at least 2 pixels.
        let block_sizes: Vec<u32> = (2..=MAX_BLOCK_SIZE.min(shape.width))
            .filter(|bs| shape.width % bs == 0)
            .collect();

        let mut kinds = vec![OperationKind::XorMask];
        if !block_sizes.is_empty() {
            kinds.push(OperationKind::PermuteBlock);
        }
        if shape.channels() > 1 {
            kinds.push(OperationKind::ChannelRotate);
        }

        Ok(Self { shape, block_sizes, kinds })
    }

    pub fn shape(&self) -> ImageShape {
        self.shape
    }

    fn draw_region(&self, rng: &mut Pcg32, unit: u32) -> Region {
        let units = (self.shape.pixel_count() as u32) / unit;
        let max_units = (MAX_SAMPLED_REGION / unit).max(1).min(units);
        let len_units = 1 + rng.below(max_units);
        let start_units = rng.below(units - len_units + 1);
        Region::new(start_units * unit, len_units * unit)
    }

    pub fn draw(&self, rng: &mut Pcg32) -> Operation {
        let kind = self.kinds[rng.below(self.kinds.len() as u32) as usize];
        match kind {
            OperationKind::PermuteBlock => {
                let block_size = self.block_sizes[rng.below(self.block_sizes.len() as u32) as usize];
                let seed = rng.next_u64();
                let region = self.draw_region(rng, block_size);
                Operation::permute_block(seed, block_size).within(region)
            }
            OperationKind::XorMask => {
                let seed = rng.next_u64();
                let key_length = 1 + rng.below(MAX_KEY_LENGTH);
                let region = self.draw_region(rng, 1);
                Operation::xor_mask(seed, key_length).within(region)
            }
            OperationKind::ChannelRotate => {
                let c = self.shape.channels() as i32;
                let mut amount = 1 + rng.below((c - 1) as u32) as i32;
                if rng.below(2) == 1 {
                    amount = -amount;
                }
                let region = self.draw_region(rng, 1);
                Operation::channel_rotate(amount).within(region)
            }
        }
    }

    /// Draws `count` operations and wraps them in a validated sequence.
    pub fn draw_sequence(&self, image_id: ImageId, count: usize, rng: &mut Pcg32) -> Result<InstructionSequence> {
        let ops: Vec<Operation> = (0..count).map(|_| self.draw(rng)).collect();
        InstructionSequence::new(image_id, self.shape, ops)
    }
}

/// Seeds the sampler stream for one variant.
pub fn variant_rng(seed: u64) -> Pcg32 {
    Pcg32::new(seed, STREAM_SAMPLER)
}
