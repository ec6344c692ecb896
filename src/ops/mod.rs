// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! Operation codec.
//!
//! The closed set of reversible pixel operations. Each variant carries every
//! parameter needed to apply it forwards and backwards; nothing is read from
//! the clock or an unseeded source.
//!
//! # Law
//! For every operation `op` that validates against a shape and every buffer
//! `b` of that shape:
//! ```text
//! apply(invert(op), apply(op, b)) == b
//! ```

pub mod prng;
pub mod region;
mod permute;
mod rotate;
mod xor;

use serde::{Deserialize, Serialize};

use crate::error::{KernelError, Result};
use crate::types::image::{ImageBuffer, ImageShape};

pub use region::Region;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    /// Seeded shuffle of pixels inside fixed-size, row-aligned blocks.
    PermuteBlock {
        seed: u64,
        block_size: u32,
        region: Option<Region>,
        inverted: bool,
    },
    /// XOR with a seeded repeating key. Its own inverse.
    XorMask {
        seed: u64,
        key_length: u32,
        region: Option<Region>,
    },
    /// Cyclic rotation of the channels of each pixel by `amount` (mod channels).
    ChannelRotate { amount: i32, region: Option<Region> },
}

/// Discriminant of [`Operation`], used by the sampler and for reporting.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    PermuteBlock,
    XorMask,
    ChannelRotate,
}

impl OperationKind {
    pub const ALL: [OperationKind; 3] = [
        OperationKind::PermuteBlock,
        OperationKind::XorMask,
        OperationKind::ChannelRotate,
    ];
}

impl Operation {
    pub fn permute_block(seed: u64, block_size: u32) -> Self {
        Operation::PermuteBlock { seed, block_size, region: None, inverted: false }
    }

    pub fn xor_mask(seed: u64, key_length: u32) -> Self {
        Operation::XorMask { seed, key_length, region: None }
    }

    pub fn channel_rotate(amount: i32) -> Self {
        Operation::ChannelRotate { amount, region: None }
    }

    /// Confines the operation to `region`.
    pub fn within(self, region: Region) -> Self {
        match self {
            Operation::PermuteBlock { seed, block_size, inverted, .. } => {
                Operation::PermuteBlock { seed, block_size, region: Some(region), inverted }
            }
            Operation::XorMask { seed, key_length, .. } => {
                Operation::XorMask { seed, key_length, region: Some(region) }
            }
            Operation::ChannelRotate { amount, .. } => {
                Operation::ChannelRotate { amount, region: Some(region) }
            }
        }
    }

    pub fn kind(&self) -> OperationKind {
        match self {
            Operation::PermuteBlock { .. } => OperationKind::PermuteBlock,
            Operation::XorMask { .. } => OperationKind::XorMask,
            Operation::ChannelRotate { .. } => OperationKind::ChannelRotate,
        }
    }

    pub fn region(&self) -> Option<&Region> {
        match self {
            Operation::PermuteBlock { region, .. }
            | Operation::XorMask { region, .. }
            | Operation::ChannelRotate { region, .. } => region.as_ref(),
        }
    }

    /// Checks the parameters against the declared domain for `shape`.
    ///
    /// Fails with [`KernelError::Configuration`].
    pub fn validate(&self, shape: &ImageShape) -> Result<()> {
        shape.validate()?;
        match *self {
            Operation::PermuteBlock { block_size, ref region, .. } => {
                permute::validate(block_size, region.as_ref(), shape)
            }
            Operation::XorMask { key_length, ref region, .. } => {
                xor::validate(key_length, region.as_ref(), shape)
            }
            Operation::ChannelRotate { amount, ref region } => {
                rotate::validate(amount, region.as_ref(), shape)
            }
        }
    }

    /// The operation that undoes `self`. Pure: derived from the parameters only.
    pub fn invert(&self) -> Operation {
        match *self {
            Operation::PermuteBlock { seed, block_size, region, inverted } => {
                Operation::PermuteBlock { seed, block_size, region, inverted: !inverted }
            }
            Operation::XorMask { .. } => *self,
            Operation::ChannelRotate { amount, region } => Operation::ChannelRotate {
                amount: -amount,
                region,
            },
        }
    }

    /// Applies the operation in place.
    ///
    /// A parameter that does not fit the buffer is reported as
    /// [`KernelError::Application`]: by the time a buffer is being modified,
    /// the sequence is expected to have been validated already.
    pub fn apply(&self, buffer: &mut ImageBuffer) -> Result<()> {
        let shape = buffer.shape();
        if buffer.len() != shape.byte_len() {
            return Err(KernelError::application("buffer length does not match its shape"));
        }
        let bytes = buffer.bytes_mut();
        let res = match *self {
            Operation::PermuteBlock { seed, block_size, ref region, inverted } => {
                permute::apply(seed, block_size, region.as_ref(), inverted, &shape, bytes)
            }
            Operation::XorMask { seed, key_length, ref region } => {
                xor::apply(seed, key_length, region.as_ref(), &shape, bytes)
            }
            Operation::ChannelRotate { amount, ref region } => {
                rotate::apply(amount, region.as_ref(), &shape, bytes)
            }
        };
        res.map_err(KernelError::into_application)
    }
}
