// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! Configuration constants.

/// Version of the operation codec and canonical sequence encoding.
/// Bumped whenever an operation's effect for given parameters changes.
pub const KERNEL_VERSION: u64 = 1;

/// Variants generated per uploaded image unless the caller asks otherwise.
pub const DEFAULT_VARIANT_COUNT: usize = 100;

/// Lower bound on operations per variant for images with at least this many pixels.
pub const MIN_OPS_PER_VARIANT: usize = 100;

/// Largest block a `PermuteBlock` may shuffle, in pixels.
pub const MAX_BLOCK_SIZE: u32 = 64;

/// Longest repeating key a `XorMask` may use, in bytes.
pub const MAX_KEY_LENGTH: u32 = 64;

/// Largest region the sampler draws for a single operation, in pixels.
pub const MAX_SAMPLED_REGION: u32 = 1024;

/// `ChannelRotate` accepts amounts in `-MAX_ROTATE_AMOUNT..=MAX_ROTATE_AMOUNT`.
pub const MAX_ROTATE_AMOUNT: i32 = 255;
