// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! Deterministic Replay Logic.

use crate::digest::{content_hash, ContentHash};
use crate::error::{KernelError, Result};
use crate::sequence::InstructionSequence;
use crate::types::image::ImageBuffer;

fn check_shape(sequence: &InstructionSequence, buffer: &ImageBuffer) -> Result<()> {
    if buffer.shape() != sequence.shape() {
        return Err(KernelError::application(format!(
            "buffer shape {:?} does not match sequence shape {:?}",
            buffer.shape(),
            sequence.shape()
        )));
    }
    Ok(())
}

/// Applies every operation of `sequence`, in order, to a copy of `source`.
///
/// The source is never touched; generation hands the same source to many
/// workers at once.
pub fn replay_forward(sequence: &InstructionSequence, source: &ImageBuffer) -> Result<ImageBuffer> {
    check_shape(sequence, source)?;
    let mut working = source.clone();
    for op in sequence.operations() {
        op.apply(&mut working)?;
    }
    Ok(working)
}

/// Applies the inverse of every operation, last to first, to a copy of `modified`.
///
/// Strictly sequential: each inverse consumes the output of the previous one.
pub fn replay_reverse(sequence: &InstructionSequence, modified: &ImageBuffer) -> Result<ImageBuffer> {
    check_shape(sequence, modified)?;
    let mut working = modified.clone();
    for op in sequence.inverse_operations() {
        op.apply(&mut working)?;
    }
    Ok(working)
}

/// Reverse replay followed by the content hash of the result.
///
/// This is the whole computation an auditor needs when only the digest of
/// the original was retained.
pub fn replay_reverse_and_hash(
    sequence: &InstructionSequence,
    modified: &ImageBuffer,
) -> Result<(ImageBuffer, ContentHash)> {
    let reversed = replay_reverse(sequence, modified)?;
    let hash = content_hash(&reversed);
    Ok((reversed, hash))
}
