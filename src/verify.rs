// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! Reversal and comparison.

use serde::{Deserialize, Serialize};

use crate::config::KERNEL_VERSION;
use crate::digest::{content_hash, ContentHash};
use crate::error::{KernelError, Result};
use crate::proof::ReversalProof;
use crate::replay::replay_reverse_and_hash;
use crate::sequence::InstructionSequence;
use crate::types::image::ImageBuffer;

/// What the reversed buffer is compared against.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum OriginalRef {
    /// The original pixel bytes.
    Exact(Vec<u8>),
    /// Only the content hash of the original was retained.
    ContentHash(ContentHash),
}

impl OriginalRef {
    pub fn method(&self) -> ComparisonMethod {
        match self {
            OriginalRef::Exact(_) => ComparisonMethod::ExactBytes,
            OriginalRef::ContentHash(_) => ComparisonMethod::ContentHash,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComparisonMethod {
    ExactBytes,
    ContentHash,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    Match,
    Mismatch,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationOutcome {
    pub verdict: Verdict,
    pub method: ComparisonMethod,
    pub reversed_hash: ContentHash,
    /// First differing byte offset for an exact comparison.
    pub first_mismatch: Option<usize>,
    /// Human-readable reason for a mismatch.
    pub diagnostic: Option<String>,
    pub proof: ReversalProof,
}

impl VerificationOutcome {
    pub fn is_match(&self) -> bool {
        self.verdict == Verdict::Match
    }
}

/// Reverses `sequence` on `modified` and compares the result with `original`.
///
/// A mismatch is a verdict, not an error. `Err` means the reversal could not
/// be carried out at all: a malformed sequence or a buffer that does not fit
/// it. Both surface as [`KernelError::Application`] (or `Encoding` when the
/// sequence cannot be re-encoded for its digest).
pub fn verify(
    sequence: &InstructionSequence,
    modified: &ImageBuffer,
    original: &OriginalRef,
) -> Result<VerificationOutcome> {
    sequence.check_integrity()?;
    let sequence_digest = sequence.digest()?;
    let variant_hash = content_hash(modified);
    let (reversed, reversed_hash) =
        replay_reverse_and_hash(sequence, modified).map_err(KernelError::into_application)?;

    let (verdict, first_mismatch, diagnostic) = match original {
        OriginalRef::Exact(bytes) => compare_exact(reversed.as_bytes(), bytes),
        OriginalRef::ContentHash(expected) => {
            if *expected == reversed_hash {
                (Verdict::Match, None, None)
            } else {
                (
                    Verdict::Mismatch,
                    None,
                    Some(format!("content hash {} != expected {}", reversed_hash, expected)),
                )
            }
        }
    };

    let method = original.method();
    Ok(VerificationOutcome {
        verdict,
        method,
        reversed_hash,
        first_mismatch,
        diagnostic,
        proof: ReversalProof {
            kernel_version: KERNEL_VERSION,
            sequence_digest,
            variant_hash,
            reversed_hash,
            method,
            verdict,
        },
    })
}

fn compare_exact(reversed: &[u8], original: &[u8]) -> (Verdict, Option<usize>, Option<String>) {
    if let Some(offset) = reversed.iter().zip(original).position(|(a, b)| a != b) {
        return (
            Verdict::Mismatch,
            Some(offset),
            Some(format!(
                "first mismatch at byte {}: reversed {:#04x}, original {:#04x}",
                offset, reversed[offset], original[offset]
            )),
        );
    }
    if reversed.len() != original.len() {
        let offset = reversed.len().min(original.len());
        return (
            Verdict::Mismatch,
            Some(offset),
            Some(format!(
                "length mismatch: reversed {} bytes, original {} bytes",
                reversed.len(),
                original.len()
            )),
        );
    }
    (Verdict::Match, None, None)
}
