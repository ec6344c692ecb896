// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! Reversal proof receipts.

use serde::{Deserialize, Serialize};

use crate::digest::ContentHash;
use crate::verify::{ComparisonMethod, Verdict};

/// Receipt of one reversal.
///
/// Names the exact sequence that was replayed (by the digest of its canonical
/// encoding), the variant it was replayed on, and what came out. Anyone
/// holding the same sequence and variant can recompute every field.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ReversalProof {
    /// Operation codec version the sequence was replayed with.
    pub kernel_version: u64,

    /// BLAKE3 of the canonical sequence encoding.
    pub sequence_digest: ContentHash,

    /// Content hash of the variant buffer before reversal.
    pub variant_hash: ContentHash,

    /// Content hash of the buffer after reversal.
    pub reversed_hash: ContentHash,

    pub method: ComparisonMethod,
    pub verdict: Verdict,
}
