// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
use serde::{Deserialize, Serialize};
use reverso_kernel::digest::ContentHash;
use reverso_kernel::sequence::InstructionSequence;
use reverso_kernel::ops::Operation;
use reverso_kernel::types::{ImageBuffer, ImageId, ImageShape, VariantId, VariantStatus};
use reverso_kernel::verify::{ComparisonMethod, OriginalRef, Verdict};

use crate::coordinator::ImageStats;
use crate::errors::TransportError;
use crate::generation::{GenerationSummary, JobState};
use crate::ledger::VerificationRecord;

/// Verdict as reported back to the generation side. `Error` means the
/// verifier could not reach a verdict at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportVerdict {
    Match,
    Mismatch,
    Error,
}

impl ReportVerdict {
    pub fn target_status(self) -> VariantStatus {
        match self {
            ReportVerdict::Match => VariantStatus::VerifiedOk,
            ReportVerdict::Mismatch => VariantStatus::VerifiedFailed,
            ReportVerdict::Error => VariantStatus::VerificationError,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ReportVerdict::Match => "match",
            ReportVerdict::Mismatch => "mismatch",
            ReportVerdict::Error => "error",
        }
    }
}

impl From<Verdict> for ReportVerdict {
    fn from(v: Verdict) -> Self {
        match v {
            Verdict::Match => ReportVerdict::Match,
            Verdict::Mismatch => ReportVerdict::Mismatch,
        }
    }
}

// ---- Protocol ----

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotifyRequest {
    pub variant_id: VariantId,
}

/// What the scheduler did with a submitted variant id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Admission {
    Queued,
    /// Already queued, deferred or running.
    Coalesced,
    /// Queue full; parked in the backlog until there is room.
    Deferred,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotifyResponse {
    pub variant_id: VariantId,
    pub admission: Admission,
}

/// Everything a verifier needs, fetched by variant identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PullPayload {
    pub variant_id: VariantId,
    pub image_id: ImageId,
    pub variant_number: u32,
    pub sequence: InstructionSequence,
    pub modified: ImageBuffer,
    pub original: OriginalRef,
}

impl PullPayload {
    pub fn encode(&self) -> Result<Vec<u8>, TransportError> {
        bincode::serde::encode_to_vec(self, bincode::config::standard())
            .map_err(|e| TransportError::Decode(e.to_string()))
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, TransportError> {
        let (payload, read): (Self, usize) = bincode::serde::decode_from_slice(bytes, bincode::config::standard())
            .map_err(|e| TransportError::Decode(e.to_string()))?;
        if read != bytes.len() {
            return Err(TransportError::Decode(format!("{} trailing bytes in payload", bytes.len() - read)));
        }
        Ok(payload)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportRequest {
    pub verdict: ReportVerdict,
    pub method: Option<ComparisonMethod>,
    pub diagnostic: Option<String>,
    pub reversed_hash: Option<ContentHash>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportResponse {
    pub variant_id: VariantId,
    pub status: VariantStatus,
    /// False when the variant was already terminal and the report was ignored.
    pub applied: bool,
}

#[derive(Debug, Deserialize)]
pub struct StuckQuery {
    pub older_than_secs: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StuckResponse {
    pub variant_ids: Vec<VariantId>,
}

// ---- Generation side ----

#[derive(Debug, Deserialize)]
pub struct UploadQuery {
    pub width: u32,
    pub height: u32,
    pub format: String,
    pub variants: Option<usize>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct UploadResponse {
    pub image_id: ImageId,
    pub variant_count: usize,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ImageProgressResponse {
    pub image_id: ImageId,
    pub state: JobState,
    pub requested: usize,
    pub summary: Option<GenerationSummary>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ImageStatsResponse {
    pub image_id: ImageId,
    #[serde(flatten)]
    pub stats: ImageStats,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct VariantSummary {
    pub variant_id: VariantId,
    pub variant_number: u32,
    pub status: VariantStatus,
    pub op_count: usize,
    pub created_at: u64,
}

/// Everything recorded about one variant except its pixels.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VariantDetails {
    pub variant_id: VariantId,
    pub image_id: ImageId,
    pub variant_number: u32,
    pub status: VariantStatus,
    pub seed: Option<u64>,
    pub shape: ImageShape,
    /// In application order.
    pub operations: Vec<Operation>,
    /// Hex BLAKE3 of the canonical sequence encoding.
    pub sequence_digest: String,
    pub created_at: u64,
    pub status_changed_at: u64,
}

// ---- Verification side ----

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HistoryPage {
    pub records: Vec<VerificationRecord>,
    pub total: usize,
    pub limit: usize,
    pub offset: usize,
}
