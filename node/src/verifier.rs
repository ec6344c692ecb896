// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! One verification attempt: pull, reverse, compare.

use std::sync::Arc;

use reverso_kernel::types::VariantId;
use reverso_kernel::verify::{verify, VerificationOutcome};

use crate::api::{PullPayload, ReportRequest, ReportVerdict};
use crate::errors::TransportError;
use crate::ledger::VerificationRecord;
use crate::protocol::GenerationPeer;

/// Why an attempt did not produce a verdict.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttemptError {
    /// Worth another attempt.
    Transport(TransportError),
    /// The payload itself is unusable (malformed sequence, mismatched
    /// buffer); retrying would replay the same bytes.
    Data(String),
}

impl AttemptError {
    pub fn is_retryable(&self) -> bool {
        match self {
            AttemptError::Transport(e) => e.is_retryable(),
            AttemptError::Data(_) => false,
        }
    }
}

impl std::fmt::Display for AttemptError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AttemptError::Transport(e) => write!(f, "{}", e),
            AttemptError::Data(msg) => write!(f, "unusable payload: {}", msg),
        }
    }
}

impl From<TransportError> for AttemptError {
    fn from(e: TransportError) -> Self {
        AttemptError::Transport(e)
    }
}

pub struct VerificationEngine {
    peer: Arc<dyn GenerationPeer>,
}

impl VerificationEngine {
    pub fn new(peer: Arc<dyn GenerationPeer>) -> Self {
        Self { peer }
    }

    pub fn peer(&self) -> &Arc<dyn GenerationPeer> {
        &self.peer
    }

    /// Pulls the variant and reaches a verdict. Nothing is recorded or
    /// reported here.
    pub async fn check(&self, variant_id: VariantId) -> Result<VerificationOutcome, AttemptError> {
        let payload = self.peer.pull(variant_id).await?;
        if payload.variant_id != variant_id {
            return Err(AttemptError::Data(format!(
                "asked for variant {}, received {}",
                variant_id, payload.variant_id
            )));
        }
        tracing::debug!(
            "Pulled variant {} (#{} of image {}, {} operations)",
            variant_id,
            payload.variant_number,
            payload.image_id,
            payload.sequence.len()
        );

        // Reverse replay is CPU-bound and strictly sequential.
        match tokio::task::spawn_blocking(move || reverse_and_compare(&payload)).await {
            Ok(result) => result,
            Err(e) => Err(AttemptError::Data(format!("verification worker failed: {}", e))),
        }
    }

    /// Full attempt: check, then report the verdict. Returns the record to
    /// append once the generation side has acknowledged the report.
    pub async fn attempt(&self, variant_id: VariantId, attempt: u32) -> Result<VerificationRecord, AttemptError> {
        let outcome = self.check(variant_id).await?;
        let verdict = ReportVerdict::from(outcome.verdict);
        let report = ReportRequest {
            verdict,
            method: Some(outcome.method),
            diagnostic: outcome.diagnostic.clone(),
            reversed_hash: Some(outcome.reversed_hash),
        };
        let ack = self.peer.report(variant_id, report).await?;
        if !ack.applied {
            tracing::debug!("Report for {} ignored; variant already {}", variant_id, ack.status.as_str());
        }

        let mut record = VerificationRecord::new(variant_id, attempt, verdict);
        record.method = Some(outcome.method);
        record.diagnostic = outcome.diagnostic;
        record.sequence_digest = Some(outcome.proof.sequence_digest);
        record.reversed_hash = Some(outcome.reversed_hash);
        Ok(record)
    }
}

fn reverse_and_compare(payload: &PullPayload) -> Result<VerificationOutcome, AttemptError> {
    verify(&payload.sequence, &payload.modified, &payload.original).map_err(|e| AttemptError::Data(e.to_string()))
}
