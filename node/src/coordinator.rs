// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! Generation side of the coordination protocol.
//!
//! [`Coordinator`] answers pulls, applies reports and lists stuck variants.
//! [`Notifier`] moves freshly persisted variants to `VerificationRequested`
//! and tells the verifier about them, and periodically re-notifies variants
//! that never reached a terminal state.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use reverso_kernel::types::{ImageId, VariantId, VariantStatus};

use crate::api::{PullPayload, ReportRequest, ReportResponse, VariantDetails, VariantSummary};
use crate::config::{OriginalRetention, RetryPolicy};
use crate::errors::{EngineError, StoreError, TransportError};
use crate::protocol::{GenerationPeer, VerificationPeer};
use crate::store::{unix_millis, Transition, VariantStore};
use crate::telemetry::NOTIFY_FAILURES;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageStats {
    pub total: usize,
    pub verified_ok: usize,
    pub verified_failed: usize,
    pub verification_error: usize,
    /// Generated or waiting for a verdict.
    pub pending: usize,
    pub generation_failed: usize,
}

fn cutoff(older_than: Duration) -> u64 {
    unix_millis().saturating_sub(older_than.as_millis() as u64)
}

pub struct Coordinator {
    store: Arc<dyn VariantStore>,
    retention: OriginalRetention,
}

impl Coordinator {
    pub fn new(store: Arc<dyn VariantStore>, retention: OriginalRetention) -> Self {
        Self { store, retention }
    }

    pub fn retention(&self) -> OriginalRetention {
        self.retention
    }

    pub fn pull(&self, variant_id: VariantId) -> Result<PullPayload, EngineError> {
        let record = self.store.fetch_variant(variant_id)?;
        let original = self.store.fetch_original(record.image_id, self.retention)?;
        tracing::debug!("Serving pull for variant {} ({:?})", variant_id, original.method());
        Ok(PullPayload {
            variant_id,
            image_id: record.image_id,
            variant_number: record.variant_number,
            sequence: record.sequence,
            modified: record.modified,
            original,
        })
    }

    /// Applies a verdict. Reports for a variant that is already terminal
    /// are acknowledged and ignored.
    pub fn report(&self, variant_id: VariantId, report: &ReportRequest) -> Result<ReportResponse, EngineError> {
        let target = report.verdict.target_status();
        let transition = self.store.update_status(variant_id, target)?;
        match transition {
            Transition::Applied { from, to } => {
                tracing::info!("Variant {}: {} -> {}", variant_id, from.as_str(), to.as_str());
                if let Some(diag) = &report.diagnostic {
                    tracing::debug!("Variant {} diagnostic: {}", variant_id, diag);
                }
            }
            Transition::Ignored { current } => {
                tracing::debug!(
                    "Ignoring {} report for variant {} already {}",
                    report.verdict.as_str(),
                    variant_id,
                    current.as_str()
                );
            }
        }
        Ok(ReportResponse {
            variant_id,
            status: transition.current(),
            applied: transition.is_applied(),
        })
    }

    /// Non-terminal variants whose status has not moved for `older_than`.
    pub fn stuck(&self, older_than: Duration) -> Result<Vec<VariantId>, EngineError> {
        let cutoff = cutoff(older_than);
        let mut ids = Vec::new();
        for status in [VariantStatus::Generated, VariantStatus::VerificationRequested] {
            ids.extend(self.store.variants_in_status(status, cutoff)?.into_iter().map(|v| v.variant_id));
        }
        Ok(ids)
    }

    pub fn variants(&self, image_id: ImageId) -> Result<Vec<VariantSummary>, EngineError> {
        Ok(self
            .store
            .variants_for_image(image_id)?
            .into_iter()
            .map(|v| VariantSummary {
                variant_id: v.variant_id,
                variant_number: v.variant_number,
                status: v.status,
                op_count: v.op_count,
                created_at: v.created_at,
            })
            .collect())
    }

    pub fn details(&self, variant_id: VariantId) -> Result<VariantDetails, EngineError> {
        let v = self.store.fetch_variant(variant_id)?;
        Ok(VariantDetails {
            variant_id,
            image_id: v.image_id,
            variant_number: v.variant_number,
            status: v.status,
            seed: v.seed,
            shape: v.sequence.shape(),
            operations: v.sequence.operations().copied().collect(),
            sequence_digest: v.sequence_digest.to_hex(),
            created_at: v.created_at,
            status_changed_at: v.status_changed_at,
        })
    }

    /// Canonical encoding of the sequence that produced a variant.
    pub fn sequence_bytes(&self, variant_id: VariantId) -> Result<Vec<u8>, EngineError> {
        let sequence = self.store.fetch_sequence(variant_id)?;
        sequence.encode().map_err(|e| EngineError::Internal(e.to_string()))
    }

    pub fn variant_pixels(&self, variant_id: VariantId) -> Result<Vec<u8>, EngineError> {
        Ok(self.store.fetch_variant(variant_id)?.modified.into_bytes())
    }

    pub fn original_pixels(&self, image_id: ImageId) -> Result<Vec<u8>, EngineError> {
        Ok(self.store.fetch_image(image_id)?.buffer.into_bytes())
    }

    pub fn image_stats(&self, image_id: ImageId, generation_failed: usize) -> Result<ImageStats, EngineError> {
        let mut stats = ImageStats { generation_failed, ..Default::default() };
        for v in self.store.variants_for_image(image_id)? {
            stats.total += 1;
            match v.status {
                VariantStatus::VerifiedOk => stats.verified_ok += 1,
                VariantStatus::VerifiedFailed => stats.verified_failed += 1,
                VariantStatus::VerificationError => stats.verification_error += 1,
                VariantStatus::Generated | VariantStatus::VerificationRequested => stats.pending += 1,
            }
        }
        Ok(stats)
    }
}

fn to_transport(e: EngineError) -> TransportError {
    match e {
        EngineError::NotFound(what) => TransportError::NotFound(what),
        EngineError::InvalidInput(msg) => TransportError::Rejected(msg),
        other => TransportError::Status { status: 500, message: other.to_string() },
    }
}

#[async_trait]
impl GenerationPeer for Coordinator {
    async fn pull(&self, variant_id: VariantId) -> Result<PullPayload, TransportError> {
        Coordinator::pull(self, variant_id).map_err(to_transport)
    }

    async fn report(&self, variant_id: VariantId, report: ReportRequest) -> Result<ReportResponse, TransportError> {
        Coordinator::report(self, variant_id, &report).map_err(to_transport)
    }

    async fn stuck(&self, older_than: Duration) -> Result<Vec<VariantId>, TransportError> {
        Coordinator::stuck(self, older_than).map_err(to_transport)
    }
}

pub struct Notifier {
    store: Arc<dyn VariantStore>,
    peer: Arc<dyn VerificationPeer>,
    retry: RetryPolicy,
}

impl Notifier {
    pub fn new(store: Arc<dyn VariantStore>, peer: Arc<dyn VerificationPeer>, retry: RetryPolicy) -> Self {
        Self { store, peer, retry }
    }

    /// Requests verification of one variant. Returns whether the verifier
    /// acknowledged it (or it needs no verification any more).
    pub async fn notify_one(&self, variant_id: VariantId) -> bool {
        let current = match self.store.update_status(variant_id, VariantStatus::VerificationRequested) {
            Ok(t) => t.current(),
            Err(StoreError::NotFound(_)) => {
                tracing::warn!("Not notifying unknown variant {}", variant_id);
                return false;
            }
            Err(e) => {
                tracing::warn!("Status update for variant {} failed: {}", variant_id, e);
                return false;
            }
        };
        if current.is_terminal() {
            tracing::debug!("Variant {} already {}; no notify", variant_id, current.as_str());
            return true;
        }

        let attempts = self.retry.max_attempts.max(1);
        for attempt in 1..=attempts {
            match self.peer.notify(variant_id).await {
                Ok(admission) => {
                    tracing::debug!("Notified variant {}: {:?}", variant_id, admission);
                    return true;
                }
                Err(e) if e.is_retryable() && attempt < attempts => {
                    tracing::warn!("Notify {} failed (attempt {}/{}): {}", variant_id, attempt, attempts, e);
                    tokio::time::sleep(self.retry.delay_for(attempt)).await;
                }
                Err(e) => {
                    tracing::warn!("Notify {} failed: {}; left for reconciliation", variant_id, e);
                    break;
                }
            }
        }
        metrics::increment_counter!(NOTIFY_FAILURES);
        false
    }

    /// Drains the generation outbox until every sender is dropped.
    pub async fn run(self: Arc<Self>, mut outbox: mpsc::UnboundedReceiver<VariantId>) {
        while let Some(variant_id) = outbox.recv().await {
            self.notify_one(variant_id).await;
        }
        tracing::debug!("Notifier outbox closed");
    }

    /// Re-notifies every variant stuck in a non-terminal state for longer
    /// than `stuck_after`. Returns how many were acknowledged.
    pub async fn reconcile_once(&self, stuck_after: Duration) -> usize {
        let cutoff = cutoff(stuck_after);
        let mut stuck = Vec::new();
        for status in [VariantStatus::Generated, VariantStatus::VerificationRequested] {
            match self.store.variants_in_status(status, cutoff) {
                Ok(found) => stuck.extend(found.into_iter().map(|v| v.variant_id)),
                Err(e) => tracing::warn!("Reconciliation scan for {} failed: {}", status.as_str(), e),
            }
        }
        if stuck.is_empty() {
            return 0;
        }

        tracing::info!("Reconciliation: re-notifying {} stuck variants", stuck.len());
        let mut acknowledged = 0;
        for id in stuck {
            if self.notify_one(id).await {
                acknowledged += 1;
            }
        }
        acknowledged
    }

    pub fn spawn_reconciler(self: Arc<Self>, interval: Duration, stuck_after: Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // The first tick completes immediately.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                self.reconcile_once(stuck_after).await;
            }
        })
    }
}
