// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! Verification work queue.
//!
//! Notified variant ids enter a bounded queue. A dispatcher hands them to
//! workers, at most `max_in_flight` at a time. When the queue is full an id
//! is parked in a backlog that is drained as room appears, so admission
//! never blocks the notifier and nothing is dropped. An id that is already
//! queued, parked or running is coalesced.
//!
//! Each job retries transport failures with exponential backoff, every
//! attempt under a timeout, and records every failed attempt in the ledger.
//! When attempts run out, or the payload turns out
//! to be unusable, a `VerificationError` record is written and reported:
//! the variant is then known to be unverifiable, which is not the same as
//! verified-and-different.

use std::collections::{HashSet, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinHandle;
use reverso_kernel::types::VariantId;

use crate::api::{Admission, ReportRequest, ReportVerdict};
use crate::config::SchedulerSettings;
use crate::errors::TransportError;
use crate::ledger::{VerificationLedger, VerificationRecord};
use crate::protocol::{GenerationPeer, VerificationPeer};
use crate::telemetry::{VERIFICATIONS, VERIFICATION_IN_FLIGHT, VERIFICATION_RETRIES};
use crate::verifier::{AttemptError, VerificationEngine};

pub struct VerificationScheduler {
    engine: VerificationEngine,
    ledger: Arc<VerificationLedger>,
    settings: SchedulerSettings,
    tx: mpsc::Sender<VariantId>,
    rx: Mutex<Option<mpsc::Receiver<VariantId>>>,
    /// Queued, parked or running.
    tracked: Mutex<HashSet<VariantId>>,
    backlog: Mutex<VecDeque<VariantId>>,
    /// Variants whose verdict the generation side has acknowledged.
    settled: Mutex<HashSet<VariantId>>,
    permits: Arc<Semaphore>,
}

impl VerificationScheduler {
    pub fn new(
        peer: Arc<dyn GenerationPeer>,
        ledger: Arc<VerificationLedger>,
        settings: SchedulerSettings,
    ) -> Arc<Self> {
        let (tx, rx) = mpsc::channel(settings.queue_capacity.max(1));
        let permits = Arc::new(Semaphore::new(settings.max_in_flight.max(1)));

        // Match and mismatch records are only written after an acknowledged report.
        let settled = ledger.settled_variants();

        Arc::new(Self {
            engine: VerificationEngine::new(peer),
            ledger,
            settings,
            tx,
            rx: Mutex::new(Some(rx)),
            tracked: Mutex::new(HashSet::new()),
            backlog: Mutex::new(VecDeque::new()),
            settled: Mutex::new(settled),
            permits,
        })
    }

    pub fn ledger(&self) -> &Arc<VerificationLedger> {
        &self.ledger
    }

    pub fn settings(&self) -> &SchedulerSettings {
        &self.settings
    }

    /// Admits one variant id. Never blocks.
    pub fn submit(&self, variant_id: VariantId) -> Admission {
        if self.settled.lock().map(|s| s.contains(&variant_id)).unwrap_or(false) {
            return Admission::Coalesced;
        }
        let mut tracked = match self.tracked.lock() {
            Ok(t) => t,
            Err(_) => return Admission::Deferred,
        };
        if !tracked.insert(variant_id) {
            return Admission::Coalesced;
        }
        match self.tx.try_send(variant_id) {
            Ok(()) => Admission::Queued,
            Err(_) => {
                if let Ok(mut backlog) = self.backlog.lock() {
                    backlog.push_back(variant_id);
                }
                tracing::debug!("Queue full; variant {} parked in backlog", variant_id);
                Admission::Deferred
            }
        }
    }

    /// Moves parked ids into the queue while it has room.
    pub fn drain_backlog(&self) -> usize {
        let mut backlog = match self.backlog.lock() {
            Ok(b) => b,
            Err(_) => return 0,
        };
        let mut moved = 0;
        while let Some(id) = backlog.front().copied() {
            if self.tx.try_send(id).is_err() {
                break;
            }
            backlog.pop_front();
            moved += 1;
        }
        moved
    }

    pub fn backlog_len(&self) -> usize {
        self.backlog.lock().map(|b| b.len()).unwrap_or(0)
    }

    /// No job queued, parked or running.
    pub fn is_idle(&self) -> bool {
        self.tracked.lock().map(|t| t.is_empty()).unwrap_or(false)
    }

    fn finish(&self, variant_id: VariantId) {
        if let Ok(mut tracked) = self.tracked.lock() {
            tracked.remove(&variant_id);
        }
    }

    fn settle(&self, variant_id: VariantId) {
        if let Ok(mut settled) = self.settled.lock() {
            settled.insert(variant_id);
        }
    }

    /// Starts the dispatcher. Returns `None` if it is already running.
    pub fn start(self: &Arc<Self>) -> Option<JoinHandle<()>> {
        let mut rx = self.rx.lock().ok()?.take()?;
        let this = self.clone();
        Some(tokio::spawn(async move {
            tracing::info!(
                "Verification scheduler started ({} in flight, queue {})",
                this.settings.max_in_flight,
                this.settings.queue_capacity
            );
            while let Some(variant_id) = rx.recv().await {
                this.drain_backlog();
                let permit = match this.permits.clone().acquire_owned().await {
                    Ok(p) => p,
                    Err(_) => break,
                };
                let worker = this.clone();
                tokio::spawn(async move {
                    metrics::increment_gauge!(VERIFICATION_IN_FLIGHT, 1.0);
                    worker.process(variant_id).await;
                    metrics::decrement_gauge!(VERIFICATION_IN_FLIGHT, 1.0);
                    worker.finish(variant_id);
                    drop(permit);
                    worker.drain_backlog();
                });
            }
        }))
    }

    async fn process(&self, variant_id: VariantId) {
        let retry = self.settings.retry;
        let max_attempts = retry.max_attempts.max(1);
        let timeout = self.settings.attempt_timeout;
        let mut last_error = None;
        let mut attempts_made = 0;

        for attempt in 1..=max_attempts {
            attempts_made = attempt;
            let result = match tokio::time::timeout(timeout, self.engine.attempt(variant_id, attempt)).await {
                Ok(r) => r,
                Err(_) => Err(AttemptError::Transport(TransportError::Timeout(timeout.as_millis() as u64))),
            };

            match result {
                Ok(record) => {
                    tracing::info!(
                        "Variant {} verified: {} (attempt {})",
                        variant_id,
                        record.verdict.as_str(),
                        attempt
                    );
                    metrics::increment_counter!(VERIFICATIONS, "verdict" => record.verdict.as_str());
                    self.settle(variant_id);
                    if let Err(e) = self.ledger.append(record) {
                        tracing::error!("Could not record verdict for {}: {}", variant_id, e);
                    }
                    return;
                }
                Err(e) if e.is_retryable() => {
                    tracing::warn!(
                        "Verification of {} failed (attempt {}/{}): {}",
                        variant_id,
                        attempt,
                        max_attempts,
                        e
                    );
                    if attempt < max_attempts {
                        // Each failed attempt stays in the audit history; the last one
                        // is recorded below together with the report.
                        let mut record = VerificationRecord::new(variant_id, attempt, ReportVerdict::Error);
                        record.diagnostic = Some(e.to_string());
                        if let Err(err) = self.ledger.append(record) {
                            tracing::error!("Could not record failed attempt for {}: {}", variant_id, err);
                        }
                    }
                    last_error = Some(e);
                    if attempt < max_attempts {
                        metrics::increment_counter!(VERIFICATION_RETRIES);
                        tokio::time::sleep(retry.delay_for(attempt)).await;
                    }
                }
                Err(e) => {
                    last_error = Some(e);
                    break;
                }
            }
        }

        let detail = last_error.map(|e| e.to_string()).unwrap_or_else(|| "no attempt made".into());
        tracing::error!(
            "Variant {} could not be verified after {} attempt(s): {}",
            variant_id,
            attempts_made,
            detail
        );

        let mut record = VerificationRecord::new(variant_id, attempts_made, ReportVerdict::Error);
        record.diagnostic = Some(detail.clone());

        let report = ReportRequest {
            verdict: ReportVerdict::Error,
            method: None,
            diagnostic: Some(detail),
            reversed_hash: None,
        };
        match tokio::time::timeout(timeout, self.engine.peer().report(variant_id, report)).await {
            Ok(Ok(_)) => self.settle(variant_id),
            Ok(Err(e)) => tracing::warn!("Error report for {} not delivered: {}", variant_id, e),
            Err(_) => tracing::warn!("Error report for {} timed out", variant_id),
        }

        metrics::increment_counter!(VERIFICATIONS, "verdict" => ReportVerdict::Error.as_str());
        if let Err(e) = self.ledger.append(record) {
            tracing::error!("Could not record verification error for {}: {}", variant_id, e);
        }
    }

    /// Drains the backlog and re-admits every variant the generation side
    /// still considers unverified. Returns how many were newly queued.
    pub async fn reconcile_once(&self, stuck_after: Duration) -> usize {
        self.drain_backlog();
        let stuck = match self.engine.peer().stuck(stuck_after).await {
            Ok(ids) => ids,
            Err(e) => {
                tracing::warn!("Reconciliation poll failed: {}", e);
                return 0;
            }
        };
        let queued = stuck
            .into_iter()
            .filter(|id| self.submit(*id) == Admission::Queued)
            .count();
        if queued > 0 {
            tracing::info!("Reconciliation: queued {} stuck variants", queued);
        }
        queued
    }

    pub fn spawn_reconciler(self: &Arc<Self>, interval: Duration, stuck_after: Duration) -> JoinHandle<()> {
        let this = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                this.reconcile_once(stuck_after).await;
            }
        })
    }
}

#[async_trait]
impl VerificationPeer for VerificationScheduler {
    async fn notify(&self, variant_id: VariantId) -> Result<Admission, TransportError> {
        Ok(self.submit(variant_id))
    }
}
