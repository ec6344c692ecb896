// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use reverso_kernel::ops::Operation;
use reverso_kernel::types::{ImageBuffer, ImageShape, PixelFormat, VariantId, VariantStatus};
use reverso_kernel::verify::{ComparisonMethod, OriginalRef};
use reverso_node::api::{Admission, ReportRequest, ReportVerdict};
use reverso_node::config::{GenerationSettings, OriginalRetention, RetryPolicy, SchedulerSettings};
use reverso_node::coordinator::{Coordinator, Notifier};
use reverso_node::errors::TransportError;
use reverso_node::generation::{GenerationEngine, VariantPlan};
use reverso_node::ledger::VerificationLedger;
use reverso_node::protocol::VerificationPeer;
use reverso_node::scheduler::VerificationScheduler;
use reverso_node::store::{MemoryStore, VariantStore};
use tokio::sync::mpsc;

fn source() -> ImageBuffer {
    let shape = ImageShape::new(8, 6, PixelFormat::Rgb8);
    let data = (0..shape.byte_len()).map(|i| (i * 13 % 256) as u8).collect();
    ImageBuffer::new(shape, data).unwrap()
}

fn quick_retry() -> RetryPolicy {
    RetryPolicy { max_attempts: 3, base_delay: Duration::from_millis(5), max_delay: Duration::from_millis(20) }
}

fn generation_settings() -> GenerationSettings {
    GenerationSettings { max_ops_per_variant: Some(128), workers: 2, ..Default::default() }
}

fn report(verdict: ReportVerdict) -> ReportRequest {
    ReportRequest { verdict, method: Some(ComparisonMethod::ExactBytes), diagnostic: None, reversed_hash: None }
}

async fn one_variant(store: Arc<MemoryStore>) -> VariantId {
    let engine = GenerationEngine::new(store, generation_settings());
    let image = engine.upload(source()).unwrap();
    let summary = engine
        .generate_planned(image.image_id, vec![VariantPlan::Explicit(vec![Operation::xor_mask(3, 5)])])
        .await
        .unwrap();
    summary.generated[0]
}

async fn wait_until<F: Fn() -> bool>(what: &str, check: F) {
    for _ in 0..500 {
        if check() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("timed out waiting for {}", what);
}

/// Records notifications and optionally fails them.
#[derive(Default)]
struct RecordingPeer {
    seen: Mutex<Vec<VariantId>>,
    fail: bool,
}

#[async_trait]
impl VerificationPeer for RecordingPeer {
    async fn notify(&self, variant_id: VariantId) -> Result<Admission, TransportError> {
        self.seen.lock().unwrap().push(variant_id);
        if self.fail {
            return Err(TransportError::Unreachable("connection refused".into()));
        }
        Ok(Admission::Queued)
    }
}

#[tokio::test]
async fn test_report_is_idempotent() {
    let store = Arc::new(MemoryStore::new());
    let id = one_variant(store.clone()).await;
    let coordinator = Coordinator::new(store.clone(), OriginalRetention::Exact);

    store.update_status(id, VariantStatus::VerificationRequested).unwrap();
    let first = coordinator.report(id, &report(ReportVerdict::Match)).unwrap();
    assert!(first.applied);
    assert_eq!(first.status, VariantStatus::VerifiedOk);

    // A late or duplicated report never overwrites a terminal status.
    let again = coordinator.report(id, &report(ReportVerdict::Match)).unwrap();
    assert!(!again.applied);
    let late = coordinator.report(id, &report(ReportVerdict::Mismatch)).unwrap();
    assert!(!late.applied);
    assert_eq!(late.status, VariantStatus::VerifiedOk);
    assert_eq!(store.fetch_variant(id).unwrap().status, VariantStatus::VerifiedOk);
}

#[tokio::test]
async fn test_pull_serves_sequence_with_original() {
    let store = Arc::new(MemoryStore::new());
    let id = one_variant(store.clone()).await;

    let exact = Coordinator::new(store.clone(), OriginalRetention::Exact).pull(id).unwrap();
    assert_eq!(exact.variant_id, id);
    assert_eq!(exact.variant_number, 1);
    assert_eq!(exact.original, OriginalRef::Exact(source().into_bytes()));
    assert_eq!(exact.sequence.reverse(&exact.modified).unwrap(), source());

    let hashed = Coordinator::new(store, OriginalRetention::HashOnly).pull(id).unwrap();
    assert_eq!(hashed.original.method(), ComparisonMethod::ContentHash);

    let decoded = reverso_node::api::PullPayload::decode(&exact.encode().unwrap()).unwrap();
    assert_eq!(decoded, exact);
}

#[tokio::test]
async fn test_notify_marks_requested_and_failures_wait_for_reconcile() {
    let store = Arc::new(MemoryStore::new());
    let id = one_variant(store.clone()).await;

    let failing = Arc::new(RecordingPeer { fail: true, ..Default::default() });
    let notifier = Notifier::new(store.clone(), failing.clone(), quick_retry());
    assert!(!notifier.notify_one(id).await);
    assert_eq!(failing.seen.lock().unwrap().len(), 3);
    // Requested before the first notify went out.
    assert_eq!(store.fetch_variant(id).unwrap().status, VariantStatus::VerificationRequested);

    let coordinator = Coordinator::new(store.clone(), OriginalRetention::Exact);
    assert_eq!(coordinator.stuck(Duration::ZERO).unwrap(), vec![id]);

    let healthy = Arc::new(RecordingPeer::default());
    let notifier = Notifier::new(store.clone(), healthy.clone(), quick_retry());
    assert_eq!(notifier.reconcile_once(Duration::ZERO).await, 1);
    assert_eq!(*healthy.seen.lock().unwrap(), vec![id]);

    // Terminal variants are neither stuck nor re-notified.
    coordinator.report(id, &report(ReportVerdict::Mismatch)).unwrap();
    assert!(coordinator.stuck(Duration::ZERO).unwrap().is_empty());
    assert_eq!(notifier.reconcile_once(Duration::ZERO).await, 0);
    assert!(notifier.notify_one(id).await);
    assert_eq!(healthy.seen.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn test_in_process_pipeline_verifies_every_variant() {
    let store = Arc::new(MemoryStore::new());
    let coordinator = Arc::new(Coordinator::new(store.clone(), OriginalRetention::Exact));
    let ledger = Arc::new(VerificationLedger::in_memory());
    let scheduler = VerificationScheduler::new(
        coordinator.clone(),
        ledger.clone(),
        SchedulerSettings { max_in_flight: 3, queue_capacity: 4, retry: quick_retry(), ..Default::default() },
    );
    scheduler.start().unwrap();

    let notifier = Arc::new(Notifier::new(store.clone(), scheduler.clone(), quick_retry()));
    let (tx, rx) = mpsc::unbounded_channel();
    tokio::spawn(notifier.run(rx));

    let engine = GenerationEngine::new(store.clone(), generation_settings()).with_outbox(tx);
    let image = engine.upload(source()).unwrap();
    let summary = engine.generate(image.image_id, 20).await.unwrap();
    assert!(summary.is_complete());

    wait_until("every variant verified", || {
        coordinator.image_stats(image.image_id, 0).unwrap().verified_ok == 20
    })
    .await;
    wait_until("scheduler idle", || scheduler.is_idle()).await;

    let stats = ledger.stats();
    assert_eq!(stats.total, 20);
    assert_eq!(stats.matched, 20);
    assert_eq!(stats.success_rate, 1.0);
    for id in &summary.generated {
        let records = ledger.for_variant(*id);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].attempt, 1);
        assert_eq!(records[0].method, Some(ComparisonMethod::ExactBytes));
        assert_eq!(records[0].sequence_digest, Some(store.fetch_variant(*id).unwrap().sequence_digest));
    }

    // A repeated notification for a settled variant does no work.
    assert_eq!(scheduler.submit(summary.generated[0]), Admission::Coalesced);
}

#[tokio::test]
async fn test_hash_only_retention_still_verifies() {
    let store = Arc::new(MemoryStore::new());
    let id = one_variant(store.clone()).await;
    let coordinator = Arc::new(Coordinator::new(store.clone(), OriginalRetention::HashOnly));
    let ledger = Arc::new(VerificationLedger::in_memory());
    let scheduler = VerificationScheduler::new(coordinator, ledger.clone(), SchedulerSettings::default());
    scheduler.start().unwrap();

    let notifier = Notifier::new(store.clone(), scheduler.clone(), quick_retry());
    assert!(notifier.notify_one(id).await);

    wait_until("verdict recorded", || ledger.len() == 1).await;
    let record = &ledger.for_variant(id)[0];
    assert_eq!(record.verdict, ReportVerdict::Match);
    assert_eq!(record.method, Some(ComparisonMethod::ContentHash));
    assert_eq!(store.fetch_variant(id).unwrap().status, VariantStatus::VerifiedOk);
}
