// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use reverso_kernel::ops::Operation;
use reverso_kernel::types::{ImageBuffer, ImageId, ImageShape, PixelFormat, VariantId, VariantStatus};
use reverso_node::config::GenerationSettings;
use reverso_node::errors::{EngineError, StoreError};
use reverso_node::generation::{GenerationEngine, JobState, VariantPlan};
use reverso_node::store::{MemoryStore, StoredImage, Transition, VariantInfo, VariantRecord, VariantStore};
use tokio::sync::mpsc;

/// Delegates to a memory store but refuses to persist one variant number.
struct FlakyStore {
    inner: MemoryStore,
    fail_number: u32,
    rejected: AtomicU32,
}

impl VariantStore for FlakyStore {
    fn put_image(&self, image: &StoredImage) -> Result<(), StoreError> {
        self.inner.put_image(image)
    }

    fn fetch_image(&self, image_id: ImageId) -> Result<StoredImage, StoreError> {
        self.inner.fetch_image(image_id)
    }

    fn store_variant(&self, record: &VariantRecord) -> Result<(), StoreError> {
        if record.variant_number == self.fail_number {
            self.rejected.fetch_add(1, Ordering::SeqCst);
            return Err(StoreError::Unavailable("disk full".into()));
        }
        self.inner.store_variant(record)
    }

    fn fetch_variant(&self, variant_id: VariantId) -> Result<VariantRecord, StoreError> {
        self.inner.fetch_variant(variant_id)
    }

    fn update_status(&self, variant_id: VariantId, status: VariantStatus) -> Result<Transition, StoreError> {
        self.inner.update_status(variant_id, status)
    }

    fn variants_for_image(&self, image_id: ImageId) -> Result<Vec<VariantInfo>, StoreError> {
        self.inner.variants_for_image(image_id)
    }

    fn variants_in_status(&self, status: VariantStatus, older_than: u64) -> Result<Vec<VariantInfo>, StoreError> {
        self.inner.variants_in_status(status, older_than)
    }
}

fn settings(variant_count: usize) -> GenerationSettings {
    GenerationSettings {
        variant_count,
        max_ops_per_variant: Some(256),
        persist_attempts: 3,
        persist_backoff: Duration::from_millis(1),
        workers: 4,
    }
}

fn gradient(width: u32, height: u32, format: PixelFormat) -> ImageBuffer {
    let shape = ImageShape::new(width, height, format);
    let data = (0..shape.byte_len()).map(|i| (i * 7 % 251) as u8).collect();
    ImageBuffer::new(shape, data).unwrap()
}

#[tokio::test]
async fn test_one_persist_failure_yields_partial_batch() {
    let store = Arc::new(FlakyStore { inner: MemoryStore::new(), fail_number: 37, rejected: AtomicU32::new(0) });
    let engine = GenerationEngine::new(store.clone(), settings(100));
    let source = gradient(16, 16, PixelFormat::Rgb8);
    let image = engine.upload(source.clone()).unwrap();

    let summary = engine.generate(image.image_id, 100).await.unwrap();

    assert_eq!(summary.requested, 100);
    assert_eq!(summary.generated.len(), 99);
    assert_eq!(summary.failed.len(), 1);
    assert_eq!(summary.failed[0].variant_number, 37);
    assert!(summary.failed[0].reason.contains("after 3 attempts"), "{}", summary.failed[0].reason);
    assert_eq!(store.rejected.load(Ordering::SeqCst), 3);
    assert!(summary.is_partial());
    assert_eq!(summary.state(), JobState::Partial);
    assert_eq!(engine.job(image.image_id).unwrap().state, JobState::Partial);

    // Every stored variant is complete and reverses to the source.
    assert_eq!(store.inner.variant_count(), 99);
    let listed = store.variants_for_image(image.image_id).unwrap();
    assert_eq!(listed.len(), 99);
    assert!(listed.iter().all(|v| v.variant_number != 37));
    for id in &summary.generated {
        let record = store.fetch_variant(*id).unwrap();
        assert_eq!(record.status, VariantStatus::Generated);
        assert!(record.sequence.len() >= 100 && record.sequence.len() <= 256);
        assert_eq!(record.sequence.reverse(&record.modified).unwrap(), source);
    }
}

#[tokio::test]
async fn test_invalid_operation_is_never_persisted() {
    let store = Arc::new(MemoryStore::new());
    let engine = GenerationEngine::new(store.clone(), settings(2));
    let image = engine.upload(gradient(4, 4, PixelFormat::Rgb8)).unwrap();

    let plans = vec![
        // Block size 3 does not divide width 4.
        VariantPlan::Explicit(vec![Operation::permute_block(9, 3)]),
        VariantPlan::Explicit(vec![Operation::xor_mask(7, 3), Operation::channel_rotate(1)]),
    ];
    let summary = engine.generate_planned(image.image_id, plans).await.unwrap();

    assert_eq!(summary.generated.len(), 1);
    assert_eq!(summary.failed.len(), 1);
    assert_eq!(summary.failed[0].variant_number, 1);
    assert!(summary.failed[0].reason.starts_with("configuration error"), "{}", summary.failed[0].reason);
    assert_eq!(store.variant_count(), 1);

    let kept = store.fetch_variant(summary.generated[0]).unwrap();
    assert_eq!(kept.variant_number, 2);
    assert_eq!(kept.seed, None);
}

#[tokio::test]
async fn test_variants_are_distinct_and_announced() {
    let store = Arc::new(MemoryStore::new());
    let (tx, mut rx) = mpsc::unbounded_channel();
    let engine = GenerationEngine::new(store.clone(), settings(12)).with_outbox(tx);
    let image = engine.upload(gradient(8, 8, PixelFormat::Rgba8)).unwrap();

    let summary = engine.generate(image.image_id, 12).await.unwrap();
    assert!(summary.is_complete());
    drop(engine);

    let mut announced = Vec::new();
    while let Some(id) = rx.recv().await {
        announced.push(id);
    }
    announced.sort();
    let mut generated = summary.generated.clone();
    generated.sort();
    assert_eq!(announced, generated);

    let digests: std::collections::HashSet<_> = summary
        .generated
        .iter()
        .map(|id| store.fetch_variant(*id).unwrap().sequence_digest)
        .collect();
    assert_eq!(digests.len(), 12);

    // Variant numbers follow generation order from 1.
    let numbers: Vec<u32> = store.variants_for_image(image.image_id).unwrap().iter().map(|v| v.variant_number).collect();
    assert_eq!(numbers, (1..=12).collect::<Vec<_>>());
}

#[tokio::test]
async fn test_tiny_image_uses_every_pixel_range() {
    let store = Arc::new(MemoryStore::new());
    let engine = GenerationEngine::new(store.clone(), settings(5));
    let source = gradient(3, 3, PixelFormat::Gray8);
    let image = engine.upload(source.clone()).unwrap();

    let summary = engine.generate(image.image_id, 5).await.unwrap();
    assert!(summary.is_complete());
    for id in summary.generated {
        let record = store.fetch_variant(id).unwrap();
        // 9 pixels: between 4 and 9 operations.
        assert!((4..=9).contains(&record.sequence.len()), "{}", record.sequence.len());
        assert_eq!(record.sequence.reverse(&record.modified).unwrap(), source);
    }
}

#[tokio::test]
async fn test_unknown_image_and_empty_batch() {
    let engine = GenerationEngine::new(Arc::new(MemoryStore::new()), settings(1));
    match engine.generate(ImageId::new(), 3).await {
        Err(EngineError::NotFound(_)) => {}
        other => panic!("expected NotFound, got {:?}", other.map(|s| s.generated.len())),
    }

    let image = engine.upload(gradient(2, 2, PixelFormat::Rgb8)).unwrap();
    assert!(matches!(
        engine.generate_planned(image.image_id, Vec::new()).await,
        Err(EngineError::InvalidInput(_))
    ));
}
