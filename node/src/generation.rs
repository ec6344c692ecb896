// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! Variant generation.
//!
//! For one image, builds N variants concurrently. Each variant gets its own
//! sampler seed, its own operation count and its own working copy of the
//! shared, read-only source buffer. CPU work runs on the blocking pool under
//! a semaphore; a failed variant is recorded in the summary and never aborts
//! its siblings.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinSet;
use reverso_kernel::error::KernelError;
use reverso_kernel::ops::Operation;
use reverso_kernel::sample::{variant_rng, OpCountRange, OperationSampler};
use reverso_kernel::sequence::InstructionSequence;
use reverso_kernel::types::{ImageBuffer, ImageId, VariantId, VariantStatus};

use crate::config::GenerationSettings;
use crate::errors::EngineError;
use crate::store::{unix_millis, StoredImage, VariantRecord, VariantStore};
use crate::telemetry::{VARIANTS_FAILED, VARIANTS_GENERATED, VARIANT_GENERATION_SECONDS};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailedVariant {
    pub variant_number: u32,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerationSummary {
    pub image_id: ImageId,
    pub requested: usize,
    /// Persisted variants, ordered by variant number.
    pub generated: Vec<VariantId>,
    pub failed: Vec<FailedVariant>,
}

impl GenerationSummary {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty() && self.generated.len() == self.requested
    }

    pub fn is_partial(&self) -> bool {
        !self.generated.is_empty() && !self.failed.is_empty()
    }

    pub fn state(&self) -> JobState {
        if self.is_complete() {
            JobState::Completed
        } else if self.generated.is_empty() {
            JobState::Failed
        } else {
            JobState::Partial
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Processing,
    Completed,
    Partial,
    Failed,
}

#[derive(Debug, Clone)]
pub struct ImageJob {
    pub state: JobState,
    pub requested: usize,
    pub summary: Option<GenerationSummary>,
}

/// How the operations of one variant are chosen.
#[derive(Debug, Clone)]
pub enum VariantPlan {
    /// Count and operations drawn from a sampler seeded with `seed`.
    Sampled { seed: u64 },
    /// A fixed list, validated like any other.
    Explicit(Vec<Operation>),
}

pub struct GenerationEngine {
    store: Arc<dyn VariantStore>,
    settings: GenerationSettings,
    permits: Arc<Semaphore>,
    outbox: Option<mpsc::UnboundedSender<VariantId>>,
    jobs: RwLock<HashMap<ImageId, ImageJob>>,
}

impl GenerationEngine {
    pub fn new(store: Arc<dyn VariantStore>, settings: GenerationSettings) -> Self {
        let permits = Arc::new(Semaphore::new(settings.workers.max(1)));
        Self {
            store,
            settings,
            permits,
            outbox: None,
            jobs: RwLock::new(HashMap::new()),
        }
    }

    /// Every persisted variant id is sent here, for the notifier.
    pub fn with_outbox(mut self, outbox: mpsc::UnboundedSender<VariantId>) -> Self {
        self.outbox = Some(outbox);
        self
    }

    pub fn store(&self) -> &Arc<dyn VariantStore> {
        &self.store
    }

    pub fn settings(&self) -> &GenerationSettings {
        &self.settings
    }

    pub fn upload(&self, buffer: ImageBuffer) -> Result<StoredImage, EngineError> {
        let image = StoredImage::new(buffer);
        self.store.put_image(&image)?;
        tracing::info!(
            "Stored image {} ({}x{} {:?}, {} bytes)",
            image.image_id,
            image.buffer.shape().width,
            image.buffer.shape().height,
            image.buffer.shape().format,
            image.buffer.len()
        );
        Ok(image)
    }

    pub fn job(&self, image_id: ImageId) -> Option<ImageJob> {
        self.jobs.read().ok()?.get(&image_id).cloned()
    }

    fn set_job(&self, image_id: ImageId, job: ImageJob) {
        if let Ok(mut jobs) = self.jobs.write() {
            jobs.insert(image_id, job);
        }
    }

    /// Marks an image as processing before its generation task is scheduled.
    pub fn begin(&self, image_id: ImageId, requested: usize) {
        self.set_job(image_id, ImageJob { state: JobState::Processing, requested, summary: None });
    }

    /// Records that generation for an image could not start at all.
    pub fn abandon(&self, image_id: ImageId, requested: usize) {
        self.set_job(image_id, ImageJob { state: JobState::Failed, requested, summary: None });
    }

    /// Generates `variant_count` sampled variants.
    pub async fn generate(&self, image_id: ImageId, variant_count: usize) -> Result<GenerationSummary, EngineError> {
        let plans = (0..variant_count)
            .map(|_| VariantPlan::Sampled { seed: rand::random() })
            .collect();
        self.generate_planned(image_id, plans).await
    }

    /// Generates one variant per plan. Variant numbers follow plan order.
    pub async fn generate_planned(
        &self,
        image_id: ImageId,
        plans: Vec<VariantPlan>,
    ) -> Result<GenerationSummary, EngineError> {
        if plans.is_empty() {
            return Err(EngineError::InvalidInput("variant count must be at least 1".into()));
        }
        let requested = plans.len();
        let image = self.store.fetch_image(image_id)?;
        let shape = image.buffer.shape();
        let source = Arc::new(image.buffer);
        let sampler = Arc::new(OperationSampler::new(shape)?);
        let range = OpCountRange::for_image(&shape, self.settings.max_ops_per_variant);

        self.begin(image_id, requested);
        tracing::info!(
            "Generating {} variants of image {} ({}..={} operations each)",
            requested,
            image_id,
            range.min,
            range.max
        );

        let mut set = JoinSet::new();
        for (i, plan) in plans.into_iter().enumerate() {
            let variant_number = (i + 1) as u32;
            let permit = self
                .permits
                .clone()
                .acquire_owned()
                .await
                .map_err(|_| EngineError::Internal("generation pool closed".into()))?;
            let job = VariantJob {
                image_id,
                variant_number,
                plan,
                source: source.clone(),
                sampler: sampler.clone(),
                range,
                store: self.store.clone(),
                persist_attempts: self.settings.persist_attempts,
                persist_backoff: self.settings.persist_backoff,
            };
            let outbox = self.outbox.clone();

            set.spawn(async move {
                let result = match tokio::task::spawn_blocking(move || job.run()).await {
                    Ok(r) => r,
                    Err(e) => Err(format!("worker panicked: {}", e)),
                };
                drop(permit);
                if let (Ok(id), Some(outbox)) = (&result, outbox) {
                    if outbox.send(*id).is_err() {
                        tracing::warn!("Notifier gone; variant {} waits for reconciliation", id);
                    }
                }
                (variant_number, result)
            });
        }

        let mut generated = Vec::with_capacity(requested);
        let mut failed = Vec::new();
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok((n, Ok(id))) => generated.push((n, id)),
                Ok((n, Err(reason))) => {
                    tracing::error!("Variant #{} of image {} failed: {}", n, image_id, reason);
                    metrics::increment_counter!(VARIANTS_FAILED);
                    failed.push(FailedVariant { variant_number: n, reason });
                }
                Err(e) => tracing::error!("Generation task for image {} aborted: {}", image_id, e),
            }
        }
        generated.sort_by_key(|(n, _)| *n);
        failed.sort_by_key(|f| f.variant_number);

        let summary = GenerationSummary {
            image_id,
            requested,
            generated: generated.into_iter().map(|(_, id)| id).collect(),
            failed,
        };
        let state = summary.state();
        tracing::info!(
            "Image {}: {} of {} variants generated ({:?})",
            image_id,
            summary.generated.len(),
            requested,
            state
        );
        self.set_job(image_id, ImageJob { state, requested, summary: Some(summary.clone()) });
        Ok(summary)
    }
}

/// Everything one blocking worker needs to build and persist a variant.
struct VariantJob {
    image_id: ImageId,
    variant_number: u32,
    plan: VariantPlan,
    source: Arc<ImageBuffer>,
    sampler: Arc<OperationSampler>,
    range: OpCountRange,
    store: Arc<dyn VariantStore>,
    persist_attempts: u32,
    persist_backoff: Duration,
}

impl VariantJob {
    fn run(self) -> Result<VariantId, String> {
        let started = Instant::now();
        let record = self.build().map_err(|e| e.to_string())?;
        metrics::histogram!(VARIANT_GENERATION_SECONDS, started.elapsed().as_secs_f64());
        tracing::debug!(
            "Built variant #{} of image {}: {} operations",
            self.variant_number,
            self.image_id,
            record.sequence.len()
        );
        self.persist(&record)?;
        metrics::increment_counter!(VARIANTS_GENERATED);
        Ok(record.variant_id)
    }

    fn build(&self) -> Result<VariantRecord, KernelError> {
        let (seed, sequence) = match &self.plan {
            VariantPlan::Sampled { seed } => {
                let mut rng = variant_rng(*seed);
                let count = self.range.draw(&mut rng);
                (Some(*seed), self.sampler.draw_sequence(self.image_id, count, &mut rng)?)
            }
            VariantPlan::Explicit(ops) => (
                None,
                InstructionSequence::new(self.image_id, self.source.shape(), ops.iter().copied())?,
            ),
        };
        let modified = sequence.apply(&self.source)?;
        let sequence_digest = sequence.digest()?;
        let now = unix_millis();
        Ok(VariantRecord {
            variant_id: VariantId::new(),
            image_id: self.image_id,
            variant_number: self.variant_number,
            seed,
            sequence,
            sequence_digest,
            modified,
            created_at: now,
            status: VariantStatus::Generated,
            status_changed_at: now,
        })
    }

    /// Persistence is the only retried step; kernel errors are final.
    fn persist(&self, record: &VariantRecord) -> Result<(), String> {
        let attempts = self.persist_attempts.max(1);
        let mut last = String::new();
        for attempt in 1..=attempts {
            match self.store.store_variant(record) {
                Ok(()) => return Ok(()),
                Err(e) => {
                    tracing::warn!(
                        "Persisting variant #{} of image {} failed (attempt {}/{}): {}",
                        self.variant_number,
                        self.image_id,
                        attempt,
                        attempts,
                        e
                    );
                    last = e.to_string();
                    if attempt < attempts {
                        std::thread::sleep(self.persist_backoff * attempt);
                    }
                }
            }
        }
        Err(format!("persistence failed after {} attempts: {}", attempts, last))
    }
}
