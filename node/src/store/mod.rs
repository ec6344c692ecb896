// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! Persistence collaborator.
//!
//! The generation side owns images and variants. Everything the protocol
//! needs from storage goes through [`VariantStore`]; the status column is
//! the single source of truth both services consult when messages arrive
//! late or twice.

pub mod frame;
pub mod memory;
pub mod file;

use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use reverso_kernel::digest::{content_hash, ContentHash};
use reverso_kernel::sequence::InstructionSequence;
use reverso_kernel::types::{ImageBuffer, ImageId, VariantId, VariantStatus};
use reverso_kernel::verify::OriginalRef;

use crate::config::OriginalRetention;
use crate::errors::StoreError;

pub use file::FileStore;
pub use memory::MemoryStore;

/// Wall-clock milliseconds since the Unix epoch.
pub fn unix_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredImage {
    pub image_id: ImageId,
    pub buffer: ImageBuffer,
    pub content_hash: ContentHash,
    pub uploaded_at: u64,
}

impl StoredImage {
    pub fn new(buffer: ImageBuffer) -> Self {
        Self {
            image_id: ImageId::new(),
            content_hash: content_hash(&buffer),
            buffer,
            uploaded_at: unix_millis(),
        }
    }
}

/// A persisted variant: the sequence and the buffer it produced, stored together.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VariantRecord {
    pub variant_id: VariantId,
    pub image_id: ImageId,
    /// 1-based position within the image's batch.
    pub variant_number: u32,
    /// Sampler seed the operations were drawn from, when they were sampled.
    pub seed: Option<u64>,
    pub sequence: InstructionSequence,
    pub sequence_digest: ContentHash,
    pub modified: ImageBuffer,
    pub created_at: u64,
    pub status: VariantStatus,
    pub status_changed_at: u64,
}

impl VariantRecord {
    pub fn info(&self) -> VariantInfo {
        VariantInfo {
            variant_id: self.variant_id,
            image_id: self.image_id,
            variant_number: self.variant_number,
            op_count: self.sequence.len(),
            status: self.status,
            created_at: self.created_at,
            status_changed_at: self.status_changed_at,
        }
    }
}

/// Variant metadata without pixel data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VariantInfo {
    pub variant_id: VariantId,
    pub image_id: ImageId,
    pub variant_number: u32,
    pub op_count: usize,
    pub status: VariantStatus,
    pub created_at: u64,
    pub status_changed_at: u64,
}

/// Result of a status update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Applied { from: VariantStatus, to: VariantStatus },
    /// The update would not move the variant forward (late or repeated
    /// message); the stored status is unchanged.
    Ignored { current: VariantStatus },
}

impl Transition {
    pub fn current(&self) -> VariantStatus {
        match *self {
            Transition::Applied { to, .. } => to,
            Transition::Ignored { current } => current,
        }
    }

    pub fn is_applied(&self) -> bool {
        matches!(self, Transition::Applied { .. })
    }
}

/// Applies the lifecycle rule to one stored status.
pub(crate) fn transition(current: VariantStatus, next: VariantStatus) -> Transition {
    if current.can_transition_to(next) {
        Transition::Applied { from: current, to: next }
    } else {
        Transition::Ignored { current }
    }
}

pub trait VariantStore: Send + Sync {
    fn put_image(&self, image: &StoredImage) -> Result<(), StoreError>;

    fn fetch_image(&self, image_id: ImageId) -> Result<StoredImage, StoreError>;

    /// Persists sequence and buffer together: after `Ok` both are readable,
    /// after `Err` neither is.
    fn store_variant(&self, record: &VariantRecord) -> Result<(), StoreError>;

    fn fetch_variant(&self, variant_id: VariantId) -> Result<VariantRecord, StoreError>;

    fn fetch_sequence(&self, variant_id: VariantId) -> Result<InstructionSequence, StoreError> {
        Ok(self.fetch_variant(variant_id)?.sequence)
    }

    fn fetch_original(&self, image_id: ImageId, retention: OriginalRetention) -> Result<OriginalRef, StoreError> {
        let image = self.fetch_image(image_id)?;
        Ok(match retention {
            OriginalRetention::Exact => OriginalRef::Exact(image.buffer.into_bytes()),
            OriginalRetention::HashOnly => OriginalRef::ContentHash(image.content_hash),
        })
    }

    /// Moves a variant forward in its lifecycle. Never moves it back and
    /// never leaves a terminal state.
    fn update_status(&self, variant_id: VariantId, status: VariantStatus) -> Result<Transition, StoreError>;

    /// Variants of one image, ordered by variant number.
    fn variants_for_image(&self, image_id: ImageId) -> Result<Vec<VariantInfo>, StoreError>;

    /// Variants in `status` whose status has not changed since `older_than`
    /// (unix millis).
    fn variants_in_status(&self, status: VariantStatus, older_than: u64) -> Result<Vec<VariantInfo>, StoreError>;
}
