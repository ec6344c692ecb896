// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
use std::collections::HashMap;
use std::sync::RwLock;

use reverso_kernel::types::{ImageId, VariantId, VariantStatus};

use super::{transition, unix_millis, StoredImage, Transition, VariantInfo, VariantRecord, VariantStore};
use crate::errors::StoreError;

/// Process-local store. Loses everything on restart.
#[derive(Default)]
pub struct MemoryStore {
    images: RwLock<HashMap<ImageId, StoredImage>>,
    variants: RwLock<HashMap<VariantId, VariantRecord>>,
}

fn poisoned<T>(_: T) -> StoreError {
    StoreError::Unavailable("lock poisoned".into())
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn variant_count(&self) -> usize {
        self.variants.read().map(|v| v.len()).unwrap_or(0)
    }
}

impl VariantStore for MemoryStore {
    fn put_image(&self, image: &StoredImage) -> Result<(), StoreError> {
        self.images.write().map_err(poisoned)?.insert(image.image_id, image.clone());
        Ok(())
    }

    fn fetch_image(&self, image_id: ImageId) -> Result<StoredImage, StoreError> {
        self.images
            .read()
            .map_err(poisoned)?
            .get(&image_id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("image {}", image_id)))
    }

    fn store_variant(&self, record: &VariantRecord) -> Result<(), StoreError> {
        self.variants.write().map_err(poisoned)?.insert(record.variant_id, record.clone());
        Ok(())
    }

    fn fetch_variant(&self, variant_id: VariantId) -> Result<VariantRecord, StoreError> {
        self.variants
            .read()
            .map_err(poisoned)?
            .get(&variant_id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("variant {}", variant_id)))
    }

    fn update_status(&self, variant_id: VariantId, status: VariantStatus) -> Result<Transition, StoreError> {
        let mut variants = self.variants.write().map_err(poisoned)?;
        let record = variants
            .get_mut(&variant_id)
            .ok_or_else(|| StoreError::NotFound(format!("variant {}", variant_id)))?;
        let t = transition(record.status, status);
        if t.is_applied() {
            record.status = status;
            record.status_changed_at = unix_millis();
        }
        Ok(t)
    }

    fn variants_for_image(&self, image_id: ImageId) -> Result<Vec<VariantInfo>, StoreError> {
        let mut out: Vec<VariantInfo> = self
            .variants
            .read()
            .map_err(poisoned)?
            .values()
            .filter(|r| r.image_id == image_id)
            .map(VariantRecord::info)
            .collect();
        out.sort_by_key(|v| v.variant_number);
        Ok(out)
    }

    fn variants_in_status(&self, status: VariantStatus, older_than: u64) -> Result<Vec<VariantInfo>, StoreError> {
        let mut out: Vec<VariantInfo> = self
            .variants
            .read()
            .map_err(poisoned)?
            .values()
            .filter(|r| r.status == status && r.status_changed_at <= older_than)
            .map(VariantRecord::info)
            .collect();
        out.sort_by_key(|v| v.status_changed_at);
        Ok(out)
    }
}
