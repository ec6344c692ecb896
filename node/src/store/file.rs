// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! File-backed store.
//!
//! ```text
//! <root>/images/<image_id>.img        StoredImage frame
//! <root>/variants/<variant_id>.var    VariantRecord frame (sequence + buffer)
//! <root>/variants/<variant_id>.status (status, changed_at) frame
//! ```
//! A variant file is written once. Status changes go to the small sidecar
//! so the pixel data is never rewritten. An in-memory index of variant
//! metadata is rebuilt from disk on open.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use reverso_kernel::types::{ImageId, VariantId, VariantStatus};

use super::frame::{decode_frame, encode_frame, write_atomic};
use super::{transition, unix_millis, StoredImage, Transition, VariantInfo, VariantRecord, VariantStore};
use crate::errors::StoreError;

pub struct FileStore {
    root: PathBuf,
    index: RwLock<HashMap<VariantId, VariantInfo>>,
}

fn poisoned<T>(_: T) -> StoreError {
    StoreError::Unavailable("lock poisoned".into())
}

fn read_frame<T: serde::de::DeserializeOwned>(path: &Path, what: String) -> Result<T, StoreError> {
    let bytes = match std::fs::read(path) {
        Ok(b) => b,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Err(StoreError::NotFound(what)),
        Err(e) => return Err(e.into()),
    };
    let (value, used) = decode_frame(&bytes)?;
    if used != bytes.len() {
        return Err(StoreError::Corrupt(format!("{}: trailing bytes", path.display())));
    }
    Ok(value)
}

impl FileStore {
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let root = root.into();
        std::fs::create_dir_all(root.join("images"))?;
        std::fs::create_dir_all(root.join("variants"))?;

        let mut index = HashMap::new();
        for entry in std::fs::read_dir(root.join("variants"))? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("var") {
                continue;
            }
            let record: VariantRecord = match read_frame(&path, path.display().to_string()) {
                Ok(r) => r,
                Err(e) => {
                    tracing::warn!("Skipping unreadable variant file {:?}: {}", path, e);
                    continue;
                }
            };
            let mut info = record.info();
            let status_path = path.with_extension("status");
            if status_path.exists() {
                match read_frame::<(VariantStatus, u64)>(&status_path, status_path.display().to_string()) {
                    Ok((status, at)) => {
                        info.status = status;
                        info.status_changed_at = at;
                    }
                    Err(e) => tracing::warn!("Ignoring unreadable status file {:?}: {}", status_path, e),
                }
            }
            index.insert(info.variant_id, info);
        }
        tracing::info!("Opened file store at {:?} with {} variants", root, index.len());

        Ok(Self {
            root,
            index: RwLock::new(index),
        })
    }

    fn image_path(&self, id: ImageId) -> PathBuf {
        self.root.join("images").join(format!("{}.img", id))
    }

    fn variant_path(&self, id: VariantId) -> PathBuf {
        self.root.join("variants").join(format!("{}.var", id))
    }

    fn status_path(&self, id: VariantId) -> PathBuf {
        self.root.join("variants").join(format!("{}.status", id))
    }
}

impl VariantStore for FileStore {
    fn put_image(&self, image: &StoredImage) -> Result<(), StoreError> {
        write_atomic(&self.image_path(image.image_id), &encode_frame(image)?)
    }

    fn fetch_image(&self, image_id: ImageId) -> Result<StoredImage, StoreError> {
        read_frame(&self.image_path(image_id), format!("image {}", image_id))
    }

    fn store_variant(&self, record: &VariantRecord) -> Result<(), StoreError> {
        write_atomic(&self.variant_path(record.variant_id), &encode_frame(record)?)?;
        self.index.write().map_err(poisoned)?.insert(record.variant_id, record.info());
        Ok(())
    }

    fn fetch_variant(&self, variant_id: VariantId) -> Result<VariantRecord, StoreError> {
        let info = self
            .index
            .read()
            .map_err(poisoned)?
            .get(&variant_id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("variant {}", variant_id)))?;
        let mut record: VariantRecord = read_frame(&self.variant_path(variant_id), format!("variant {}", variant_id))?;
        record.status = info.status;
        record.status_changed_at = info.status_changed_at;
        Ok(record)
    }

    fn update_status(&self, variant_id: VariantId, status: VariantStatus) -> Result<Transition, StoreError> {
        let mut index = self.index.write().map_err(poisoned)?;
        let info = index
            .get_mut(&variant_id)
            .ok_or_else(|| StoreError::NotFound(format!("variant {}", variant_id)))?;
        let t = transition(info.status, status);
        if t.is_applied() {
            let at = unix_millis();
            write_atomic(&self.status_path(variant_id), &encode_frame(&(status, at))?)?;
            info.status = status;
            info.status_changed_at = at;
        }
        Ok(t)
    }

    fn variants_for_image(&self, image_id: ImageId) -> Result<Vec<VariantInfo>, StoreError> {
        let mut out: Vec<VariantInfo> = self
            .index
            .read()
            .map_err(poisoned)?
            .values()
            .filter(|v| v.image_id == image_id)
            .cloned()
            .collect();
        out.sort_by_key(|v| v.variant_number);
        Ok(out)
    }

    fn variants_in_status(&self, status: VariantStatus, older_than: u64) -> Result<Vec<VariantInfo>, StoreError> {
        let mut out: Vec<VariantInfo> = self
            .index
            .read()
            .map_err(poisoned)?
            .values()
            .filter(|v| v.status == status && v.status_changed_at <= older_than)
            .cloned()
            .collect();
        out.sort_by_key(|v| v.status_changed_at);
        Ok(out)
    }
}
