// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! Append-only verification history.
//!
//! One record per finished attempt. A retried variant accumulates several
//! records; nothing is ever rewritten. With a path the ledger is also a
//! file of concatenated frames, replayed on open.

use std::collections::HashSet;
use std::fs::{File, OpenOptions};
use std::io::{Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use reverso_kernel::digest::ContentHash;
use reverso_kernel::types::{RecordId, VariantId};
use reverso_kernel::verify::ComparisonMethod;

use crate::api::ReportVerdict;
use crate::errors::StoreError;
use crate::store::frame::{decode_frame, encode_frame};
use crate::store::unix_millis;

pub const MAX_PAGE: usize = 100;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationRecord {
    pub record_id: RecordId,
    pub variant_id: VariantId,
    pub attempt: u32,
    pub verdict: ReportVerdict,
    pub method: Option<ComparisonMethod>,
    pub recorded_at: u64,
    /// First mismatching offset, or error detail.
    pub diagnostic: Option<String>,
    pub sequence_digest: Option<ContentHash>,
    pub reversed_hash: Option<ContentHash>,
}

impl VerificationRecord {
    pub fn new(variant_id: VariantId, attempt: u32, verdict: ReportVerdict) -> Self {
        Self {
            record_id: RecordId::new(),
            variant_id,
            attempt,
            verdict,
            method: None,
            recorded_at: unix_millis(),
            diagnostic: None,
            sequence_digest: None,
            reversed_hash: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VerificationStats {
    pub total: usize,
    pub matched: usize,
    pub mismatched: usize,
    pub errors: usize,
    /// Share of records with a `Match` verdict, 0.0 when there are none.
    pub success_rate: f64,
}

#[derive(Default)]
struct Inner {
    records: Vec<VerificationRecord>,
    file: Option<File>,
}

#[derive(Default)]
pub struct VerificationLedger {
    inner: Mutex<Inner>,
    path: Option<PathBuf>,
}

fn poisoned<T>(_: T) -> StoreError {
    StoreError::Unavailable("ledger lock poisoned".into())
}

impl VerificationLedger {
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// Opens (or creates) a ledger file and replays its records.
    ///
    /// A torn frame at the end of the file, left by a crash mid-append, is
    /// dropped; everything before it is kept.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        let bytes = match std::fs::read(&path) {
            Ok(b) => b,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Vec::new(),
            Err(e) => return Err(e.into()),
        };

        let mut records = Vec::new();
        let mut offset = 0;
        while offset < bytes.len() {
            match decode_frame::<VerificationRecord>(&bytes[offset..]) {
                Ok((record, used)) => {
                    records.push(record);
                    offset += used;
                }
                Err(e) => {
                    tracing::warn!("Ledger {:?}: dropping {} bytes after offset {}: {}", path, bytes.len() - offset, offset, e);
                    break;
                }
            }
        }

        let mut file = OpenOptions::new().create(true).write(true).open(&path)?;
        file.set_len(offset as u64)?;
        file.seek(SeekFrom::End(0))?;

        tracing::info!("Opened ledger {:?} with {} records", path, records.len());
        Ok(Self {
            inner: Mutex::new(Inner { records, file: Some(file) }),
            path: Some(path),
        })
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn append(&self, record: VerificationRecord) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().map_err(poisoned)?;
        if let Some(file) = inner.file.as_mut() {
            file.write_all(&encode_frame(&record)?)?;
            file.flush()?;
        }
        inner.records.push(record);
        Ok(())
    }

    /// All records of one variant, oldest first.
    pub fn for_variant(&self, variant_id: VariantId) -> Vec<VerificationRecord> {
        match self.inner.lock() {
            Ok(inner) => inner.records.iter().filter(|r| r.variant_id == variant_id).cloned().collect(),
            Err(_) => Vec::new(),
        }
    }

    /// Variants with a `Match` or `Mismatch` record.
    pub fn settled_variants(&self) -> HashSet<VariantId> {
        match self.inner.lock() {
            Ok(inner) => inner
                .records
                .iter()
                .filter(|r| r.verdict != ReportVerdict::Error)
                .map(|r| r.variant_id)
                .collect(),
            Err(_) => HashSet::new(),
        }
    }

    /// Newest first. `limit` is clamped to `1..=MAX_PAGE`.
    pub fn history(&self, limit: usize, offset: usize) -> (Vec<VerificationRecord>, usize, usize) {
        let limit = limit.clamp(1, MAX_PAGE);
        match self.inner.lock() {
            Ok(inner) => {
                let page = inner.records.iter().rev().skip(offset).take(limit).cloned().collect();
                (page, inner.records.len(), limit)
            }
            Err(_) => (Vec::new(), 0, limit),
        }
    }

    pub fn stats(&self) -> VerificationStats {
        let inner = match self.inner.lock() {
            Ok(i) => i,
            Err(_) => return VerificationStats::default(),
        };
        let mut stats = VerificationStats { total: inner.records.len(), ..Default::default() };
        for r in inner.records.iter() {
            match r.verdict {
                ReportVerdict::Match => stats.matched += 1,
                ReportVerdict::Mismatch => stats.mismatched += 1,
                ReportVerdict::Error => stats.errors += 1,
            }
        }
        if stats.total > 0 {
            stats.success_rate = stats.matched as f64 / stats.total as f64;
        }
        stats
    }

    pub fn len(&self) -> usize {
        self.inner.lock().map(|i| i.records.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_history_is_newest_first_and_clamped() {
        let ledger = VerificationLedger::in_memory();
        let ids: Vec<VariantId> = (0..5).map(|_| VariantId::new()).collect();
        for id in &ids {
            ledger.append(VerificationRecord::new(*id, 1, ReportVerdict::Match)).unwrap();
        }

        let (page, total, limit) = ledger.history(2, 1);
        assert_eq!(total, 5);
        assert_eq!(limit, 2);
        assert_eq!(page[0].variant_id, ids[3]);
        assert_eq!(page[1].variant_id, ids[2]);

        let (page, _, limit) = ledger.history(0, 0);
        assert_eq!((page.len(), limit), (1, 1));
        let (_, _, limit) = ledger.history(1000, 0);
        assert_eq!(limit, MAX_PAGE);
    }

    #[test]
    fn test_stats() {
        let ledger = VerificationLedger::in_memory();
        let v = VariantId::new();
        ledger.append(VerificationRecord::new(v, 1, ReportVerdict::Match)).unwrap();
        ledger.append(VerificationRecord::new(v, 2, ReportVerdict::Match)).unwrap();
        ledger.append(VerificationRecord::new(v, 3, ReportVerdict::Mismatch)).unwrap();
        ledger.append(VerificationRecord::new(VariantId::new(), 1, ReportVerdict::Error)).unwrap();

        let s = ledger.stats();
        assert_eq!((s.total, s.matched, s.mismatched, s.errors), (4, 2, 1, 1));
        assert!((s.success_rate - 0.5).abs() < f64::EPSILON);
        assert_eq!(ledger.for_variant(v).len(), 3);
    }
}
