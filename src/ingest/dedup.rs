// src/ingest/dedup.rs
use std::sync::Arc;

use crate::ingest::error::StoreError;
use crate::ingest::store::{IngestionStore, InsertOutcome};
use crate::ingest::types::{ArticleRecord, Fingerprint};

/// Result of offering an extracted record to the store.
#[derive(Debug, Clone, PartialEq)]
pub enum Admission {
    New(ArticleRecord),
    Duplicate,
}

/// Pre-check against the store's fingerprint index, followed by the atomic
/// insert that has the final word. Holds no fingerprints of its own.
#[derive(Clone)]
pub struct Deduplicator {
    store: Arc<dyn IngestionStore>,
}

impl Deduplicator {
    pub fn new(store: Arc<dyn IngestionStore>) -> Self {
        Self { store }
    }

    pub async fn is_new(&self, fingerprint: &Fingerprint) -> Result<bool, StoreError> {
        Ok(!self.store.exists_fingerprint(fingerprint).await?)
    }

    /// Check, then insert. A lost race (`AlreadyExists`) and a reported
    /// constraint violation both count as `Duplicate`; only connection
    /// failures surface as errors.
    pub async fn admit(&self, record: ArticleRecord) -> Result<Admission, StoreError> {
        if !self.is_new(&record.fingerprint).await? {
            return Ok(Admission::Duplicate);
        }
        match self.store.insert_if_absent(&record).await {
            Ok(InsertOutcome::Inserted) => Ok(Admission::New(record)),
            Ok(InsertOutcome::AlreadyExists) => Ok(Admission::Duplicate),
            Err(StoreError::ConstraintViolation(msg)) => {
                tracing::debug!(
                    fingerprint = %record.fingerprint,
                    %msg,
                    "constraint violation treated as duplicate"
                );
                Ok(Admission::Duplicate)
            }
            Err(e) => Err(e),
        }
    }
}
