// src/ingest/store/mod.rs
//! Write contract of the article store. The store owns the fingerprint
//! index and is the only arbiter of "new": `insert_if_absent` must be atomic
//! on the fingerprint so that concurrent writers of the same article get
//! exactly one `Inserted`.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;

use crate::ingest::error::StoreError;
use crate::ingest::types::{ArticleRecord, Fingerprint};

pub use memory::MemoryStore;
pub use postgres::PgStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    Inserted,
    AlreadyExists,
}

#[async_trait]
pub trait IngestionStore: Send + Sync {
    /// Records are immutable: an existing fingerprint is never updated.
    async fn insert_if_absent(&self, record: &ArticleRecord) -> Result<InsertOutcome, StoreError>;

    async fn exists_fingerprint(&self, fingerprint: &Fingerprint) -> Result<bool, StoreError>;
}
