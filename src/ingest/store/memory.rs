// src/ingest/store/memory.rs
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;

use super::{IngestionStore, InsertOutcome};
use crate::ingest::error::StoreError;
use crate::ingest::types::{ArticleRecord, Fingerprint};

/// Process-local store. Used when no database is configured and in tests;
/// contents do not survive a restart.
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: Mutex<HashMap<Fingerprint, ArticleRecord>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap_or_else(|p| p.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, fingerprint: &Fingerprint) -> Option<ArticleRecord> {
        self.inner
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .get(fingerprint)
            .cloned()
    }
}

#[async_trait]
impl IngestionStore for MemoryStore {
    async fn insert_if_absent(&self, record: &ArticleRecord) -> Result<InsertOutcome, StoreError> {
        let mut map = self
            .inner
            .lock()
            .map_err(|_| StoreError::Connection("store mutex poisoned".into()))?;
        if map.contains_key(&record.fingerprint) {
            return Ok(InsertOutcome::AlreadyExists);
        }
        map.insert(record.fingerprint.clone(), record.clone());
        Ok(InsertOutcome::Inserted)
    }

    async fn exists_fingerprint(&self, fingerprint: &Fingerprint) -> Result<bool, StoreError> {
        let map = self
            .inner
            .lock()
            .map_err(|_| StoreError::Connection("store mutex poisoned".into()))?;
        Ok(map.contains_key(fingerprint))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::types::SourceId;
    use std::sync::Arc;

    fn record(url: &str, title: &str) -> ArticleRecord {
        let src = SourceId::new("hn");
        ArticleRecord {
            fingerprint: Fingerprint::compute(&src, url),
            source_id: src,
            external_url: url.into(),
            title: title.into(),
            summary: None,
            body: String::new(),
            published_at: None,
            ingested_at: None,
        }
    }

    #[tokio::test]
    async fn second_insert_is_already_exists_and_keeps_first() {
        let store = MemoryStore::new();
        let first = record("https://example.com/a", "first");
        let drifted = record("https://example.com/a", "edited title");

        assert_eq!(store.insert_if_absent(&first).await.unwrap(), InsertOutcome::Inserted);
        assert_eq!(
            store.insert_if_absent(&drifted).await.unwrap(),
            InsertOutcome::AlreadyExists
        );
        assert_eq!(store.len(), 1);
        assert_eq!(store.get(&first.fingerprint).unwrap().title, "first");
        assert!(store.exists_fingerprint(&first.fingerprint).await.unwrap());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_inserts_of_same_fingerprint_yield_one_winner() {
        let store = Arc::new(MemoryStore::new());
        let rec = record("https://example.com/race", "race");
        let barrier = Arc::new(tokio::sync::Barrier::new(8));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let store = store.clone();
            let rec = rec.clone();
            let barrier = barrier.clone();
            handles.push(tokio::spawn(async move {
                barrier.wait().await;
                store.insert_if_absent(&rec).await.unwrap()
            }));
        }

        let mut inserted = 0;
        let mut existing = 0;
        for h in handles {
            match h.await.unwrap() {
                InsertOutcome::Inserted => inserted += 1,
                InsertOutcome::AlreadyExists => existing += 1,
            }
        }
        assert_eq!(inserted, 1);
        assert_eq!(existing, 7);
        assert_eq!(store.len(), 1);
    }
}
