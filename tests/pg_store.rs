// tests/pg_store.rs
// Run with: POSTGRES_URL=postgres://... cargo test --features pg-tests
#![cfg(feature = "pg-tests")]

use std::sync::Arc;

use article_ingest::ingest::dedup::{Admission, Deduplicator};
use article_ingest::ingest::store::postgres::TABLE;
use article_ingest::ingest::store::{IngestionStore, InsertOutcome, PgStore};
use article_ingest::ingest::types::{ArticleRecord, Fingerprint, SourceId};

async fn store() -> PgStore {
    let url = std::env::var("POSTGRES_URL").expect("POSTGRES_URL required for pg-tests");
    let store = PgStore::connect(&url, 8).await.expect("connect");
    store.init_schema().await.expect("schema");
    store
}

fn record(tag: &str) -> ArticleRecord {
    let nanos = chrono::Utc::now().timestamp_nanos_opt().unwrap_or_default();
    let src = SourceId::new("pg-test");
    let url = format!("https://example.com/{tag}/{nanos}");
    ArticleRecord {
        fingerprint: Fingerprint::compute(&src, &url),
        source_id: src,
        external_url: url,
        title: format!("{tag} title"),
        summary: Some("summary".into()),
        body: "body".into(),
        published_at: None,
        ingested_at: Some(chrono::Utc::now()),
    }
}

#[tokio::test]
async fn insert_is_idempotent_on_fingerprint() {
    let store = store().await;
    let rec = record("idempotent");

    assert!(!store.exists_fingerprint(&rec.fingerprint).await.unwrap());
    assert_eq!(store.insert_if_absent(&rec).await.unwrap(), InsertOutcome::Inserted);
    assert_eq!(
        store.insert_if_absent(&rec).await.unwrap(),
        InsertOutcome::AlreadyExists
    );
    assert!(store.exists_fingerprint(&rec.fingerprint).await.unwrap());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_admissions_store_exactly_one_row() {
    let url = std::env::var("POSTGRES_URL").expect("POSTGRES_URL required for pg-tests");
    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(8)
        .connect(&url)
        .await
        .unwrap();
    let store = Arc::new(PgStore::from_pool(pool.clone()));
    store.init_schema().await.unwrap();
    let rec = record("race");

    let mut tasks = Vec::new();
    for _ in 0..8 {
        let dedup = Deduplicator::new(store.clone());
        let rec = rec.clone();
        tasks.push(tokio::spawn(async move { dedup.admit(rec).await }));
    }
    let mut new = 0;
    for t in tasks {
        if let Admission::New(_) = t.await.unwrap().unwrap() {
            new += 1;
        }
    }
    assert_eq!(new, 1);

    let rows: i64 = sqlx::query_scalar(&format!(
        "SELECT COUNT(*) FROM {TABLE} WHERE fingerprint = $1"
    ))
    .bind(rec.fingerprint.as_str())
    .fetch_one(&pool)
    .await
    .unwrap();
    assert_eq!(rows, 1);
}
