// src/ingest/store/postgres.rs
use async_trait::async_trait;
use sqlx::postgres::{PgPool, PgPoolOptions};

use super::{IngestionStore, InsertOutcome};
use crate::ingest::error::StoreError;
use crate::ingest::types::{ArticleRecord, Fingerprint};

/// Table name shared with the API layer and the bot, which read articles back.
pub const TABLE: &str = "parsed_articles";

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS parsed_articles (
    id            BIGSERIAL PRIMARY KEY,
    fingerprint   CHAR(64)     NOT NULL UNIQUE,
    source_id     TEXT         NOT NULL,
    url           TEXT         NOT NULL,
    title         VARCHAR(255) NOT NULL,
    summary       TEXT,
    body          TEXT         NOT NULL,
    published_at  TIMESTAMPTZ,
    ingested_at   TIMESTAMPTZ  NOT NULL DEFAULT now()
)";

const UNIQUE_VIOLATION: &str = "23505";

/// PostgreSQL store. Uniqueness of `fingerprint` is enforced by the table,
/// so racing writers are arbitrated by the database.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub async fn connect(url: &str, max_connections: u32) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(url)
            .await
            .map_err(|e| StoreError::Connection(e.to_string()))?;
        Ok(Self { pool })
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Idempotent; safe to run at every start.
    pub async fn init_schema(&self) -> Result<(), StoreError> {
        sqlx::query(SCHEMA)
            .execute(&self.pool)
            .await
            .map_err(map_sqlx)?;
        Ok(())
    }
}

fn map_sqlx(e: sqlx::Error) -> StoreError {
    match &e {
        sqlx::Error::Database(db) => {
            // SQLSTATE class 23 = integrity constraint violation
            if db.code().is_some_and(|c| c.starts_with("23")) {
                StoreError::ConstraintViolation(db.message().to_string())
            } else {
                StoreError::Connection(e.to_string())
            }
        }
        _ => StoreError::Connection(e.to_string()),
    }
}

#[async_trait]
impl IngestionStore for PgStore {
    async fn insert_if_absent(&self, record: &ArticleRecord) -> Result<InsertOutcome, StoreError> {
        let res = sqlx::query(
            "INSERT INTO parsed_articles
                (fingerprint, source_id, url, title, summary, body, published_at, ingested_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, COALESCE($8, now()))
             ON CONFLICT (fingerprint) DO NOTHING",
        )
        .bind(record.fingerprint.as_str())
        .bind(record.source_id.as_str())
        .bind(&record.external_url)
        .bind(&record.title)
        .bind(record.summary.as_deref())
        .bind(&record.body)
        .bind(record.published_at)
        .bind(record.ingested_at)
        .execute(&self.pool)
        .await;

        match res {
            Ok(done) if done.rows_affected() == 1 => Ok(InsertOutcome::Inserted),
            Ok(_) => Ok(InsertOutcome::AlreadyExists),
            Err(sqlx::Error::Database(db)) if db.code().as_deref() == Some(UNIQUE_VIOLATION) => {
                Ok(InsertOutcome::AlreadyExists)
            }
            Err(e) => Err(map_sqlx(e)),
        }
    }

    async fn exists_fingerprint(&self, fingerprint: &Fingerprint) -> Result<bool, StoreError> {
        let found: Option<i32> =
            sqlx::query_scalar("SELECT 1 FROM parsed_articles WHERE fingerprint = $1")
                .bind(fingerprint.as_str())
                .fetch_optional(&self.pool)
                .await
                .map_err(map_sqlx)?;
        Ok(found.is_some())
    }
}
