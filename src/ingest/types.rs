// src/ingest/types.rs
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use url::Url;

/// Stable identifier of a configured source (the `id` key of a `[[sources]]` entry).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SourceId(String);

impl SourceId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Dedup key: lowercase hex SHA-256 of `source_id`, `\n`, `external_url`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fingerprint(String);

impl Fingerprint {
    pub fn compute(source: &SourceId, external_url: &str) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(source.as_str().as_bytes());
        hasher.update(b"\n");
        hasher.update(external_url.as_bytes());
        let digest = hasher.finalize();
        let mut out = String::with_capacity(64);
        for b in digest.iter() {
            use std::fmt::Write as _;
            let _ = write!(&mut out, "{:02x}", b);
        }
        Self(out)
    }

    /// Wrap a fingerprint read back from the store.
    pub fn from_hex(hex: impl Into<String>) -> Self {
        Self(hex.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A URL discovered on a source listing, not yet fetched.
#[derive(Debug, Clone, PartialEq)]
pub struct CandidateUrl {
    pub url: Url,
    /// Title as shown on the listing (HN anchor text, RSS `<title>`).
    pub title_hint: Option<String>,
    pub published_hint: Option<DateTime<Utc>>,
}

impl CandidateUrl {
    pub fn new(url: Url) -> Self {
        Self {
            url,
            title_hint: None,
            published_hint: None,
        }
    }
}

/// Raw bytes of a fetched page. Dropped right after extraction.
#[derive(Debug, Clone)]
pub struct RawDocument {
    pub url: Url,
    pub body: Vec<u8>,
    pub fetched_at: DateTime<Utc>,
}

/// Canonical unit written to the store and handed to the notifier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArticleRecord {
    pub source_id: SourceId,
    pub external_url: String,
    pub title: String,
    pub summary: Option<String>,
    pub body: String,
    pub published_at: Option<DateTime<Utc>>,
    pub fingerprint: Fingerprint,
    /// Set by the scheduler right before the store write.
    pub ingested_at: Option<DateTime<Utc>>,
}

/// Canonical form of an article URL: no fragment, no `utm_*` tracking parameters.
pub fn canonical_url(url: &Url) -> String {
    let mut out = url.clone();
    out.set_fragment(None);

    if let Some(query) = url.query() {
        let segments: Vec<&str> = query.split('&').collect();
        let kept: Vec<&str> = segments
            .iter()
            .copied()
            .filter(|seg| !is_tracking_param(seg))
            .collect();
        // untouched unless something is dropped, so encodings survive verbatim
        if kept.len() != segments.len() {
            let rebuilt = kept.join("&");
            out.set_query((!rebuilt.is_empty()).then_some(rebuilt.as_str()));
        }
    }

    out.to_string()
}

fn is_tracking_param(segment: &str) -> bool {
    let key = segment.split('=').next().unwrap_or_default();
    key.get(..4)
        .is_some_and(|prefix| prefix.eq_ignore_ascii_case("utm_"))
}
