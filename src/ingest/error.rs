// src/ingest/error.rs
//! Failure taxonomy of the pipeline. Candidate-level errors (`FetchError`,
//! `ExtractError`) are counted and skipped; `StoreError::Connection` aborts
//! the affected source for the current cycle; `PublishError` never touches
//! ingestion.

use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FetchError {
    #[error("request timed out")]
    Timeout,

    #[error("network error: {0}")]
    NetworkError(String),

    #[error("HTTP status {0}")]
    HttpStatus(u16),

    #[error("too many redirects")]
    TooManyRedirects,

    #[error("fetch timeout must be strictly positive")]
    InvalidTimeout,
}

impl FetchError {
    /// Transient failures are retried by the fetcher; 4xx never is.
    pub fn is_transient(&self) -> bool {
        match self {
            FetchError::Timeout | FetchError::NetworkError(_) => true,
            FetchError::HttpStatus(code) => *code >= 500,
            FetchError::TooManyRedirects | FetchError::InvalidTimeout => false,
        }
    }

    pub(crate) fn from_reqwest(e: &reqwest::Error) -> Self {
        if e.is_timeout() {
            FetchError::Timeout
        } else if e.is_redirect() {
            FetchError::TooManyRedirects
        } else if let Some(status) = e.status() {
            FetchError::HttpStatus(status.as_u16())
        } else {
            FetchError::NetworkError(e.to_string())
        }
    }
}

/// Failure to enumerate a source listing; fatal for that source's cycle.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ListingError {
    #[error("listing fetch failed: {0}")]
    Fetch(#[from] FetchError),

    #[error("listing unparseable: {0}")]
    Parse(String),
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ExtractError {
    #[error("missing required field `{0}`")]
    MissingRequiredField(&'static str),

    #[error("malformed document: {0}")]
    MalformedDocument(String),
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    /// Integrity violation reported by the store; the pipeline counts it as a duplicate.
    #[error("constraint violation: {0}")]
    ConstraintViolation(String),

    #[error("store connection error: {0}")]
    Connection(String),
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PublishError {
    #[error("publish failed: {0}")]
    Transient(String),

    #[error("notifier misconfigured: {0}")]
    Config(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_classification() {
        assert!(FetchError::Timeout.is_transient());
        assert!(FetchError::NetworkError("reset".into()).is_transient());
        assert!(FetchError::HttpStatus(503).is_transient());
        assert!(!FetchError::HttpStatus(404).is_transient());
        assert!(!FetchError::HttpStatus(429).is_transient());
        assert!(!FetchError::TooManyRedirects.is_transient());
    }
}
