// src/ingest/cycle.rs
//! Per-cycle bookkeeping, built by the scheduler and handed to logs and
//! metrics at the end of each cycle.

use chrono::{DateTime, Utc};
use metrics::{counter, gauge, histogram};
use serde::Serialize;

use crate::ingest::types::{ArticleRecord, SourceId};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SourceCounts {
    /// Candidates whose detail page was requested.
    pub fetched: usize,
    pub extracted: usize,
    /// Extracted but already in the store.
    pub deduplicated: usize,
    pub persisted: usize,
    /// Candidate-level fetch/extract failures.
    pub failed: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "reason", rename_all = "snake_case")]
pub enum SourceStatus {
    Completed,
    ListingFailed(String),
    StoreFailed(String),
    /// Cancelled at the cycle deadline.
    TimedOut,
}

impl SourceStatus {
    pub fn is_failure(&self) -> bool {
        !matches!(self, SourceStatus::Completed)
    }

    fn label(&self) -> &'static str {
        match self {
            SourceStatus::Completed => "completed",
            SourceStatus::ListingFailed(_) => "listing_failed",
            SourceStatus::StoreFailed(_) => "store_failed",
            SourceStatus::TimedOut => "timed_out",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SourceReport {
    pub source: SourceId,
    pub status: SourceStatus,
    pub counts: SourceCounts,
    #[serde(skip)]
    pub new_articles: Vec<ArticleRecord>,
}

impl SourceReport {
    pub fn new(source: SourceId) -> Self {
        Self {
            source,
            status: SourceStatus::Completed,
            counts: SourceCounts::default(),
            new_articles: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CycleOutcome {
    Completed,
    PartiallyFailed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "detail", rename_all = "snake_case")]
pub enum NotificationStatus {
    /// Nothing new; the notifier was not called.
    Skipped,
    Delivered { delivered: usize },
    Failed(String),
    /// Bounded wait elapsed; publish abandoned.
    Abandoned,
}

#[derive(Debug, Clone, Serialize)]
pub struct CycleResult {
    pub cycle: u64,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub outcome: CycleOutcome,
    pub sources: Vec<SourceReport>,
    pub notification: NotificationStatus,
}

impl CycleResult {
    pub fn finalize(
        cycle: u64,
        started_at: DateTime<Utc>,
        finished_at: DateTime<Utc>,
        sources: Vec<SourceReport>,
    ) -> Self {
        let outcome = if sources.iter().any(|s| s.status.is_failure()) {
            CycleOutcome::PartiallyFailed
        } else {
            CycleOutcome::Completed
        };
        Self {
            cycle,
            started_at,
            finished_at,
            outcome,
            sources,
            notification: NotificationStatus::Skipped,
        }
    }

    pub fn source(&self, id: &str) -> Option<&SourceReport> {
        self.sources.iter().find(|s| s.source.as_str() == id)
    }

    /// Newly persisted records across all sources, in source order.
    pub fn new_articles(&self) -> Vec<ArticleRecord> {
        self.sources
            .iter()
            .flat_map(|s| s.new_articles.iter().cloned())
            .collect()
    }

    pub fn totals(&self) -> SourceCounts {
        self.sources.iter().fold(SourceCounts::default(), |mut acc, s| {
            acc.fetched += s.counts.fetched;
            acc.extracted += s.counts.extracted;
            acc.deduplicated += s.counts.deduplicated;
            acc.persisted += s.counts.persisted;
            acc.failed += s.counts.failed;
            acc
        })
    }

    /// Hand the result to the log and metrics collaborators.
    pub fn report(&self) {
        let outcome = match self.outcome {
            CycleOutcome::Completed => "completed",
            CycleOutcome::PartiallyFailed => "partially_failed",
        };
        let elapsed_ms = (self.finished_at - self.started_at).num_milliseconds().max(0);

        counter!("ingest_cycles_total", "outcome" => outcome).increment(1);
        histogram!("ingest_cycle_duration_ms").record(elapsed_ms as f64);
        gauge!("ingest_last_cycle_ts").set(self.finished_at.timestamp() as f64);

        for s in &self.sources {
            let source = s.source.to_string();
            if s.status.is_failure() {
                counter!("ingest_source_failures_total", "source" => source.clone(), "status" => s.status.label())
                    .increment(1);
            }
            tracing::info!(
                target: "ingest",
                cycle = self.cycle,
                source = %s.source,
                status = s.status.label(),
                fetched = s.counts.fetched,
                extracted = s.counts.extracted,
                deduplicated = s.counts.deduplicated,
                persisted = s.counts.persisted,
                failed = s.counts.failed,
                "source finished"
            );
        }

        let totals = self.totals();
        tracing::info!(
            target: "ingest",
            cycle = self.cycle,
            outcome,
            elapsed_ms,
            fetched = totals.fetched,
            persisted = totals.persisted,
            deduplicated = totals.deduplicated,
            failed = totals.failed,
            notification = ?self.notification,
            "ingest cycle finished"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn any_failed_source_makes_cycle_partially_failed() {
        let now = Utc::now();
        let ok = SourceReport::new(SourceId::new("a"));
        let mut bad = SourceReport::new(SourceId::new("b"));
        bad.status = SourceStatus::TimedOut;

        let r = CycleResult::finalize(1, now, now, vec![ok.clone()]);
        assert_eq!(r.outcome, CycleOutcome::Completed);

        let r = CycleResult::finalize(2, now, now, vec![ok, bad]);
        assert_eq!(r.outcome, CycleOutcome::PartiallyFailed);
        assert_eq!(r.source("b").unwrap().status, SourceStatus::TimedOut);
    }

    #[test]
    fn totals_sum_sources() {
        let now = Utc::now();
        let mut a = SourceReport::new(SourceId::new("a"));
        a.counts = SourceCounts { fetched: 3, extracted: 2, deduplicated: 0, persisted: 2, failed: 1 };
        let mut b = SourceReport::new(SourceId::new("b"));
        b.counts = SourceCounts { fetched: 1, extracted: 1, deduplicated: 1, persisted: 0, failed: 0 };
        let r = CycleResult::finalize(1, now, now, vec![a, b]);
        assert_eq!(
            r.totals(),
            SourceCounts { fetched: 4, extracted: 3, deduplicated: 1, persisted: 2, failed: 1 }
        );
    }
}
