// src/ingest/scheduler.rs
//! Owned, injectable driver of ingestion cycles.
//!
//! One cycle runs every configured source concurrently. Within a source,
//! candidates go through fetch → extract → dedup → store with at most
//! `workers` in flight. Every source is bounded by the cycle deadline; a
//! source still running at the deadline is dropped (in-flight requests
//! abandoned) and reported as `TimedOut`. Records already committed by that
//! source stay in its report and are notified with the rest.

use chrono::{DateTime, Utc};
use futures::stream::StreamExt;
use metrics::counter;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::{Instant, MissedTickBehavior};

use crate::ingest::config::SchedulerConfig;
use crate::ingest::cycle::{CycleOutcome, CycleResult, NotificationStatus, SourceReport, SourceStatus};
use crate::ingest::dedup::{Admission, Deduplicator};
use crate::ingest::ensure_metrics_described;
use crate::ingest::error::{ExtractError, FetchError, ListingError, StoreError};
use crate::ingest::fetcher::Fetcher;
use crate::ingest::providers::SourceAdapter;
use crate::ingest::store::IngestionStore;
use crate::ingest::types::{ArticleRecord, CandidateUrl};
use crate::notify::Notifier;

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Running,
    Completed,
    PartiallyFailed,
}

#[derive(Debug, Clone)]
pub struct SchedulerSettings {
    pub interval: Duration,
    pub cycle_deadline: Duration,
    pub publish_timeout: Duration,
    pub workers: usize,
}

impl From<&SchedulerConfig> for SchedulerSettings {
    fn from(cfg: &SchedulerConfig) -> Self {
        Self {
            interval: cfg.interval(),
            cycle_deadline: cfg.cycle_deadline(),
            publish_timeout: cfg.publish_timeout(),
            workers: cfg.workers,
        }
    }
}

enum CandidateOutcome {
    Persisted(ArticleRecord),
    Duplicate,
    FetchFailed(CandidateUrl, FetchError),
    ExtractFailed(CandidateUrl, ExtractError),
    StoreFailed(StoreError),
    ListingFailed(ListingError),
}

impl CandidateOutcome {
    fn label(&self) -> &'static str {
        match self {
            CandidateOutcome::Persisted(_) => "persisted",
            CandidateOutcome::Duplicate => "duplicate",
            CandidateOutcome::FetchFailed(..) => "fetch_failed",
            CandidateOutcome::ExtractFailed(..) => "extract_failed",
            CandidateOutcome::StoreFailed(_) => "store_failed",
            CandidateOutcome::ListingFailed(_) => "listing_failed",
        }
    }
}

pub struct Scheduler {
    settings: SchedulerSettings,
    sources: Vec<Arc<dyn SourceAdapter>>,
    fetcher: Fetcher,
    dedup: Deduplicator,
    notifier: Arc<dyn Notifier>,
    clock: Arc<dyn Clock>,
    phase: Mutex<Phase>,
    cycles: AtomicU64,
}

impl Scheduler {
    pub fn new(
        settings: SchedulerSettings,
        sources: Vec<Arc<dyn SourceAdapter>>,
        fetcher: Fetcher,
        store: Arc<dyn IngestionStore>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            settings,
            sources,
            fetcher,
            dedup: Deduplicator::new(store),
            notifier,
            clock: Arc::new(SystemClock),
            phase: Mutex::new(Phase::Idle),
            cycles: AtomicU64::new(0),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn settings(&self) -> &SchedulerSettings {
        &self.settings
    }

    pub fn phase(&self) -> Phase {
        *self.phase.lock().unwrap_or_else(|p| p.into_inner())
    }

    /// Cycles started so far (skipped triggers not included).
    pub fn cycles_started(&self) -> u64 {
        self.cycles.load(Ordering::Relaxed)
    }

    fn try_begin(&self) -> Option<RunningGuard<'_>> {
        let mut phase = self.phase.lock().unwrap_or_else(|p| p.into_inner());
        if *phase == Phase::Running {
            return None;
        }
        *phase = Phase::Running;
        Some(RunningGuard {
            phase: &self.phase,
            finished: false,
        })
    }

    /// Run one cycle. Returns `None` when a cycle is already running; the
    /// trigger is skipped, never queued.
    pub async fn run_cycle(&self) -> Option<CycleResult> {
        ensure_metrics_described();

        let Some(guard) = self.try_begin() else {
            tracing::warn!(target: "ingest", "previous cycle still running; trigger skipped");
            counter!("ingest_triggers_skipped_total").increment(1);
            return None;
        };

        let cycle = self.cycles.fetch_add(1, Ordering::Relaxed) + 1;
        let started_at = self.clock.now();
        let deadline = Instant::now() + self.settings.cycle_deadline;
        tracing::info!(target: "ingest", cycle, sources = self.sources.len(), "ingest cycle started");

        let mut reports: Vec<SourceReport> = self
            .sources
            .iter()
            .map(|s| SourceReport::new(s.id().clone()))
            .collect();

        let runs = self
            .sources
            .iter()
            .zip(reports.iter_mut())
            .map(|(src, report)| async move {
                let res =
                    tokio::time::timeout_at(deadline, self.run_source(src.as_ref(), &mut *report))
                        .await;
                if res.is_err() {
                    tracing::error!(
                        target: "ingest",
                        cycle,
                        source = %report.source,
                        "source cancelled at cycle deadline"
                    );
                    report.status = SourceStatus::TimedOut;
                }
            });
        futures::future::join_all(runs).await;

        let mut result = CycleResult::finalize(cycle, started_at, self.clock.now(), reports);
        guard.finish(match result.outcome {
            CycleOutcome::Completed => Phase::Completed,
            CycleOutcome::PartiallyFailed => Phase::PartiallyFailed,
        });

        result.notification = self.publish(result.new_articles()).await;
        result.report();
        Some(result)
    }

    async fn run_source(&self, src: &dyn SourceAdapter, report: &mut SourceReport) {
        let mut outcomes = src
            .list_articles(&self.fetcher)
            .map(|item| async move {
                match item {
                    Ok(candidate) => self.process_candidate(src, candidate).await,
                    Err(e) => CandidateOutcome::ListingFailed(e),
                }
            })
            .buffer_unordered(self.settings.workers.max(1));

        while let Some(outcome) = outcomes.next().await {
            counter!(
                "ingest_candidates_total",
                "source" => report.source.to_string(),
                "outcome" => outcome.label()
            )
            .increment(1);

            let c = &mut report.counts;
            match outcome {
                CandidateOutcome::Persisted(record) => {
                    c.fetched += 1;
                    c.extracted += 1;
                    c.persisted += 1;
                    tracing::debug!(source = %report.source, url = %record.external_url, "article persisted");
                    report.new_articles.push(record);
                }
                CandidateOutcome::Duplicate => {
                    c.fetched += 1;
                    c.extracted += 1;
                    c.deduplicated += 1;
                }
                CandidateOutcome::FetchFailed(candidate, e) => {
                    c.fetched += 1;
                    c.failed += 1;
                    tracing::warn!(source = %report.source, url = %candidate.url, error = %e, "candidate fetch failed");
                }
                CandidateOutcome::ExtractFailed(candidate, e) => {
                    c.fetched += 1;
                    c.failed += 1;
                    tracing::warn!(source = %report.source, url = %candidate.url, error = %e, "candidate extraction failed");
                }
                CandidateOutcome::StoreFailed(e) => {
                    c.fetched += 1;
                    c.extracted += 1;
                    tracing::error!(source = %report.source, error = %e, "store unavailable; aborting source");
                    report.status = SourceStatus::StoreFailed(e.to_string());
                    break;
                }
                CandidateOutcome::ListingFailed(e) => {
                    // listing stream ends here; candidates already in flight still finish
                    tracing::error!(source = %report.source, error = %e, "listing enumeration failed");
                    report.status = SourceStatus::ListingFailed(e.to_string());
                }
            }
        }
    }

    async fn process_candidate(
        &self,
        src: &dyn SourceAdapter,
        candidate: CandidateUrl,
    ) -> CandidateOutcome {
        let raw = match src.resolve_detail(&self.fetcher, &candidate).await {
            Ok(raw) => raw,
            Err(e) => return CandidateOutcome::FetchFailed(candidate, e),
        };
        let mut record = match src.extract(&raw, &candidate) {
            Ok(r) => r,
            Err(e) => return CandidateOutcome::ExtractFailed(candidate, e),
        };
        drop(raw);

        record.ingested_at = Some(self.clock.now());
        match self.dedup.admit(record).await {
            Ok(Admission::New(r)) => CandidateOutcome::Persisted(r),
            Ok(Admission::Duplicate) => CandidateOutcome::Duplicate,
            Err(e) => CandidateOutcome::StoreFailed(e),
        }
    }

    /// Empty batches are not published. Otherwise wait at most
    /// `publish_timeout`, then give up; stored articles are unaffected.
    async fn publish(&self, batch: Vec<ArticleRecord>) -> NotificationStatus {
        if batch.is_empty() {
            return NotificationStatus::Skipped;
        }
        let notifier = self.notifier.name();
        match tokio::time::timeout(self.settings.publish_timeout, self.notifier.publish(&batch)).await
        {
            Ok(Ok(ack)) => {
                counter!("notify_publish_total", "result" => "ok").increment(1);
                tracing::info!(target: "notify", notifier, articles = batch.len(), delivered = ack.delivered, "batch published");
                NotificationStatus::Delivered {
                    delivered: ack.delivered,
                }
            }
            Ok(Err(e)) => {
                counter!("notify_publish_total", "result" => "error").increment(1);
                tracing::error!(target: "notify", notifier, articles = batch.len(), error = %e, "publish failed");
                NotificationStatus::Failed(e.to_string())
            }
            Err(_) => {
                counter!("notify_publish_total", "result" => "abandoned").increment(1);
                tracing::error!(
                    target: "notify",
                    notifier,
                    articles = batch.len(),
                    timeout_ms = self.settings.publish_timeout.as_millis() as u64,
                    "publish abandoned after timeout"
                );
                NotificationStatus::Abandoned
            }
        }
    }

    /// Start the recurring driver. The first cycle starts immediately, then
    /// one per interval; ticks missed while busy are dropped.
    pub fn start(self: Arc<Self>) -> SchedulerHandle {
        let (tx, mut rx) = watch::channel(false);
        let sched = self;
        let join = tokio::spawn(async move {
            let mut ticker =
                tokio::time::interval(sched.settings.interval.max(Duration::from_millis(1)));
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            let mut in_flight: JoinSet<()> = JoinSet::new();
            tracing::info!(
                target: "ingest",
                interval_secs = sched.settings.interval.as_secs(),
                "scheduler started"
            );

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let s = sched.clone();
                        in_flight.spawn(async move {
                            s.run_cycle().await;
                        });
                    }
                    Some(res) = in_flight.join_next(), if !in_flight.is_empty() => {
                        if let Err(e) = res {
                            tracing::error!(target: "ingest", error = %e, "cycle task aborted");
                        }
                    }
                    changed = rx.changed() => {
                        if changed.is_err() || *rx.borrow() {
                            break;
                        }
                    }
                }
            }

            while let Some(res) = in_flight.join_next().await {
                if let Err(e) = res {
                    tracing::error!(target: "ingest", error = %e, "cycle task aborted");
                }
            }
            tracing::info!(target: "ingest", "scheduler stopped");
        });
        SchedulerHandle { shutdown: tx, join }
    }
}

/// Resets the phase to `Idle` if a cycle is dropped before finishing.
struct RunningGuard<'a> {
    phase: &'a Mutex<Phase>,
    finished: bool,
}

impl RunningGuard<'_> {
    fn finish(mut self, outcome: Phase) {
        *self.phase.lock().unwrap_or_else(|p| p.into_inner()) = outcome;
        self.finished = true;
    }
}

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        if !self.finished {
            *self.phase.lock().unwrap_or_else(|p| p.into_inner()) = Phase::Idle;
        }
    }
}

/// The single start/stop control of the pipeline.
pub struct SchedulerHandle {
    shutdown: watch::Sender<bool>,
    join: JoinHandle<()>,
}

impl SchedulerHandle {
    /// Stop triggering; waits for an in-flight cycle (bounded by its deadline).
    pub async fn stop(self) {
        let _ = self.shutdown.send(true);
        if let Err(e) = self.join.await {
            tracing::error!(target: "ingest", error = %e, "scheduler task failed");
        }
    }
}
