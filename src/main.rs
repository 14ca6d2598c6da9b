//! Article ingestion service: periodically pulls configured sources, stores
//! new articles and announces them to subscribers.

use anyhow::Context;
use std::sync::Arc;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use article_ingest::ingest::fetcher::Fetcher;
use article_ingest::ingest::providers::build_sources;
use article_ingest::ingest::store::{IngestionStore, MemoryStore, PgStore};
use article_ingest::{notify, IngestConfig, Scheduler, SchedulerSettings};

const ENV_POSTGRES_URL: &str = "POSTGRES_URL";

/// `LOG_FORMAT=json` switches to JSON lines; filtering via `RUST_LOG`.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("ingest=info,notify=info,article_ingest=info,warn"));
    let json = std::env::var("LOG_FORMAT").is_ok_and(|v| v.eq_ignore_ascii_case("json"));

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(fmt::layer().json()).init();
    } else {
        registry.with(fmt::layer().compact()).init();
    }
}

async fn open_store() -> anyhow::Result<Arc<dyn IngestionStore>> {
    match std::env::var(ENV_POSTGRES_URL) {
        Ok(url) if !url.trim().is_empty() => {
            let store = PgStore::connect(&url, 5)
                .await
                .context("connect to postgres")?;
            store.init_schema().await.context("init schema")?;
            tracing::info!("using postgres store");
            Ok(Arc::new(store))
        }
        _ => {
            tracing::warn!("POSTGRES_URL not set; articles are kept in memory only");
            Ok(Arc::new(MemoryStore::new()))
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();
    init_tracing();

    let cfg = IngestConfig::load_default()?;
    if let Some(addr) = cfg.metrics_addr {
        article_ingest::metrics::install(addr)?;
    }

    let store = open_store().await?;
    let notifier: Arc<dyn notify::Notifier> = Arc::from(notify::from_env(&cfg.notify));
    let sources = build_sources(&cfg.sources)?;
    let fetcher = Fetcher::new(&cfg.fetch)?;

    tracing::info!(
        sources = sources.len(),
        notifier = notifier.name(),
        interval_secs = cfg.scheduler.interval_secs,
        "article ingest starting"
    );

    let scheduler = Arc::new(Scheduler::new(
        SchedulerSettings::from(&cfg.scheduler),
        sources,
        fetcher,
        store,
        notifier,
    ));
    let handle = scheduler.start();

    tokio::signal::ctrl_c().await.context("wait for ctrl-c")?;
    tracing::info!("shutdown requested");
    handle.stop().await;
    Ok(())
}
