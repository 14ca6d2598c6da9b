// src/ingest/config.rs
use anyhow::{anyhow, bail, ensure, Context, Result};
use serde::Deserialize;
use std::collections::BTreeSet;
use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

pub const ENV_CONFIG_PATH: &str = "INGEST_CONFIG_PATH";
pub const DEFAULT_CONFIG_PATH: &str = "config/ingest.toml";
pub const ENV_TELEGRAM_CHAT_IDS: &str = "TELEGRAM_CHAT_IDS";

fn default_interval_secs() -> u64 {
    600
}
fn default_cycle_deadline_secs() -> u64 {
    300
}
fn default_publish_timeout_secs() -> u64 {
    30
}
fn default_workers() -> usize {
    4
}
fn default_timeout_ms() -> u64 {
    10_000
}
fn default_retry_budget() -> u32 {
    3
}
fn default_backoff_base_ms() -> u64 {
    250
}
fn default_backoff_cap_ms() -> u64 {
    4_000
}
fn default_max_redirects() -> usize {
    5
}
fn default_user_agent() -> String {
    format!("article-ingest/{}", env!("CARGO_PKG_VERSION"))
}
fn default_telegram_api_base() -> String {
    "https://api.telegram.org".to_string()
}
fn default_telegram_timeout_secs() -> u64 {
    5
}
fn default_telegram_retries() -> u8 {
    3
}
fn default_listing_path() -> String {
    "/".to_string()
}
fn default_pages() -> u32 {
    1
}

/// Whole configuration document (`config/ingest.toml`).
#[derive(Debug, Clone, Default, Deserialize)]
pub struct IngestConfig {
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub fetch: FetchConfig,
    #[serde(default)]
    pub notify: NotifyConfig,
    /// Prometheus listener, e.g. "0.0.0.0:9000". Disabled when absent.
    #[serde(default)]
    pub metrics_addr: Option<SocketAddr>,
    #[serde(default)]
    pub sources: Vec<SourceConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SchedulerConfig {
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
    #[serde(default = "default_cycle_deadline_secs")]
    pub cycle_deadline_secs: u64,
    #[serde(default = "default_publish_timeout_secs")]
    pub publish_timeout_secs: u64,
    /// Concurrent candidates per source.
    #[serde(default = "default_workers")]
    pub workers: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_interval_secs(),
            cycle_deadline_secs: default_cycle_deadline_secs(),
            publish_timeout_secs: default_publish_timeout_secs(),
            workers: default_workers(),
        }
    }
}

impl SchedulerConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn cycle_deadline(&self) -> Duration {
        Duration::from_secs(self.cycle_deadline_secs)
    }

    pub fn publish_timeout(&self) -> Duration {
        Duration::from_secs(self.publish_timeout_secs)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct FetchConfig {
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    /// Retries after the first attempt.
    #[serde(default = "default_retry_budget")]
    pub retry_budget: u32,
    #[serde(default = "default_backoff_base_ms")]
    pub backoff_base_ms: u64,
    #[serde(default = "default_backoff_cap_ms")]
    pub backoff_cap_ms: u64,
    #[serde(default = "default_max_redirects")]
    pub max_redirects: usize,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            timeout_ms: default_timeout_ms(),
            retry_budget: default_retry_budget(),
            backoff_base_ms: default_backoff_base_ms(),
            backoff_cap_ms: default_backoff_cap_ms(),
            max_redirects: default_max_redirects(),
            user_agent: default_user_agent(),
        }
    }
}

impl FetchConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct NotifyConfig {
    #[serde(default)]
    pub telegram_chat_ids: Vec<String>,
    #[serde(default = "default_telegram_api_base")]
    pub telegram_api_base: String,
    #[serde(default = "default_telegram_timeout_secs")]
    pub telegram_timeout_secs: u64,
    /// Retries after the first attempt, per message.
    #[serde(default = "default_telegram_retries")]
    pub telegram_retries: u8,
}

impl Default for NotifyConfig {
    fn default() -> Self {
        Self {
            telegram_chat_ids: Vec::new(),
            telegram_api_base: default_telegram_api_base(),
            telegram_timeout_secs: default_telegram_timeout_secs(),
            telegram_retries: default_telegram_retries(),
        }
    }
}

/// Closed set of source variants; selected by `kind` in the config.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    HackerNews,
    Rss,
    HtmlIndex,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SourceConfig {
    pub id: String,
    pub kind: SourceKind,
    pub base_url: String,
    /// Joined onto `base_url`; `{page}` is replaced by 1..=pages.
    #[serde(default = "default_listing_path")]
    pub listing_path: String,
    #[serde(default = "default_pages")]
    pub pages: u32,
    /// `html_index` only.
    #[serde(default)]
    pub link_selector: Option<String>,
    #[serde(default)]
    pub allow_external: bool,
    #[serde(default)]
    pub selectors: SelectorOverrides,
}

impl SourceConfig {
    /// Listing URLs in fetch order.
    pub fn listing_urls(&self) -> Result<Vec<Url>> {
        let base = Url::parse(&self.base_url)
            .with_context(|| format!("source `{}`: invalid base_url", self.id))?;
        let paths: Vec<String> = if self.listing_path.contains("{page}") {
            (1..=self.pages.max(1))
                .map(|p| self.listing_path.replace("{page}", &p.to_string()))
                .collect()
        } else {
            vec![self.listing_path.clone()]
        };
        paths
            .iter()
            .map(|p| {
                base.join(p)
                    .with_context(|| format!("source `{}`: invalid listing_path {p}", self.id))
            })
            .collect()
    }
}

/// Per-source replacements for the variant's default selector lists.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SelectorOverrides {
    #[serde(default)]
    pub title: Option<Vec<String>>,
    #[serde(default)]
    pub summary: Option<Vec<String>>,
    #[serde(default)]
    pub body: Option<Vec<String>>,
    #[serde(default)]
    pub published_at: Option<Vec<String>>,
}

impl IngestConfig {
    pub fn parse(s: &str) -> Result<Self> {
        let cfg: IngestConfig = toml::from_str(s).context("parsing ingest config")?;
        Ok(cfg)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("reading ingest config from {}", path.display()))?;
        Self::parse(&content)
    }

    /// Resolve the config file:
    /// 1) $INGEST_CONFIG_PATH
    /// 2) config/ingest.toml
    ///
    /// then apply environment overrides and validate.
    pub fn load_default() -> Result<Self> {
        let mut cfg = if let Ok(p) = std::env::var(ENV_CONFIG_PATH) {
            let pb = PathBuf::from(p);
            if !pb.exists() {
                return Err(anyhow!("{ENV_CONFIG_PATH} points to non-existent path"));
            }
            Self::load_from(&pb)?
        } else {
            Self::load_from(Path::new(DEFAULT_CONFIG_PATH))?
        };
        cfg.apply_env();
        cfg.validate()?;
        Ok(cfg)
    }

    /// `TELEGRAM_CHAT_IDS` (comma-separated) replaces the file list.
    pub fn apply_env(&mut self) {
        if let Ok(raw) = std::env::var(ENV_TELEGRAM_CHAT_IDS) {
            let ids = clean_list(raw.split(',').map(str::to_string).collect());
            if !ids.is_empty() {
                self.notify.telegram_chat_ids = ids;
            }
        }
    }

    pub fn validate(&self) -> Result<()> {
        let s = &self.scheduler;
        ensure!(s.interval_secs > 0, "scheduler.interval_secs must be > 0");
        ensure!(s.cycle_deadline_secs > 0, "scheduler.cycle_deadline_secs must be > 0");
        ensure!(
            s.cycle_deadline_secs <= s.interval_secs,
            "scheduler.cycle_deadline_secs must not exceed interval_secs"
        );
        ensure!(s.publish_timeout_secs > 0, "scheduler.publish_timeout_secs must be > 0");
        ensure!(s.workers > 0, "scheduler.workers must be > 0");

        let f = &self.fetch;
        ensure!(f.timeout_ms > 0, "fetch.timeout_ms must be > 0");
        ensure!(
            f.backoff_base_ms <= f.backoff_cap_ms,
            "fetch.backoff_base_ms must not exceed backoff_cap_ms"
        );

        let mut seen = BTreeSet::new();
        for src in &self.sources {
            if src.id.trim().is_empty() {
                bail!("source id must not be empty");
            }
            if !seen.insert(src.id.as_str()) {
                bail!("duplicate source id `{}`", src.id);
            }
            src.listing_urls()?;
            src.check_selectors()?;
        }
        Ok(())
    }
}

impl SourceConfig {
    fn check_selectors(&self) -> Result<()> {
        let o = &self.selectors;
        let lists = [&o.title, &o.summary, &o.body, &o.published_at];
        let overrides = lists.into_iter().flatten().flatten();
        for sel in overrides.chain(self.link_selector.iter()) {
            scraper::Selector::parse(sel)
                .map_err(|e| anyhow!("source `{}`: invalid selector `{sel}`: {e:?}", self.id))?;
        }
        Ok(())
    }
}

fn clean_list(items: Vec<String>) -> Vec<String> {
    let mut set = BTreeSet::new();
    for it in items {
        let t = it.trim();
        if !t.is_empty() {
            set.insert(t.to_string());
        }
    }
    set.into_iter().collect()
}
