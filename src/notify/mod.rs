// src/notify/mod.rs
//! Fan-out of newly ingested articles to the messaging bot. Delivery is
//! best-effort: a failed publish never rolls back stored articles.

pub mod telegram;

use async_trait::async_trait;

use crate::ingest::config::NotifyConfig;
use crate::ingest::error::PublishError;
use crate::ingest::types::ArticleRecord;

pub use telegram::TelegramNotifier;

pub const ENV_TELEGRAM_BOT_TOKEN: &str = "TELEGRAM_BOT_TOKEN";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ack {
    /// Messages accepted by the downstream channel.
    pub delivered: usize,
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn publish(&self, batch: &[ArticleRecord]) -> Result<Ack, PublishError>;

    fn name(&self) -> &'static str;
}

/// Fallback when no bot is configured: articles only show up in the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn publish(&self, batch: &[ArticleRecord]) -> Result<Ack, PublishError> {
        for a in batch {
            tracing::info!(
                target: "notify",
                source = %a.source_id,
                title = %a.title,
                url = %a.external_url,
                "new article"
            );
        }
        Ok(Ack {
            delivered: batch.len(),
        })
    }

    fn name(&self) -> &'static str {
        "log"
    }
}

/// Telegram when `TELEGRAM_BOT_TOKEN` and at least one chat id are present,
/// otherwise the log notifier.
pub fn from_env(cfg: &NotifyConfig) -> Box<dyn Notifier> {
    match std::env::var(ENV_TELEGRAM_BOT_TOKEN) {
        Ok(token) if !token.trim().is_empty() && !cfg.telegram_chat_ids.is_empty() => {
            Box::new(TelegramNotifier::from_config(token, cfg))
        }
        Ok(_) => {
            tracing::warn!("TELEGRAM_BOT_TOKEN set but no chat ids configured; logging only");
            Box::new(LogNotifier)
        }
        Err(_) => {
            tracing::debug!("Telegram disabled (no TELEGRAM_BOT_TOKEN)");
            Box::new(LogNotifier)
        }
    }
}
