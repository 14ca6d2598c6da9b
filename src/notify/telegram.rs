// src/notify/telegram.rs
use async_trait::async_trait;
use reqwest::{header, Client, Response, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::{Ack, Notifier};
use crate::ingest::config::NotifyConfig;
use crate::ingest::error::PublishError;
use crate::ingest::types::ArticleRecord;

/// Bot API `sendMessage` for every article × subscribed chat.
#[derive(Clone)]
pub struct TelegramNotifier {
    token: String,
    chat_ids: Vec<String>,
    api_base: String,
    client: Client,
    timeout: Duration,
    retries: u8,
}

impl TelegramNotifier {
    pub fn new(token: String, chat_ids: Vec<String>) -> Self {
        Self {
            token,
            chat_ids,
            api_base: "https://api.telegram.org".to_string(),
            client: Client::new(),
            timeout: Duration::from_secs(5),
            retries: 3,
        }
    }

    pub fn from_config(token: String, cfg: &NotifyConfig) -> Self {
        Self::new(token, cfg.telegram_chat_ids.clone())
            .with_api_base(cfg.telegram_api_base.clone())
            .with_timeout(cfg.telegram_timeout_secs)
            .with_retries(cfg.telegram_retries)
    }

    pub fn with_api_base(mut self, base: String) -> Self {
        self.api_base = base.trim_end_matches('/').to_string();
        self
    }

    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout = Duration::from_secs(secs);
        self
    }

    /// Retries after the first attempt; `0` sends each message once.
    pub fn with_retries(mut self, retries: u8) -> Self {
        self.retries = retries;
        self
    }

    fn endpoint(&self) -> String {
        format!("{}/bot{}/sendMessage", self.api_base, self.token)
    }

    async fn send_message(&self, chat_id: &str, text: &str) -> Result<(), PublishError> {
        let payload = SendMessage {
            chat_id,
            text,
            disable_web_page_preview: false,
        };
        let url = self.endpoint();

        let mut attempt: u8 = 0;
        loop {
            let res = self
                .client
                .post(&url)
                .timeout(self.timeout)
                .json(&payload)
                .send()
                .await;

            let (err, wait) = match res {
                Ok(rsp) if rsp.status().is_success() => return Ok(()),
                Ok(rsp) if rsp.status() == StatusCode::TOO_MANY_REQUESTS => {
                    let wait = retry_after(rsp).await.min(MAX_RETRY_AFTER);
                    ("telegram rate limited (429)".to_string(), wait)
                }
                // 4xx (blocked bot, unknown chat) will not get better on retry
                Ok(rsp) if rsp.status().is_client_error() => {
                    return Err(PublishError::Transient(format!(
                        "telegram HTTP error: {}",
                        rsp.status()
                    )));
                }
                Ok(rsp) => (
                    format!("telegram HTTP error: {}", rsp.status()),
                    backoff(attempt),
                ),
                Err(e) => (format!("telegram request failed: {e}"), backoff(attempt)),
            };

            if attempt < self.retries {
                attempt += 1;
                tokio::time::sleep(wait).await;
                continue;
            }
            return Err(PublishError::Transient(strip_token(&err, &self.token)));
        }
    }
}

const MAX_RETRY_AFTER: Duration = Duration::from_secs(30);

fn backoff(attempt: u8) -> Duration {
    Duration::from_millis(500u64 << attempt.min(6))
}

#[derive(Deserialize)]
struct ApiError {
    parameters: Option<ResponseParameters>,
}

#[derive(Deserialize)]
struct ResponseParameters {
    retry_after: Option<u64>,
}

/// Wait requested by a 429: `Retry-After` header, else the Bot API's
/// `parameters.retry_after`, else one second.
async fn retry_after(rsp: Response) -> Duration {
    let from_header = rsp
        .headers()
        .get(header::RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok());
    let secs = match from_header {
        Some(secs) => secs,
        None => rsp
            .json::<ApiError>()
            .await
            .ok()
            .and_then(|body| body.parameters)
            .and_then(|p| p.retry_after)
            .unwrap_or(1),
    };
    Duration::from_secs(secs)
}

/// reqwest errors include the URL, which carries the bot token.
fn strip_token(msg: &str, token: &str) -> String {
    if token.is_empty() {
        msg.to_string()
    } else {
        msg.replace(token, "<token>")
    }
}

pub fn format_message(a: &ArticleRecord) -> String {
    format!("📰 New article: {}\n{}", a.title, a.external_url)
}

#[async_trait]
impl Notifier for TelegramNotifier {
    async fn publish(&self, batch: &[ArticleRecord]) -> Result<Ack, PublishError> {
        if self.chat_ids.is_empty() {
            return Err(PublishError::Config("no chat ids".into()));
        }

        let mut delivered = 0usize;
        let mut last_err = None;
        for article in batch {
            let text = format_message(article);
            for chat in &self.chat_ids {
                match self.send_message(chat, &text).await {
                    Ok(()) => delivered += 1,
                    Err(e) => {
                        tracing::warn!(
                            target: "notify",
                            chat = %chat,
                            url = %article.external_url,
                            error = %e,
                            "telegram delivery failed"
                        );
                        last_err = Some(e);
                    }
                }
            }
        }

        match last_err {
            Some(e) if delivered == 0 => Err(e),
            _ => Ok(Ack { delivered }),
        }
    }

    fn name(&self) -> &'static str {
        "telegram"
    }
}

#[derive(Serialize)]
struct SendMessage<'a> {
    chat_id: &'a str,
    text: &'a str,
    disable_web_page_preview: bool,
}
