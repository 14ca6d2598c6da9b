// src/ingest/providers/mod.rs
//! Source adapters: one variant per supported source kind, all behind the
//! `SourceAdapter` capability. Adding a source kind means adding a module
//! here and an arm in [`build_source`]; the scheduler never changes.

pub mod hacker_news;
pub mod html_index;
pub mod rss;

use anyhow::Result;
use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt};
use std::sync::Arc;
use url::Url;

use crate::ingest::config::{SourceConfig, SourceKind};
use crate::ingest::error::{ExtractError, FetchError, ListingError};
use crate::ingest::fetcher::Fetcher;
use crate::ingest::types::{ArticleRecord, CandidateUrl, RawDocument, SourceId};

#[async_trait]
pub trait SourceAdapter: Send + Sync {
    fn id(&self) -> &SourceId;

    /// Candidates from the source's current listing. Finite; a fresh call
    /// re-enumerates from scratch. The stream ends after the first `Err`.
    fn list_articles<'a>(
        &'a self,
        fetcher: &'a Fetcher,
    ) -> BoxStream<'a, Result<CandidateUrl, ListingError>>;

    async fn resolve_detail(
        &self,
        fetcher: &Fetcher,
        candidate: &CandidateUrl,
    ) -> Result<RawDocument, FetchError> {
        fetcher.fetch_default(&candidate.url).await
    }

    fn extract(
        &self,
        raw: &RawDocument,
        candidate: &CandidateUrl,
    ) -> Result<ArticleRecord, ExtractError>;
}

/// Explicit registry: config `kind` → adapter variant.
pub fn build_source(cfg: &SourceConfig) -> Result<Arc<dyn SourceAdapter>> {
    let adapter: Arc<dyn SourceAdapter> = match cfg.kind {
        SourceKind::HackerNews => Arc::new(hacker_news::HackerNewsAdapter::from_config(cfg)?),
        SourceKind::Rss => Arc::new(rss::RssAdapter::from_config(cfg)?),
        SourceKind::HtmlIndex => Arc::new(html_index::HtmlIndexAdapter::from_config(cfg)?),
    };
    Ok(adapter)
}

pub fn build_sources(cfgs: &[SourceConfig]) -> Result<Vec<Arc<dyn SourceAdapter>>> {
    cfgs.iter().map(build_source).collect()
}

/// Fetch listing pages one by one, lazily, turning each into candidates with
/// `parse`. Stops after the first failing page.
pub(crate) fn paged_listing<'a, F>(
    source: &'a SourceId,
    fetcher: &'a Fetcher,
    pages: Vec<Url>,
    parse: F,
) -> BoxStream<'a, Result<CandidateUrl, ListingError>>
where
    F: Fn(&RawDocument) -> Result<Vec<CandidateUrl>, ListingError> + Send + Sync + 'a,
{
    struct State<'a, F> {
        source: &'a SourceId,
        fetcher: &'a Fetcher,
        pages: std::vec::IntoIter<Url>,
        parse: F,
        failed: bool,
    }

    let init = State {
        source,
        fetcher,
        pages: pages.into_iter(),
        parse,
        failed: false,
    };

    stream::unfold(init, |mut st| async move {
        if st.failed {
            return None;
        }
        let page = st.pages.next()?;
        let batch = match st.fetcher.fetch_default(&page).await {
            Ok(raw) => (st.parse)(&raw),
            Err(e) => Err(ListingError::Fetch(e)),
        };
        match &batch {
            Ok(items) => {
                tracing::debug!(source = %st.source, %page, count = items.len(), "listing page parsed")
            }
            Err(e) => {
                tracing::warn!(source = %st.source, %page, error = %e, "listing page failed");
                st.failed = true;
            }
        }
        Some((batch, st))
    })
    .flat_map(|batch| {
        let items: Vec<Result<CandidateUrl, ListingError>> = match batch {
            Ok(items) => items.into_iter().map(Ok).collect(),
            Err(e) => vec![Err(e)],
        };
        stream::iter(items)
    })
    .boxed()
}

/// Resolve `href` against the page it was found on; only http(s) survives.
pub(crate) fn resolve_link(base: &Url, href: &str) -> Option<Url> {
    let href = href.trim();
    if href.is_empty() || href.starts_with('#') {
        return None;
    }
    let url = base.join(href).ok()?;
    matches!(url.scheme(), "http" | "https").then_some(url)
}

/// Decode a listing document as UTF-8 (lossy: listings are only scanned for links).
pub(crate) fn listing_text(raw: &RawDocument) -> String {
    String::from_utf8_lossy(&raw.body).into_owned()
}
