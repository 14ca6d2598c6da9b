// src/ingest/providers/html_index.rs
use anyhow::Result;
use async_trait::async_trait;
use futures::stream::BoxStream;
use scraper::{Html, Selector};
use std::collections::HashSet;
use url::Url;

use super::{listing_text, paged_listing, resolve_link, SourceAdapter};
use crate::ingest::config::SourceConfig;
use crate::ingest::error::{ExtractError, ListingError};
use crate::ingest::extract::{parse_selector, Extractor, RuleSpec};
use crate::ingest::fetcher::Fetcher;
use crate::ingest::normalize_whitespace;
use crate::ingest::types::{ArticleRecord, CandidateUrl, RawDocument, SourceId};

pub const DEFAULT_LINK_SELECTOR: &str = "article a[href]";

/// Plain HTML index page (blog front page, section page) whose article links
/// are matched by a configurable selector.
pub struct HtmlIndexAdapter {
    id: SourceId,
    listing: Vec<Url>,
    links: Selector,
    allow_external: bool,
    extractor: Extractor,
}

impl HtmlIndexAdapter {
    pub fn from_config(cfg: &SourceConfig) -> Result<Self> {
        let link_selector = cfg.link_selector.as_deref().unwrap_or(DEFAULT_LINK_SELECTOR);
        let rules = RuleSpec::generic_article().with_overrides(&cfg.selectors);
        Ok(Self {
            id: SourceId::new(cfg.id.clone()),
            listing: cfg.listing_urls()?,
            links: parse_selector(link_selector)?,
            allow_external: cfg.allow_external,
            extractor: Extractor::compile(&rules)?,
        })
    }
}

pub fn parse_index(
    html: &str,
    page: &Url,
    links: &Selector,
    allow_external: bool,
) -> Vec<CandidateUrl> {
    let doc = Html::parse_document(html);
    let mut seen = HashSet::new();
    let mut out = Vec::new();

    for a in doc.select(links) {
        let Some(mut url) = a.value().attr("href").and_then(|h| resolve_link(page, h)) else {
            continue;
        };
        if !allow_external && url.host_str() != page.host_str() {
            continue;
        }
        url.set_fragment(None);
        // cards often link the same article from image and headline
        if !seen.insert(url.clone()) {
            continue;
        }
        let title = normalize_whitespace(&a.text().collect::<String>());
        out.push(CandidateUrl {
            url,
            title_hint: (!title.is_empty()).then_some(title),
            published_hint: None,
        });
    }
    out
}

#[async_trait]
impl SourceAdapter for HtmlIndexAdapter {
    fn id(&self) -> &SourceId {
        &self.id
    }

    fn list_articles<'a>(
        &'a self,
        fetcher: &'a Fetcher,
    ) -> BoxStream<'a, Result<CandidateUrl, ListingError>> {
        paged_listing(&self.id, fetcher, self.listing.clone(), move |raw| {
            Ok(parse_index(
                &listing_text(raw),
                &raw.url,
                &self.links,
                self.allow_external,
            ))
        })
    }

    fn extract(
        &self,
        raw: &RawDocument,
        candidate: &CandidateUrl,
    ) -> Result<ArticleRecord, ExtractError> {
        self.extractor.extract(raw, &self.id, candidate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const INDEX: &str = r##"
        <html><body>
          <article><a href="/2024/first"><img src="x.png"></a><h2><a href="/2024/first#top">First post</a></h2></article>
          <article><h2><a href="https://elsewhere.example.org/guest">Guest post</a></h2></article>
          <article><h2><a href="/2024/second">Second post</a></h2></article>
          <div class="sidebar"><a href="/about">About</a></div>
        </body></html>
    "##;

    #[test]
    fn same_host_links_deduplicated_in_order() {
        let page = Url::parse("https://news.example.com/").unwrap();
        let sel = parse_selector(DEFAULT_LINK_SELECTOR).unwrap();
        let got = parse_index(INDEX, &page, &sel, false);

        let urls: Vec<&str> = got.iter().map(|c| c.url.as_str()).collect();
        assert_eq!(
            urls,
            vec![
                "https://news.example.com/2024/first",
                "https://news.example.com/2024/second"
            ]
        );
        // image link has no text; the first hit wins
        assert_eq!(got[0].title_hint, None);
        assert_eq!(got[1].title_hint.as_deref(), Some("Second post"));
    }

    #[test]
    fn external_links_kept_when_allowed() {
        let page = Url::parse("https://news.example.com/").unwrap();
        let sel = parse_selector(DEFAULT_LINK_SELECTOR).unwrap();
        let got = parse_index(INDEX, &page, &sel, true);
        assert_eq!(got.len(), 3);
        assert_eq!(got[1].url.as_str(), "https://elsewhere.example.org/guest");
    }
}
