// src/ingest/providers/hacker_news.rs
use anyhow::Result;
use async_trait::async_trait;
use futures::stream::BoxStream;
use scraper::{Html, Selector};
use url::Url;

use super::{listing_text, paged_listing, resolve_link, SourceAdapter};
use crate::ingest::config::SourceConfig;
use crate::ingest::error::{ExtractError, ListingError};
use crate::ingest::extract::{parse_selector, Extractor, RuleSpec};
use crate::ingest::fetcher::Fetcher;
use crate::ingest::normalize_whitespace;
use crate::ingest::types::{ArticleRecord, CandidateUrl, RawDocument, SourceId};

/// Story rows of the "newest" listing.
const STORY_ANCHOR: &str = "tr.athing span.titleline > a";

/// Hacker News style listing: each story row links straight to the article.
pub struct HackerNewsAdapter {
    id: SourceId,
    listing: Vec<Url>,
    anchor: Selector,
    extractor: Extractor,
}

impl HackerNewsAdapter {
    pub fn from_config(cfg: &SourceConfig) -> Result<Self> {
        let rules = RuleSpec::generic_article().with_overrides(&cfg.selectors);
        Ok(Self {
            id: SourceId::new(cfg.id.clone()),
            listing: cfg.listing_urls()?,
            anchor: parse_selector(STORY_ANCHOR)?,
            extractor: Extractor::compile(&rules)?,
        })
    }

    pub fn parse_listing(&self, raw: &RawDocument) -> Vec<CandidateUrl> {
        parse_story_rows(&listing_text(raw), &raw.url, &self.anchor)
    }
}

fn parse_story_rows(html: &str, page: &Url, anchor: &Selector) -> Vec<CandidateUrl> {
    let doc = Html::parse_document(html);
    let mut out = Vec::new();
    for a in doc.select(anchor) {
        let Some(url) = a.value().attr("href").and_then(|h| resolve_link(page, h)) else {
            tracing::warn!(%page, "story row without usable link");
            continue;
        };
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
impl SourceAdapter for HackerNewsAdapter {
    fn id(&self) -> &SourceId {
        &self.id
    }

    fn list_articles<'a>(
        &'a self,
        fetcher: &'a Fetcher,
    ) -> BoxStream<'a, Result<CandidateUrl, ListingError>> {
        paged_listing(&self.id, fetcher, self.listing.clone(), move |raw| {
            Ok(self.parse_listing(raw))
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

    const LISTING: &str = r#"
        <html><body><table>
          <tr class="athing" id="1">
            <td class="title"><span class="titleline">
              <a href="https://example.com/launch">Launch   HN: Widgets</a>
              <span class="sitebit comhead">(<a href="from?site=example.com">example.com</a>)</span>
            </span></td>
          </tr>
          <tr class="athing" id="2">
            <td class="title"><span class="titleline">
              <a href="item?id=2">Ask HN: How do you test?</a>
            </span></td>
          </tr>
          <tr class="spacer"></tr>
        </table></body></html>
    "#;

    #[test]
    fn story_rows_become_candidates_with_title_hints() {
        let page = Url::parse("https://news.ycombinator.com/newest").unwrap();
        let anchor = parse_selector(STORY_ANCHOR).unwrap();
        let got = parse_story_rows(LISTING, &page, &anchor);

        assert_eq!(got.len(), 2);
        assert_eq!(got[0].url.as_str(), "https://example.com/launch");
        assert_eq!(got[0].title_hint.as_deref(), Some("Launch HN: Widgets"));
        assert_eq!(got[1].url.as_str(), "https://news.ycombinator.com/item?id=2");
    }
}
