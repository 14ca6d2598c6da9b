// src/ingest/providers/rss.rs
use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::stream::BoxStream;
use quick_xml::de::from_str;
use serde::Deserialize;
use time::{format_description::well_known::Rfc2822, OffsetDateTime, UtcOffset};
use url::Url;

use super::{listing_text, paged_listing, resolve_link, SourceAdapter};
use crate::ingest::config::SourceConfig;
use crate::ingest::error::{ExtractError, ListingError};
use crate::ingest::extract::{Extractor, RuleSpec};
use crate::ingest::fetcher::Fetcher;
use crate::ingest::normalize_text;
use crate::ingest::types::{ArticleRecord, CandidateUrl, RawDocument, SourceId};

#[derive(Debug, Deserialize)]
struct Rss {
    channel: Channel,
}

#[derive(Debug, Deserialize)]
struct Channel {
    #[serde(rename = "item", default)]
    item: Vec<Item>,
}

#[derive(Debug, Deserialize)]
struct Item {
    title: Option<String>,
    link: Option<String>,
    #[serde(rename = "pubDate")]
    pub_date: Option<String>,
}

fn parse_rfc2822(ts: &str) -> Option<DateTime<Utc>> {
    OffsetDateTime::parse(ts.trim(), &Rfc2822)
        .ok()
        .map(|dt| dt.to_offset(UtcOffset::UTC).unix_timestamp())
        .and_then(|secs| DateTime::from_timestamp(secs, 0))
}

/// RSS 2.0 feed as listing; items link to full article pages.
pub struct RssAdapter {
    id: SourceId,
    listing: Vec<Url>,
    extractor: Extractor,
}

impl RssAdapter {
    /// Blog engines usually wrap the post body in one of these.
    pub fn default_rules() -> RuleSpec {
        let mut rules = RuleSpec::generic_article();
        rules.body = [".entry-content", ".post-content", "article", "main", "body"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        rules
    }

    pub fn from_config(cfg: &SourceConfig) -> Result<Self> {
        let rules = Self::default_rules().with_overrides(&cfg.selectors);
        Ok(Self {
            id: SourceId::new(cfg.id.clone()),
            listing: cfg.listing_urls()?,
            extractor: Extractor::compile(&rules)?,
        })
    }
}

pub fn parse_feed(xml: &str, feed_url: &Url) -> Result<Vec<CandidateUrl>, ListingError> {
    let xml_clean = scrub_html_entities_for_xml(xml);
    let rss: Rss = from_str(&xml_clean).map_err(|e| ListingError::Parse(e.to_string()))?;

    let mut out = Vec::with_capacity(rss.channel.item.len());
    for it in rss.channel.item {
        let Some(url) = it.link.as_deref().and_then(|l| resolve_link(feed_url, l)) else {
            tracing::debug!(feed = %feed_url, "rss item without usable link");
            continue;
        };
        let title = it
            .title
            .as_deref()
            .map(normalize_text)
            .filter(|t| !t.is_empty());
        out.push(CandidateUrl {
            url,
            title_hint: title,
            published_hint: it.pub_date.as_deref().and_then(parse_rfc2822),
        });
    }
    Ok(out)
}

#[async_trait]
impl SourceAdapter for RssAdapter {
    fn id(&self) -> &SourceId {
        &self.id
    }

    fn list_articles<'a>(
        &'a self,
        fetcher: &'a Fetcher,
    ) -> BoxStream<'a, Result<CandidateUrl, ListingError>> {
        paged_listing(&self.id, fetcher, self.listing.clone(), |raw| {
            parse_feed(&listing_text(raw), &raw.url)
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

/// Feeds routinely embed HTML named entities that are not valid XML.
fn scrub_html_entities_for_xml(s: &str) -> String {
    s.replace("&nbsp;", " ")
        .replace("&ndash;", "-")
        .replace("&mdash;", "-")
        .replace("&ldquo;", "\"")
        .replace("&rdquo;", "\"")
        .replace("&lsquo;", "'")
        .replace("&rsquo;", "'")
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    const FEED: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
        <rss version="2.0"><channel>
          <title>Example blog</title>
          <item>
            <title>Release &ndash; 1.0</title>
            <link>https://blog.example.com/posts/release-1-0</link>
            <pubDate>Tue, 02 Jan 2024 10:00:00 +0000</pubDate>
            <description>Notes</description>
          </item>
          <item>
            <title>Relative link</title>
            <link>/posts/relative</link>
          </item>
          <item>
            <title>No link at all</title>
          </item>
        </channel></rss>"#;

    #[test]
    fn items_with_links_become_candidates() {
        let feed_url = Url::parse("https://blog.example.com/feed.xml").unwrap();
        let got = parse_feed(FEED, &feed_url).unwrap();

        assert_eq!(got.len(), 2);
        assert_eq!(got[0].url.as_str(), "https://blog.example.com/posts/release-1-0");
        assert_eq!(got[0].title_hint.as_deref(), Some("Release - 1.0"));
        assert_eq!(
            got[0].published_hint,
            Some(Utc.with_ymd_and_hms(2024, 1, 2, 10, 0, 0).unwrap())
        );
        assert_eq!(got[1].url.as_str(), "https://blog.example.com/posts/relative");
        assert_eq!(got[1].published_hint, None);
    }

    #[test]
    fn empty_channel_is_fine_but_garbage_is_not() {
        let feed_url = Url::parse("https://blog.example.com/feed.xml").unwrap();
        let empty = r#"<rss version="2.0"><channel><title>x</title></channel></rss>"#;
        assert!(parse_feed(empty, &feed_url).unwrap().is_empty());
        assert!(matches!(
            parse_feed("<html><body>not a feed</body></html>", &feed_url),
            Err(ListingError::Parse(_))
        ));
    }
}
