// src/ingest/extract.rs
//! Raw HTML → `ArticleRecord`.
//!
//! Field lookup is driven by ordered selector lists per field; the first
//! selector that yields non-empty text wins. `meta` elements contribute their
//! `content` attribute and `time` elements their `datetime` attribute.

use chrono::{DateTime, NaiveDate, Utc};
use scraper::{ElementRef, Html, Node, Selector};

use crate::ingest::config::SelectorOverrides;
use crate::ingest::error::ExtractError;
use crate::ingest::{normalize_text, normalize_whitespace};
use crate::ingest::types::{
    canonical_url, ArticleRecord, CandidateUrl, Fingerprint, RawDocument, SourceId,
};

pub const TITLE_MAX_CHARS: usize = 255;
pub const SUMMARY_FALLBACK_CHARS: usize = 300;

const BLOCK_SELECTOR: &str = "p, h2, h3, h4, h5, h6, li, blockquote, pre";
const SKIPPED_TAGS: &[&str] = &[
    "script", "style", "noscript", "nav", "footer", "aside", "form", "iframe", "svg",
];

/// Selector lists as written in config, before compilation.
#[derive(Debug, Clone)]
pub struct RuleSpec {
    pub title: Vec<String>,
    pub summary: Vec<String>,
    pub body: Vec<String>,
    pub published_at: Vec<String>,
}

impl RuleSpec {
    /// Works for most article pages: OpenGraph first, then document structure.
    pub fn generic_article() -> Self {
        Self {
            title: strings(&[
                r#"meta[property="og:title"]"#,
                "article h1",
                "h1",
                "title",
            ]),
            summary: strings(&[
                r#"meta[property="og:description"]"#,
                r#"meta[name="description"]"#,
            ]),
            body: strings(&["article", "main", r#"[role="main"]"#, "body"]),
            published_at: strings(&[
                r#"meta[property="article:published_time"]"#,
                r#"meta[name="date"]"#,
                "time[datetime]",
            ]),
        }
    }

    pub fn with_overrides(mut self, o: &SelectorOverrides) -> Self {
        if let Some(v) = &o.title {
            self.title = v.clone();
        }
        if let Some(v) = &o.summary {
            self.summary = v.clone();
        }
        if let Some(v) = &o.body {
            self.body = v.clone();
        }
        if let Some(v) = &o.published_at {
            self.published_at = v.clone();
        }
        self
    }
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

/// Compiled selector lists for one source.
#[derive(Debug, Clone)]
pub struct Extractor {
    title: Vec<Selector>,
    summary: Vec<Selector>,
    body: Vec<Selector>,
    published_at: Vec<Selector>,
    blocks: Selector,
}

impl Extractor {
    pub fn compile(rules: &RuleSpec) -> anyhow::Result<Self> {
        Ok(Self {
            title: compile_list("title", &rules.title)?,
            summary: compile_list("summary", &rules.summary)?,
            body: compile_list("body", &rules.body)?,
            published_at: compile_list("published_at", &rules.published_at)?,
            blocks: parse_selector(BLOCK_SELECTOR)?,
        })
    }

    pub fn extract(
        &self,
        raw: &RawDocument,
        source: &SourceId,
        candidate: &CandidateUrl,
    ) -> Result<ArticleRecord, ExtractError> {
        if raw.body.iter().all(|b| b.is_ascii_whitespace()) {
            return Err(ExtractError::MalformedDocument("empty document".into()));
        }
        let html = std::str::from_utf8(&raw.body)
            .map_err(|e| ExtractError::MalformedDocument(format!("not utf-8: {e}")))?;
        let doc = Html::parse_document(html);

        let title = first_text(&doc, &self.title)
            .or_else(|| {
                candidate
                    .title_hint
                    .as_deref()
                    .map(normalize_text)
                    .filter(|t| !t.is_empty())
            })
            .map(|t| truncate_chars(&t, TITLE_MAX_CHARS))
            .ok_or(ExtractError::MissingRequiredField("title"))?;

        let body = self.body_text(&doc);

        let summary = first_text(&doc, &self.summary).or_else(|| {
            body.split("\n\n")
                .next()
                .filter(|p| !p.is_empty())
                .map(|p| truncate_chars(p, SUMMARY_FALLBACK_CHARS))
        });

        let published_at = first_text(&doc, &self.published_at)
            .and_then(|s| parse_timestamp(&s))
            .or(candidate.published_hint);

        let external_url = canonical_url(&candidate.url);
        let fingerprint = Fingerprint::compute(source, &external_url);

        Ok(ArticleRecord {
            source_id: source.clone(),
            external_url,
            title,
            summary,
            body,
            published_at,
            fingerprint,
            ingested_at: None,
        })
    }

    fn body_text(&self, doc: &Html) -> String {
        for sel in &self.body {
            for container in doc.select(sel) {
                let mut paragraphs = Vec::new();
                for block in container.select(&self.blocks) {
                    if is_inside_skipped(block)
                        || has_block_ancestor_within(block, container, &self.blocks)
                    {
                        continue;
                    }
                    let text = normalize_whitespace(&visible_text(block));
                    if !text.is_empty() {
                        paragraphs.push(text);
                    }
                }
                if paragraphs.is_empty() {
                    let text = normalize_whitespace(&visible_text(container));
                    if !text.is_empty() {
                        paragraphs.push(text);
                    }
                }
                if !paragraphs.is_empty() {
                    return paragraphs.join("\n\n");
                }
            }
        }
        String::new()
    }
}

fn compile_list(field: &str, items: &[String]) -> anyhow::Result<Vec<Selector>> {
    items
        .iter()
        .map(|s| {
            parse_selector(s).map_err(|e| anyhow::anyhow!("{field} selector: {e}"))
        })
        .collect()
}

pub(crate) fn parse_selector(s: &str) -> anyhow::Result<Selector> {
    Selector::parse(s).map_err(|e| anyhow::anyhow!("invalid selector `{s}`: {e:?}"))
}

fn first_text(doc: &Html, selectors: &[Selector]) -> Option<String> {
    selectors.iter().find_map(|sel| {
        doc.select(sel).find_map(|el| {
            let raw = match el.value().name() {
                "meta" => el.value().attr("content").map(str::to_string),
                "time" => el
                    .value()
                    .attr("datetime")
                    .map(str::to_string)
                    .or_else(|| Some(visible_text(el))),
                _ => Some(visible_text(el)),
            }?;
            let text = normalize_whitespace(&raw);
            (!text.is_empty()).then_some(text)
        })
    })
}

/// Text of an element, skipping script/style/navigation subtrees.
pub fn visible_text(el: ElementRef<'_>) -> String {
    let mut out = String::new();
    collect_text(el, &mut out);
    out
}

fn collect_text(el: ElementRef<'_>, out: &mut String) {
    for child in el.children() {
        match child.value() {
            Node::Text(t) => out.push_str(t),
            Node::Element(e) => {
                if is_skipped_tag(e.name()) {
                    continue;
                }
                if let Some(child_el) = ElementRef::wrap(child) {
                    // keep words of adjacent blocks apart
                    out.push(' ');
                    collect_text(child_el, out);
                    out.push(' ');
                }
            }
            _ => {}
        }
    }
}

fn is_skipped_tag(name: &str) -> bool {
    SKIPPED_TAGS.iter().any(|t| *t == name)
}

fn is_inside_skipped(el: ElementRef<'_>) -> bool {
    el.ancestors().any(|a| match a.value() {
        Node::Element(e) => is_skipped_tag(e.name()),
        _ => false,
    })
}

/// `<li><p>..</p></li>` would otherwise be emitted twice.
fn has_block_ancestor_within(
    el: ElementRef<'_>,
    container: ElementRef<'_>,
    blocks: &Selector,
) -> bool {
    for a in el.ancestors() {
        if a.id() == container.id() {
            return false;
        }
        if let Some(a_el) = ElementRef::wrap(a) {
            if blocks.matches(&a_el) {
                return true;
            }
        }
    }
    false
}

fn truncate_chars(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        s.chars().take(max).collect::<String>().trim_end().to_string()
    }
}

/// RFC 3339, RFC 2822, then a bare `YYYY-MM-DD` (midnight UTC).
pub fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    let s = s.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = DateTime::parse_from_rfc2822(s) {
        return Some(dt.with_timezone(&Utc));
    }
    let date_part = s.get(..10).unwrap_or(s);
    NaiveDate::parse_from_str(date_part, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|ndt| ndt.and_utc())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use url::Url;

    fn raw(html: &str) -> RawDocument {
        RawDocument {
            url: Url::parse("https://example.com/post").unwrap(),
            body: html.as_bytes().to_vec(),
            fetched_at: Utc::now(),
        }
    }

    fn candidate() -> CandidateUrl {
        CandidateUrl::new(Url::parse("https://example.com/post#comments").unwrap())
    }

    fn generic() -> Extractor {
        Extractor::compile(&RuleSpec::generic_article()).unwrap()
    }

    #[test]
    fn extracts_fields_from_article_markup() {
        let html = r#"
            <html><head>
              <title>Site | Fallback</title>
              <meta property="og:title" content="  Rust &amp; Friends ">
              <meta name="description" content="A short   summary.">
              <meta property="article:published_time" content="2024-05-01T10:30:00+02:00">
            </head><body>
              <nav><p>Home About</p></nav>
              <article>
                <h1>Rust &amp; Friends</h1>
                <p>First   paragraph
                   spans lines.</p>
                <script>var x = 1;</script>
                <p>Second <b>bold</b> paragraph.</p>
                <aside><p>Related links</p></aside>
              </article>
              <footer>(c) 2024</footer>
            </body></html>
        "#;
        let src = SourceId::new("blog");
        let rec = generic().extract(&raw(html), &src, &candidate()).unwrap();

        assert_eq!(rec.title, "Rust & Friends");
        assert_eq!(rec.summary.as_deref(), Some("A short summary."));
        assert_eq!(
            rec.body,
            "First paragraph spans lines.\n\nSecond bold paragraph."
        );
        assert_eq!(
            rec.published_at,
            Some(Utc.with_ymd_and_hms(2024, 5, 1, 8, 30, 0).unwrap())
        );
        assert_eq!(rec.external_url, "https://example.com/post");
        assert_eq!(rec.fingerprint, Fingerprint::compute(&src, "https://example.com/post"));
        assert!(rec.ingested_at.is_none());
    }

    #[test]
    fn empty_title_is_missing_required_field() {
        let html = "<html><head><title>   </title></head><body><p>text</p></body></html>";
        let err = generic()
            .extract(&raw(html), &SourceId::new("blog"), &candidate())
            .unwrap_err();
        assert_eq!(err, ExtractError::MissingRequiredField("title"));
    }

    #[test]
    fn listing_hint_fills_missing_title() {
        let html = "<html><body><p>Only body text here.</p></body></html>";
        let mut c = candidate();
        c.title_hint = Some("Show HN: A thing".into());
        let rec = generic().extract(&raw(html), &SourceId::new("hn"), &c).unwrap();
        assert_eq!(rec.title, "Show HN: A thing");
        // summary falls back to first paragraph
        assert_eq!(rec.summary.as_deref(), Some("Only body text here."));
    }

    #[test]
    fn empty_or_binary_documents_are_malformed() {
        let ex = generic();
        let src = SourceId::new("blog");
        assert!(matches!(
            ex.extract(&raw("  \n "), &src, &candidate()),
            Err(ExtractError::MalformedDocument(_))
        ));
        let mut bin = raw("x");
        bin.body = vec![0xff, 0xfe, 0x00, 0x81];
        assert!(matches!(
            ex.extract(&bin, &src, &candidate()),
            Err(ExtractError::MalformedDocument(_))
        ));
    }

    #[test]
    fn long_titles_are_truncated() {
        let long = "x".repeat(400);
        let html = format!("<html><head><title>{long}</title></head><body></body></html>");
        let rec = generic()
            .extract(&raw(&html), &SourceId::new("blog"), &candidate())
            .unwrap();
        assert_eq!(rec.title.chars().count(), TITLE_MAX_CHARS);
    }

    #[test]
    fn overrides_replace_default_rules() {
        let rules = RuleSpec::generic_article().with_overrides(&SelectorOverrides {
            title: Some(vec!["h2.headline".into()]),
            ..Default::default()
        });
        let ex = Extractor::compile(&rules).unwrap();
        let html = r#"<html><head><title>Generic</title></head>
            <body><h2 class="headline">Specific</h2></body></html>"#;
        let rec = ex.extract(&raw(html), &SourceId::new("blog"), &candidate()).unwrap();
        assert_eq!(rec.title, "Specific");
    }

    #[test]
    fn invalid_selector_fails_compilation() {
        let rules = RuleSpec::generic_article().with_overrides(&SelectorOverrides {
            body: Some(vec!["div[".into()]),
            ..Default::default()
        });
        assert!(Extractor::compile(&rules).is_err());
    }

    #[test]
    fn timestamp_formats() {
        let want = Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap();
        assert_eq!(parse_timestamp("2024-01-02T00:00:00Z"), Some(want));
        assert_eq!(parse_timestamp("Tue, 02 Jan 2024 00:00:00 +0000"), Some(want));
        assert_eq!(parse_timestamp("2024-01-02"), Some(want));
        assert_eq!(parse_timestamp("yesterday"), None);
    }
}
