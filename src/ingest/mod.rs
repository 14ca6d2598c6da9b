// src/ingest/mod.rs
pub mod config;
pub mod cycle;
pub mod dedup;
pub mod error;
pub mod extract;
pub mod fetcher;
pub mod providers;
pub mod scheduler;
pub mod store;
pub mod types;

use metrics::{describe_counter, describe_gauge, describe_histogram};
use once_cell::sync::OnceCell;

/// One-time metrics registration (so series show up on /metrics).
pub(crate) fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("ingest_cycles_total", "Ingestion cycles run, by outcome.");
        describe_counter!(
            "ingest_triggers_skipped_total",
            "Timer triggers skipped because a cycle was still running."
        );
        describe_counter!(
            "ingest_candidates_total",
            "Candidates processed, by source and outcome."
        );
        describe_counter!(
            "ingest_source_failures_total",
            "Source-level failures (listing, store, deadline)."
        );
        describe_counter!("ingest_fetch_retries_total", "Fetcher retries of transient failures.");
        describe_counter!("notify_publish_total", "Notifier publish attempts, by result.");
        describe_histogram!("ingest_cycle_duration_ms", "Cycle wall time in milliseconds.");
        describe_gauge!("ingest_last_cycle_ts", "Unix ts when the last cycle finished.");
    });
}

/// Collapse runs of whitespace into one space and trim.
pub fn normalize_whitespace(s: &str) -> String {
    static RE_WS: OnceCell<regex::Regex> = OnceCell::new();
    let re_ws = RE_WS.get_or_init(|| regex::Regex::new(r"\s+").unwrap());
    re_ws.replace_all(s, " ").trim().to_string()
}

/// Normalize text that may still carry markup (RSS titles, listing hints):
/// decode entities, strip tags, collapse whitespace.
pub fn normalize_text(s: &str) -> String {
    // 1) HTML entity decode
    let out = html_escape::decode_html_entities(s).to_string();

    // 2) Strip HTML tags
    static RE_TAGS: OnceCell<regex::Regex> = OnceCell::new();
    let re_tags = RE_TAGS.get_or_init(|| regex::Regex::new(r"(?is)</?[a-z][^>]*>").unwrap());
    let out = re_tags.replace_all(&out, " ");

    // 3) Collapse whitespace
    normalize_whitespace(&out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_text_decodes_strips_and_collapses() {
        let s = "  <b>Hello</b>,&nbsp;&nbsp; world!!!  ";
        assert_eq!(normalize_text(s), "Hello , world!!!");
        assert_eq!(normalize_text("a &lt; b"), "a < b");
    }

    #[test]
    fn normalize_whitespace_keeps_punctuation() {
        assert_eq!(normalize_whitespace("\n  One.\t Two.  \n"), "One. Two.");
    }
}
