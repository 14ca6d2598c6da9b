// tests/ingest_config.rs
use article_ingest::ingest::config::{SourceKind, ENV_CONFIG_PATH, ENV_TELEGRAM_CHAT_IDS};
use article_ingest::ingest::providers::build_sources;
use article_ingest::IngestConfig;
use std::{env, fs};

#[serial_test::serial]
#[test]
fn default_falls_back_to_config_dir_in_cwd() {
    // isolate CWD so the repo's own config/ is not picked up
    let old = env::current_dir().unwrap();
    let tmp = tempfile::tempdir().unwrap();
    env::set_current_dir(tmp.path()).unwrap();
    env::remove_var(ENV_CONFIG_PATH);
    env::remove_var(ENV_TELEGRAM_CHAT_IDS);

    // nothing on disk
    assert!(IngestConfig::load_default().is_err());

    let cfg_dir = tmp.path().join("config");
    fs::create_dir_all(&cfg_dir).unwrap();
    fs::write(
        cfg_dir.join("ingest.toml"),
        r#"
[notify]
telegram_chat_ids = ["100"]

[[sources]]
id = "feed"
kind = "rss"
base_url = "https://blog.example.com"
listing_path = "/rss"
"#,
    )
    .unwrap();
    let cfg = IngestConfig::load_default().unwrap();
    assert_eq!(cfg.sources[0].kind, SourceKind::Rss);
    assert_eq!(cfg.notify.telegram_chat_ids, vec!["100".to_string()]);
    assert_eq!(cfg.scheduler.interval_secs, 600);

    env::set_current_dir(&old).unwrap();
}

#[serial_test::serial]
#[test]
fn invalid_file_is_rejected() {
    let tmp = tempfile::tempdir().unwrap();
    let p = tmp.path().join("bad.toml");
    fs::write(
        &p,
        r#"
[scheduler]
workers = 0
"#,
    )
    .unwrap();
    env::set_var(ENV_CONFIG_PATH, p.display().to_string());
    let err = IngestConfig::load_default().unwrap_err();
    assert!(err.to_string().contains("workers"));

    fs::write(&p, "[[sources]]\nid = \"x\"\nkind = \"gopher\"\nbase_url = \"https://x\"\n").unwrap();
    assert!(IngestConfig::load_default().is_err(), "unknown source kind");

    env::remove_var(ENV_CONFIG_PATH);
}

#[test]
fn shipped_config_builds_every_source() {
    let cfg = IngestConfig::load_from(std::path::Path::new(concat!(
        env!("CARGO_MANIFEST_DIR"),
        "/config/ingest.toml"
    )))
    .unwrap();
    cfg.validate().unwrap();
    let sources = build_sources(&cfg.sources).unwrap();
    let ids: Vec<&str> = sources.iter().map(|s| s.id().as_str()).collect();
    assert_eq!(ids, vec!["hn", "rust-blog", "lwn"]);
}

#[test]
fn shipped_index_selectors_keep_whole_article_body() {
    use article_ingest::ingest::extract::{Extractor, RuleSpec};
    use article_ingest::ingest::types::{CandidateUrl, RawDocument, SourceId};

    let cfg = IngestConfig::load_from(std::path::Path::new(concat!(
        env!("CARGO_MANIFEST_DIR"),
        "/config/ingest.toml"
    )))
    .unwrap();
    let lwn = cfg.sources.iter().find(|s| s.id == "lwn").unwrap();
    let rules = RuleSpec::generic_article().with_overrides(&lwn.selectors);
    let ex = Extractor::compile(&rules).unwrap();

    let url = url::Url::parse("https://lwn.net/Articles/1/").unwrap();
    let raw = RawDocument {
        url: url.clone(),
        body: br#"<html><head><title>Kernel news</title></head><body>
            <div class="ArticleText">
              <p>First paragraph.</p>
              <p>Second paragraph.</p>
            </div></body></html>"#
            .to_vec(),
        fetched_at: chrono::Utc::now(),
    };
    let rec = ex
        .extract(&raw, &SourceId::new("lwn"), &CandidateUrl::new(url))
        .unwrap();
    assert_eq!(rec.body, "First paragraph.\n\nSecond paragraph.");
}
