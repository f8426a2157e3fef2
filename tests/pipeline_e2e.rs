//! Full site runs against in-process fakes and an on-disk store.

use chrono::NaiveDate;
use newsfeed::api::{Generate, Generation};
use newsfeed::config::{SiteConfig, load_all_site_configs};
use newsfeed::cost::CostTracker;
use newsfeed::fetch::Transport;
use newsfeed::models::Usage;
use newsfeed::pipeline::{RunWindow, Runner};
use newsfeed::processing::Processor;
use newsfeed::processing::summarization::{SummarizeOptions, Summarizer};
use newsfeed::processing::tagging::Tagger;
use newsfeed::storage::{JsonStore, Repository};
use newsfeed::{NewsfeedError, Result};
use serde_json::Value;
use std::collections::HashMap;
use std::fs;
use std::sync::Mutex;
use std::time::Duration;

const SITE: &str = r#"{
    "name": "dcd",
    "listing_url": "https://www.example.com/news",
    "pagination": "?page={n}",
    "request_delay": 0,
    "listing_pattern": "\\[(?P<title>.+)\\]\\((?P<url>.+)\\)\\s+(?P<date_raw>\\d{1,2} \\w+ \\d{4})",
    "listing_fields": ["title", "url", "date_raw"],
    "date_format": "%d %b %Y",
    "pipeline": ["extract_jina_meta", "remove_noise", "extract_body", "strip_byline",
                 "strip_links", "strip_images", "decode_entities", "normalize_whitespace",
                 "summarize", "auto_tag"]
}"#;

const LISTING_PAGE: &str = "\
# Latest news

[Equinix announces new hyperscale facility](https://www.example.com/a) 19 Feb 2026
[Utility approves substation](https://www.example.com/b) 18 Feb 2026
";

const ARTICLE_A: &str = "\
Title: Equinix announces new hyperscale facility
URL Source: https://www.example.com/a

Markdown Content:
* [News](https://www.example.com/news)
* [Analysis](https://www.example.com/analysis)
* [Events](https://www.example.com/events)
* [Jobs](https://www.example.com/jobs)
* [About](https://www.example.com/about)

February 19, 2026 By Staff Writer

Equinix has announced a new hyperscale facility outside Madrid, with 60MW planned across three buildings for cloud customers.
The first building is due to open in 2027 and will run on a [renewable power](https://www.example.com/ppa) purchase agreement.

We use cookies to improve your experience. Accept all cookies
";

const ARTICLE_B: &str = "\
Title: Utility approves substation
URL Source: https://www.example.com/b

Markdown Content:
The regional utility approved a new 400kV substation to serve the data center cluster north of the city by 2028.
";

#[derive(Default)]
struct Pages {
    pages: HashMap<String, String>,
    requests: Mutex<Vec<String>>,
}

impl Pages {
    fn with(mut self, url: &str, body: &str) -> Self {
        self.pages.insert(url.to_string(), body.to_string());
        self
    }
}

impl Transport for Pages {
    async fn fetch(&self, url: &str) -> Result<String> {
        self.requests.lock().unwrap().push(url.to_string());
        self.pages.get(url).cloned().ok_or_else(|| NewsfeedError::Status {
            status: 404,
            url: url.to_string(),
        })
    }
}

/// Answers every prompt with a fixed summary, failing for articles that
/// mention `fail_on`.
struct Backend {
    fail_on: Option<&'static str>,
}

impl Generate for Backend {
    async fn generate(&self, _model: &str, prompt: &str, _schema: Option<&Value>) -> Result<Generation> {
        if self.fail_on.is_some_and(|needle| prompt.contains(needle)) {
            return Err(NewsfeedError::Status {
                status: 503,
                url: "https://backend.test".into(),
            });
        }
        Ok(Generation {
            text: "```json\n{\"subtitle\": \"New build announced\", \"bullets\": [\"60MW\", \"Madrid\", \"2027\"]}\n```".into(),
            usage: Usage {
                input_tokens: 500,
                output_tokens: 50,
            },
        })
    }
}

fn day(d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2026, 2, d).unwrap()
}

fn pages() -> Pages {
    Pages::default()
        .with("https://www.example.com/news", LISTING_PAGE)
        .with("https://www.example.com/news?page=2", "")
        .with("https://www.example.com/a", ARTICLE_A)
        .with("https://www.example.com/b", ARTICLE_B)
}

fn tagger() -> Tagger {
    Tagger::from_json(r#"{"Expansion": ["new facility", "hyperscale"], "Power": ["substation", "ppa"]}"#).unwrap()
}

fn options() -> SummarizeOptions {
    SummarizeOptions {
        max_retries: 2,
        retry_delay: Duration::ZERO,
        ..SummarizeOptions::default()
    }
}

#[tokio::test]
async fn test_site_run_end_to_end() {
    let dir = tempfile::tempdir().unwrap();
    let store = JsonStore::open(dir.path()).unwrap();
    let cost = CostTracker::new();
    let backend = Backend { fail_on: None };
    let tagger = tagger();
    let config = SiteConfig::from_json(SITE).unwrap();
    let transport = pages();

    let summarizer = Summarizer::new(&backend, &cost, &store).with_options(options());
    let runner = Runner::new(Processor::new(summarizer, &tagger), &store, &cost);
    let window = RunWindow {
        from: None,
        to: None,
        max_pages: 5,
    };
    let report = runner.run_site(&transport, &config, &window, day(20)).await.unwrap();

    assert_eq!(report.fetched, 2);
    assert_eq!(report.saved, 2);
    assert_eq!(report.cost.input_tokens, 1_000);
    assert_eq!(
        transport.requests.lock().unwrap().clone(),
        vec![
            "https://www.example.com/news",
            "https://www.example.com/news?page=2",
            "https://www.example.com/a",
            "https://www.example.com/b",
        ]
    );

    // Everything must survive a reopen.
    let reopened = JsonStore::open(dir.path()).unwrap();
    let articles = reopened.articles();
    assert_eq!(articles.len(), 2);

    let a = &articles[0].article;
    assert_eq!(a.date, Some(day(19)));
    assert_eq!(a.date_raw.as_deref(), Some("19 Feb 2026"));
    let body = a.content.as_deref().unwrap();
    assert!(body.starts_with("Equinix has announced a new hyperscale facility outside Madrid"));
    assert!(body.contains("renewable power purchase agreement"));
    assert!(!body.contains("cookies"));
    assert!(!body.contains("[News]"));
    assert!(!body.contains("By Staff Writer"));
    assert_eq!(a.subtitle.as_deref(), Some("New build announced"));
    assert_eq!(a.bullets.as_ref().map(Vec::len), Some(3));
    assert_eq!(a.tags, Some(vec!["Expansion".to_string()]));

    let b = &articles[1].article;
    assert_eq!(b.tags, Some(vec!["Power".to_string()]));

    let state = reopened.load_run_state("dcd").unwrap();
    assert_eq!(state.last_article_date, Some(day(20)));
    assert!(state.last_run_at.is_some());
}

#[tokio::test]
async fn test_summary_failure_is_recorded_once() {
    let dir = tempfile::tempdir().unwrap();
    let store = JsonStore::open(dir.path()).unwrap();
    let cost = CostTracker::new();
    let backend = Backend {
        fail_on: Some("substation"),
    };
    let tagger = tagger();
    let config = SiteConfig::from_json(SITE).unwrap();

    let summarizer = Summarizer::new(&backend, &cost, &store).with_options(options());
    let runner = Runner::new(Processor::new(summarizer, &tagger), &store, &cost);
    let window = RunWindow {
        from: Some(day(1)),
        to: Some(day(20)),
        max_pages: 5,
    };
    let report = runner.run_site(&pages(), &config, &window, day(20)).await.unwrap();
    assert_eq!(report.saved, 2);

    let failures = store.failures().unwrap();
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].url, "https://www.example.com/b");
    assert_eq!(failures[0].step, "summarize");
    assert_eq!(failures[0].retry_count, 2);
    assert!(!failures[0].resolved);

    let missing = store.articles_missing_summaries().unwrap();
    assert_eq!(missing.len(), 1);
    assert_eq!(missing[0].article.subtitle.as_deref(), Some(""));
}

#[tokio::test]
async fn test_site_configs_load_from_directory() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("dcd.json"), SITE).unwrap();
    fs::write(dir.path().join("tags.json"), r#"{"Expansion": ["hyperscale"]}"#).unwrap();

    let configs = load_all_site_configs(dir.path()).unwrap();
    assert_eq!(configs.len(), 1);
    assert_eq!(configs[0].name, "dcd");
    assert_eq!(configs[0].pipeline.len(), 10);
}
