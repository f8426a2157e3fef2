//! Data models for in-flight articles, run state, summaries, and failures.
//!
//! This module defines the core data structures used throughout the pipeline:
//! - [`ArticleRecord`]: an article discovered on a listing page, progressively
//!   enriched by the fetch and processing steps
//! - [`SourceRunState`]: the per-source watermark persisted between runs
//! - [`SummaryResult`]: the subtitle + bullets produced by the LLM
//! - [`FailureRecord`]: a durable note that a step gave up on a URL
//! - [`StoredArticle`]: an article as held by the repository
//! - [`CategorySummary`]: a stored per-tag digest for a date window

use chrono::{DateTime, NaiveDate, Utc};
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// An article moving through the pipeline.
///
/// Created by the listing parser with only listing fields filled in, then
/// enriched step by step: the fetcher adds `content`, extraction adds the
/// proxy metadata, summarization adds `subtitle`/`bullets`, tagging adds
/// `tags`. Fields not yet computed are `None`.
///
/// The URL is the only identity; deduplication happens in the repository.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ArticleRecord {
    /// Absolute article URL.
    pub url: String,
    /// Headline as shown on the listing page.
    pub title: String,
    /// Normalized publication date, when `date_raw` parsed.
    #[serde(default)]
    pub date: Option<NaiveDate>,
    /// Publication date exactly as captured from the listing.
    #[serde(default)]
    pub date_raw: Option<String>,
    /// Article body: raw proxy output after fetch, clean text after processing.
    #[serde(default)]
    pub content: Option<String>,
    /// `Title:` header reported by the fetch proxy.
    #[serde(default)]
    pub jina_title: Option<String>,
    /// `URL Source:` header reported by the fetch proxy.
    #[serde(default)]
    pub jina_url: Option<String>,
    /// One-sentence LLM headline. Empty string means summarization failed.
    #[serde(default)]
    pub subtitle: Option<String>,
    /// Key facts from the LLM.
    #[serde(default)]
    pub bullets: Option<Vec<String>>,
    /// Keyword tags.
    #[serde(default)]
    pub tags: Option<Vec<String>>,
    /// Listing fields that do not map onto a known attribute.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extra: BTreeMap<String, String>,
}

impl ArticleRecord {
    pub fn new(url: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            title: title.into(),
            ..Default::default()
        }
    }

    pub fn with_date(mut self, date: NaiveDate) -> Self {
        self.date = Some(date);
        self
    }

    pub fn with_content(mut self, content: impl Into<String>) -> Self {
        self.content = Some(content.into());
        self
    }

    pub fn with_summary(mut self, summary: SummaryResult) -> Self {
        self.subtitle = Some(summary.subtitle);
        self.bullets = Some(summary.bullets);
        self
    }

    pub fn with_tags(mut self, tags: Vec<String>) -> Self {
        self.tags = Some(tags);
        self
    }

    /// Set a listing field by name. Known names fill the typed attribute,
    /// anything else lands in `extra`.
    pub fn set_field(&mut self, name: &str, value: Option<String>) {
        match name {
            "url" => self.url = value.unwrap_or_default(),
            "title" => self.title = value.unwrap_or_default(),
            "date_raw" => self.date_raw = value,
            "content" => self.content = value,
            other => {
                if let Some(v) = value {
                    self.extra.insert(other.to_string(), v);
                }
            }
        }
    }

    /// Rewrite the body in place if there is one.
    pub fn map_content(mut self, f: impl FnOnce(&str) -> String) -> Self {
        if let Some(content) = self.content.take() {
            self.content = Some(f(&content));
        }
        self
    }

    /// True when a usable summary is attached.
    pub fn has_summary(&self) -> bool {
        self.subtitle.as_deref().is_some_and(|s| !s.is_empty())
    }

    /// True when at least one tag is attached.
    pub fn has_tags(&self) -> bool {
        self.tags.as_ref().is_some_and(|t| !t.is_empty())
    }
}

/// Persisted fetch progress for one source.
///
/// Read at the start of a run to seed the default date window; written back
/// only when the run kept at least one article.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceRunState {
    pub source_name: String,
    #[serde(default)]
    pub last_run_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_article_date: Option<NaiveDate>,
}

impl SourceRunState {
    pub fn new(source_name: impl Into<String>) -> Self {
        Self {
            source_name: source_name.into(),
            ..Default::default()
        }
    }
}

/// LLM summary of a single article.
///
/// Either both fields carry content or both are empty (the failure sentinel
/// returned by [`SummaryResult::empty`]).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SummaryResult {
    pub subtitle: String,
    pub bullets: Vec<String>,
}

impl SummaryResult {
    /// The sentinel returned after all attempts failed.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.subtitle.is_empty()
    }

    /// Trim, drop blank bullets, and remove duplicates while keeping order.
    pub fn sanitized(self) -> Self {
        Self {
            subtitle: self.subtitle.trim().to_string(),
            bullets: self
                .bullets
                .into_iter()
                .map(|b| b.trim().to_string())
                .filter(|b| !b.is_empty())
                .unique()
                .collect(),
        }
    }
}

/// Durable record that a step gave up on a URL.
///
/// At most one unresolved record exists per `(url, step)`; a repeated failure
/// updates `error` and `retry_count` on the existing record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureRecord {
    pub url: String,
    pub step: String,
    pub error: String,
    pub retry_count: u32,
    #[serde(default)]
    pub resolved: bool,
    pub updated_at: DateTime<Utc>,
}

/// An article as kept by the repository.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredArticle {
    pub source_name: String,
    pub source_url: String,
    pub saved_at: DateTime<Utc>,
    #[serde(flatten)]
    pub article: ArticleRecord,
}

/// A stored map-reduce summary for one tag over one date window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategorySummary {
    pub tag: String,
    pub date_from: NaiveDate,
    pub date_to: NaiveDate,
    pub summary: String,
    pub article_count: usize,
    pub created_at: DateTime<Utc>,
}

/// Token counts reported by the generative backend for one call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    pub input_tokens: u64,
    pub output_tokens: u64,
}

impl std::ops::AddAssign for Usage {
    fn add_assign(&mut self, rhs: Self) {
        self.input_tokens += rhs.input_tokens;
        self.output_tokens += rhs.output_tokens;
    }
}
