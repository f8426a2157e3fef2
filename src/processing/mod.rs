//! Article processing pipeline.
//!
//! Each source lists the [`Step`]s its articles go through, in order. Most
//! steps are pure text rewrites of the article body (see [`Step::transform`]);
//! `summarize` and `auto_tag` need the run's [`Processor`], which owns the
//! summarizer and tagger.
//!
//! | Step | Effect |
//! |------|--------|
//! | `extract_jina_meta` | split proxy header into `jina_title`/`jina_url`, keep body |
//! | `remove_noise` | drop nav, link clusters, forms, cookie and share rows |
//! | `extract_body` | narrow to the article by markers or longest paragraph run |
//! | `strip_byline` | drop the first `Month D, YYYY By ...` line |
//! | `strip_links` | `[text](url)` to `text` |
//! | `strip_images` | drop images and their captions |
//! | `decode_entities` | HTML entities in body and title |
//! | `normalize_whitespace` | trailing spaces, blank-line runs, trim |
//! | `summarize` | subtitle + bullets from the LLM |
//! | `auto_tag` | keyword tags |

pub mod cleanup;
pub mod extraction;
pub mod noise;
pub mod summarization;
pub mod tagging;

use crate::api::Generate;
use crate::config::SiteConfig;
use crate::models::ArticleRecord;
use std::fmt;
use summarization::Summarizer;
use tagging::Tagger;
use tracing::{debug, instrument, warn};

/// A named processing step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Step {
    ExtractJinaMeta,
    RemoveNoise,
    ExtractBody,
    StripByline,
    StripLinks,
    StripImages,
    DecodeEntities,
    NormalizeWhitespace,
    Summarize,
    AutoTag,
}

/// A local body rewrite.
pub type Transform = fn(ArticleRecord, &SiteConfig) -> ArticleRecord;

impl Step {
    pub const ALL: [Step; 10] = [
        Step::ExtractJinaMeta,
        Step::RemoveNoise,
        Step::ExtractBody,
        Step::StripByline,
        Step::StripLinks,
        Step::StripImages,
        Step::DecodeEntities,
        Step::NormalizeWhitespace,
        Step::Summarize,
        Step::AutoTag,
    ];

    /// Steps a source gets when its document does not list any.
    pub const DEFAULT_PIPELINE: [Step; 8] = [
        Step::ExtractJinaMeta,
        Step::RemoveNoise,
        Step::ExtractBody,
        Step::StripByline,
        Step::StripLinks,
        Step::StripImages,
        Step::DecodeEntities,
        Step::NormalizeWhitespace,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Step::ExtractJinaMeta => "extract_jina_meta",
            Step::RemoveNoise => "remove_noise",
            Step::ExtractBody => "extract_body",
            Step::StripByline => "strip_byline",
            Step::StripLinks => "strip_links",
            Step::StripImages => "strip_images",
            Step::DecodeEntities => "decode_entities",
            Step::NormalizeWhitespace => "normalize_whitespace",
            Step::Summarize => "summarize",
            Step::AutoTag => "auto_tag",
        }
    }

    pub fn from_name(name: &str) -> Option<Step> {
        Step::ALL.into_iter().find(|s| s.name() == name.trim())
    }

    /// The body rewrite for local steps; `None` for steps that call out to
    /// the summarizer or tagger.
    pub fn transform(self) -> Option<Transform> {
        let f: Transform = match self {
            Step::ExtractJinaMeta => apply_jina_meta,
            Step::RemoveNoise => apply_remove_noise,
            Step::ExtractBody => apply_extract_body,
            Step::StripByline => apply_strip_byline,
            Step::StripLinks => apply_strip_links,
            Step::StripImages => apply_strip_images,
            Step::DecodeEntities => apply_decode_entities,
            Step::NormalizeWhitespace => apply_normalize_whitespace,
            Step::Summarize | Step::AutoTag => return None,
        };
        Some(f)
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

fn apply_jina_meta(mut record: ArticleRecord, _config: &SiteConfig) -> ArticleRecord {
    let Some(raw) = record.content.as_deref() else {
        return record;
    };
    let meta = extraction::extract_jina_meta(raw);
    record.jina_title = meta.title;
    record.jina_url = meta.url;
    record.content = Some(meta.body);
    record
}

fn apply_extract_body(record: ArticleRecord, config: &SiteConfig) -> ArticleRecord {
    if config.has_markers() {
        record.map_content(|body| {
            extraction::extract_body_by_markers(
                body,
                config.content_start_marker.as_ref(),
                config.content_end_marker.as_ref(),
            )
        })
    } else {
        record.map_content(|body| {
            extraction::extract_body_by_heuristic(body, extraction::MIN_PARAGRAPH_LEN)
        })
    }
}

fn apply_decode_entities(mut record: ArticleRecord, _config: &SiteConfig) -> ArticleRecord {
    record.title = cleanup::decode_entities(&record.title);
    record.map_content(cleanup::decode_entities)
}

fn apply_remove_noise(record: ArticleRecord, _config: &SiteConfig) -> ArticleRecord {
    record.map_content(noise::remove_noise)
}

fn apply_strip_byline(record: ArticleRecord, _config: &SiteConfig) -> ArticleRecord {
    record.map_content(cleanup::strip_byline)
}

fn apply_strip_links(record: ArticleRecord, _config: &SiteConfig) -> ArticleRecord {
    record.map_content(cleanup::strip_links)
}

fn apply_strip_images(record: ArticleRecord, _config: &SiteConfig) -> ArticleRecord {
    record.map_content(cleanup::strip_images)
}

fn apply_normalize_whitespace(record: ArticleRecord, _config: &SiteConfig) -> ArticleRecord {
    record.map_content(cleanup::normalize_whitespace)
}

/// An ordered step list built from names.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pipeline {
    steps: Vec<Step>,
}

impl Pipeline {
    pub fn new(steps: Vec<Step>) -> Self {
        Self { steps }
    }

    /// Resolve names, skipping unknown ones with a warning. Site documents are
    /// stricter: there an unknown name fails the load.
    pub fn from_names<S: AsRef<str>>(names: &[S]) -> Self {
        let steps = names
            .iter()
            .filter_map(|name| {
                let name = name.as_ref();
                let step = Step::from_name(name);
                if step.is_none() {
                    warn!(step = name, "Unknown processing step; skipping");
                }
                step
            })
            .collect();
        Self { steps }
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }
}

/// Runs steps against articles. Holds the services the LLM and tagging
/// steps need.
pub struct Processor<'a, B> {
    summarizer: Summarizer<'a, B>,
    tagger: &'a Tagger,
}

impl<'a, B: Generate> Processor<'a, B> {
    pub fn new(summarizer: Summarizer<'a, B>, tagger: &'a Tagger) -> Self {
        Self { summarizer, tagger }
    }

    pub fn summarizer(&self) -> &Summarizer<'a, B> {
        &self.summarizer
    }

    pub fn tagger(&self) -> &Tagger {
        self.tagger
    }

    async fn apply(&self, step: Step, record: ArticleRecord, config: &SiteConfig) -> ArticleRecord {
        if let Some(transform) = step.transform() {
            return transform(record, config);
        }
        match step {
            Step::Summarize => {
                let body = record.content.clone().unwrap_or_default();
                let summary = self.summarizer.summarize(&body, &record.url).await;
                record.with_summary(summary)
            }
            Step::AutoTag => {
                let tags = self.tagger.auto_tag(record.content.as_deref().unwrap_or_default());
                record.with_tags(tags)
            }
            _ => record,
        }
    }

    /// Apply `steps` to one article, strictly in order.
    #[instrument(level = "info", skip_all, fields(source = %config.name, url = %record.url))]
    pub async fn process_article(
        &self,
        mut record: ArticleRecord,
        config: &SiteConfig,
        steps: &[Step],
    ) -> ArticleRecord {
        for &step in steps {
            record = self.apply(step, record, config).await;
            debug!(
                %step,
                chars = record.content.as_deref().map_or(0, |c| c.chars().count()),
                "Applied step"
            );
        }
        record
    }
}
