//! Site configuration and the model catalogue.
//!
//! Each source is described by one JSON document in the sites directory
//! (`sites/<key>.json`). The document is deserialized into a
//! [`SiteConfigFile`] and then validated into an immutable [`SiteConfig`]:
//! regexes are compiled in multi-line mode and pipeline step names become
//! [`Step`] values, so a broken pattern or a misspelled step fails at load
//! time instead of in the middle of a run.
//!
//! `tags.json` lives in the same directory but is the keyword-tag document,
//! not a source (see [`crate::processing::tagging`]).

use crate::error::{NewsfeedError, Result};
use crate::processing::Step;
use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info, instrument};

/// Model used when the caller does not pick one.
pub const DEFAULT_MODEL: &str = "gemma-3-27b-it";

/// File in the sites directory holding the keyword-tag dictionary.
pub const TAGS_FILE: &str = "tags.json";

/// What the generative backend can do for a given model.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModelSpec {
    pub name: &'static str,
    /// Context window in tokens.
    pub token_limit: usize,
    /// Whether the model honours a JSON response schema.
    pub json_mode: bool,
}

const MODELS: &[ModelSpec] = &[
    ModelSpec { name: "gemini-2.5-flash", token_limit: 1_048_576, json_mode: true },
    ModelSpec { name: "gemini-2.5-pro", token_limit: 1_048_576, json_mode: false },
    ModelSpec { name: "gemini-2.0-flash", token_limit: 1_048_576, json_mode: true },
    ModelSpec { name: "gemini-1.5-flash", token_limit: 1_048_576, json_mode: true },
    ModelSpec { name: "gemini-1.5-pro", token_limit: 2_097_152, json_mode: true },
    ModelSpec { name: "gemma-3-27b-it", token_limit: 131_072, json_mode: false },
];

/// Token limit assumed for models missing from the catalogue.
pub const FALLBACK_TOKEN_LIMIT: usize = 32_768;

/// Look up a model, falling back to a conservative unknown-model entry.
pub fn model_spec(name: &str) -> ModelSpec {
    MODELS
        .iter()
        .copied()
        .find(|m| m.name == name)
        .unwrap_or(ModelSpec {
            name: "unknown",
            token_limit: FALLBACK_TOKEN_LIMIT,
            json_mode: false,
        })
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceType {
    #[default]
    News,
    FacilityListing,
}

fn default_poll_frequency() -> u32 {
    1
}
fn default_request_delay() -> f64 {
    1.0
}
fn default_max_retries() -> u32 {
    3
}
fn default_true() -> bool {
    true
}
fn default_date_format() -> String {
    "%d %b %Y".to_string()
}
fn default_pipeline() -> Vec<String> {
    Step::DEFAULT_PIPELINE
        .iter()
        .map(|s| s.name().to_string())
        .collect()
}

/// A site document exactly as written on disk.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SiteConfigFile {
    pub name: String,
    pub listing_url: String,
    /// Appended to `listing_url` for pages 2+, `{n}` is the page number.
    #[serde(alias = "pagination")]
    pub pagination_template: String,
    #[serde(default)]
    pub source_type: SourceType,
    #[serde(default = "default_poll_frequency", alias = "poll_frequency_days")]
    pub poll_frequency: u32,
    /// Seconds to wait before every proxy request.
    #[serde(default = "default_request_delay")]
    pub request_delay: f64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_true")]
    pub eager_fetch: bool,
    #[serde(default = "default_true")]
    pub verify_ssl: bool,
    #[serde(default)]
    pub listing_pattern: String,
    #[serde(default)]
    pub listing_fields: Vec<String>,
    /// `strftime`-style format for the `date_raw` listing field.
    #[serde(default = "default_date_format")]
    pub date_format: String,
    #[serde(default, alias = "content_start")]
    pub content_start_marker: Option<String>,
    #[serde(default, alias = "content_end")]
    pub content_end_marker: Option<String>,
    #[serde(default = "default_pipeline")]
    pub pipeline: Vec<String>,
}

impl Default for SiteConfigFile {
    fn default() -> Self {
        Self {
            name: String::new(),
            listing_url: String::new(),
            pagination_template: "?page={n}".to_string(),
            source_type: SourceType::default(),
            poll_frequency: default_poll_frequency(),
            request_delay: default_request_delay(),
            max_retries: default_max_retries(),
            eager_fetch: true,
            verify_ssl: true,
            listing_pattern: String::new(),
            listing_fields: Vec::new(),
            date_format: default_date_format(),
            content_start_marker: None,
            content_end_marker: None,
            pipeline: default_pipeline(),
        }
    }
}

/// Validated, immutable per-source configuration.
#[derive(Debug, Clone)]
pub struct SiteConfig {
    pub name: String,
    pub listing_url: String,
    pub pagination_template: String,
    pub source_type: SourceType,
    pub poll_frequency: u32,
    pub request_delay: Duration,
    pub max_retries: u32,
    pub eager_fetch: bool,
    pub verify_ssl: bool,
    /// `None` when the document leaves the pattern empty.
    pub listing_pattern: Option<Regex>,
    pub listing_fields: Vec<String>,
    pub date_format: String,
    pub content_start_marker: Option<Regex>,
    pub content_end_marker: Option<Regex>,
    pub pipeline: Vec<Step>,
}

fn compile(site: &str, field: &'static str, pattern: &str) -> Result<Regex> {
    RegexBuilder::new(pattern)
        .multi_line(true)
        .build()
        .map_err(|e| NewsfeedError::InvalidPattern {
            site: site.to_string(),
            field,
            message: e.to_string(),
        })
}

fn compile_optional(site: &str, field: &'static str, pattern: Option<&str>) -> Result<Option<Regex>> {
    match pattern.map(str::trim) {
        None | Some("") => Ok(None),
        Some(p) => compile(site, field, p).map(Some),
    }
}

impl SiteConfigFile {
    /// Compile patterns and resolve step names.
    ///
    /// # Errors
    ///
    /// Fails on an invalid regex, an unknown step name, or a negative or
    /// non-finite `request_delay`.
    pub fn validate(self) -> Result<SiteConfig> {
        let site = self.name.as_str();

        if !self.request_delay.is_finite() || self.request_delay < 0.0 {
            return Err(NewsfeedError::Config(format!(
                "request_delay for {site} must be a non-negative number of seconds"
            )));
        }

        let listing_pattern = compile_optional(site, "listing_pattern", Some(&self.listing_pattern))?;
        let content_start_marker =
            compile_optional(site, "content_start_marker", self.content_start_marker.as_deref())?;
        let content_end_marker =
            compile_optional(site, "content_end_marker", self.content_end_marker.as_deref())?;

        let pipeline = self
            .pipeline
            .iter()
            .map(|name| {
                Step::from_name(name).ok_or_else(|| NewsfeedError::UnknownStep {
                    site: site.to_string(),
                    step: name.clone(),
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(SiteConfig {
            request_delay: Duration::from_secs_f64(self.request_delay),
            listing_pattern,
            content_start_marker,
            content_end_marker,
            pipeline,
            name: self.name,
            listing_url: self.listing_url,
            pagination_template: self.pagination_template,
            source_type: self.source_type,
            poll_frequency: self.poll_frequency,
            max_retries: self.max_retries,
            eager_fetch: self.eager_fetch,
            verify_ssl: self.verify_ssl,
            listing_fields: self.listing_fields,
            date_format: self.date_format,
        })
    }
}

impl SiteConfig {
    /// Parse and validate a site document from a JSON string.
    pub fn from_json(json: &str) -> Result<Self> {
        let raw: SiteConfigFile = serde_json::from_str(json)?;
        raw.validate()
    }

    /// True when explicit body markers are configured.
    pub fn has_markers(&self) -> bool {
        self.content_start_marker.is_some() || self.content_end_marker.is_some()
    }
}

/// Load one source by key from the sites directory.
#[instrument(level = "info", skip(sites_dir), fields(sites_dir = %sites_dir.display()))]
pub fn load_site_config(sites_dir: &Path, site_key: &str) -> Result<SiteConfig> {
    let path = sites_dir.join(format!("{site_key}.json"));
    let json = fs::read_to_string(&path)?;
    let config = SiteConfig::from_json(&json)?;
    debug!(site = %config.name, steps = config.pipeline.len(), "Loaded site config");
    Ok(config)
}

/// Load every source in the sites directory, sorted by file name.
///
/// `tags.json` is skipped. Any malformed document fails the whole load so
/// configuration mistakes surface before the first request is made.
#[instrument(level = "info", skip_all, fields(sites_dir = %sites_dir.display()))]
pub fn load_all_site_configs(sites_dir: &Path) -> Result<Vec<SiteConfig>> {
    let mut paths = fs::read_dir(sites_dir)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| p.extension().and_then(|s| s.to_str()) == Some("json"))
        .filter(|p| p.file_name().and_then(|s| s.to_str()) != Some(TAGS_FILE))
        .collect::<Vec<_>>();
    paths.sort();

    let mut configs = Vec::with_capacity(paths.len());
    for path in paths {
        let json = fs::read_to_string(&path)?;
        let config = SiteConfig::from_json(&json).map_err(|e| {
            NewsfeedError::Config(format!("{}: {e}", path.display()))
        })?;
        configs.push(config);
    }
    info!(count = configs.len(), "Loaded site configs");
    Ok(configs)
}
