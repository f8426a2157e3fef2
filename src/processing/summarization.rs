//! Per-article LLM summaries with retry and failure bookkeeping.
//!
//! [`Summarizer::summarize`] never returns an error. Each attempt yields an
//! [`Attempt`]; the loop backs off on retryable outcomes and, once it gives
//! up, writes one [`FailureRecord`](crate::models::FailureRecord) for the
//! `(url, "summarize")` pair and returns [`SummaryResult::empty`].

use crate::api::Generate;
use crate::config::{DEFAULT_MODEL, model_spec};
use crate::cost::CostTracker;
use crate::error::{NewsfeedError, Result};
use crate::models::SummaryResult;
use crate::storage::Repository;
use crate::utils::{looks_truncated, truncate_for_log};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use serde_json::{Value, json};
use std::time::Duration;
use tokio::time::sleep;
use tracing::{error, info, instrument, warn};

/// Step name used in failure records.
pub const SUMMARIZE_STEP: &str = "summarize";

pub const SUMMARY_PROMPT: &str = r#"You are a market intelligence analyst for a data center company.
Summarize this article for a sales team.

Return JSON with exactly this structure:
{
    "subtitle": "One sentence: what happened and why it matters",
    "bullets": ["key fact 1", "key fact 2", "key fact 3"]
}

Rules:
- subtitle: max 15 words, headline style, no filler words
- bullets: 3-5 items, each a key fact (who, what, where, how much, when)
- Focus on competitive intelligence: new builds, expansions, partnerships, financials
- No fluff, no opinions

Article:
"#;

static SUMMARY_SCHEMA: Lazy<Value> = Lazy::new(|| {
    json!({
        "type": "OBJECT",
        "properties": {
            "subtitle": {
                "type": "STRING",
                "description": "One sentence: what happened and why it matters"
            },
            "bullets": {
                "type": "ARRAY",
                "items": {"type": "STRING"},
                "minItems": 3,
                "maxItems": 5,
                "description": "Key facts: who, what, where, how much, when"
            }
        },
        "required": ["subtitle", "bullets"]
    })
});

/// Response schema sent in structured-output mode.
pub fn summary_schema() -> &'static Value {
    &SUMMARY_SCHEMA
}

static FENCE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"```(?:json)?\s*").unwrap());
static OBJECT_SPAN_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)\{.*\}").unwrap());

/// Recover a JSON value from model output.
///
/// Code fences are removed first. If the remainder does not parse, the span
/// from the first `{` to the last `}` is tried.
pub fn extract_json(text: &str) -> Result<Value> {
    let cleaned = FENCE_RE.replace_all(text, "");
    let cleaned = cleaned.trim();
    match serde_json::from_str::<Value>(cleaned) {
        Ok(value) => return Ok(value),
        Err(e) if looks_truncated(&e) => {
            warn!(response = %truncate_for_log(text, 200), "Model output looks truncated");
        }
        Err(_) => {}
    }
    if let Some(span) = OBJECT_SPAN_RE.find(cleaned) {
        if let Ok(value) = serde_json::from_str::<Value>(span.as_str()) {
            return Ok(value);
        }
    }
    Err(NewsfeedError::MalformedSummary(format!(
        "could not extract JSON from response: {}",
        truncate_for_log(text, 200)
    )))
}

#[derive(Deserialize)]
struct RawSummary {
    subtitle: String,
    bullets: Vec<String>,
}

/// Check a parsed response and turn it into a sanitized [`SummaryResult`].
///
/// Needs a non-empty `subtitle` and at least one non-blank bullet.
pub fn validate_summary(value: Value) -> Result<SummaryResult> {
    let keys: Vec<String> = value
        .as_object()
        .map(|o| o.keys().cloned().collect())
        .unwrap_or_default();
    let raw: RawSummary = serde_json::from_value(value).map_err(|e| {
        NewsfeedError::MalformedSummary(format!("unexpected shape {keys:?}: {e}"))
    })?;
    let summary = SummaryResult {
        subtitle: raw.subtitle,
        bullets: raw.bullets,
    }
    .sanitized();
    if summary.subtitle.is_empty() {
        return Err(NewsfeedError::MalformedSummary("empty subtitle".into()));
    }
    if summary.bullets.is_empty() {
        return Err(NewsfeedError::MalformedSummary("no bullets".into()));
    }
    Ok(summary)
}

#[derive(Debug, Clone, PartialEq)]
pub struct SummarizeOptions {
    pub model: String,
    pub max_retries: u32,
    /// Base of the backoff: attempt `n` failing waits `retry_delay * 2^n`.
    pub retry_delay: Duration,
}

impl Default for SummarizeOptions {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.to_string(),
            max_retries: 3,
            retry_delay: Duration::from_secs(2),
        }
    }
}

/// Outcome of a single backend call.
#[derive(Debug)]
pub enum Attempt {
    Success(SummaryResult),
    Retryable(NewsfeedError),
    Terminal(NewsfeedError),
}

impl Attempt {
    fn from_error(e: NewsfeedError) -> Self {
        if e.is_retryable() {
            Attempt::Retryable(e)
        } else {
            Attempt::Terminal(e)
        }
    }
}

/// Summarization engine. Borrows the run's backend, cost tracker, and
/// repository.
pub struct Summarizer<'a, B> {
    backend: &'a B,
    cost: &'a CostTracker,
    repo: &'a dyn Repository,
    options: SummarizeOptions,
}

impl<'a, B: Generate> Summarizer<'a, B> {
    pub fn new(backend: &'a B, cost: &'a CostTracker, repo: &'a dyn Repository) -> Self {
        Self {
            backend,
            cost,
            repo,
            options: SummarizeOptions::default(),
        }
    }

    pub fn with_options(mut self, options: SummarizeOptions) -> Self {
        self.options = options;
        self
    }

    pub fn options(&self) -> &SummarizeOptions {
        &self.options
    }

    async fn attempt(&self, text: &str) -> Attempt {
        let model = self.options.model.as_str();
        let schema = model_spec(model).json_mode.then(summary_schema);
        let prompt = format!("{SUMMARY_PROMPT}{text}");

        let generation = match self.backend.generate(model, &prompt, schema).await {
            Ok(g) => g,
            Err(e) => return Attempt::from_error(e),
        };
        self.cost
            .track_usage(generation.usage.input_tokens, generation.usage.output_tokens, model);
        info!(
            input_tokens = generation.usage.input_tokens,
            output_tokens = generation.usage.output_tokens,
            "Summarized"
        );

        match extract_json(&generation.text).and_then(validate_summary) {
            Ok(summary) => Attempt::Success(summary),
            Err(e) => Attempt::from_error(e),
        }
    }

    fn give_up(&self, url: &str, error: &NewsfeedError, attempts: u32) -> SummaryResult {
        error!(url, attempts, error = %error, "Summarization failed");
        if let Err(e) = self
            .repo
            .record_failure(url, SUMMARIZE_STEP, &error.to_string(), attempts)
        {
            error!(url, error = %e, "Failed to record summarization failure");
        }
        SummaryResult::empty()
    }

    /// Subtitle and bullets for `text`, or the empty sentinel.
    #[instrument(level = "info", skip_all, fields(url = %url, model = %self.options.model))]
    pub async fn summarize(&self, text: &str, url: &str) -> SummaryResult {
        let max = self.options.max_retries.max(1);
        for attempt in 1..=max {
            match self.attempt(text).await {
                Attempt::Success(summary) => return summary,
                Attempt::Terminal(e) => return self.give_up(url, &e, attempt),
                Attempt::Retryable(e) if attempt == max => return self.give_up(url, &e, max),
                Attempt::Retryable(e) => {
                    let delay = self.options.retry_delay.saturating_mul(2u32.saturating_pow(attempt));
                    warn!(attempt, max, ?delay, error = %e, "Summarize attempt failed; backing off");
                    sleep(delay).await;
                }
            }
        }
        SummaryResult::empty()
    }
}
