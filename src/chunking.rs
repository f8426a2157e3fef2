//! Map-reduce summaries over many articles.
//!
//! A category digest covers every article carrying one tag over a date
//! window, which can be far more text than one prompt holds. Articles are
//! rendered to one line each and packed greedily into chunks that fit the
//! model's budget:
//!
//! ```text
//! budget = floor(0.7 * token_limit) - tokens(prompt with no articles)
//! ```
//!
//! One chunk is summarized directly. Several chunks are summarized one by
//! one (map) and the partial summaries are merged by a second prompt
//! (reduce). Token estimates use `max(1, chars / 4)` throughout.

use crate::api::{Generate, Generation};
use crate::config::model_spec;
use crate::cost::CostTracker;
use crate::error::{NewsfeedError, Result};
use crate::models::{ArticleRecord, Usage};
use chrono::NaiveDate;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, info, instrument};

/// Model used for category digests unless overridden.
pub const DEFAULT_CATEGORY_MODEL: &str = "gemini-2.5-flash";

/// Longest content excerpt per article line, in characters.
pub const EXCERPT_CHARS: usize = 500;

/// Pause between consecutive backend calls in one map-reduce run.
pub const CHUNK_PAUSE: Duration = Duration::from_secs(4);

const LINE_SEPARATOR: &str = "\n\n";

/// Rough token count for budgeting.
pub fn estimate_tokens(text: &str) -> usize {
    (text.chars().count() / 4).max(1)
}

fn category_prompt(label: &str, count: usize, from: NaiveDate, to: NaiveDate, articles: &str) -> String {
    format!(
        "You are a market intelligence analyst for a data center company.\n\
         Summarize the following {count} articles about \"{label}\" from {from} to {to}.\n\
         \n\
         Write a brief (3-5 sentences) covering:\n\
         - Key themes and trends\n\
         - Most significant developments\n\
         - Any competitive implications for Equinix\n\
         \n\
         Articles:\n\
         {articles}\n"
    )
}

fn combine_prompt(label: &str, count: usize, from: NaiveDate, to: NaiveDate, partials: &str) -> String {
    format!(
        "You are a market intelligence analyst for a data center company.\n\
         Below are partial summaries, each covering part of {count} articles about \"{label}\" \
         from {from} to {to}.\n\
         \n\
         Merge them into one brief (3-5 sentences) covering:\n\
         - Key themes and trends\n\
         - Most significant developments\n\
         - Any competitive implications for Equinix\n\
         \n\
         Do not mention that the input was split.\n\
         \n\
         Partial summaries:\n\
         {partials}\n"
    )
}

/// Tokens left for article lines once the fixed prompt text is paid for.
pub fn content_budget(token_limit: usize, label: &str, from: NaiveDate, to: NaiveDate) -> usize {
    let overhead = estimate_tokens(&category_prompt(label, 0, from, to, ""));
    (token_limit * 7 / 10).saturating_sub(overhead)
}

/// At most `limit` characters of `text`, preferring to end on a sentence.
///
/// A cut lands after the last `.`, `!` or `?` found past a third of the
/// limit; failing that, before the last space; failing that, at the limit.
pub fn smart_excerpt(text: &str, limit: usize) -> String {
    let text = text.trim();
    let Some((cut, _)) = text.char_indices().nth(limit) else {
        return text.to_string();
    };
    let head = &text[..cut];
    let floor = head.char_indices().nth(limit / 3).map_or(0, |(i, _)| i);

    if let Some(end) = head.rfind(['.', '!', '?']).filter(|&i| i > floor) {
        return head[..=end].to_string();
    }
    match head.rfind(' ') {
        Some(space) if space > 0 => head[..space].trim_end().to_string(),
        _ => head.to_string(),
    }
}

/// `- {title} ({date}): {excerpt}`
pub fn format_article_line(article: &ArticleRecord) -> String {
    let date = article
        .date
        .map(|d| d.to_string())
        .or_else(|| article.date_raw.clone())
        .unwrap_or_default();
    let excerpt = smart_excerpt(article.content.as_deref().unwrap_or_default(), EXCERPT_CHARS);
    format!("- {} ({date}): {excerpt}", article.title)
}

/// Greedily group lines so each group's joined text fits `budget`.
///
/// A line that alone exceeds the budget still gets a group of its own.
pub fn pack_chunks(lines: Vec<String>, budget: usize) -> Vec<Vec<String>> {
    let mut chunks = Vec::new();
    let mut current: Vec<String> = Vec::new();
    let mut current_chars = 0usize;

    for line in lines {
        let line_chars = line.chars().count();
        let joined_chars = if current.is_empty() {
            line_chars
        } else {
            current_chars + LINE_SEPARATOR.len() + line_chars
        };
        if !current.is_empty() && (joined_chars / 4).max(1) > budget {
            chunks.push(std::mem::take(&mut current));
            current_chars = line_chars;
        } else {
            current_chars = joined_chars;
        }
        current.push(line);
    }
    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}

/// Chunked digest engine over one backend.
pub struct CategorySummarizer<'a, B> {
    backend: &'a B,
    cost: &'a CostTracker,
    model: String,
    token_limit: usize,
    pause: Duration,
}

impl<'a, B: Generate> CategorySummarizer<'a, B> {
    pub fn new(backend: &'a B, cost: &'a CostTracker) -> Self {
        Self {
            backend,
            cost,
            model: DEFAULT_CATEGORY_MODEL.to_string(),
            token_limit: model_spec(DEFAULT_CATEGORY_MODEL).token_limit,
            pause: CHUNK_PAUSE,
        }
    }

    /// Switch model; the token limit follows the model catalogue.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self.token_limit = model_spec(&self.model).token_limit;
        self
    }

    pub fn with_token_limit(mut self, token_limit: usize) -> Self {
        self.token_limit = token_limit;
        self
    }

    pub fn with_pause(mut self, pause: Duration) -> Self {
        self.pause = pause;
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    async fn call(&self, prompt: &str, usage: &mut Usage) -> Result<String> {
        let Generation { text, usage: used } = self.backend.generate(&self.model, prompt, None).await?;
        *usage += used;
        Ok(text.trim().to_string())
    }

    /// One digest for `articles`, labelled `label`, covering `[from, to]`.
    ///
    /// Usage from every call is reported to the cost tracker once, after the
    /// final call succeeds.
    ///
    /// # Errors
    ///
    /// [`NewsfeedError::EmptyBatch`] for no articles; otherwise the first
    /// backend error.
    #[instrument(level = "info", skip_all, fields(label = %label, model = %self.model, articles = articles.len()))]
    pub async fn generate_summary(
        &self,
        label: &str,
        articles: &[ArticleRecord],
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<String> {
        if articles.is_empty() {
            return Err(NewsfeedError::EmptyBatch);
        }
        let budget = content_budget(self.token_limit, label, from, to);
        let lines = articles.iter().map(format_article_line).collect();
        let chunks = pack_chunks(lines, budget);
        info!(budget, chunks = chunks.len(), "Packed articles");

        let mut usage = Usage::default();
        let mut partials = Vec::with_capacity(chunks.len());
        for (i, chunk) in chunks.iter().enumerate() {
            if i > 0 && !self.pause.is_zero() {
                sleep(self.pause).await;
            }
            let prompt = category_prompt(label, chunk.len(), from, to, &chunk.join(LINE_SEPARATOR));
            partials.push(self.call(&prompt, &mut usage).await?);
            debug!(chunk = i + 1, lines = chunk.len(), "Summarized chunk");
        }

        let summary = if partials.len() == 1 {
            partials.remove(0)
        } else {
            if !self.pause.is_zero() {
                sleep(self.pause).await;
            }
            let prompt = combine_prompt(label, articles.len(), from, to, &partials.join(LINE_SEPARATOR));
            self.call(&prompt, &mut usage).await?
        };

        self.cost
            .track_usage(usage.input_tokens, usage.output_tokens, &self.model);
        info!(
            input_tokens = usage.input_tokens,
            output_tokens = usage.output_tokens,
            "Category summary generated"
        );
        Ok(summary)
    }
}
