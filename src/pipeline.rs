//! Run orchestration: fetch, process, store, report.
//!
//! [`Runner`] ties one run's services together. It is built once in `main`
//! and borrowed by every source run, so nothing here holds global state.

use crate::api::Generate;
use crate::chunking::CategorySummarizer;
use crate::config::{SiteConfig, SiteConfigFile};
use crate::cost::{CostReport, CostTracker};
use crate::error::Result;
use crate::fetch::{Transport, fetch_article_content, fetch_new_articles};
use crate::models::{ArticleRecord, CategorySummary, StoredArticle};
use crate::processing::summarization::SUMMARIZE_STEP;
use crate::processing::{Processor, Step};
use crate::storage::{Repository, SaveOutcome};
use chrono::{NaiveDate, Utc};
use serde::Serialize;
use std::borrow::Cow;
use std::time::Instant;
use tracing::{error, info, instrument, warn};

/// Cleanup applied to a body fetched again during backfill.
pub const REFETCH_STEPS: [Step; 7] = [
    Step::ExtractJinaMeta,
    Step::RemoveNoise,
    Step::ExtractBody,
    Step::StripLinks,
    Step::StripImages,
    Step::DecodeEntities,
    Step::NormalizeWhitespace,
];

/// Minimum tagged articles before a category digest is written.
pub const DEFAULT_MIN_ARTICLES: usize = 5;

/// Date window and page limit for a fetch run. Unset dates fall back to the
/// source's saved state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunWindow {
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
    pub max_pages: u32,
}

impl Default for RunWindow {
    fn default() -> Self {
        Self {
            from: None,
            to: None,
            max_pages: 5,
        }
    }
}

/// What one source run did.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SiteReport {
    pub source: String,
    pub fetched: usize,
    pub processed: usize,
    pub saved: usize,
    pub duplicates: usize,
    pub failed: usize,
    pub cost: CostReport,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SourceFailure {
    pub source: String,
    pub error: String,
}

/// Outcome of running every configured source.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RunSummary {
    pub reports: Vec<SiteReport>,
    pub failures: Vec<SourceFailure>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BackfillReport {
    pub summaries_missing: usize,
    pub summaries_fixed: usize,
    pub tags_missing: usize,
    pub tags_fixed: usize,
}

fn has_content(record: &ArticleRecord) -> bool {
    record.content.as_deref().is_some_and(|c| !c.is_empty())
}

/// The stored article's source config, or defaults built from what the
/// repository knows about the source.
fn config_for<'c>(stored: &StoredArticle, configs: &'c [SiteConfig]) -> Result<Cow<'c, SiteConfig>> {
    if let Some(config) = configs.iter().find(|c| c.name == stored.source_name) {
        return Ok(Cow::Borrowed(config));
    }
    let fallback = SiteConfigFile {
        name: stored.source_name.clone(),
        listing_url: stored.source_url.clone(),
        ..SiteConfigFile::default()
    };
    Ok(Cow::Owned(fallback.validate()?))
}

pub struct Runner<'a, B> {
    processor: Processor<'a, B>,
    repo: &'a dyn Repository,
    cost: &'a CostTracker,
}

impl<'a, B: Generate> Runner<'a, B> {
    pub fn new(processor: Processor<'a, B>, repo: &'a dyn Repository, cost: &'a CostTracker) -> Self {
        Self {
            processor,
            repo,
            cost,
        }
    }

    /// Fetch, process, and store one source.
    ///
    /// Articles with a body go through the source's pipeline; the rest are
    /// stored as discovered. A failed save is counted and logged but does not
    /// stop the run. Run state is written back once, at the end.
    ///
    /// # Errors
    ///
    /// Listing fetch failures and state persistence failures.
    #[instrument(level = "info", skip_all, fields(source = %config.name))]
    pub async fn run_site<T: Transport>(
        &self,
        transport: &T,
        config: &SiteConfig,
        window: &RunWindow,
        today: NaiveDate,
    ) -> Result<SiteReport> {
        let t0 = Instant::now();
        let mut state = self.repo.load_run_state(&config.name)?;
        self.cost.reset();
        info!("Run starting");

        let articles = fetch_new_articles(
            transport,
            config,
            &mut state,
            window.from,
            window.to,
            window.max_pages,
            today,
        )
        .await?;
        let fetched = articles.len();

        let (mut processed, mut saved, mut duplicates, mut failed) = (0, 0, 0, 0);
        for record in articles {
            let record = if has_content(&record) {
                processed += 1;
                self.processor
                    .process_article(record, config, &config.pipeline)
                    .await
            } else {
                record
            };
            match self
                .repo
                .save_article(&record, &config.name, &config.listing_url)
            {
                Ok(SaveOutcome::Inserted) => saved += 1,
                Ok(SaveOutcome::Duplicate) => duplicates += 1,
                Err(e) => {
                    error!(url = %record.url, error = %e, "Failed to save article");
                    failed += 1;
                }
            }
        }

        self.repo.save_run_state(&state)?;
        let cost = self.cost.daily_cost();
        info!(
            fetched,
            processed,
            saved,
            duplicates,
            failed,
            input_tokens = cost.input_tokens,
            output_tokens = cost.output_tokens,
            total_cost = cost.total_cost,
            elapsed_ms = t0.elapsed().as_millis(),
            "Run complete"
        );
        Ok(SiteReport {
            source: config.name.clone(),
            fetched,
            processed,
            saved,
            duplicates,
            failed,
            cost,
        })
    }

    /// Run every source in order. A failing source is logged and recorded in
    /// the summary; the others still run.
    #[instrument(level = "info", skip_all, fields(sources = configs.len()))]
    pub async fn run_all<T, F>(
        &self,
        configs: &[SiteConfig],
        make_transport: F,
        window: &RunWindow,
        today: NaiveDate,
    ) -> RunSummary
    where
        T: Transport,
        F: Fn(&SiteConfig) -> Result<T>,
    {
        let mut summary = RunSummary::default();
        for config in configs {
            let outcome = match make_transport(config) {
                Ok(transport) => self.run_site(&transport, config, window, today).await,
                Err(e) => Err(e),
            };
            match outcome {
                Ok(report) => summary.reports.push(report),
                Err(e) => {
                    error!(source = %config.name, error = %e, "Source run failed");
                    summary.failures.push(SourceFailure {
                        source: config.name.clone(),
                        error: e.to_string(),
                    });
                }
            }
        }
        info!(
            succeeded = summary.reports.len(),
            failed = summary.failures.len(),
            "All sources done"
        );
        summary
    }

    async fn backfill_summary<T: Transport>(
        &self,
        transport: &T,
        stored: StoredArticle,
        configs: &[SiteConfig],
    ) -> Result<bool> {
        let config = config_for(&stored, configs)?;
        let mut record = stored.article;

        if !has_content(&record) {
            info!(url = %record.url, "Missing content; refetching");
            record.content = None;
            let fetched = fetch_article_content(transport, record, &config).await;
            record = self
                .processor
                .process_article(fetched, &config, &REFETCH_STEPS)
                .await;
            if !has_content(&record) {
                warn!(url = %record.url, "Refetch failed; skipping");
                return Ok(false);
            }
            self.repo.update_article(&record)?;
        }

        let body = record.content.as_deref().unwrap_or_default();
        let summary = self.processor.summarizer().summarize(body, &record.url).await;
        if summary.is_empty() {
            warn!(url = %record.url, "Summary still failing");
            return Ok(false);
        }

        let record = record.with_summary(summary);
        self.repo.update_article(&record)?;
        let resolved = self.repo.resolve_failures(&record.url, SUMMARIZE_STEP)?;
        info!(url = %record.url, resolved, "Backfilled summary");
        Ok(true)
    }

    fn backfill_tags(&self, stored: StoredArticle) -> Result<bool> {
        let record = stored.article;
        if record.title.is_empty() && !has_content(&record) {
            warn!(url = %record.url, "Nothing to tag");
            return Ok(false);
        }
        let text = format!(
            "{} {}",
            record.title,
            record.content.as_deref().unwrap_or_default()
        );
        let tags = self.processor.tagger().auto_tag(&text);
        if tags.is_empty() {
            return Ok(false);
        }
        info!(url = %record.url, tags = tags.len(), "Backfilled tags");
        self.repo.update_article(&record.with_tags(tags))?;
        Ok(true)
    }

    /// Fill in missing summaries, then missing tags, for stored articles.
    ///
    /// Articles without a body are fetched again and cleaned with
    /// [`REFETCH_STEPS`]. A successful summary resolves the article's open
    /// `summarize` failures. Per-article fetch and summary failures are
    /// skipped; repository errors abort.
    #[instrument(level = "info", skip_all)]
    pub async fn backfill<T: Transport>(
        &self,
        transport: &T,
        configs: &[SiteConfig],
    ) -> Result<BackfillReport> {
        let mut report = BackfillReport::default();

        let missing = self.repo.articles_missing_summaries()?;
        report.summaries_missing = missing.len();
        info!(count = missing.len(), "Articles missing summaries");
        for stored in missing {
            if self.backfill_summary(transport, stored, configs).await? {
                report.summaries_fixed += 1;
            }
        }

        let missing = self.repo.articles_missing_tags()?;
        report.tags_missing = missing.len();
        info!(count = missing.len(), "Articles missing tags");
        for stored in missing {
            if self.backfill_tags(stored)? {
                report.tags_fixed += 1;
            }
        }

        info!(
            summaries_fixed = report.summaries_fixed,
            tags_fixed = report.tags_fixed,
            "Backfill complete"
        );
        Ok(report)
    }
}

/// Result of one category digest request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CategoryOutcome {
    Saved(CategorySummary),
    AlreadyExists,
    TooFewArticles(usize),
}

/// Write the digest for `tag` over `[from, to]` unless one exists or too
/// few articles carry the tag.
#[instrument(level = "info", skip_all, fields(tag = %tag, %from, %to))]
pub async fn summarize_category<B: Generate>(
    engine: &CategorySummarizer<'_, B>,
    repo: &dyn Repository,
    tag: &str,
    from: NaiveDate,
    to: NaiveDate,
    min_articles: usize,
) -> Result<CategoryOutcome> {
    if repo.category_summary_exists(tag, from, to)? {
        info!("Category summary already exists");
        return Ok(CategoryOutcome::AlreadyExists);
    }
    let articles: Vec<ArticleRecord> = repo
        .articles_for_tag(tag, from, to)?
        .into_iter()
        .map(|stored| stored.article)
        .collect();
    if articles.len() < min_articles {
        info!(count = articles.len(), min_articles, "Too few articles; skipping");
        return Ok(CategoryOutcome::TooFewArticles(articles.len()));
    }

    let summary = engine.generate_summary(tag, &articles, from, to).await?;
    let record = CategorySummary {
        tag: tag.to_string(),
        date_from: from,
        date_to: to,
        summary,
        article_count: articles.len(),
        created_at: Utc::now(),
    };
    repo.save_category_summary(&record)?;
    info!(articles = record.article_count, "Saved category summary");
    Ok(CategoryOutcome::Saved(record))
}
