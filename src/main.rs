//! # newsfeed
//!
//! Pulls news listings through a markdown fetch proxy, cleans each article
//! body, summarizes and tags it with an LLM, and stores the result.
//!
//! ## Usage
//!
//! ```sh
//! newsfeed run --site dcd
//! newsfeed backfill
//! newsfeed summarize --tag Expansion --from 2026-02-01 --to 2026-02-07
//! ```
//!
//! ## Architecture
//!
//! 1. **Discovery**: page through each source's listing and keep articles in
//!    the date window
//! 2. **Fetching**: download article bodies through the proxy
//! 3. **Processing**: run each source's step pipeline (cleanup, summary, tags)
//! 4. **Storage**: save articles and advance the source watermark

use clap::Parser;
use newsfeed::api::GeminiClient;
use newsfeed::chunking::CategorySummarizer;
use newsfeed::cli::{Cli, Command};
use newsfeed::config::{SiteConfigFile, TAGS_FILE, load_all_site_configs, load_site_config};
use newsfeed::cost::CostTracker;
use newsfeed::fetch::JinaClient;
use newsfeed::pipeline::{CategoryOutcome, RunWindow, Runner, summarize_category};
use newsfeed::processing::summarization::{SummarizeOptions, Summarizer};
use newsfeed::processing::tagging::Tagger;
use newsfeed::processing::{Pipeline, Processor};
use newsfeed::storage::JsonStore;
use newsfeed::utils::{ensure_writable_dir, today};
use std::error::Error;
use std::path::Path;
use tracing::{debug, error, info, warn};
use tracing_subscriber::{EnvFilter, fmt as tfmt};

fn load_tagger(sites_dir: &Path) -> Result<Tagger, Box<dyn Error>> {
    let path = sites_dir.join(TAGS_FILE);
    if !path.exists() {
        warn!(path = %path.display(), "No tag keyword file; articles will not be tagged");
        return Ok(Tagger::default());
    }
    Ok(Tagger::load(&path)?)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    // --- Tracing init ---
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tfmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_file(false)
        .with_line_number(false)
        .with_timer(tracing_subscriber::fmt::time::UtcTime::rfc_3339())
        .init();

    let start_time = std::time::Instant::now();
    info!("newsfeed starting up");

    let Cli {
        sites_dir,
        data_dir,
        google_api_key,
        jina_api_key,
        command,
    } = Cli::parse();
    debug!(sites_dir = %sites_dir.display(), data_dir = %data_dir.display(), ?command, "Parsed CLI arguments");

    if let Err(e) = ensure_writable_dir(&data_dir) {
        error!(
            path = %data_dir.display(),
            error = %e,
            "Data directory is not writable (fix perms or choose a different path)"
        );
        return Err(e.into());
    }

    let store = JsonStore::open(&data_dir)?;
    let cost = CostTracker::new();
    let backend = GeminiClient::new(google_api_key)?;
    let tagger = load_tagger(&sites_dir)?;

    match command {
        Command::Run {
            site,
            from,
            to,
            max_pages,
            no_verify_ssl,
            steps,
            model,
        } => {
            let mut configs = match site.as_deref() {
                Some(key) => vec![load_site_config(&sites_dir, key)?],
                None => load_all_site_configs(&sites_dir)?,
            };
            if !steps.is_empty() {
                let pipeline = Pipeline::from_names(&steps);
                info!(steps = ?pipeline.steps(), "Overriding source pipelines");
                for config in &mut configs {
                    config.pipeline = pipeline.steps().to_vec();
                }
            }
            if no_verify_ssl {
                for config in &mut configs {
                    config.verify_ssl = false;
                }
            }

            let options = SummarizeOptions {
                model,
                ..SummarizeOptions::default()
            };
            let summarizer = Summarizer::new(&backend, &cost, &store).with_options(options);
            let runner = Runner::new(Processor::new(summarizer, &tagger), &store, &cost);
            let window = RunWindow {
                from,
                to,
                max_pages,
            };

            let summary = runner
                .run_all(
                    &configs,
                    |config| JinaClient::new(config, jina_api_key.clone()),
                    &window,
                    today(),
                )
                .await;

            for report in &summary.reports {
                info!(
                    source = %report.source,
                    fetched = report.fetched,
                    saved = report.saved,
                    duplicates = report.duplicates,
                    failed = report.failed,
                    total_cost = report.cost.total_cost,
                    "Source summary"
                );
            }
            if !summary.failures.is_empty() {
                for failure in &summary.failures {
                    error!(source = %failure.source, error = %failure.error, "Source failed");
                }
                return Err(format!("{} source(s) failed", summary.failures.len()).into());
            }
        }

        Command::Backfill { model } => {
            let configs = load_all_site_configs(&sites_dir)?;
            let proxy_config = SiteConfigFile {
                name: "backfill".to_string(),
                ..SiteConfigFile::default()
            }
            .validate()?;
            let transport = JinaClient::new(&proxy_config, jina_api_key)?;

            let options = SummarizeOptions {
                model,
                ..SummarizeOptions::default()
            };
            let summarizer = Summarizer::new(&backend, &cost, &store).with_options(options);
            let runner = Runner::new(Processor::new(summarizer, &tagger), &store, &cost);

            let report = runner.backfill(&transport, &configs).await?;
            let spend = cost.daily_cost();
            info!(
                summaries_fixed = report.summaries_fixed,
                summaries_missing = report.summaries_missing,
                tags_fixed = report.tags_fixed,
                tags_missing = report.tags_missing,
                total_cost = spend.total_cost,
                "Backfill summary"
            );
        }

        Command::Summarize {
            tag,
            from,
            to,
            model,
            min_articles,
        } => {
            let to = to.unwrap_or_else(today);
            let from = from.unwrap_or(to);
            if from > to {
                return Err(format!("--from {from} is after --to {to}").into());
            }
            let tags: Vec<String> = if tag.is_empty() {
                tagger.tag_names().map(str::to_string).collect()
            } else {
                tag
            };
            if tags.is_empty() {
                warn!("No tags to summarize");
            }

            let engine = CategorySummarizer::new(&backend, &cost).with_model(model);
            let mut failed = 0usize;
            for tag in &tags {
                match summarize_category(&engine, &store, tag, from, to, min_articles).await {
                    Ok(CategoryOutcome::Saved(saved)) => {
                        info!(tag = %tag, articles = saved.article_count, "Category summary written");
                    }
                    Ok(outcome) => debug!(tag = %tag, ?outcome, "No category summary written"),
                    Err(e) => {
                        error!(tag = %tag, error = %e, "Category summary failed");
                        failed += 1;
                    }
                }
            }
            let spend = cost.daily_cost();
            info!(
                tags = tags.len(),
                failed,
                input_tokens = spend.input_tokens,
                output_tokens = spend.output_tokens,
                total_cost = spend.total_cost,
                "Category summaries done"
            );
            if failed > 0 {
                return Err(format!("{failed} category summaries failed").into());
            }
        }
    }

    let elapsed = start_time.elapsed();
    info!(
        elapsed_secs = elapsed.as_secs(),
        elapsed_ms = elapsed.as_millis(),
        "newsfeed finished"
    );
    Ok(())
}
