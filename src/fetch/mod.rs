//! Listing discovery and article body fetching.
//!
//! A fetch run for one source has three phases:
//!
//! 1. **Pagination**: listing pages are fetched in order and parsed until a
//!    page comes back empty, `max_pages` is reached, or a record older than
//!    the window is seen.
//! 2. **Filtering**: records are kept when their date falls within
//!    `[from, to]`. Undated records are skipped.
//! 3. **Enrichment**: with `eager_fetch`, each kept record's body is fetched
//!    in order. A failed body fetch leaves `content` empty and moves on.
//!
//! Every network call is preceded by the source's `request_delay`.

pub mod client;
pub mod parser;

use crate::config::SiteConfig;
use crate::error::Result;
use crate::models::{ArticleRecord, SourceRunState};
use chrono::{Days, NaiveDate, Utc};
use futures::stream::{self, StreamExt};
use std::time::Duration;
use tokio::time::sleep;
use tracing::{info, instrument, warn};

pub use client::{JinaClient, Transport, build_listing_url};
pub use parser::parse_listing;

/// How far back a source with no saved state starts.
pub const DEFAULT_LOOKBACK_DAYS: u64 = 7;

/// Fetch window: explicit argument, else saved state, else a week ago.
pub fn resolve_dates(
    state: &SourceRunState,
    from: Option<NaiveDate>,
    to: Option<NaiveDate>,
    today: NaiveDate,
) -> (NaiveDate, NaiveDate) {
    let from = from.or(state.last_article_date).unwrap_or_else(|| {
        today
            .checked_sub_days(Days::new(DEFAULT_LOOKBACK_DAYS))
            .unwrap_or(today)
    });
    (from, to.unwrap_or(today))
}

/// Keep records dated within `[from, to]`.
///
/// Scanning stops at the first record dated before `from`; the flag in the
/// result reports whether that happened.
pub fn filter_by_date(
    records: Vec<ArticleRecord>,
    from: NaiveDate,
    to: NaiveDate,
) -> (Vec<ArticleRecord>, bool) {
    let mut kept = Vec::new();
    for record in records {
        let Some(date) = record.date else { continue };
        if date < from {
            return (kept, true);
        }
        if date <= to {
            kept.push(record);
        }
    }
    (kept, false)
}

async fn fetch_after_delay<T: Transport>(transport: &T, url: &str, delay: Duration) -> Result<String> {
    if !delay.is_zero() {
        sleep(delay).await;
    }
    transport.fetch(url).await
}

/// Fill in `content` for one record unless it already has some.
///
/// Failures are logged and leave the record unchanged.
#[instrument(level = "info", skip_all, fields(source = %config.name, url = %record.url))]
pub async fn fetch_article_content<T: Transport>(
    transport: &T,
    mut record: ArticleRecord,
    config: &SiteConfig,
) -> ArticleRecord {
    if record.content.as_deref().is_some_and(|c| !c.is_empty()) {
        return record;
    }
    if record.url.is_empty() {
        warn!("Record has no URL; cannot fetch body");
        return record;
    }
    match fetch_after_delay(transport, &record.url, config.request_delay).await {
        Ok(body) => record.content = Some(body),
        Err(e) => warn!(error = %e, "Failed to fetch article"),
    }
    record
}

async fn enrich_with_content<T: Transport>(
    transport: &T,
    records: Vec<ArticleRecord>,
    config: &SiteConfig,
) -> Vec<ArticleRecord> {
    stream::iter(records)
        .then(|record| async move {
            info!(source = %config.name, title = %record.title, "Fetching article");
            fetch_article_content(transport, record, config).await
        })
        .collect()
        .await
}

/// Discover articles for one source within the date window.
///
/// `state` is advanced to `to` only when at least one article was kept.
///
/// # Errors
///
/// A failed listing page fetch aborts the run and is returned. Body fetch
/// failures never are.
#[instrument(level = "info", skip_all, fields(source = %config.name))]
pub async fn fetch_new_articles<T: Transport>(
    transport: &T,
    config: &SiteConfig,
    state: &mut SourceRunState,
    from: Option<NaiveDate>,
    to: Option<NaiveDate>,
    max_pages: u32,
    today: NaiveDate,
) -> Result<Vec<ArticleRecord>> {
    let (from, to) = resolve_dates(state, from, to, today);
    info!(%from, %to, "Run window");

    let mut kept = Vec::new();
    for page in 1..=max_pages {
        let url = build_listing_url(&config.listing_url, page, &config.pagination_template);
        info!(page, %url, "Fetching listing page");
        let markdown = fetch_after_delay(transport, &url, config.request_delay).await?;
        let records = parse_listing(&markdown, config);
        info!(page, count = records.len(), "Parsed listing page");
        if records.is_empty() {
            break;
        }
        let (filtered, cutoff) = filter_by_date(records, from, to);
        kept.extend(filtered);
        if cutoff {
            info!(page, "Reached articles older than the window");
            break;
        }
    }

    if config.eager_fetch && !kept.is_empty() {
        kept = enrich_with_content(transport, kept, config).await;
    }

    if !kept.is_empty() {
        state.last_run_at = Some(Utc::now());
        state.last_article_date = Some(to);
    }
    info!(count = kept.len(), "Discovered articles");
    Ok(kept)
}
