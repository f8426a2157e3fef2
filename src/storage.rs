//! Article, run-state, and failure persistence.
//!
//! The pipeline only sees the [`Repository`] trait. [`JsonStore`] keeps
//! everything as pretty-printed JSON documents in one data directory:
//!
//! ```text
//! data_dir/
//! ├── articles.json            # Vec<StoredArticle>, deduplicated by URL
//! ├── state.json               # source name -> SourceRunState
//! ├── failures.json            # Vec<FailureRecord>
//! └── category_summaries.json  # Vec<CategorySummary>
//! ```
//!
//! Every mutation rewrites the affected document before returning, so a
//! crash mid-run keeps everything saved so far. Memory only changes once the
//! write succeeds.

use crate::error::Result;
use crate::models::{ArticleRecord, CategorySummary, FailureRecord, SourceRunState, StoredArticle};
use chrono::{NaiveDate, Utc};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, info, instrument};

const ARTICLES_FILE: &str = "articles.json";
const STATE_FILE: &str = "state.json";
const FAILURES_FILE: &str = "failures.json";
const CATEGORY_SUMMARIES_FILE: &str = "category_summaries.json";

/// Outcome of [`Repository::save_article`]. Both are successes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveOutcome {
    Inserted,
    Duplicate,
}

/// Persistence boundary used by the pipeline.
pub trait Repository {
    /// Store an article. A URL already present is a no-op.
    fn save_article(
        &self,
        article: &ArticleRecord,
        source_name: &str,
        source_url: &str,
    ) -> Result<SaveOutcome>;

    /// Replace the stored copy of an article with the same URL. Returns
    /// `false` when no such article exists.
    fn update_article(&self, article: &ArticleRecord) -> Result<bool>;

    /// State for a source, or a fresh state when it has never run.
    fn load_run_state(&self, source_name: &str) -> Result<SourceRunState>;

    fn save_run_state(&self, state: &SourceRunState) -> Result<()>;

    /// Record that `step` gave up on `url`. Updates the existing unresolved
    /// record for the pair if there is one.
    fn record_failure(&self, url: &str, step: &str, error: &str, retries: u32) -> Result<()>;

    /// Mark every unresolved failure for the pair resolved. Returns how many
    /// changed.
    fn resolve_failures(&self, url: &str, step: &str) -> Result<usize>;

    fn failures(&self) -> Result<Vec<FailureRecord>>;

    /// Articles whose subtitle is missing or empty.
    fn articles_missing_summaries(&self) -> Result<Vec<StoredArticle>>;

    /// Articles with no tags.
    fn articles_missing_tags(&self) -> Result<Vec<StoredArticle>>;

    /// Articles carrying `tag` dated within `[from, to]`, newest first.
    fn articles_for_tag(
        &self,
        tag: &str,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<StoredArticle>>;

    fn category_summary_exists(&self, tag: &str, from: NaiveDate, to: NaiveDate) -> Result<bool>;

    fn save_category_summary(&self, summary: &CategorySummary) -> Result<()>;
}

#[derive(Debug, Default)]
struct StoreData {
    articles: Vec<StoredArticle>,
    states: BTreeMap<String, SourceRunState>,
    failures: Vec<FailureRecord>,
    category_summaries: Vec<CategorySummary>,
}

/// JSON-file repository. With no directory it only lives in memory.
#[derive(Debug)]
pub struct JsonStore {
    dir: Option<PathBuf>,
    data: Mutex<StoreData>,
}

fn read_or_default<T: DeserializeOwned + Default>(path: &Path) -> Result<T> {
    if !path.exists() {
        return Ok(T::default());
    }
    let raw = fs::read_to_string(path)?;
    if raw.trim().is_empty() {
        return Ok(T::default());
    }
    Ok(serde_json::from_str(&raw)?)
}

impl JsonStore {
    /// Open (or create) a store in `dir`, loading whatever is already there.
    #[instrument(level = "info", skip_all, fields(dir = %dir.display()))]
    pub fn open(dir: &Path) -> Result<Self> {
        fs::create_dir_all(dir)?;
        let data = StoreData {
            articles: read_or_default(&dir.join(ARTICLES_FILE))?,
            states: read_or_default(&dir.join(STATE_FILE))?,
            failures: read_or_default(&dir.join(FAILURES_FILE))?,
            category_summaries: read_or_default(&dir.join(CATEGORY_SUMMARIES_FILE))?,
        };
        info!(
            articles = data.articles.len(),
            sources = data.states.len(),
            failures = data.failures.len(),
            "Opened JSON store"
        );
        Ok(Self {
            dir: Some(dir.to_path_buf()),
            data: Mutex::new(data),
        })
    }

    pub fn in_memory() -> Self {
        Self {
            dir: None,
            data: Mutex::new(StoreData::default()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, StoreData> {
        self.data.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Write one document via a temp file and rename.
    fn persist<T: Serialize + ?Sized>(&self, file: &str, value: &T) -> Result<()> {
        let Some(dir) = &self.dir else {
            return Ok(());
        };
        let json = serde_json::to_string_pretty(value)?;
        let tmp = dir.join(format!("{file}.tmp"));
        fs::write(&tmp, json)?;
        fs::rename(&tmp, dir.join(file))?;
        debug!(file, "Persisted");
        Ok(())
    }

    /// Every stored article in insertion order.
    pub fn articles(&self) -> Vec<StoredArticle> {
        self.lock().articles.clone()
    }

    fn select(&self, keep: impl Fn(&StoredArticle) -> bool) -> Vec<StoredArticle> {
        self.lock().articles.iter().filter(|a| keep(a)).cloned().collect()
    }
}

impl Repository for JsonStore {
    fn save_article(
        &self,
        article: &ArticleRecord,
        source_name: &str,
        source_url: &str,
    ) -> Result<SaveOutcome> {
        let mut data = self.lock();
        if data.articles.iter().any(|a| a.article.url == article.url) {
            info!(url = %article.url, "Skipping duplicate");
            return Ok(SaveOutcome::Duplicate);
        }
        let mut articles = data.articles.clone();
        articles.push(StoredArticle {
            source_name: source_name.to_string(),
            source_url: source_url.to_string(),
            saved_at: Utc::now(),
            article: article.clone(),
        });
        self.persist(ARTICLES_FILE, &articles)?;
        data.articles = articles;
        info!(url = %article.url, title = %article.title, "Saved article");
        Ok(SaveOutcome::Inserted)
    }

    fn update_article(&self, article: &ArticleRecord) -> Result<bool> {
        let mut data = self.lock();
        let mut articles = data.articles.clone();
        let Some(stored) = articles.iter_mut().find(|a| a.article.url == article.url) else {
            return Ok(false);
        };
        stored.article = article.clone();
        self.persist(ARTICLES_FILE, &articles)?;
        data.articles = articles;
        Ok(true)
    }

    fn load_run_state(&self, source_name: &str) -> Result<SourceRunState> {
        Ok(self
            .lock()
            .states
            .get(source_name)
            .cloned()
            .unwrap_or_else(|| SourceRunState::new(source_name)))
    }

    fn save_run_state(&self, state: &SourceRunState) -> Result<()> {
        let mut data = self.lock();
        let mut states = data.states.clone();
        states.insert(state.source_name.clone(), state.clone());
        self.persist(STATE_FILE, &states)?;
        data.states = states;
        Ok(())
    }

    fn record_failure(&self, url: &str, step: &str, error: &str, retries: u32) -> Result<()> {
        let mut data = self.lock();
        let mut failures = data.failures.clone();
        let now = Utc::now();
        match failures
            .iter_mut()
            .find(|f| f.url == url && f.step == step && !f.resolved)
        {
            Some(existing) => {
                existing.error = error.to_string();
                existing.retry_count = retries;
                existing.updated_at = now;
            }
            None => failures.push(FailureRecord {
                url: url.to_string(),
                step: step.to_string(),
                error: error.to_string(),
                retry_count: retries,
                resolved: false,
                updated_at: now,
            }),
        }
        self.persist(FAILURES_FILE, &failures)?;
        data.failures = failures;
        Ok(())
    }

    fn resolve_failures(&self, url: &str, step: &str) -> Result<usize> {
        let mut data = self.lock();
        let now = Utc::now();
        let mut failures = data.failures.clone();
        let mut changed = 0;
        for failure in failures
            .iter_mut()
            .filter(|f| f.url == url && f.step == step && !f.resolved)
        {
            failure.resolved = true;
            failure.updated_at = now;
            changed += 1;
        }
        if changed > 0 {
            self.persist(FAILURES_FILE, &failures)?;
            data.failures = failures;
        }
        Ok(changed)
    }

    fn failures(&self) -> Result<Vec<FailureRecord>> {
        Ok(self.lock().failures.clone())
    }

    fn articles_missing_summaries(&self) -> Result<Vec<StoredArticle>> {
        Ok(self.select(|a| !a.article.has_summary()))
    }

    fn articles_missing_tags(&self) -> Result<Vec<StoredArticle>> {
        Ok(self.select(|a| !a.article.has_tags()))
    }

    fn articles_for_tag(
        &self,
        tag: &str,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<StoredArticle>> {
        let mut found = self.select(|a| {
            a.article.date.is_some_and(|d| d >= from && d <= to)
                && a.article
                    .tags
                    .as_ref()
                    .is_some_and(|tags| tags.iter().any(|t| t == tag))
        });
        found.sort_by(|a, b| b.article.date.cmp(&a.article.date));
        Ok(found)
    }

    fn category_summary_exists(&self, tag: &str, from: NaiveDate, to: NaiveDate) -> Result<bool> {
        Ok(self
            .lock()
            .category_summaries
            .iter()
            .any(|s| s.tag == tag && s.date_from == from && s.date_to == to))
    }

    fn save_category_summary(&self, summary: &CategorySummary) -> Result<()> {
        let mut data = self.lock();
        let mut summaries = data.category_summaries.clone();
        summaries.push(summary.clone());
        self.persist(CATEGORY_SUMMARIES_FILE, &summaries)?;
        data.category_summaries = summaries;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 2, d).unwrap()
    }

    #[test]
    fn test_save_article_is_idempotent_on_url() {
        let store = JsonStore::in_memory();
        let article = ArticleRecord::new("https://example.com/a", "First");
        assert_eq!(
            store.save_article(&article, "dcd", "https://example.com").unwrap(),
            SaveOutcome::Inserted
        );
        let renamed = ArticleRecord::new("https://example.com/a", "Second");
        assert_eq!(
            store.save_article(&renamed, "dcd", "https://example.com").unwrap(),
            SaveOutcome::Duplicate
        );
        let articles = store.articles();
        assert_eq!(articles.len(), 1);
        assert_eq!(articles[0].article.title, "First");
    }

    #[test]
    fn test_run_state_defaults_and_roundtrips() {
        let store = JsonStore::in_memory();
        assert_eq!(store.load_run_state("dcd").unwrap(), SourceRunState::new("dcd"));

        let mut state = SourceRunState::new("dcd");
        state.last_article_date = Some(day(19));
        store.save_run_state(&state).unwrap();
        assert_eq!(store.load_run_state("dcd").unwrap(), state);
    }

    #[test]
    fn test_record_failure_keeps_one_unresolved_per_pair() {
        let store = JsonStore::in_memory();
        store.record_failure("u1", "summarize", "timeout", 3).unwrap();
        store.record_failure("u1", "summarize", "bad json", 3).unwrap();
        store.record_failure("u1", "fetch", "404", 1).unwrap();

        let failures = store.failures().unwrap();
        assert_eq!(failures.len(), 2);
        let summarize = failures.iter().find(|f| f.step == "summarize").unwrap();
        assert_eq!(summarize.error, "bad json");

        assert_eq!(store.resolve_failures("u1", "summarize").unwrap(), 1);
        store.record_failure("u1", "summarize", "again", 3).unwrap();
        let failures = store.failures().unwrap();
        assert_eq!(failures.iter().filter(|f| f.step == "summarize").count(), 2);
        assert_eq!(
            failures
                .iter()
                .filter(|f| f.step == "summarize" && !f.resolved)
                .count(),
            1
        );
    }

    #[test]
    fn test_queries_for_backfill_and_tags() {
        let store = JsonStore::in_memory();
        let summary = crate::models::SummaryResult {
            subtitle: "Campus opens".into(),
            bullets: vec!["40MW".into()],
        };
        let done = ArticleRecord::new("u1", "Done")
            .with_date(day(10))
            .with_summary(summary)
            .with_tags(vec!["Expansion".into()]);
        let failed = ArticleRecord::new("u2", "Failed")
            .with_date(day(12))
            .with_summary(crate::models::SummaryResult::empty())
            .with_tags(vec!["Expansion".into()]);
        let untagged = ArticleRecord::new("u3", "Untagged").with_date(day(11));
        for a in [&done, &failed, &untagged] {
            store.save_article(a, "dcd", "https://example.com").unwrap();
        }

        let missing: Vec<_> = store
            .articles_missing_summaries()
            .unwrap()
            .into_iter()
            .map(|a| a.article.url)
            .collect();
        assert_eq!(missing, vec!["u2", "u3"]);

        let untagged: Vec<_> = store
            .articles_missing_tags()
            .unwrap()
            .into_iter()
            .map(|a| a.article.url)
            .collect();
        assert_eq!(untagged, vec!["u3"]);

        let tagged: Vec<_> = store
            .articles_for_tag("Expansion", day(1), day(28))
            .unwrap()
            .into_iter()
            .map(|a| a.article.url)
            .collect();
        assert_eq!(tagged, vec!["u2", "u1"]);
        assert!(store.articles_for_tag("Expansion", day(11), day(11)).unwrap().is_empty());
    }

    #[test]
    fn test_open_reloads_persisted_documents() {
        let tmp = tempfile::tempdir().unwrap();
        {
            let store = JsonStore::open(tmp.path()).unwrap();
            store
                .save_article(&ArticleRecord::new("u1", "T"), "dcd", "https://example.com")
                .unwrap();
            store.save_run_state(&SourceRunState::new("dcd")).unwrap();
            store.record_failure("u1", "summarize", "x", 3).unwrap();
        }
        assert!(tmp.path().join(ARTICLES_FILE).exists());
        assert!(!tmp.path().join(format!("{ARTICLES_FILE}.tmp")).exists());

        let store = JsonStore::open(tmp.path()).unwrap();
        assert_eq!(store.articles().len(), 1);
        assert_eq!(store.failures().unwrap().len(), 1);
        assert_eq!(
            store.save_article(&ArticleRecord::new("u1", "T"), "dcd", "x").unwrap(),
            SaveOutcome::Duplicate
        );
    }

    #[test]
    fn test_failed_write_leaves_store_unchanged() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().join("data");
        let store = JsonStore::open(&dir).unwrap();
        let article = ArticleRecord::new("https://example.com/a", "First");
        fs::remove_dir_all(&dir).unwrap();

        assert!(store.save_article(&article, "dcd", "https://example.com").is_err());
        assert!(store.save_run_state(&SourceRunState::new("dcd")).is_err());
        assert!(store.record_failure("u1", "summarize", "x", 3).is_err());
        assert!(store.articles().is_empty());
        assert!(store.failures().unwrap().is_empty());

        fs::create_dir_all(&dir).unwrap();
        assert_eq!(
            store.save_article(&article, "dcd", "https://example.com").unwrap(),
            SaveOutcome::Inserted
        );
        let reopened = JsonStore::open(&dir).unwrap();
        assert_eq!(reopened.articles().len(), 1);
        assert!(reopened.failures().unwrap().is_empty());
    }

    #[test]
    fn test_category_summary_exists() {
        let store = JsonStore::in_memory();
        assert!(!store.category_summary_exists("AI", day(1), day(7)).unwrap());
        store
            .save_category_summary(&CategorySummary {
                tag: "AI".into(),
                date_from: day(1),
                date_to: day(7),
                summary: "GPU demand grew.".into(),
                article_count: 6,
                created_at: Utc::now(),
            })
            .unwrap();
        assert!(store.category_summary_exists("AI", day(1), day(7)).unwrap());
        assert!(!store.category_summary_exists("AI", day(1), day(8)).unwrap());
    }
}
