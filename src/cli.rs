//! Command-line interface definitions for newsfeed.
//!
//! Global options say where configuration and data live and carry the API
//! keys; each subcommand is one kind of run. Every option can also come from
//! the environment.

use crate::chunking::DEFAULT_CATEGORY_MODEL;
use crate::config::DEFAULT_MODEL;
use crate::pipeline::DEFAULT_MIN_ARTICLES;
use crate::utils::parse_ymd;
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Command-line arguments for newsfeed.
///
/// # Examples
///
/// ```sh
/// # Every configured source, default window
/// newsfeed run
///
/// # One source over an explicit window
/// newsfeed run --site dcd --from 2026-02-01 --to 2026-02-07
///
/// # Retry missing summaries and tags
/// newsfeed backfill
///
/// # Weekly digest for one tag
/// newsfeed summarize --tag Expansion --from 2026-02-01 --to 2026-02-07
/// ```
#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct Cli {
    /// Directory holding one JSON document per source plus tags.json
    #[arg(long, env = "NEWSFEED_SITES_DIR", default_value = "sites", global = true)]
    pub sites_dir: PathBuf,

    /// Directory for stored articles, run state, and failure records
    #[arg(long, env = "NEWSFEED_DATA_DIR", default_value = "data", global = true)]
    pub data_dir: PathBuf,

    /// Gemini API key
    #[arg(long, env = "GOOGLE_API_KEY", hide_env_values = true, global = true)]
    pub google_api_key: Option<String>,

    /// Optional fetch-proxy API key
    #[arg(long, env = "JINA_API_KEY", hide_env_values = true, global = true)]
    pub jina_api_key: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, PartialEq)]
pub enum Command {
    /// Fetch, process, and store new articles
    Run {
        /// Source key (file stem in the sites directory); all sources if omitted
        #[arg(short, long)]
        site: Option<String>,

        /// First day of the window (YYYY-MM-DD); defaults to the saved watermark
        #[arg(long, value_parser = parse_ymd)]
        from: Option<NaiveDate>,

        /// Last day of the window (YYYY-MM-DD); defaults to today
        #[arg(long, value_parser = parse_ymd)]
        to: Option<NaiveDate>,

        /// Stop paginating after this many listing pages
        #[arg(long, default_value_t = 5)]
        max_pages: u32,

        /// Skip TLS certificate verification for the fetch proxy
        #[arg(long)]
        no_verify_ssl: bool,

        /// Comma-separated step names replacing each source's pipeline
        #[arg(long, value_delimiter = ',')]
        steps: Vec<String>,

        /// Model for per-article summaries
        #[arg(long, default_value = DEFAULT_MODEL)]
        model: String,
    },

    /// Retry missing summaries and tags for stored articles
    Backfill {
        /// Model for per-article summaries
        #[arg(long, default_value = DEFAULT_MODEL)]
        model: String,
    },

    /// Write category digests over a date window
    Summarize {
        /// Tag to summarize; every tag in tags.json if omitted (repeatable)
        #[arg(short, long)]
        tag: Vec<String>,

        /// First day of the window (YYYY-MM-DD); defaults to `--to`
        #[arg(long, value_parser = parse_ymd)]
        from: Option<NaiveDate>,

        /// Last day of the window (YYYY-MM-DD); defaults to today
        #[arg(long, value_parser = parse_ymd)]
        to: Option<NaiveDate>,

        /// Model for the digest
        #[arg(long, default_value = DEFAULT_CATEGORY_MODEL)]
        model: String,

        /// Skip tags with fewer matching articles than this
        #[arg(long, default_value_t = DEFAULT_MIN_ARTICLES)]
        min_articles: usize,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_run_defaults() {
        let cli = Cli::try_parse_from(["newsfeed", "run"]).unwrap();
        assert_eq!(cli.sites_dir, PathBuf::from("sites"));
        assert_eq!(cli.data_dir, PathBuf::from("data"));
        assert_eq!(
            cli.command,
            Command::Run {
                site: None,
                from: None,
                to: None,
                max_pages: 5,
                no_verify_ssl: false,
                steps: Vec::new(),
                model: DEFAULT_MODEL.to_string(),
            }
        );
    }

    #[test]
    fn test_cli_run_with_window() {
        let cli = Cli::try_parse_from([
            "newsfeed",
            "run",
            "-s",
            "dcd",
            "--from",
            "2026-02-01",
            "--to",
            "2026-02-07",
            "--no-verify-ssl",
            "--steps",
            "extract_jina_meta,normalize_whitespace",
            "--data-dir",
            "/tmp/newsfeed",
        ])
        .unwrap();

        assert_eq!(cli.data_dir, PathBuf::from("/tmp/newsfeed"));
        let Command::Run {
            site,
            from,
            to,
            no_verify_ssl,
            steps,
            ..
        } = cli.command
        else {
            panic!("expected run");
        };
        assert_eq!(site.as_deref(), Some("dcd"));
        assert_eq!(from, NaiveDate::from_ymd_opt(2026, 2, 1));
        assert_eq!(to, NaiveDate::from_ymd_opt(2026, 2, 7));
        assert!(no_verify_ssl);
        assert_eq!(steps, vec!["extract_jina_meta", "normalize_whitespace"]);
    }

    #[test]
    fn test_cli_rejects_bad_dates() {
        assert!(Cli::try_parse_from(["newsfeed", "run", "--from", "02/01/2026"]).is_err());
    }

    #[test]
    fn test_cli_summarize_tags() {
        let cli = Cli::try_parse_from([
            "newsfeed",
            "summarize",
            "-t",
            "Expansion",
            "-t",
            "Power",
            "--min-articles",
            "2",
        ])
        .unwrap();
        let Command::Summarize {
            tag,
            model,
            min_articles,
            ..
        } = cli.command
        else {
            panic!("expected summarize");
        };
        assert_eq!(tag, vec!["Expansion", "Power"]);
        assert_eq!(model, DEFAULT_CATEGORY_MODEL);
        assert_eq!(min_articles, 2);
    }
}
