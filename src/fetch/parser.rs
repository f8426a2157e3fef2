//! Config-driven listing parser.

use crate::config::SiteConfig;
use crate::models::ArticleRecord;
use chrono::NaiveDate;
use tracing::{debug, warn};
use url::Url;

/// Normalize a listing date with a `strftime`-style format.
pub fn parse_listing_date(raw: &str, format: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(raw.trim(), format).ok()
}

/// Make a listing link absolute against the source's listing URL.
fn resolve_url(listing_url: &str, href: &str) -> String {
    if Url::parse(href).is_ok() {
        return href.to_string();
    }
    Url::parse(listing_url)
        .and_then(|base| base.join(href))
        .map(|u| u.to_string())
        .unwrap_or_else(|_| href.to_string())
}

/// Extract article records from one listing page.
///
/// Every match of the listing pattern becomes a record; capture groups are
/// assigned to `listing_fields` by position. Values are trimmed and empty
/// ones treated as absent. A `date_raw` value is also parsed into `date`,
/// which stays `None` when the format does not match.
pub fn parse_listing(markdown: &str, config: &SiteConfig) -> Vec<ArticleRecord> {
    let Some(pattern) = config.listing_pattern.as_ref() else {
        warn!(source = %config.name, "No listing_pattern configured");
        return Vec::new();
    };
    if config.listing_fields.is_empty() {
        warn!(source = %config.name, "No listing_fields configured");
        return Vec::new();
    }

    let records: Vec<ArticleRecord> = pattern
        .captures_iter(markdown)
        .map(|caps| {
            let mut record = ArticleRecord::default();
            for (i, field) in config.listing_fields.iter().enumerate() {
                let value = caps
                    .get(i + 1)
                    .map(|m| m.as_str().trim())
                    .filter(|v| !v.is_empty())
                    .map(str::to_string);
                record.set_field(field, value);
            }
            if !record.url.is_empty() {
                record.url = resolve_url(&config.listing_url, &record.url);
            }
            record.date = record
                .date_raw
                .as_deref()
                .and_then(|raw| parse_listing_date(raw, &config.date_format));
            record
        })
        .collect();

    debug!(source = %config.name, count = records.len(), "Parsed listing");
    records
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> SiteConfig {
        SiteConfig::from_json(
            r#"{
                "name": "dcd",
                "listing_url": "https://www.example.com/news",
                "pagination": "?page={n}",
                "listing_pattern": "\\[(?P<title>.+)\\]\\((?P<url>.+)\\)\\s+(?P<date_raw>\\d{1,2} \\w+ \\d{4})",
                "listing_fields": ["title", "url", "date_raw"],
                "date_format": "%d %b %Y"
            }"#,
        )
        .unwrap()
    }

    #[test]
    fn test_parse_listing_zips_fields_and_parses_dates() {
        let md = "# News\n\n[Campus opens in Dublin](https://www.example.com/a) 19 Feb 2026\n\
                  [Operator buys land](/news/b) 18 Feb 2026\n\
                  [Odd date](https://www.example.com/c) 31 Foo 2026\n";
        let records = parse_listing(md, &config());
        assert_eq!(records.len(), 3);

        assert_eq!(records[0].title, "Campus opens in Dublin");
        assert_eq!(records[0].url, "https://www.example.com/a");
        assert_eq!(records[0].date_raw.as_deref(), Some("19 Feb 2026"));
        assert_eq!(records[0].date, NaiveDate::from_ymd_opt(2026, 2, 19));
        assert!(records[0].content.is_none());

        assert_eq!(records[1].url, "https://www.example.com/news/b");

        assert_eq!(records[2].date_raw.as_deref(), Some("31 Foo 2026"));
        assert_eq!(records[2].date, None);
    }

    #[test]
    fn test_missing_pattern_or_fields_yields_nothing() {
        let mut cfg = config();
        cfg.listing_fields.clear();
        assert!(parse_listing("[a](b) 1 Jan 2026", &cfg).is_empty());

        let mut cfg = config();
        cfg.listing_pattern = None;
        assert!(parse_listing("[a](b) 1 Jan 2026", &cfg).is_empty());
    }

    #[test]
    fn test_extra_fields_kept() {
        let cfg = SiteConfig::from_json(
            r#"{
                "name": "x",
                "listing_url": "https://x.test/",
                "pagination": "",
                "listing_pattern": "^## (.+)\\n\\[more\\]\\((.+)\\)\\n(\\w*)$",
                "listing_fields": ["title", "url", "section"]
            }"#,
        )
        .unwrap();
        let md = "## Power deal signed\n[more](https://x.test/p)\nEnergy\n## Blank section\n[more](https://x.test/q)\n";
        let records = parse_listing(md, &cfg);
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].extra.get("section").map(String::as_str), Some("Energy"));
        assert!(records[1].extra.is_empty());
        assert_eq!(records[1].date, None);
    }

    #[test]
    fn test_parse_listing_date_formats() {
        assert_eq!(
            parse_listing_date(" 2026-02-19 ", "%Y-%m-%d"),
            NaiveDate::from_ymd_opt(2026, 2, 19)
        );
        assert_eq!(
            parse_listing_date("February 19, 2026", "%B %d, %Y"),
            NaiveDate::from_ymd_opt(2026, 2, 19)
        );
        assert_eq!(parse_listing_date("yesterday", "%Y-%m-%d"), None);
    }
}
