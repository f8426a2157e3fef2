//! Body extraction from fetch-proxy output.
//!
//! The proxy returns a small header (`Title:`, `URL Source:`) followed by
//! `Markdown Content:` and the rendered page. [`extract_jina_meta`] splits
//! the two; [`extract_body_by_markers`] and [`extract_body_by_heuristic`]
//! narrow the page down to the article itself.

use once_cell::sync::Lazy;
use regex::Regex;

static TITLE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?m)^Title:\s*(.+)$").unwrap());
static URL_SOURCE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)^URL Source:\s*(.+)$").unwrap());

const CONTENT_MARKER: &str = "Markdown Content:";

/// Minimum stripped length for a line to count as a paragraph.
pub const MIN_PARAGRAPH_LEN: usize = 80;

/// Proxy header fields plus the candidate body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JinaMeta {
    pub title: Option<String>,
    pub url: Option<String>,
    pub body: String,
}

/// Split proxy output into header metadata and body.
///
/// Without a `Markdown Content:` marker the whole input is the body.
pub fn extract_jina_meta(raw: &str) -> JinaMeta {
    let capture = |re: &Regex| {
        re.captures(raw)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str().trim().to_string())
    };
    let body = match raw.find(CONTENT_MARKER) {
        Some(idx) => raw[idx + CONTENT_MARKER.len()..].trim().to_string(),
        None => raw.to_string(),
    };
    JinaMeta {
        title: capture(&TITLE_RE),
        url: capture(&URL_SOURCE_RE),
        body,
    }
}

/// Cut the text between the first `start` match and the first `end` match
/// after it. A missing or unmatched marker leaves that side of the text open.
pub fn extract_body_by_markers(text: &str, start: Option<&Regex>, end: Option<&Regex>) -> String {
    let start_idx = start
        .and_then(|re| re.find(text))
        .map(|m| m.start())
        .unwrap_or(0);
    let end_idx = end
        .and_then(|re| re.find(&text[start_idx..]))
        .map(|m| start_idx + m.start())
        .unwrap_or(text.len());
    text[start_idx..end_idx].trim().to_string()
}

fn is_paragraph(stripped: &str, min_len: usize) -> bool {
    stripped.chars().count() >= min_len
        && !stripped.starts_with(['*', '-', '|', '#', '[', '!'])
}

/// Keep the longest contiguous run of paragraph-like lines.
///
/// Runs are measured by their total stripped length. Blank lines inside a
/// run do not end it; any other non-paragraph line does. On a tie the
/// earlier run wins. Returns an empty string when no line qualifies.
pub fn extract_body_by_heuristic(text: &str, min_paragraph_len: usize) -> String {
    let lines: Vec<&str> = text.split('\n').collect();
    let (mut best_start, mut best_end, mut best_len) = (0usize, 0usize, 0usize);
    let mut current: Option<usize> = None;
    let mut current_len = 0usize;

    for (i, line) in lines.iter().enumerate() {
        let stripped = line.trim();
        if is_paragraph(stripped, min_paragraph_len) {
            current.get_or_insert(i);
            current_len += stripped.chars().count();
        } else if stripped.is_empty() {
            continue;
        } else {
            if let Some(start) = current.take() {
                if current_len > best_len {
                    (best_start, best_end, best_len) = (start, i, current_len);
                }
            }
            current_len = 0;
        }
    }
    if let Some(start) = current {
        if current_len > best_len {
            (best_start, best_end) = (start, lines.len());
        }
    }

    lines[best_start..best_end].join("\n").trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn para(word: &str) -> String {
        format!("{word} ").repeat(20).trim_end().to_string()
    }

    #[test]
    fn test_extract_jina_meta_full_header() {
        let raw = "Title: Campus opens in Dublin\nURL Source: https://example.com/a\n\nMarkdown Content:\n\n# Heading\n\nBody text.";
        let meta = extract_jina_meta(raw);
        assert_eq!(meta.title.as_deref(), Some("Campus opens in Dublin"));
        assert_eq!(meta.url.as_deref(), Some("https://example.com/a"));
        assert_eq!(meta.body, "# Heading\n\nBody text.");
    }

    #[test]
    fn test_extract_jina_meta_without_marker_keeps_everything() {
        let raw = "Just some text\nwithout a header";
        let meta = extract_jina_meta(raw);
        assert_eq!(meta.title, None);
        assert_eq!(meta.url, None);
        assert_eq!(meta.body, raw);
    }

    #[test]
    fn test_markers_cut_between_start_and_following_end() {
        let start = Regex::new(r"(?m)^# ").unwrap();
        let end = Regex::new(r"(?m)^Related").unwrap();
        let text = "Related nav\n# Story\nBody\nRelated articles\nmore";
        let body = extract_body_by_markers(text, Some(&start), Some(&end));
        assert_eq!(body, "# Story\nBody");
    }

    #[test]
    fn test_markers_absent_or_unmatched_default_to_bounds() {
        let start = Regex::new("NOPE").unwrap();
        let end = Regex::new("ALSO NOPE").unwrap();
        let text = "  whole body  ";
        assert_eq!(extract_body_by_markers(text, Some(&start), Some(&end)), "whole body");
        assert_eq!(extract_body_by_markers(text, None, None), "whole body");
    }

    #[test]
    fn test_heuristic_returns_paragraph_run_between_lists() {
        let (a, b, c) = (para("alpha"), para("bravo"), para("charlie"));
        let text = format!(
            "* [Home](/)\n* [News](/news)\n\n{a}\n\n{b}\n{c}\n\n- [Share](/s)\n- [Print](/p)"
        );
        let body = extract_body_by_heuristic(&text, MIN_PARAGRAPH_LEN);
        assert_eq!(body, format!("{a}\n\n{b}\n{c}"));
    }

    #[test]
    fn test_heuristic_prefers_longer_run_and_earlier_on_tie() {
        let (a, b, c) = (para("alpha"), para("bravo"), para("charlie"));
        let longer = format!("{a}\n## Sub\n{b}\n{c}");
        assert_eq!(
            extract_body_by_heuristic(&longer, MIN_PARAGRAPH_LEN),
            format!("{b}\n{c}")
        );

        let x = para("xxxxx");
        let y = para("yyyyy");
        let tie = format!("{x}\n## Sub\n{y}");
        assert_eq!(extract_body_by_heuristic(&tie, MIN_PARAGRAPH_LEN), x);
    }

    #[test]
    fn test_heuristic_without_paragraphs_is_empty() {
        let text = "# Title\n* item\nshort line";
        assert_eq!(extract_body_by_heuristic(text, MIN_PARAGRAPH_LEN), "");
    }
}
