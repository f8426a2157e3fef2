//! Removal of non-article blocks from rendered markdown.
//!
//! Four detectors scan the page line by line, each independently:
//!
//! | Detector | Flags |
//! |----------|-------|
//! | [`nav_blocks`] | 5+ consecutive `* [link]` bullets |
//! | [`link_clusters`] | 4+ link-only lines, blank lines allowed in between |
//! | [`form_blocks`] | runs of 3+ form-field lines (labels, phone prefixes, checkboxes, submit) |
//! | [`is_cookie_banner`] / [`is_share_row`] | single lines |
//!
//! [`remove_noise`] unions every flagged line into one exclusion set before
//! deleting anything, so detector order never matters.

use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::{BTreeSet, HashSet};
use std::ops::RangeInclusive;

const NAV_THRESHOLD: usize = 5;
const LINK_CLUSTER_THRESHOLD: usize = 4;
const FORM_MIN_FIELDS: usize = 3;
const FORM_MAX_GAP: usize = 3;
const SHARE_MIN_PLATFORMS: usize = 3;

static BULLET_LINK_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\s*\*\s+\[").unwrap());
static BARE_LINK_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\[.*\]\(.*\)").unwrap());
static FORM_FIELD_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)(^\s*(Nome|Email|Telefone|Empresa|Segmento|Name|Phone|Company)\*?\s*$)|(\(?\+\d{1,4}\)\s*$)|(- \[[ x]\])|(^\s*Submit\s*$)|(^\s*Iniciar a conversa\s*$)",
    )
    .unwrap()
});
static COOKIE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)cookie|consent|privac|aceitar|recusar").unwrap());
static SHARE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\[(Facebook|Twitter|LinkedIn|Reddit|Email|Share)\]").unwrap()
});

fn is_bullet_link(line: &str) -> bool {
    BULLET_LINK_RE.is_match(line)
}

/// Runs of five or more consecutive bullet links.
pub fn nav_blocks(lines: &[&str]) -> Vec<RangeInclusive<usize>> {
    let mut blocks = Vec::new();
    let mut start: Option<usize> = None;
    let mut count = 0usize;
    for (i, line) in lines.iter().enumerate() {
        if is_bullet_link(line) {
            start.get_or_insert(i);
            count += 1;
        } else {
            if let Some(s) = start.take() {
                if count >= NAV_THRESHOLD {
                    blocks.push(s..=i - 1);
                }
            }
            count = 0;
        }
    }
    if let Some(s) = start {
        if count >= NAV_THRESHOLD {
            blocks.push(s..=lines.len() - 1);
        }
    }
    blocks
}

/// Runs of link-only lines. Blank lines neither count nor break the run.
pub fn link_clusters(lines: &[&str]) -> Vec<RangeInclusive<usize>> {
    let mut blocks = Vec::new();
    let mut start: Option<usize> = None;
    let mut count = 0usize;
    for (i, line) in lines.iter().enumerate() {
        let stripped = line.trim();
        if stripped.is_empty() {
            continue;
        }
        if BARE_LINK_RE.is_match(stripped) || is_bullet_link(stripped) {
            start.get_or_insert(i);
            count += 1;
        } else {
            if let Some(s) = start.take() {
                if count >= LINK_CLUSTER_THRESHOLD {
                    blocks.push(s..=i - 1);
                }
            }
            count = 0;
        }
    }
    if let Some(s) = start {
        if count >= LINK_CLUSTER_THRESHOLD {
            blocks.push(s..=lines.len() - 1);
        }
    }
    blocks
}

/// Form regions: contact forms, newsletter sign-ups, consent checkboxes.
///
/// A run opens on the first form-field line. Every non-form line after that
/// counts against the run; once more than three have been seen the run
/// closes, and it is only kept if it held at least three form lines. A kept
/// run spans from its first to its last form line.
pub fn form_blocks(lines: &[&str]) -> Vec<RangeInclusive<usize>> {
    let mut blocks = Vec::new();
    let mut start: Option<usize> = None;
    let mut last_form = 0usize;
    let mut form_lines = 0usize;
    let mut other_lines = 0usize;

    for (i, line) in lines.iter().enumerate() {
        if FORM_FIELD_RE.is_match(line) {
            start.get_or_insert(i);
            last_form = i;
            form_lines += 1;
            continue;
        }
        let Some(s) = start else { continue };
        other_lines += 1;
        if other_lines > FORM_MAX_GAP {
            if form_lines >= FORM_MIN_FIELDS {
                blocks.push(s..=last_form);
            }
            start = None;
            form_lines = 0;
            other_lines = 0;
        }
    }
    if let Some(s) = start {
        if form_lines >= FORM_MIN_FIELDS {
            blocks.push(s..=last_form);
        }
    }
    blocks
}

/// Cookie and consent banner lines.
pub fn is_cookie_banner(line: &str) -> bool {
    COOKIE_RE.is_match(line)
}

/// A row linking to at least three different social platforms.
pub fn is_share_row(line: &str) -> bool {
    let platforms: HashSet<String> = SHARE_RE
        .captures_iter(line)
        .filter_map(|c| c.get(1))
        .map(|m| m.as_str().to_ascii_lowercase())
        .collect();
    platforms.len() >= SHARE_MIN_PLATFORMS
}

/// Indices of every line flagged by any detector.
pub fn noise_lines(lines: &[&str]) -> BTreeSet<usize> {
    let mut flagged: BTreeSet<usize> = nav_blocks(lines)
        .into_iter()
        .chain(link_clusters(lines))
        .chain(form_blocks(lines))
        .flatten()
        .collect();
    flagged.extend(
        lines
            .iter()
            .enumerate()
            .filter(|(_, line)| is_cookie_banner(line) || is_share_row(line))
            .map(|(i, _)| i),
    );
    flagged
}

fn remove_noise_once(text: &str) -> String {
    let lines: Vec<&str> = text.split('\n').collect();
    let flagged = noise_lines(&lines);
    if flagged.is_empty() {
        return text.to_string();
    }
    lines
        .iter()
        .enumerate()
        .filter(|(i, _)| !flagged.contains(i))
        .map(|(_, line)| *line)
        .collect::<Vec<_>>()
        .join("\n")
}

/// Delete every detected noise line.
///
/// Deleting one block can bring two partial blocks together, so the scan is
/// repeated until nothing more is flagged; the result is stable under a
/// second call.
pub fn remove_noise(text: &str) -> String {
    let mut current = text.to_string();
    loop {
        let next = remove_noise_once(&current);
        if next == current {
            return current;
        }
        current = next;
    }
}
