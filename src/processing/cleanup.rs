//! Text cleanup transforms applied after extraction.

use once_cell::sync::Lazy;
use regex::{Captures, Regex};

static EXCESS_NEWLINES_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n{3,}").unwrap());
static TRAILING_SPACE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?m)[ \t]+$").unwrap());
static LINK_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(!?)\[([^\]]*)\]\([^)]+\)").unwrap());
static IMAGE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"!\[[^\]]*\]\([^)]+\)").unwrap());
static CAPTION_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?m)^–\s+.{1,30}$").unwrap());
static BYLINE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?m)^(?:January|February|March|April|May|June|July|August|September|October|November|December)\s+\d{1,2},\s+\d{4}\s+By.+$",
    )
    .unwrap()
});

/// Decode HTML entities (`&amp;`, `&#8217;`, `&nbsp;`, ...).
pub fn decode_entities(text: &str) -> String {
    html_escape::decode_html_entities(text).into_owned()
}

/// Strip trailing spaces and tabs from every line, collapse three or more
/// newlines into one blank line, and trim the ends.
pub fn normalize_whitespace(text: &str) -> String {
    let text = TRAILING_SPACE_RE.replace_all(text, "");
    let text = EXCESS_NEWLINES_RE.replace_all(&text, "\n\n");
    text.trim().to_string()
}

/// Replace `[text](url)` with `text`. Image syntax is left alone.
pub fn strip_links(text: &str) -> String {
    LINK_RE
        .replace_all(text, |caps: &Captures| {
            if &caps[1] == "!" {
                caps[0].to_string()
            } else {
                caps[2].to_string()
            }
        })
        .into_owned()
}

/// Remove `![alt](url)` images and short `– caption` lines under them.
pub fn strip_images(text: &str) -> String {
    let text = IMAGE_RE.replace_all(text, "");
    CAPTION_RE.replace_all(&text, "").into_owned()
}

/// Remove the first `Month D, YYYY By Author` line.
pub fn strip_byline(text: &str) -> String {
    BYLINE_RE.replace(text, "").into_owned()
}
