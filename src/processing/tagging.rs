//! Keyword tagging.

use crate::error::{NewsfeedError, Result};
use serde_json::{Map, Value};
use std::fs;
use std::path::Path;
use tracing::{debug, instrument};

/// Tag name to keyword list, loaded once per run and passed to whoever
/// needs it.
#[derive(Debug, Clone, Default)]
pub struct Tagger {
    tags: Vec<(String, Vec<String>)>,
}

impl Tagger {
    /// Build from `(tag, keywords)` pairs. Keywords are lower-cased here so
    /// matching only has to lower-case the text.
    pub fn from_pairs<T, K>(pairs: impl IntoIterator<Item = (T, Vec<K>)>) -> Self
    where
        T: Into<String>,
        K: AsRef<str>,
    {
        let tags = pairs
            .into_iter()
            .map(|(tag, keywords)| {
                let keywords = keywords
                    .iter()
                    .map(|k| k.as_ref().to_lowercase())
                    .filter(|k| !k.is_empty())
                    .collect();
                (tag.into(), keywords)
            })
            .collect();
        Self { tags }
    }

    /// Parse a `{"Tag": ["keyword", ...]}` document. Tag order in the file is
    /// the order tags are reported in.
    pub fn from_json(json: &str) -> Result<Self> {
        let doc: Map<String, Value> = serde_json::from_str(json)?;
        let mut pairs = Vec::with_capacity(doc.len());
        for (tag, keywords) in doc {
            let keywords: Vec<String> = serde_json::from_value(keywords).map_err(|e| {
                NewsfeedError::Config(format!("tag `{tag}` must map to a list of strings: {e}"))
            })?;
            pairs.push((tag, keywords));
        }
        Ok(Self::from_pairs(pairs))
    }

    #[instrument(level = "info", skip_all, fields(path = %path.display()))]
    pub fn load(path: &Path) -> Result<Self> {
        let tagger = Self::from_json(&fs::read_to_string(path)?)?;
        debug!(tags = tagger.len(), "Loaded tag keywords");
        Ok(tagger)
    }

    pub fn len(&self) -> usize {
        self.tags.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tags.is_empty()
    }

    /// Tag names in configured order.
    pub fn tag_names(&self) -> impl Iterator<Item = &str> {
        self.tags.iter().map(|(tag, _)| tag.as_str())
    }

    /// Every tag with at least one keyword occurring in `text`.
    pub fn auto_tag(&self, text: &str) -> Vec<String> {
        let text = text.to_lowercase();
        let matched: Vec<String> = self
            .tags
            .iter()
            .filter(|(_, keywords)| keywords.iter().any(|k| text.contains(k.as_str())))
            .map(|(tag, _)| tag.clone())
            .collect();
        debug!(?matched, "Tagged");
        matched
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_auto_tag_matches_any_keyword() {
        let tagger = Tagger::from_pairs([("Expansion", vec!["new facility", "hyperscale"])]);
        assert_eq!(
            tagger.auto_tag("Equinix announces new hyperscale facility"),
            vec!["Expansion".to_string()]
        );
        assert!(tagger.auto_tag("Quarterly earnings call").is_empty());
    }

    #[test]
    fn test_auto_tag_is_case_insensitive() {
        let tagger = Tagger::from_pairs([("AI", vec!["GPU"]), ("Power", vec!["Substation"])]);
        assert_eq!(
            tagger.auto_tag("new gpu cluster next to the SUBSTATION"),
            vec!["AI".to_string(), "Power".to_string()]
        );
    }

    #[test]
    fn test_from_json_keeps_file_order() {
        let tagger = Tagger::from_json(
            r#"{"Zeta": ["campus"], "Alpha": ["campus"], "Mid": ["nothing here"]}"#,
        )
        .unwrap();
        assert_eq!(
            tagger.auto_tag("a new campus"),
            vec!["Zeta".to_string(), "Alpha".to_string()]
        );
        assert_eq!(tagger.tag_names().collect::<Vec<_>>(), vec!["Zeta", "Alpha", "Mid"]);
    }

    #[test]
    fn test_from_json_rejects_non_list_values() {
        let err = Tagger::from_json(r#"{"Expansion": "hyperscale"}"#).unwrap_err();
        assert!(matches!(err, NewsfeedError::Config(_)));
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tags.json");
        fs::write(&path, r#"{"M&A": ["acquires", "merger"]}"#).unwrap();
        let tagger = Tagger::load(&path).unwrap();
        assert_eq!(tagger.len(), 1);
        assert_eq!(tagger.auto_tag("Operator acquires rival"), vec!["M&A".to_string()]);
    }
}
