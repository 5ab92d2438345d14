//! The document record shared by loaders, the chunker, and the vector index.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Metadata keys written by the loaders.
pub mod meta {
    pub const SOURCE: &str = "source";
    pub const TITLE: &str = "title";
    pub const PAGE: &str = "page";
    pub const TOTAL_PAGES: &str = "total_pages";
    pub const CONTENT_TYPE: &str = "content_type";
    pub const START_INDEX: &str = "start_index";
}

/// A unit of text plus its provenance.
///
/// Loaders produce one per page or file; the chunker produces many smaller
/// ones that carry a copy of their parent's metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub content: String,
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
}

impl Document {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            metadata: HashMap::new(),
        }
    }

    pub fn with_metadata(
        mut self,
        key: impl Into<String>,
        value: impl Into<serde_json::Value>,
    ) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// String-valued metadata entry, if present.
    pub fn meta_str(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).and_then(|v| v.as_str())
    }

    pub fn source(&self) -> Option<&str> {
        self.meta_str(meta::SOURCE)
    }

    /// Human-facing label: `title`, then `source`.
    pub fn title(&self) -> Option<&str> {
        self.meta_str(meta::TITLE)
            .filter(|t| !t.is_empty())
            .or_else(|| self.source().filter(|s| !s.is_empty()))
    }

    /// Length in characters, the unit chunk sizes are measured in.
    pub fn char_len(&self) -> usize {
        self.content.chars().count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_title_prefers_title_over_source() {
        let doc = Document::new("body")
            .with_metadata(meta::SOURCE, "notes.txt")
            .with_metadata(meta::TITLE, "Capitals");
        assert_eq!(doc.title(), Some("Capitals"));
    }

    #[test]
    fn test_title_falls_back_to_source() {
        let doc = Document::new("body").with_metadata(meta::SOURCE, "notes.txt");
        assert_eq!(doc.title(), Some("notes.txt"));
        assert_eq!(Document::new("body").title(), None);
    }

    #[test]
    fn test_char_len_counts_scalar_values() {
        assert_eq!(Document::new("héllo").char_len(), 5);
    }

    #[test]
    fn test_non_string_metadata_is_ignored_by_meta_str() {
        let doc = Document::new("x").with_metadata(meta::PAGE, 3);
        assert_eq!(doc.meta_str(meta::PAGE), None);
        assert_eq!(doc.metadata.get(meta::PAGE), Some(&serde_json::json!(3)));
    }
}
