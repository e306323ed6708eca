//! Queue item types for translation work units.

use serde::{Deserialize, Serialize};

/// Longest language code accepted by [`QueueItem::validate`].
const MAX_LANGUAGE_LEN: usize = 16;

/// Validation errors for queue items.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ItemError {
    #[error("source content id must be a positive integer")]
    MissingSource,

    #[error("language code must not be empty")]
    EmptyLanguage,

    #[error("invalid language code: {0}")]
    InvalidLanguage(String),
}

/// Identity of an item in the queue: one source document in one target language.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ItemKey {
    pub source_content_id: u64,
    pub language: String,
}

impl ItemKey {
    pub fn new(source_content_id: u64, language: impl Into<String>) -> Self {
        Self {
            source_content_id,
            language: language.into(),
        }
    }
}

impl std::fmt::Display for ItemKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.source_content_id, self.language)
    }
}

/// A single translation request: translate one piece of content into one language.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueItem {
    /// Content to translate.
    pub source_content_id: u64,
    /// Existing translation to overwrite, `0` to create a new one.
    #[serde(default)]
    pub target_content_id: u64,
    /// Target language code.
    pub language: String,
    /// Display label, not used for processing.
    #[serde(default)]
    pub title: String,
    /// Set only once the item has failed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl QueueItem {
    /// Create a new item that will produce a fresh translation.
    pub fn new(source_content_id: u64, language: impl Into<String>) -> Self {
        Self {
            source_content_id,
            target_content_id: 0,
            language: language.into(),
            title: String::new(),
            error: None,
        }
    }

    /// Overwrite an existing translation instead of creating one.
    pub fn with_target(mut self, target_content_id: u64) -> Self {
        self.target_content_id = target_content_id;
        self
    }

    /// Set the display title.
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    pub fn key(&self) -> ItemKey {
        ItemKey::new(self.source_content_id, self.language.clone())
    }

    /// Check the item is well-formed before it enters the queue.
    pub fn validate(&self) -> Result<(), ItemError> {
        if self.source_content_id == 0 {
            return Err(ItemError::MissingSource);
        }
        if self.language.trim().is_empty() {
            return Err(ItemError::EmptyLanguage);
        }
        let valid = self.language.len() <= MAX_LANGUAGE_LEN
            && self
                .language
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        if !valid {
            return Err(ItemError::InvalidLanguage(self.language.clone()));
        }
        Ok(())
    }

    /// Label used in logs and summaries.
    pub fn label(&self) -> String {
        if self.title.is_empty() {
            format!("#{} ({})", self.source_content_id, self.language)
        } else {
            format!("{} ({})", self.title, self.language)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validates_required_fields() {
        assert_eq!(QueueItem::new(0, "es").validate(), Err(ItemError::MissingSource));
        assert_eq!(QueueItem::new(4, "  ").validate(), Err(ItemError::EmptyLanguage));
        assert!(matches!(
            QueueItem::new(4, "es; drop").validate(),
            Err(ItemError::InvalidLanguage(_))
        ));
        assert_eq!(QueueItem::new(4, "pt-BR").validate(), Ok(()));
        assert_eq!(QueueItem::new(4, "zh_hant").validate(), Ok(()));
    }

    #[test]
    fn key_ignores_title_and_target() {
        let a = QueueItem::new(7, "fr").with_title("Hello");
        let b = QueueItem::new(7, "fr").with_target(99);
        assert_eq!(a.key(), b.key());
        assert_eq!(a.key().to_string(), "7:fr");
    }

    #[test]
    fn deserializes_with_defaults() -> Result<(), serde_json::Error> {
        let item: QueueItem =
            serde_json::from_str(r#"{"source_content_id": 12, "language": "de"}"#)?;
        assert_eq!(item, QueueItem::new(12, "de"));
        assert_eq!(item.label(), "#12 (de)");
        Ok(())
    }
}
