//! Document chunks and retrieval results.
//!
//! These are the data structures that flow through the retrieval pipeline:
//! chunks live in a knowledge base, retrieval results are produced per
//! query, and reranked results are derived from them by the second-pass
//! relevance model.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Category of a knowledge base.
///
/// The service partitions legal text into three independently-built stores:
/// statute text, case summaries, and court judgements.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreCategory {
    /// Statute / article text (法条).
    Law,
    /// Case summaries (案例).
    Case,
    /// Court judgements (判决书).
    Judgement,
}

impl StoreCategory {
    /// All categories, in loading order.
    pub const ALL: [StoreCategory; 3] = [Self::Law, Self::Case, Self::Judgement];

    /// Stable identifier used in paths and health payloads.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Law => "law",
            Self::Case => "case",
            Self::Judgement => "judgement",
        }
    }

    /// Human-readable label used in logs and provenance tags.
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::Law => "法条",
            Self::Case => "案例",
            Self::Judgement => "判决书",
        }
    }
}

impl std::fmt::Display for StoreCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for StoreCategory {
    type Err = crate::LegalFlashError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "law" => Ok(Self::Law),
            "case" => Ok(Self::Case),
            "judgement" => Ok(Self::Judgement),
            other => Err(crate::LegalFlashError::validation(format!(
                "unknown knowledge base category: {other} (expected law, case, or judgement)"
            ))),
        }
    }
}

/// A chunk of legal text stored in a knowledge base.
///
/// Chunks are produced at ingestion time and are immutable once stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentChunk {
    /// Text content of the chunk.
    pub content: String,

    /// Chunk metadata (source file, chunk index, etc.).
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
}

impl DocumentChunk {
    /// Create a new chunk with the given content and no metadata.
    pub fn new<S: Into<String>>(content: S) -> Self {
        Self {
            content: content.into(),
            metadata: HashMap::new(),
        }
    }

    /// Add a metadata entry.
    pub fn with_metadata<K, V>(mut self, key: K, value: V) -> Self
    where
        K: Into<String>,
        V: Into<serde_json::Value>,
    {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

/// A chunk returned by one knowledge store for one query.
///
/// Transient: lives only for the duration of a single request. Results are
/// ordered by retrieval rank within their source store; cross-store ordering
/// is undefined until the rerank stage.
#[derive(Debug, Clone, PartialEq)]
pub struct RetrievalResult {
    /// The retrieved chunk.
    pub chunk: DocumentChunk,

    /// Similarity score assigned by the store (higher is more similar).
    pub retrieval_score: f32,

    /// Label of the store the chunk came from (e.g. "法条").
    pub store_label: String,
}

/// A candidate passage after second-pass relevance scoring.
///
/// Derived from a set of [`RetrievalResult`]s for one query; reranking never
/// invents candidates, so every reranked result's content is traceable to a
/// retrieval result. Total order by `relevance_score` descending, ties
/// broken by input order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RerankedResult {
    /// Passage content.
    pub content: String,

    /// Cross-encoder relevance score (higher is more relevant).
    pub relevance_score: f32,

    /// Metadata carried over from the original chunk.
    #[serde(default)]
    pub original_metadata: HashMap<String, serde_json::Value>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_category_identifiers() {
        assert_eq!(StoreCategory::Law.as_str(), "law");
        assert_eq!(StoreCategory::Judgement.label(), "判决书");
        assert_eq!(StoreCategory::ALL.len(), 3);
    }

    #[test]
    fn test_category_serde() {
        let json = serde_json::to_string(&StoreCategory::Case).unwrap();
        assert_eq!(json, "\"case\"");
        let back: StoreCategory = serde_json::from_str(&json).unwrap();
        assert_eq!(back, StoreCategory::Case);
    }

    #[test]
    fn test_chunk_builder() {
        let chunk = DocumentChunk::new("第五百条 当事人应当遵循诚信原则")
            .with_metadata("source", "civil_code.txt")
            .with_metadata("chunk_index", 42);

        assert_eq!(chunk.metadata.len(), 2);
        assert_eq!(
            chunk.metadata.get("source"),
            Some(&serde_json::Value::String("civil_code.txt".into()))
        );
    }
}
