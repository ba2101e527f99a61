//! Persisted knowledge stores.
//!
//! A store is one category's collection of embedded chunks, persisted as a
//! JSON-lines file and held in memory for querying. Search embeds the query
//! through the shared embedder and ranks chunks by cosine similarity.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

use legalflash_core::{
    traits::{Embedder, KnowledgeStore},
    types::{DocumentChunk, StoreCategory},
    LegalFlashError, Result,
};

/// File name of a store's chunk records inside its category directory.
pub const CHUNKS_FILE: &str = "chunks.jsonl";

/// Chunk size used at ingestion, in characters.
pub const CHUNK_SIZE: usize = 500;

/// Overlap between adjacent chunks, in characters.
pub const CHUNK_OVERLAP: usize = 50;

/// One persisted chunk record: content, metadata, and its embedding.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredChunk {
    content: String,
    #[serde(default)]
    metadata: HashMap<String, serde_json::Value>,
    embedding: Vec<f32>,
}

/// An in-memory vector store loaded from a persisted chunk file.
pub struct PersistedVectorStore {
    category: StoreCategory,
    embedder: Arc<dyn Embedder>,
    records: Vec<StoredChunk>,
}

impl std::fmt::Debug for PersistedVectorStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PersistedVectorStore")
            .field("category", &self.category)
            .field("records", &self.records.len())
            .finish_non_exhaustive()
    }
}

impl PersistedVectorStore {
    /// Load one category's store from its directory.
    ///
    /// Returns `Ok(None)` when the directory or chunk file is absent or
    /// holds no records: an unavailable store is simply missing from the
    /// active set, not an error. Corrupt records are an error so a damaged
    /// knowledge base is caught at startup rather than mid-request.
    pub fn load(
        dir: &Path,
        category: StoreCategory,
        embedder: Arc<dyn Embedder>,
    ) -> Result<Option<Self>> {
        let path = dir.join(CHUNKS_FILE);
        if !path.exists() {
            debug!("no chunk file at {}, store unavailable", path.display());
            return Ok(None);
        }

        let raw = std::fs::read_to_string(&path)?;
        let mut records = Vec::new();
        for (line_no, line) in raw.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            let record: StoredChunk = serde_json::from_str(line).map_err(|e| {
                LegalFlashError::knowledge_base(format!(
                    "corrupt chunk record at {}:{}: {e}",
                    path.display(),
                    line_no + 1
                ))
            })?;
            records.push(record);
        }

        if records.is_empty() {
            debug!("chunk file at {} is empty, store unavailable", path.display());
            return Ok(None);
        }

        info!(
            "loaded {} knowledge base: {} chunks from {}",
            category.label(),
            records.len(),
            path.display()
        );
        Ok(Some(Self {
            category,
            embedder,
            records,
        }))
    }

    /// Build a store from a UTF-8 text file and persist it.
    ///
    /// The source is split into overlapping fixed-size chunks, embedded in
    /// batch, and written as JSON lines to `<dir>/chunks.jsonl`. Returns
    /// the number of chunks written.
    pub async fn ingest(
        source: &Path,
        dir: &Path,
        category: StoreCategory,
        embedder: &dyn Embedder,
    ) -> Result<usize> {
        let text = std::fs::read_to_string(source)?;
        let pieces = split_text(&text, CHUNK_SIZE, CHUNK_OVERLAP);
        if pieces.is_empty() {
            return Err(LegalFlashError::knowledge_base(format!(
                "source file {} produced no chunks",
                source.display()
            )));
        }
        info!(
            "ingesting {}: {} chunks of ≤{CHUNK_SIZE} chars",
            source.display(),
            pieces.len()
        );

        let embeddings = embedder.embed_batch(pieces.clone()).await?;

        std::fs::create_dir_all(dir)?;
        let count = pieces.len();
        let mut lines = String::new();
        for (index, (content, embedding)) in pieces.into_iter().zip(embeddings).enumerate() {
            let record = StoredChunk {
                content,
                metadata: HashMap::from([
                    (
                        "source".to_string(),
                        serde_json::Value::String(source.display().to_string()),
                    ),
                    ("chunk_index".to_string(), serde_json::Value::from(index)),
                    (
                        "category".to_string(),
                        serde_json::Value::String(category.as_str().to_string()),
                    ),
                ]),
                embedding,
            };
            lines.push_str(&serde_json::to_string(&record)?);
            lines.push('\n');
        }
        let path = dir.join(CHUNKS_FILE);
        std::fs::write(&path, lines)?;

        info!(
            "ingestion complete: {} knowledge base saved to {}",
            category.label(),
            path.display()
        );
        Ok(count)
    }
}

#[async_trait]
impl KnowledgeStore for PersistedVectorStore {
    async fn query(&self, text: &str, k: usize) -> Result<Vec<(DocumentChunk, f32)>> {
        let query_embedding = self.embedder.embed(text).await?;

        let mut scored: Vec<(usize, f32)> = self
            .records
            .iter()
            .enumerate()
            .map(|(i, record)| (i, cosine_similarity(&query_embedding, &record.embedding)))
            .collect();
        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(k);

        Ok(scored
            .into_iter()
            .map(|(i, score)| {
                let record = &self.records[i];
                (
                    DocumentChunk {
                        content: record.content.clone(),
                        metadata: record.metadata.clone(),
                    },
                    score,
                )
            })
            .collect())
    }

    fn category(&self) -> StoreCategory {
        self.category
    }

    fn len(&self) -> usize {
        self.records.len()
    }
}

/// Split text into fixed-size chunks with overlap between neighbors.
///
/// Operates on characters, not bytes, so multi-byte text never splits
/// mid-codepoint.
#[must_use]
pub fn split_text(text: &str, chunk_size: usize, overlap: usize) -> Vec<String> {
    assert!(overlap < chunk_size, "overlap must be smaller than chunk size");

    let chars: Vec<char> = text.chars().collect();
    if chars.is_empty() {
        return Vec::new();
    }

    let step = chunk_size - overlap;
    let mut chunks = Vec::new();
    let mut start = 0;
    while start < chars.len() {
        let end = (start + chunk_size).min(chars.len());
        let piece: String = chars[start..end].iter().collect();
        if !piece.trim().is_empty() {
            chunks.push(piece);
        }
        if end == chars.len() {
            break;
        }
        start += step;
    }
    chunks
}

/// Cosine similarity between two vectors.
#[must_use]
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot / (norm_a * norm_b)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    struct CharCountEmbedder;

    // Maps text to a tiny vector so similarity is deterministic in tests.
    #[async_trait]
    impl Embedder for CharCountEmbedder {
        async fn embed(&self, text: &str) -> Result<Vec<f32>> {
            let n = text.chars().count() as f32;
            Ok(vec![n, 1.0])
        }

        fn dimension(&self) -> usize {
            2
        }

        fn model_name(&self) -> &str {
            "char-count"
        }
    }

    #[test]
    fn test_cosine_similarity() {
        assert!((cosine_similarity(&[1.0, 0.0], &[1.0, 0.0]) - 1.0).abs() < 1e-6);
        assert!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).abs() < 1e-6);
        assert_eq!(cosine_similarity(&[1.0], &[1.0, 2.0]), 0.0);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 2.0]), 0.0);
    }

    #[test]
    fn test_split_text_overlap() {
        let text = "a".repeat(1200);
        let chunks = split_text(&text, 500, 50);
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0].chars().count(), 500);
        assert_eq!(chunks[1].chars().count(), 500);
        // Last chunk covers the tail: 1200 - 2*450 = 300 chars.
        assert_eq!(chunks[2].chars().count(), 300);
    }

    #[test]
    fn test_split_text_short_input() {
        let chunks = split_text("短文本", 500, 50);
        assert_eq!(chunks, vec!["短文本".to_string()]);
        assert!(split_text("", 500, 50).is_empty());
    }

    #[tokio::test]
    async fn test_load_absent_store_is_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let store = PersistedVectorStore::load(
            &dir.path().join("law"),
            StoreCategory::Law,
            Arc::new(CharCountEmbedder),
        )
        .unwrap();
        assert!(store.is_none());
    }

    #[tokio::test]
    async fn test_roundtrip_ingest_and_query() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("legal_docs.txt");
        std::fs::write(&source, "第五百条 当事人应当遵循诚信原则履行合同义务").unwrap();

        let embedder = CharCountEmbedder;
        let store_dir = dir.path().join("law");
        let count =
            PersistedVectorStore::ingest(&source, &store_dir, StoreCategory::Law, &embedder)
                .await
                .unwrap();
        assert_eq!(count, 1);

        let store =
            PersistedVectorStore::load(&store_dir, StoreCategory::Law, Arc::new(CharCountEmbedder))
                .unwrap()
                .expect("store should load");
        assert_eq!(store.len(), 1);
        assert_eq!(store.category(), StoreCategory::Law);

        let results = store.query("违约责任", 5).await.unwrap();
        assert_eq!(results.len(), 1);
        assert!(results[0].0.content.contains("诚信原则"));
        assert_eq!(
            results[0].0.metadata.get("category"),
            Some(&serde_json::Value::String("law".into()))
        );
    }
}
