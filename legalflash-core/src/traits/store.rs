//! Knowledge store trait.
//!
//! A knowledge store is a persisted collection of embedded text chunks
//! queryable by nearest-neighbor similarity. The retrieval pipeline only
//! consumes the narrow `query(text, k)` surface; index persistence and
//! internals belong to the implementation.

use async_trait::async_trait;

use crate::types::{DocumentChunk, StoreCategory};
use crate::Result;

/// A queryable vector store for one knowledge-base category.
#[async_trait]
pub trait KnowledgeStore: Send + Sync + std::fmt::Debug {
    /// Return the top-`k` chunks nearest to `text` under the store's
    /// embedding, most similar first, paired with their similarity scores.
    ///
    /// # Errors
    ///
    /// Returns an error if query embedding or the similarity search fails.
    async fn query(&self, text: &str, k: usize) -> Result<Vec<(DocumentChunk, f32)>>;

    /// The category this store holds.
    fn category(&self) -> StoreCategory;

    /// Number of chunks in the store.
    fn len(&self) -> usize;

    /// Whether the store holds no chunks.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
