//! Embedding generation trait.

use async_trait::async_trait;

use crate::Result;

/// Generates dense embeddings for text content.
///
/// Embeddings are fixed-size vectors used for nearest-neighbor search in
/// the knowledge stores. All stores share one embedding function, so a
/// query embedded once can be compared against every category.
#[async_trait]
pub trait Embedder: Send + Sync + std::fmt::Debug {
    /// Generate an embedding for a single text.
    ///
    /// The returned vector's length matches `dimension()`.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying model fails.
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Generate embeddings for multiple texts in one batch.
    async fn embed_batch(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>> {
        let mut embeddings = Vec::with_capacity(texts.len());
        for text in texts {
            embeddings.push(self.embed(&text).await?);
        }
        Ok(embeddings)
    }

    /// Embedding dimension.
    fn dimension(&self) -> usize;

    /// Name of the underlying model.
    fn model_name(&self) -> &str;
}
