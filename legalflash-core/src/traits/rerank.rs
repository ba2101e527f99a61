//! Relevance model trait.

use async_trait::async_trait;

use crate::Result;

/// Scores (query, document) pairs with a cross-encoder-style model.
///
/// Unlike the embedding similarity used for first-pass retrieval, a
/// relevance model sees both texts at once, which makes it more accurate
/// and much more expensive; the reranker only runs it when the candidate
/// set is large enough for the ordering to matter.
#[async_trait]
pub trait RelevanceModel: Send + Sync + std::fmt::Debug {
    /// Score every document against the query.
    ///
    /// Returns one score per input document, in input order. Higher means
    /// more relevant.
    ///
    /// # Errors
    ///
    /// Returns an error if model inference fails.
    async fn score(&self, query: &str, documents: &[&str]) -> Result<Vec<f32>>;

    /// Identifier of the loaded model.
    fn model_name(&self) -> &str;
}
