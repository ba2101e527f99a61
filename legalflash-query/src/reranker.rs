//! Cross-encoder reranking.
//!
//! Second-pass relevance scoring of retrieved candidates. Every (query,
//! candidate) pair is scored by the relevance model, candidates are sorted
//! by descending score (stable, so ties keep retrieval order), and only the
//! top-k survive.

use fastembed::{RerankInitOptions, RerankerModel, TextRerank};
use std::sync::Arc;
use tracing::{debug, info, warn};

use legalflash_core::{
    traits::RelevanceModel,
    types::{RerankedResult, RetrievalResult},
    LegalFlashError, Result,
};
use legalflash_core::config::{DEFAULT_RERANK_MODEL, FALLBACK_RERANK_MODEL};

/// Reranks retrieval candidates with a pairwise relevance model.
#[derive(Debug, Clone)]
pub struct Reranker {
    model: Arc<dyn RelevanceModel>,
}

impl Reranker {
    /// Create a reranker over the given relevance model.
    pub fn new(model: Arc<dyn RelevanceModel>) -> Self {
        Self { model }
    }

    /// Identifier of the underlying model.
    #[must_use]
    pub fn model_name(&self) -> &str {
        self.model.model_name()
    }

    /// Score all candidates against the query and return the `top_k` best,
    /// sorted by descending score.
    ///
    /// Ties keep their input order. Every returned string is one of the
    /// input candidates; reranking never invents content.
    pub async fn rerank(
        &self,
        query: &str,
        candidates: &[String],
        top_k: usize,
    ) -> Result<Vec<(String, f32)>> {
        if candidates.is_empty() {
            return Ok(Vec::new());
        }

        debug!("reranking {} candidates", candidates.len());
        let refs: Vec<&str> = candidates.iter().map(String::as_str).collect();
        let scores = self.model.score(query, &refs).await?;

        let mut scored: Vec<(String, f32)> = candidates
            .iter()
            .cloned()
            .zip(scores)
            .collect();
        // sort_by is stable: equal scores keep input order.
        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(top_k);

        info!(
            "rerank complete: kept top {} of {} candidates",
            scored.len(),
            candidates.len()
        );
        Ok(scored)
    }

    /// Rerank while carrying each candidate's original metadata through.
    ///
    /// Reranked content is matched back to its source record by content
    /// equality; if no match is found (which correct usage never produces)
    /// a minimal record with only content and score is synthesized.
    pub async fn rerank_with_metadata(
        &self,
        query: &str,
        candidates: &[RetrievalResult],
        top_k: usize,
    ) -> Result<Vec<RerankedResult>> {
        let contents: Vec<String> = candidates
            .iter()
            .map(|r| r.chunk.content.clone())
            .collect();
        let scored = self.rerank(query, &contents, top_k).await?;

        Ok(scored
            .into_iter()
            .map(|(content, score)| {
                let original = candidates
                    .iter()
                    .find(|r| r.chunk.content == content);
                match original {
                    Some(result) => RerankedResult {
                        content,
                        relevance_score: score,
                        original_metadata: result.chunk.metadata.clone(),
                    },
                    None => RerankedResult {
                        content,
                        relevance_score: score,
                        original_metadata: Default::default(),
                    },
                }
            })
            .collect())
    }
}

/// In-process cross-encoder backed by `fastembed::TextRerank`.
pub struct FastEmbedRelevanceModel {
    model: TextRerank,
    model_name: String,
}

impl std::fmt::Debug for FastEmbedRelevanceModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FastEmbedRelevanceModel")
            .field("model_name", &self.model_name)
            .finish_non_exhaustive()
    }
}

impl FastEmbedRelevanceModel {
    /// Load the named cross-encoder, trying the fallback identifier when
    /// the primary fails.
    ///
    /// # Errors
    ///
    /// Returns an error when neither model loads. Construction failure is
    /// fatal for the process: the orchestrator treats "no reranker" as a
    /// permanent condition, not a per-request retry.
    pub fn new(model_name: &str) -> Result<Self> {
        info!("loading rerank model: {model_name}");
        match Self::load(model_name) {
            Ok(model) => Ok(model),
            Err(e) => {
                warn!("rerank model {model_name} failed to load: {e}, trying fallback");
                Self::load(FALLBACK_RERANK_MODEL).map_err(|e2| {
                    LegalFlashError::rerank(format!(
                        "no rerank model could be loaded: primary {model_name}: {e}; fallback {FALLBACK_RERANK_MODEL}: {e2}"
                    ))
                })
            }
        }
    }

    fn load(model_name: &str) -> Result<Self> {
        let model_id = Self::parse_model_name(model_name)?;
        let model = TextRerank::try_new(
            RerankInitOptions::new(model_id).with_show_download_progress(false),
        )
        .map_err(|e| LegalFlashError::rerank(format!("failed to initialize {model_name}: {e}")))?;

        Ok(Self {
            model,
            model_name: model_name.to_string(),
        })
    }

    fn parse_model_name(model_name: &str) -> Result<RerankerModel> {
        match model_name {
            DEFAULT_RERANK_MODEL => Ok(RerankerModel::BGERerankerBase),
            FALLBACK_RERANK_MODEL => Ok(RerankerModel::JINARerankerV2BaseMultiligual),
            "jinaai/jina-reranker-v1-turbo-en" => Ok(RerankerModel::JINARerankerV1TurboEn),
            _ => Err(LegalFlashError::configuration(format!(
                "unsupported rerank model: {model_name}"
            ))),
        }
    }
}

#[async_trait::async_trait]
impl RelevanceModel for FastEmbedRelevanceModel {
    async fn score(&self, query: &str, documents: &[&str]) -> Result<Vec<f32>> {
        let results = self
            .model
            .rerank(query, documents.to_vec(), false, None)
            .map_err(|e| LegalFlashError::rerank(format!("scoring failed: {e}")))?;

        // fastembed returns results sorted by score; restore input order.
        let mut scores = vec![0.0_f32; documents.len()];
        for result in results {
            if let Some(slot) = scores.get_mut(result.index) {
                *slot = result.score;
            }
        }
        Ok(scores)
    }

    fn model_name(&self) -> &str {
        &self.model_name
    }
}
