//! Local embedding model.
//!
//! All knowledge stores share one embedding function, so ingestion and
//! query-time search land in the same vector space. The model runs
//! in-process via fastembed.

use async_trait::async_trait;
use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};
use tracing::info;

use legalflash_core::{traits::Embedder, LegalFlashError, Result};

/// In-process embedder backed by `fastembed::TextEmbedding`.
pub struct FastEmbedder {
    model: TextEmbedding,
    model_name: String,
    dimension: usize,
}

impl std::fmt::Debug for FastEmbedder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FastEmbedder")
            .field("model_name", &self.model_name)
            .field("dimension", &self.dimension)
            .finish_non_exhaustive()
    }
}

impl FastEmbedder {
    /// Load an embedding model by identifier.
    ///
    /// # Errors
    ///
    /// Returns a configuration error for unknown identifiers and an
    /// embedding error if model initialization fails (download, ONNX
    /// session, etc.).
    pub fn new(model_name: &str) -> Result<Self> {
        let (model_id, dimension) = Self::parse_model_name(model_name)?;

        info!("loading embedding model: {model_name}");
        let model = TextEmbedding::try_new(
            InitOptions::new(model_id).with_show_download_progress(false),
        )
        .map_err(|e| {
            LegalFlashError::embedding(format!("failed to initialize {model_name}: {e}"))
        })?;

        Ok(Self {
            model,
            model_name: model_name.to_string(),
            dimension,
        })
    }

    fn parse_model_name(model_name: &str) -> Result<(EmbeddingModel, usize)> {
        match model_name {
            "sentence-transformers/all-MiniLM-L6-v2" => Ok((EmbeddingModel::AllMiniLML6V2, 384)),
            "BAAI/bge-small-en-v1.5" => Ok((EmbeddingModel::BGESmallENV15, 384)),
            "BAAI/bge-base-en-v1.5" => Ok((EmbeddingModel::BGEBaseENV15, 768)),
            "BAAI/bge-small-zh-v1.5" => Ok((EmbeddingModel::BGESmallZHV15, 512)),
            "intfloat/multilingual-e5-base" => Ok((EmbeddingModel::MultilingualE5Base, 768)),
            _ => Err(LegalFlashError::configuration(format!(
                "unsupported embedding model: {model_name}"
            ))),
        }
    }
}

#[async_trait]
impl Embedder for FastEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let mut embeddings = self
            .model
            .embed(vec![text.to_string()], None)
            .map_err(|e| LegalFlashError::embedding(format!("embedding failed: {e}")))?;
        embeddings
            .pop()
            .ok_or_else(|| LegalFlashError::embedding("model returned no embedding"))
    }

    async fn embed_batch(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>> {
        self.model
            .embed(texts, Some(64))
            .map_err(|e| LegalFlashError::embedding(format!("batch embedding failed: {e}")))
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn model_name(&self) -> &str {
        &self.model_name
    }
}
