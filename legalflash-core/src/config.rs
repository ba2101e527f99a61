//! Service configuration.
//!
//! Configuration is env-driven with sensible local-development defaults:
//! a vLLM-compatible backend on localhost and knowledge bases under
//! `./knowledge_base/<category>`.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::types::StoreCategory;
use crate::{LegalFlashError, Result};

/// Default embedding model, shared by ingestion and query time.
pub const DEFAULT_EMBEDDING_MODEL: &str = "sentence-transformers/all-MiniLM-L6-v2";

/// Default cross-encoder used for reranking.
pub const DEFAULT_RERANK_MODEL: &str = "BAAI/bge-reranker-base";

/// Fallback cross-encoder tried when the primary fails to load.
pub const FALLBACK_RERANK_MODEL: &str = "jinaai/jina-reranker-v2-base-multilingual";

/// Top-level service configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AppConfig {
    /// Address the HTTP server binds to.
    pub bind_addr: String,

    /// Base URL of the vLLM-compatible inference backend.
    pub inference_url: String,

    /// Directory holding the persisted knowledge bases.
    pub data_dir: PathBuf,

    /// Embedding model identifier.
    pub embedding_model: String,

    /// Primary rerank model identifier.
    pub rerank_model: String,

    /// Timeout for rewrite-sized completion calls, seconds.
    pub rewrite_timeout_secs: u64,

    /// Timeout for answer generation calls, seconds.
    pub generation_timeout_secs: u64,

    /// Timeout for backend health probes, seconds.
    pub health_timeout_secs: u64,

    /// Capacity of the metrics history ring buffers.
    pub metrics_capacity: usize,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:9000".to_string(),
            inference_url: "http://localhost:8000".to_string(),
            data_dir: PathBuf::from("knowledge_base"),
            embedding_model: DEFAULT_EMBEDDING_MODEL.to_string(),
            rerank_model: DEFAULT_RERANK_MODEL.to_string(),
            rewrite_timeout_secs: 30,
            generation_timeout_secs: 120,
            health_timeout_secs: 5,
            metrics_capacity: 1000,
        }
    }
}

impl AppConfig {
    /// Build a configuration from environment variables, falling back to
    /// defaults for anything unset.
    ///
    /// Recognized variables: `LEGALFLASH_BIND_ADDR`, `VLLM_URL`,
    /// `LEGALFLASH_DATA_DIR`, `LEGALFLASH_EMBEDDING_MODEL`,
    /// `LEGALFLASH_RERANK_MODEL`.
    #[must_use]
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(addr) = std::env::var("LEGALFLASH_BIND_ADDR") {
            config.bind_addr = addr;
        }
        if let Ok(url) = std::env::var("VLLM_URL") {
            config.inference_url = url;
        }
        if let Ok(dir) = std::env::var("LEGALFLASH_DATA_DIR") {
            config.data_dir = PathBuf::from(dir);
        }
        if let Ok(model) = std::env::var("LEGALFLASH_EMBEDDING_MODEL") {
            config.embedding_model = model;
        }
        if let Ok(model) = std::env::var("LEGALFLASH_RERANK_MODEL") {
            config.rerank_model = model;
        }
        config
    }

    /// Set the inference backend URL.
    #[must_use]
    pub fn with_inference_url<S: Into<String>>(mut self, url: S) -> Self {
        self.inference_url = url.into();
        self
    }

    /// Set the knowledge-base directory.
    #[must_use]
    pub fn with_data_dir<P: Into<PathBuf>>(mut self, dir: P) -> Self {
        self.data_dir = dir.into();
        self
    }

    /// On-disk location of one category's knowledge base.
    #[must_use]
    pub fn store_dir(&self, category: StoreCategory) -> PathBuf {
        self.data_dir.join(category.as_str())
    }

    /// Whether a category's knowledge base exists on disk and is non-empty.
    #[must_use]
    pub fn store_present(&self, category: StoreCategory) -> bool {
        let dir = self.store_dir(category);
        dir_is_nonempty(&dir)
    }

    /// Timeout for rewrite-sized completion calls.
    #[must_use]
    pub fn rewrite_timeout(&self) -> Duration {
        Duration::from_secs(self.rewrite_timeout_secs)
    }

    /// Timeout for answer generation calls.
    #[must_use]
    pub fn generation_timeout(&self) -> Duration {
        Duration::from_secs(self.generation_timeout_secs)
    }

    /// Timeout for backend health probes.
    #[must_use]
    pub fn health_timeout(&self) -> Duration {
        Duration::from_secs(self.health_timeout_secs)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        if self.bind_addr.is_empty() {
            return Err(LegalFlashError::configuration("bind_addr must not be empty"));
        }
        if !self.inference_url.starts_with("http://") && !self.inference_url.starts_with("https://")
        {
            return Err(LegalFlashError::configuration(format!(
                "inference_url must be an http(s) URL, got {}",
                self.inference_url
            )));
        }
        if self.metrics_capacity == 0 {
            return Err(LegalFlashError::configuration(
                "metrics_capacity must be positive",
            ));
        }
        Ok(())
    }
}

fn dir_is_nonempty(dir: &Path) -> bool {
    std::fs::read_dir(dir)
        .map(|mut entries| entries.next().is_some())
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_validates() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.metrics_capacity, 1000);
    }

    #[test]
    fn test_store_dir_layout() {
        let config = AppConfig::default().with_data_dir("/var/lib/legalflash");
        assert_eq!(
            config.store_dir(StoreCategory::Judgement),
            PathBuf::from("/var/lib/legalflash/judgement")
        );
    }

    #[test]
    fn test_invalid_inference_url() {
        let config = AppConfig::default().with_inference_url("localhost:8000");
        assert!(config.validate().is_err());
    }
}
