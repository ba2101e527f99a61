//! Application context.
//!
//! All process-wide components (the inference client, the store registry,
//! the rewriter, the reranker, the metrics collector) are constructed
//! once here and handed to request handlers as shared state. Each optional
//! component is initialized independently: a failure is logged and the
//! service degrades rather than refusing to start.

use std::sync::Arc;
use tracing::{info, warn};

use legalflash_core::{AppConfig, Result, StoreCategory};
use legalflash_core::RelevanceModel;
use legalflash_query::prelude::{
    FastEmbedRelevanceModel, FastEmbedder, MultiRetriever, PersistedVectorStore, QueryRewriter,
    RagPipeline, Reranker, StoreRegistry, VllmClient,
};

use crate::monitoring::MetricsCollector;

/// Which optional components came up at startup.
#[derive(Debug, Clone, Copy, serde::Serialize)]
pub struct ComponentStatus {
    /// Query rewriting is available.
    pub query_rewriter: bool,
    /// A reranker instance exists for this process.
    pub reranker: bool,
    /// The embedding model loaded.
    pub embeddings: bool,
    /// The inference client was constructed.
    pub inference_client: bool,
}

/// Process-wide state shared by every request handler.
#[derive(Debug)]
pub struct AppContext {
    /// Service configuration.
    pub config: AppConfig,
    /// The retrieval pipeline.
    pub pipeline: RagPipeline,
    /// Category → store registry, built once at startup.
    pub registry: StoreRegistry,
    /// Request metrics and host telemetry.
    pub metrics: Arc<MetricsCollector>,
    /// Optional-component availability.
    pub components: ComponentStatus,
}

impl AppContext {
    /// Initialize every component and assemble the context.
    ///
    /// # Errors
    ///
    /// Returns an error only for invalid configuration; component failures
    /// degrade the service instead of aborting startup.
    pub fn initialize(config: AppConfig) -> Result<Arc<Self>> {
        config.validate()?;

        let metrics = Arc::new(MetricsCollector::with_capacity(
            config.inference_url.clone(),
            config.metrics_capacity,
        ));

        let generation_client =
            VllmClient::new(&config.inference_url).with_timeout(config.generation_timeout());
        let rewrite_client = generation_client
            .clone()
            .with_timeout(config.rewrite_timeout());

        // The embedding model is shared by every store; without it no
        // knowledge base can answer queries.
        let embedder: Option<Arc<FastEmbedder>> = match FastEmbedder::new(&config.embedding_model)
        {
            Ok(embedder) => {
                info!("embedding model ready: {}", config.embedding_model);
                Some(Arc::new(embedder))
            }
            Err(e) => {
                warn!("embedding model failed to load: {e}");
                None
            }
        };

        // Each category loads independently; an unavailable store is
        // simply absent from the active set.
        let mut registry = StoreRegistry::new();
        if let Some(embedder) = &embedder {
            for category in StoreCategory::ALL {
                let dir = config.store_dir(category);
                match PersistedVectorStore::load(&dir, category, embedder.clone()) {
                    Ok(Some(store)) => registry.insert(Arc::new(store)),
                    Ok(None) => {
                        info!(
                            "{} knowledge base not present at {}",
                            category.label(),
                            dir.display()
                        );
                    }
                    Err(e) => {
                        warn!("{} knowledge base failed to load: {e}", category.label());
                    }
                }
            }
        }
        match registry.available() {
            0 => warn!("no knowledge base loaded; chat requests will be refused"),
            n => info!("{n} knowledge base(s) active"),
        }

        let rewriter = QueryRewriter::new(Arc::new(rewrite_client));

        let reranker = match FastEmbedRelevanceModel::new(&config.rerank_model) {
            Ok(model) => {
                info!("rerank model ready: {}", model.model_name());
                Some(Reranker::new(Arc::new(model)))
            }
            Err(e) => {
                warn!("reranker initialization failed: {e}; rerank stage will be skipped");
                None
            }
        };

        let components = ComponentStatus {
            query_rewriter: true,
            reranker: reranker.is_some(),
            embeddings: embedder.is_some(),
            inference_client: true,
        };

        let retriever = MultiRetriever::new(&registry, reranker.is_some());
        let mut pipeline =
            RagPipeline::new(Arc::new(generation_client), retriever).with_rewriter(rewriter);
        if let Some(reranker) = reranker {
            pipeline = pipeline.with_reranker(reranker);
        }

        Ok(Arc::new(Self {
            config,
            pipeline,
            registry,
            metrics,
            components,
        }))
    }
}
