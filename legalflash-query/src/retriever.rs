//! Multi-store retrieval.
//!
//! The service holds up to three independently-loaded knowledge stores
//! (law, case, judgement). Retrieval fans the search query out to every
//! active store and concatenates the results with provenance labels;
//! cross-store ordering is left to the rerank stage.

use std::sync::Arc;
use tracing::{info, warn};

use legalflash_core::{
    traits::KnowledgeStore,
    types::{RetrievalResult, StoreCategory},
    Result,
};

/// Per-store candidate count when two or more stores are active.
pub const MULTI_STORE_K: usize = 50;

/// Candidate count for a single store feeding a rerank stage.
pub const SINGLE_STORE_K_RERANKED: usize = 50;

/// Candidate count for a single store with no rerank stage downstream.
pub const SINGLE_STORE_K_PLAIN: usize = 3;

/// Fixed-size registry of category → optional store handle.
///
/// Built once at startup: each category's store is loaded independently,
/// and a store that failed to load is simply absent. The registry is
/// inspected once to build the active retriever list, with no runtime probing.
#[derive(Debug, Default, Clone)]
pub struct StoreRegistry {
    law: Option<Arc<dyn KnowledgeStore>>,
    case: Option<Arc<dyn KnowledgeStore>>,
    judgement: Option<Arc<dyn KnowledgeStore>>,
}

impl StoreRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a store under its category.
    pub fn insert(&mut self, store: Arc<dyn KnowledgeStore>) {
        match store.category() {
            StoreCategory::Law => self.law = Some(store),
            StoreCategory::Case => self.case = Some(store),
            StoreCategory::Judgement => self.judgement = Some(store),
        }
    }

    /// The store for a category, if it loaded.
    #[must_use]
    pub fn get(&self, category: StoreCategory) -> Option<&Arc<dyn KnowledgeStore>> {
        match category {
            StoreCategory::Law => self.law.as_ref(),
            StoreCategory::Case => self.case.as_ref(),
            StoreCategory::Judgement => self.judgement.as_ref(),
        }
    }

    /// Whether a category's store is loaded.
    #[must_use]
    pub fn is_loaded(&self, category: StoreCategory) -> bool {
        self.get(category).is_some()
    }

    /// Number of loaded stores.
    #[must_use]
    pub fn available(&self) -> usize {
        StoreCategory::ALL
            .iter()
            .filter(|c| self.is_loaded(**c))
            .count()
    }

    /// All loaded stores, in category order.
    #[must_use]
    pub fn active(&self) -> Vec<Arc<dyn KnowledgeStore>> {
        StoreCategory::ALL
            .iter()
            .filter_map(|c| self.get(*c).cloned())
            .collect()
    }
}

/// Fans a search query out across the active knowledge stores.
#[derive(Debug, Clone)]
pub struct MultiRetriever {
    stores: Vec<Arc<dyn KnowledgeStore>>,
    rerank_downstream: bool,
}

impl MultiRetriever {
    /// Build a retriever over the registry's active stores.
    ///
    /// `rerank_downstream` widens the single-store candidate count when a
    /// rerank stage will cut the set down afterwards.
    #[must_use]
    pub fn new(registry: &StoreRegistry, rerank_downstream: bool) -> Self {
        Self {
            stores: registry.active(),
            rerank_downstream,
        }
    }

    /// Number of active stores.
    #[must_use]
    pub fn store_count(&self) -> usize {
        self.stores.len()
    }

    /// Retrieve candidates for the search query from every active store.
    ///
    /// With two or more stores, each is queried for its top
    /// [`MULTI_STORE_K`] and the results are concatenated (not merged by
    /// score) in category order, labeled by source store. With exactly one
    /// store its results alone are returned. With zero stores the result is
    /// empty; callers short-circuit before retrieval in that case.
    ///
    /// Fan-out is sequential and a failing store call aborts the whole
    /// retrieval step; the orchestrator converts the error into a
    /// retrieval-error response.
    pub async fn retrieve(&self, search_query: &str) -> Result<Vec<RetrievalResult>> {
        match self.stores.len() {
            0 => {
                warn!("retrieval requested with no knowledge store loaded");
                Ok(Vec::new())
            }
            1 => {
                let store = &self.stores[0];
                let k = if self.rerank_downstream {
                    SINGLE_STORE_K_RERANKED
                } else {
                    SINGLE_STORE_K_PLAIN
                };
                let results = Self::query_store(store, search_query, k).await?;
                info!(
                    "retrieval complete: {} documents from {}",
                    results.len(),
                    store.category().label()
                );
                Ok(results)
            }
            _ => {
                let mut aggregated = Vec::new();
                let mut per_store = Vec::new();
                for store in &self.stores {
                    let results = Self::query_store(store, search_query, MULTI_STORE_K).await?;
                    per_store.push(format!("{}: {}", store.category().label(), results.len()));
                    aggregated.extend(results);
                }
                info!(
                    "retrieval complete ({}), {} documents total",
                    per_store.join(", "),
                    aggregated.len()
                );
                Ok(aggregated)
            }
        }
    }

    async fn query_store(
        store: &Arc<dyn KnowledgeStore>,
        search_query: &str,
        k: usize,
    ) -> Result<Vec<RetrievalResult>> {
        let label = store.category().label().to_string();
        let chunks = store.query(search_query, k).await?;
        Ok(chunks
            .into_iter()
            .map(|(chunk, score)| RetrievalResult {
                chunk,
                retrieval_score: score,
                store_label: label.clone(),
            })
            .collect())
    }
}
