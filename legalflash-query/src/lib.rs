//! Query processing and retrieval for the LegalFlash RAG service.
//!
//! This crate implements the request-processing pipeline that takes a raw
//! user question and produces a grounded answer:
//!
//! - **Query rewriting**: conversational question → terse retrieval
//!   keywords, with silent fallback to the original query
//! - **Multi-store retrieval**: fan-out across the loaded knowledge bases
//!   with provenance labels
//! - **Reranking**: cross-encoder second-pass scoring, skipped when the
//!   candidate set is too small to matter
//! - **Orchestration**: per-stage fallback, prompt assembly, and both
//!   buffered and streaming generation
//!
//! # Architecture
//!
//! ```text
//! Query → Rewriter → MultiRetriever → Reranker → prompt → CompletionClient
//!                        ↓                                      ↓
//!                  KnowledgeStores                     buffered / SSE stream
//! ```

#![deny(missing_docs)]
#![warn(clippy::all, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod client;
pub mod embedder;
pub mod pipeline;
pub mod prompts;
pub mod reranker;
pub mod retriever;
pub mod rewriter;
pub mod store;

/// Re-export commonly used types and traits.
pub mod prelude {
    pub use crate::client::VllmClient;
    pub use crate::embedder::FastEmbedder;
    pub use crate::pipeline::{
        EventStream, PipelineReply, Prepared, RagPipeline, RagPipelineConfig, ReadyGeneration,
        KB_NOT_LOADED_MSG, NO_DOCUMENTS_MSG,
    };
    pub use crate::reranker::{FastEmbedRelevanceModel, Reranker};
    pub use crate::retriever::{MultiRetriever, StoreRegistry};
    pub use crate::rewriter::QueryRewriter;
    pub use crate::store::PersistedVectorStore;

    // Re-export core types
    pub use legalflash_core::*;
}
