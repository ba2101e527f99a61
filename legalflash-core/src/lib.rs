//! # LegalFlash Core
//!
//! Core traits, types, and interfaces for LegalFlash, a retrieval-augmented
//! generation service for legal question answering.
//!
//! This crate provides the foundational building blocks shared by the query
//! pipeline and the HTTP server:
//!
//! - **Data structures**: document chunks, retrieval/rerank results, chat
//!   wire types, per-stage pipeline outcomes
//! - **Core traits**: `CompletionClient`, `Embedder`, `KnowledgeStore`,
//!   `RelevanceModel`
//! - **Configuration**: env-driven service settings
//! - **Error handling**: comprehensive error types with context
//!
//! ## Architecture
//!
//! The pipeline consumes its collaborators through narrow trait seams:
//!
//! - A **completion client** talks to the external model-serving endpoint
//! - An **embedder** turns text into vectors shared by all stores
//! - **Knowledge stores** answer nearest-neighbor queries per category
//! - A **relevance model** scores (query, passage) pairs for reranking

#![deny(missing_docs)]
#![warn(clippy::all, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod error;
pub mod traits;
pub mod types;

// Re-export key types at crate root for convenience
pub use config::AppConfig;
pub use error::{LegalFlashError, Result};
pub use types::{
    ChatRequest, ChatResponse, CompletionOptions, DocumentChunk, PipelineTrace, RerankDisposition,
    RerankedResult, RetrievalResult, SourcePreview, StageOutcome, StoreCategory, StreamEvent,
};

// Re-export traits for convenience
pub use traits::*;

/// Version information for the LegalFlash core library.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Name of the LegalFlash core library.
pub const NAME: &str = env!("CARGO_PKG_NAME");
