//! Trait seams to the service's external collaborators.
//!
//! Each trait covers exactly the surface the retrieval pipeline consumes:
//! a completion endpoint, an embedding function, a nearest-neighbor store,
//! and a pairwise relevance model. Concrete implementations live in
//! `legalflash-query`; tests substitute hand-rolled mocks.

pub mod completion;
pub mod embedder;
pub mod rerank;
pub mod store;

pub use completion::{CompletionClient, CompletionStream};
pub use embedder::Embedder;
pub use rerank::RelevanceModel;
pub use store::KnowledgeStore;
