//! Core data types for the LegalFlash service.
//!
//! This module contains the data structures that flow through the retrieval
//! pipeline: document chunks and retrieval results, chat wire types, and
//! per-stage pipeline outcomes.

pub mod chat;
pub mod chunk;
pub mod stage;

// Re-export all types for convenience
pub use chat::*;
pub use chunk::*;
pub use stage::*;
