//! HTTP serving surface for the LegalFlash RAG service.
//!
//! Exposes the chat endpoint (buffered JSON or server-sent events), a
//! health endpoint reporting per-component status, and metrics endpoints
//! in JSON and Prometheus exposition formats.

#![deny(missing_docs)]
#![warn(clippy::all, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod context;
pub mod monitoring;
pub mod routes;

pub use context::{AppContext, ComponentStatus};
pub use monitoring::MetricsCollector;
pub use routes::router;
