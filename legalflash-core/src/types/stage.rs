//! Per-stage pipeline outcomes.
//!
//! The orchestrator threads an explicit outcome through every fallible
//! stage instead of collapsing failures into default behavior, so callers
//! and tests can see which branch fired rather than inferring it from the
//! final response text.

use serde::{Deserialize, Serialize};

/// Outcome of one pipeline stage.
#[derive(Debug, Clone, PartialEq)]
pub enum StageOutcome<T> {
    /// The stage ran and produced its value.
    Success(T),
    /// The stage failed but degraded to a usable value.
    Fallback {
        /// The value used in place of the stage's output.
        value: T,
        /// Why the fallback fired.
        reason: String,
    },
    /// The stage failed and the pipeline cannot continue past it.
    Failed {
        /// Why the stage failed.
        reason: String,
    },
}

impl<T> StageOutcome<T> {
    /// The stage's value, if it produced one (success or fallback).
    pub fn value(&self) -> Option<&T> {
        match self {
            Self::Success(value) | Self::Fallback { value, .. } => Some(value),
            Self::Failed { .. } => None,
        }
    }

    /// Whether the fallback branch fired.
    #[must_use]
    pub fn is_fallback(&self) -> bool {
        matches!(self, Self::Fallback { .. })
    }

    /// Whether the stage failed hard.
    #[must_use]
    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed { .. })
    }
}

/// How the rerank stage resolved for one request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RerankDisposition {
    /// The relevance model scored and reordered the candidates.
    Applied,
    /// Candidate count was at or below the threshold; retrieval order kept.
    SkippedFewCandidates,
    /// No reranker instance exists for this process.
    SkippedUnavailable,
    /// The model call failed; retrieval-order top-k used instead.
    FailedFellBack,
}

/// A record of which branch each stage took for one request.
///
/// Collected by the orchestrator alongside the response; the server logs
/// it, tests assert on it.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineTrace {
    /// Search query actually sent to the stores (original or rewritten).
    pub search_query: String,

    /// Whether the rewrite stage fell back to the original query.
    pub rewrite_fallback: bool,

    /// Number of candidates aggregated across stores, by store label.
    pub retrieved_per_store: Vec<(String, usize)>,

    /// How the rerank stage resolved.
    pub rerank: RerankDisposition,

    /// Number of passages stuffed into the prompt.
    pub context_passages: usize,
}

impl PipelineTrace {
    /// Total candidates aggregated across all stores.
    #[must_use]
    pub fn total_retrieved(&self) -> usize {
        self.retrieved_per_store.iter().map(|(_, n)| n).sum()
    }
}
