//! The RAG pipeline orchestrator.
//!
//! Sequences rewrite → retrieve → rerank-or-skip → prompt assembly →
//! generate for one chat request, enforcing per-stage fallback. Every
//! stage's failure is caught here and mapped to a user-visible diagnostic
//! string; no stage error reaches the HTTP layer as a protocol fault.
//!
//! State machine per request, terminal states in brackets:
//!
//! ```text
//! START → REWRITE → RETRIEVE → [empty: return early] → RERANK_OR_SKIP
//!       → PROMPT_BUILD → GENERATE → [stream done | buffered done | error]
//! ```

use futures::Stream;
use futures_util::StreamExt;
use std::pin::Pin;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{error, info, instrument, warn};

use legalflash_core::{
    traits::CompletionClient,
    types::{
        ChatRequest, ChatResponse, CompletionOptions, PipelineTrace, RerankDisposition,
        SourcePreview, StageOutcome, StreamEvent,
    },
};

use crate::prompts::build_answer_prompt;
use crate::reranker::Reranker;
use crate::retriever::MultiRetriever;
use crate::rewriter::QueryRewriter;

/// Response when no knowledge base is loaded.
pub const KB_NOT_LOADED_MSG: &str = "❌ 错误: 知识库未加载，请先运行 legalflash ingest 构建知识库";

/// Response when retrieval produced no candidates.
pub const NO_DOCUMENTS_MSG: &str = "❌ 未检索到相关文档，请尝试其他问题";

/// Configuration for pipeline behavior.
#[derive(Debug, Clone)]
pub struct RagPipelineConfig {
    /// Rerank only when the candidate count exceeds this threshold; at or
    /// below it the model cannot change which items are selected.
    pub rerank_skip_threshold: usize,

    /// Number of passages stuffed into the prompt.
    pub final_top_k: usize,
}

impl Default for RagPipelineConfig {
    fn default() -> Self {
        Self {
            rerank_skip_threshold: 5,
            final_top_k: 5,
        }
    }
}

/// The result of one buffered pipeline run.
#[derive(Debug)]
pub struct PipelineReply {
    /// The response body sent to the client.
    pub response: ChatResponse,

    /// Which branch each stage took; `None` when the pipeline
    /// short-circuited before any stage ran.
    pub trace: Option<PipelineTrace>,

    /// Whether the request counts as a success for metrics purposes.
    pub success: bool,
}

impl PipelineReply {
    fn failure<S: Into<String>>(message: S, trace: Option<PipelineTrace>) -> Self {
        Self {
            response: ChatResponse::message(message),
            trace,
            success: false,
        }
    }
}

/// A request that made it through every pre-generation stage.
#[derive(Debug)]
pub struct ReadyGeneration {
    /// The fully-assembled prompt.
    pub prompt: String,

    /// Source previews for the selected passages, 1-based.
    pub sources: Vec<SourcePreview>,

    /// Generation settings from the request.
    pub options: CompletionOptions,

    /// Stage trace so far.
    pub trace: PipelineTrace,
}

/// Outcome of the pre-generation stages.
#[derive(Debug)]
pub enum Prepared {
    /// The pipeline short-circuited; respond without calling the backend.
    Early(PipelineReply),

    /// All pre-generation stages passed; generation can run.
    Ready(ReadyGeneration),
}

/// A stream of chat events: one `start`, zero or more `chunk`s, one
/// terminal `done` or `error`.
pub type EventStream = Pin<Box<dyn Stream<Item = StreamEvent> + Send>>;

/// Orchestrates the full retrieval-augmented generation flow.
#[derive(Debug, Clone)]
pub struct RagPipeline {
    client: Arc<dyn CompletionClient>,
    rewriter: Option<QueryRewriter>,
    retriever: MultiRetriever,
    reranker: Option<Reranker>,
    config: RagPipelineConfig,
}

impl RagPipeline {
    /// Create a pipeline with no rewriter or reranker.
    pub fn new(client: Arc<dyn CompletionClient>, retriever: MultiRetriever) -> Self {
        Self {
            client,
            rewriter: None,
            retriever,
            reranker: None,
            config: RagPipelineConfig::default(),
        }
    }

    /// Attach a query rewriter.
    #[must_use]
    pub fn with_rewriter(mut self, rewriter: QueryRewriter) -> Self {
        self.rewriter = Some(rewriter);
        self
    }

    /// Attach a reranker.
    #[must_use]
    pub fn with_reranker(mut self, reranker: Reranker) -> Self {
        self.reranker = Some(reranker);
        self
    }

    /// Override the pipeline configuration.
    #[must_use]
    pub fn with_config(mut self, config: RagPipelineConfig) -> Self {
        self.config = config;
        self
    }

    /// Whether a reranker instance exists for this process.
    #[must_use]
    pub fn has_reranker(&self) -> bool {
        self.reranker.is_some()
    }

    /// Run the pre-generation stages: rewrite, retrieve, rerank-or-skip,
    /// prompt assembly.
    #[instrument(skip(self, request), fields(query = %request.query))]
    pub async fn prepare(&self, request: &ChatRequest) -> Prepared {
        info!("received query: {}", request.query);

        if self.retriever.store_count() == 0 {
            return Prepared::Early(PipelineReply::failure(KB_NOT_LOADED_MSG, None));
        }

        // REWRITE: never fails the pipeline; any failure substitutes the
        // original query.
        let (search_query, rewrite_fallback) = match &self.rewriter {
            Some(rewriter) => match rewriter.rewrite(&request.query).await {
                StageOutcome::Success(q) => (q, false),
                StageOutcome::Fallback { value, reason } => {
                    warn!("rewrite fell back to original query: {reason}");
                    (value, true)
                }
                // The rewriter never returns Failed; guard anyway.
                StageOutcome::Failed { reason } => {
                    warn!("rewrite failed: {reason}");
                    (request.query.clone(), true)
                }
            },
            None => (request.query.clone(), false),
        };

        // RETRIEVE: a thrown retrieval maps to a retrieval-error response.
        let results = match self.retriever.retrieve(&search_query).await {
            Ok(results) => results,
            Err(e) => {
                error!("retrieval failed: {e}");
                return Prepared::Early(PipelineReply::failure(
                    format!("❌ 检索失败: {e}"),
                    None,
                ));
            }
        };

        let retrieved_per_store = count_per_store(&results);

        if results.is_empty() {
            return Prepared::Early(PipelineReply::failure(
                NO_DOCUMENTS_MSG,
                Some(PipelineTrace {
                    search_query,
                    rewrite_fallback,
                    retrieved_per_store,
                    rerank: RerankDisposition::SkippedFewCandidates,
                    context_passages: 0,
                }),
            ));
        }

        // RERANK_OR_SKIP: reranking judges relevance against the original
        // question, not the rewritten search query.
        let contents: Vec<String> = results.iter().map(|r| r.chunk.content.clone()).collect();
        let (passages, rerank) = if let Some(reranker) = &self.reranker {
            if contents.len() > self.config.rerank_skip_threshold {
                match reranker
                    .rerank_with_metadata(&request.query, &results, self.config.final_top_k)
                    .await
                {
                    Ok(reranked) => {
                        info!(
                            "rerank selected top {} of {} documents",
                            reranked.len(),
                            contents.len()
                        );
                        (
                            reranked.into_iter().map(|r| r.content).collect::<Vec<_>>(),
                            RerankDisposition::Applied,
                        )
                    }
                    Err(e) => {
                        warn!("rerank failed, using retrieval order: {e}");
                        (
                            contents
                                .iter()
                                .take(self.config.final_top_k)
                                .cloned()
                                .collect(),
                            RerankDisposition::FailedFellBack,
                        )
                    }
                }
            } else {
                info!(
                    "few candidates ({}), skipping rerank",
                    contents.len()
                );
                (
                    contents
                        .iter()
                        .take(self.config.final_top_k)
                        .cloned()
                        .collect(),
                    RerankDisposition::SkippedFewCandidates,
                )
            }
        } else {
            (
                contents
                    .iter()
                    .take(self.config.final_top_k)
                    .cloned()
                    .collect::<Vec<_>>(),
                RerankDisposition::SkippedUnavailable,
            )
        };

        // PROMPT_BUILD
        let prompt = build_answer_prompt(&passages, &request.query);
        let sources = passages
            .iter()
            .enumerate()
            .map(|(i, doc)| SourcePreview::from_content(doc, i + 1))
            .collect();

        Prepared::Ready(ReadyGeneration {
            prompt,
            sources,
            options: CompletionOptions::from_request(request),
            trace: PipelineTrace {
                search_query,
                rewrite_fallback,
                retrieved_per_store,
                rerank,
                context_passages: passages.len(),
            },
        })
    }

    /// GENERATE, buffered: one completion call, full response at once.
    pub async fn generate(&self, ready: ReadyGeneration) -> PipelineReply {
        match self.client.complete(&ready.prompt, &ready.options).await {
            Ok(text) => {
                info!(
                    "pipeline complete: rewrite → retrieve({}) → rerank({:?}) → generate",
                    ready.trace.total_retrieved(),
                    ready.trace.rerank
                );
                PipelineReply {
                    response: ChatResponse {
                        response: text,
                        sources: ready.sources,
                    },
                    trace: Some(ready.trace),
                    success: true,
                }
            }
            Err(e) => {
                error!("generation failed: {e}");
                PipelineReply::failure(format!("❌ 生成失败: {e}"), Some(ready.trace))
            }
        }
    }

    /// GENERATE, streaming: a `start` event, incremental `chunk` events,
    /// then a terminal `done` (with sources) or `error` event.
    ///
    /// Each event is yielded as soon as the backend produces it. Dropping
    /// the stream stops the generation loop and releases the backend
    /// connection.
    pub fn generate_stream(&self, ready: ReadyGeneration) -> EventStream {
        let client = Arc::clone(&self.client);
        let (tx, rx) = mpsc::channel::<StreamEvent>(32);

        tokio::spawn(async move {
            if tx.send(StreamEvent::Start).await.is_err() {
                return;
            }

            let mut upstream = match client.complete_stream(&ready.prompt, &ready.options).await {
                Ok(stream) => stream,
                Err(e) => {
                    error!("streaming generation failed to start: {e}");
                    let _ = tx
                        .send(StreamEvent::Error {
                            error: e.to_string(),
                        })
                        .await;
                    return;
                }
            };

            while let Some(item) = upstream.next().await {
                match item {
                    Ok(text) => {
                        if tx.send(StreamEvent::Chunk { text }).await.is_err() {
                            // Client went away; stop consuming upstream.
                            return;
                        }
                    }
                    Err(e) => {
                        error!("streaming generation interrupted: {e}");
                        let _ = tx
                            .send(StreamEvent::Error {
                                error: e.to_string(),
                            })
                            .await;
                        return;
                    }
                }
            }

            let _ = tx
                .send(StreamEvent::Done {
                    sources: ready.sources,
                })
                .await;
        });

        Box::pin(ReceiverStream::new(rx))
    }

    /// Run the whole pipeline buffered: prepare + generate.
    pub async fn chat(&self, request: &ChatRequest) -> PipelineReply {
        match self.prepare(request).await {
            Prepared::Early(reply) => reply,
            Prepared::Ready(ready) => self.generate(ready).await,
        }
    }
}

/// Count aggregated candidates by store label, preserving first-seen order.
fn count_per_store(
    results: &[legalflash_core::types::RetrievalResult],
) -> Vec<(String, usize)> {
    let mut counts: Vec<(String, usize)> = Vec::new();
    for result in results {
        match counts.iter_mut().find(|(label, _)| *label == result.store_label) {
            Some((_, n)) => *n += 1,
            None => counts.push((result.store_label.clone(), 1)),
        }
    }
    counts
}
