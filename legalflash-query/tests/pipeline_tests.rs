//! End-to-end pipeline tests over mock collaborators.
//!
//! These exercise the orchestrator's stage sequencing and fallback policy
//! without a real inference backend, embedding model, or on-disk store.

use async_trait::async_trait;
use futures_util::StreamExt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use legalflash_core::{
    traits::{CompletionClient, CompletionStream, KnowledgeStore, RelevanceModel},
    types::{ChatRequest, CompletionOptions, DocumentChunk, RerankDisposition, StoreCategory},
    LegalFlashError, Result, StreamEvent,
};
use legalflash_query::pipeline::{
    Prepared, RagPipeline, KB_NOT_LOADED_MSG, NO_DOCUMENTS_MSG,
};
use legalflash_query::reranker::Reranker;
use legalflash_query::retriever::{MultiRetriever, StoreRegistry};
use legalflash_query::rewriter::QueryRewriter;

/// Completion client with a fixed buffered answer and scripted stream
/// chunks.
#[derive(Debug)]
struct MockLlm {
    answer: String,
    chunks: Vec<String>,
    fail: bool,
}

impl MockLlm {
    fn answering(chunks: &[&str]) -> Arc<Self> {
        Arc::new(Self {
            answer: chunks.concat(),
            chunks: chunks.iter().map(|s| (*s).to_string()).collect(),
            fail: false,
        })
    }

    fn failing() -> Arc<Self> {
        Arc::new(Self {
            answer: String::new(),
            chunks: Vec::new(),
            fail: true,
        })
    }
}

#[async_trait]
impl CompletionClient for MockLlm {
    async fn complete(&self, _prompt: &str, _options: &CompletionOptions) -> Result<String> {
        if self.fail {
            return Err(LegalFlashError::inference("connection refused"));
        }
        Ok(self.answer.clone())
    }

    async fn complete_stream(
        &self,
        _prompt: &str,
        _options: &CompletionOptions,
    ) -> Result<CompletionStream> {
        if self.fail {
            return Err(LegalFlashError::inference("connection refused"));
        }
        let chunks: Vec<Result<String>> = self.chunks.iter().cloned().map(Ok).collect();
        Ok(Box::pin(futures::stream::iter(chunks)))
    }

    fn endpoint(&self) -> &str {
        "mock"
    }
}

/// Knowledge store with fixed chunks, optionally failing every query.
#[derive(Debug)]
struct FixedStore {
    category: StoreCategory,
    chunks: Vec<String>,
    fail: bool,
}

impl FixedStore {
    fn with_chunks(category: StoreCategory, chunks: &[&str]) -> Arc<dyn KnowledgeStore> {
        Arc::new(Self {
            category,
            chunks: chunks.iter().map(|s| (*s).to_string()).collect(),
            fail: false,
        })
    }

    fn numbered(category: StoreCategory, count: usize) -> Arc<dyn KnowledgeStore> {
        let chunks: Vec<String> = (0..count)
            .map(|i| format!("{} 文档 {i}", category.label()))
            .collect();
        Arc::new(Self {
            category,
            chunks,
            fail: false,
        })
    }

    fn failing(category: StoreCategory) -> Arc<dyn KnowledgeStore> {
        Arc::new(Self {
            category,
            chunks: Vec::new(),
            fail: true,
        })
    }
}

#[async_trait]
impl KnowledgeStore for FixedStore {
    async fn query(&self, _text: &str, k: usize) -> Result<Vec<(DocumentChunk, f32)>> {
        if self.fail {
            return Err(LegalFlashError::knowledge_base("index unreadable"));
        }
        Ok(self
            .chunks
            .iter()
            .take(k)
            .enumerate()
            .map(|(i, c)| (DocumentChunk::new(c.clone()), 1.0 - i as f32 * 0.001))
            .collect())
    }

    fn category(&self) -> StoreCategory {
        self.category
    }

    fn len(&self) -> usize {
        self.chunks.len()
    }
}

/// Relevance model that counts invocations and scores by trailing number.
#[derive(Debug, Default)]
struct CountingModel {
    calls: AtomicUsize,
}

#[async_trait]
impl RelevanceModel for CountingModel {
    async fn score(&self, _query: &str, documents: &[&str]) -> Result<Vec<f32>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(documents
            .iter()
            .map(|doc| {
                doc.split_whitespace()
                    .last()
                    .and_then(|w| w.parse::<f32>().ok())
                    .unwrap_or(0.0)
            })
            .collect())
    }

    fn model_name(&self) -> &str {
        "counting"
    }
}

fn registry_of(stores: Vec<Arc<dyn KnowledgeStore>>) -> StoreRegistry {
    let mut registry = StoreRegistry::new();
    for store in stores {
        registry.insert(store);
    }
    registry
}

// One store with 3 matching chunks, candidate count at or below the skip
// threshold: reranking is bypassed with no model call and the answer
// cites passages 1..=3 in retrieval order.
#[tokio::test]
async fn few_candidates_skip_rerank_without_model_call() {
    let registry = registry_of(vec![FixedStore::with_chunks(
        StoreCategory::Law,
        &[
            "第六百七十六条 借款人未按照约定的期限返还借款的，应当按照约定或者国家有关规定支付逾期利息。",
            "第五百七十七条 当事人一方不履行合同义务的，应当承担继续履行、采取补救措施或者赔偿损失等违约责任。",
            "第五百八十五条 当事人可以约定一方违约时应当根据违约情况向对方支付一定数额的违约金。",
        ],
    )]);
    let model = Arc::new(CountingModel::default());
    let pipeline = RagPipeline::new(
        MockLlm::answering(&["根据《民法典》相关规定，逾期支付本金应承担违约责任。"]),
        MultiRetriever::new(&registry, true),
    )
    .with_reranker(Reranker::new(model.clone()));

    let request = ChatRequest::new("如果甲方逾期支付本金，需要承担什么违约责任？");
    let reply = pipeline.chat(&request).await;

    assert!(reply.success);
    assert!(reply.response.response.contains("违约责任"));
    assert_eq!(reply.response.sources.len(), 3);
    let indices: Vec<usize> = reply.response.sources.iter().map(|s| s.index).collect();
    assert_eq!(indices, vec![1, 2, 3]);

    let trace = reply.trace.expect("trace present");
    assert_eq!(trace.rerank, RerankDisposition::SkippedFewCandidates);
    // No model invocation below the threshold.
    assert_eq!(model.calls.load(Ordering::SeqCst), 0);
}

// Zero stores loaded: fixed apology, recorded as a failure for metrics.
#[tokio::test]
async fn no_knowledge_base_short_circuits() {
    let registry = StoreRegistry::new();
    let pipeline = RagPipeline::new(
        MockLlm::answering(&["unused"]),
        MultiRetriever::new(&registry, false),
    );

    let reply = pipeline.chat(&ChatRequest::new("任意问题")).await;
    assert!(!reply.success);
    assert_eq!(reply.response.response, KB_NOT_LOADED_MSG);
    assert!(reply.response.sources.is_empty());
    assert!(reply.trace.is_none());
}

// The rewrite call fails; generation proceeds with the original query
// and no error surfaces to the client.
#[tokio::test]
async fn rewrite_failure_degrades_silently() {
    let registry = registry_of(vec![FixedStore::with_chunks(
        StoreCategory::Case,
        &["某借款合同纠纷案：法院判决被告支付逾期利息。"],
    )]);
    let pipeline = RagPipeline::new(
        MockLlm::answering(&["可以主张逾期利息。"]),
        MultiRetriever::new(&registry, false),
    )
    .with_rewriter(QueryRewriter::new(MockLlm::failing()));

    let request = ChatRequest::new("对方不还钱怎么办？");
    let reply = pipeline.chat(&request).await;

    assert!(reply.success);
    assert_eq!(reply.response.response, "可以主张逾期利息。");
    let trace = reply.trace.expect("trace present");
    assert!(trace.rewrite_fallback);
    assert_eq!(trace.search_query, "对方不还钱怎么办？");
}

// 50 candidates from 2 stores with rerank enabled: exactly 5 results,
// all traceable to the retrieved set, model invoked.
#[tokio::test]
async fn rerank_cuts_fifty_candidates_to_five() {
    let registry = registry_of(vec![
        FixedStore::numbered(StoreCategory::Law, 25),
        FixedStore::numbered(StoreCategory::Case, 25),
    ]);
    let model = Arc::new(CountingModel::default());
    let pipeline = RagPipeline::new(
        MockLlm::answering(&["综合法条与案例，答复如下。"]),
        MultiRetriever::new(&registry, true),
    )
    .with_reranker(Reranker::new(model.clone()));

    let request = ChatRequest::new("违约金的上限是多少？");
    let reply = pipeline.chat(&request).await;

    assert!(reply.success);
    assert_eq!(reply.response.sources.len(), 5);
    for source in &reply.response.sources {
        assert!(
            source.content.starts_with("法条 文档") || source.content.starts_with("案例 文档"),
            "source not traceable: {}",
            source.content
        );
    }

    let trace = reply.trace.expect("trace present");
    assert_eq!(trace.rerank, RerankDisposition::Applied);
    assert_eq!(trace.total_retrieved(), 50);
    assert_eq!(trace.context_passages, 5);
    assert!(model.calls.load(Ordering::SeqCst) > 0);

    // The model scores by trailing number, so the top documents are the
    // highest-numbered ones from each store.
    assert!(reply.response.sources[0].content.ends_with("24"));
}

// A failing store call aborts retrieval and maps to the retrieval-error
// response, not a protocol error.
#[tokio::test]
async fn retrieval_failure_maps_to_error_response() {
    let registry = registry_of(vec![
        FixedStore::numbered(StoreCategory::Law, 10),
        FixedStore::failing(StoreCategory::Judgement),
    ]);
    let pipeline = RagPipeline::new(
        MockLlm::answering(&["unused"]),
        MultiRetriever::new(&registry, false),
    );

    let reply = pipeline.chat(&ChatRequest::new("问题")).await;
    assert!(!reply.success);
    assert!(reply.response.response.starts_with("❌ 检索失败"));
}

// A store that answers with nothing yields the fixed no-documents reply.
#[tokio::test]
async fn empty_retrieval_short_circuits() {
    let registry = registry_of(vec![FixedStore::with_chunks(StoreCategory::Law, &[])]);
    let pipeline = RagPipeline::new(
        MockLlm::answering(&["unused"]),
        MultiRetriever::new(&registry, false),
    );

    let reply = pipeline.chat(&ChatRequest::new("冷门问题")).await;
    assert!(!reply.success);
    assert_eq!(reply.response.response, NO_DOCUMENTS_MSG);
    assert_eq!(reply.trace.expect("trace").context_passages, 0);
}

// Generation failure is caught and mapped to a diagnostic string.
#[tokio::test]
async fn generation_failure_maps_to_error_response() {
    let registry = registry_of(vec![FixedStore::with_chunks(
        StoreCategory::Law,
        &["第一条"],
    )]);
    let pipeline = RagPipeline::new(
        MockLlm::failing(),
        MultiRetriever::new(&registry, false),
    );

    let reply = pipeline.chat(&ChatRequest::new("问题")).await;
    assert!(!reply.success);
    assert!(reply.response.response.starts_with("❌ 生成失败"));
}

// The stream is exactly one start, chunks, one terminal done; chunk
// concatenation equals the buffered response for the same inputs.
#[tokio::test]
async fn streaming_event_order_and_equivalence() {
    let registry = registry_of(vec![FixedStore::with_chunks(
        StoreCategory::Law,
        &["第五百条 当事人应当遵循诚信原则。"],
    )]);
    let client = MockLlm::answering(&["根据", "《民法典》", "第五百条，", "应当遵循诚信原则。"]);
    let pipeline = RagPipeline::new(client, MultiRetriever::new(&registry, false));

    let request = ChatRequest::new("诚信原则的依据？");

    // Buffered run for the equivalence check.
    let buffered = pipeline.chat(&request).await;
    assert!(buffered.success);

    // Streaming run.
    let ready = match pipeline.prepare(&request).await {
        Prepared::Ready(ready) => ready,
        Prepared::Early(reply) => panic!("unexpected early reply: {:?}", reply.response.response),
    };
    let events: Vec<StreamEvent> = pipeline.generate_stream(ready).collect().await;

    assert!(events.len() >= 2);
    assert_eq!(events[0], StreamEvent::Start);
    let start_count = events
        .iter()
        .filter(|e| matches!(e, StreamEvent::Start))
        .count();
    assert_eq!(start_count, 1);

    let terminal_count = events.iter().filter(|e| e.is_terminal()).count();
    assert_eq!(terminal_count, 1);
    assert!(events.last().unwrap().is_terminal());

    let concatenated: String = events
        .iter()
        .filter_map(|e| match e {
            StreamEvent::Chunk { text } => Some(text.as_str()),
            _ => None,
        })
        .collect();
    assert_eq!(concatenated, buffered.response.response);

    match events.last().unwrap() {
        StreamEvent::Done { sources } => {
            assert_eq!(sources.len(), 1);
            assert_eq!(sources[0].index, 1);
        }
        other => panic!("expected done, got {other:?}"),
    }
}

// A backend that cannot open the stream yields start then a terminal error.
#[tokio::test]
async fn streaming_backend_failure_yields_error_event() {
    let registry = registry_of(vec![FixedStore::with_chunks(
        StoreCategory::Law,
        &["第一条"],
    )]);
    let pipeline = RagPipeline::new(
        MockLlm::failing(),
        MultiRetriever::new(&registry, false),
    );

    let ready = match pipeline.prepare(&ChatRequest::new("问题")).await {
        Prepared::Ready(ready) => ready,
        Prepared::Early(_) => panic!("expected ready"),
    };
    let events: Vec<StreamEvent> = pipeline.generate_stream(ready).collect().await;

    assert_eq!(events[0], StreamEvent::Start);
    assert!(matches!(events.last(), Some(StreamEvent::Error { .. })));
}
