//! HTTP routes.
//!
//! Domain-level failures (missing knowledge base, retrieval or generation
//! errors) always answer 200 with a user-visible diagnostic in the body;
//! only malformed requests get a 4xx. Degradation is machine-readable via
//! `GET /health` instead.

use axum::{
    extract::State,
    http::{header, StatusCode},
    response::sse::{Event, Sse},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use futures_util::StreamExt;
use serde_json::json;
use std::sync::Arc;
use std::time::Instant;

use legalflash_core::{ChatRequest, StoreCategory, StreamEvent};
use legalflash_query::pipeline::Prepared;

use crate::context::AppContext;
use crate::monitoring::{BackendState, MetricsCollector};

/// Build the service router.
pub fn router(context: Arc<AppContext>) -> Router {
    Router::new()
        .route("/api/rag/chat", post(chat))
        .route("/health", get(health))
        .route("/metrics", get(metrics))
        .route("/metrics/prometheus", get(metrics_prometheus))
        .with_state(context)
}

/// Records exactly one latency sample per request, at the terminal stream
/// event or, if the client disconnects first, when the stream is dropped.
struct RequestGuard {
    metrics: Arc<MetricsCollector>,
    start: Instant,
    success: bool,
    recorded: bool,
}

impl RequestGuard {
    fn new(metrics: Arc<MetricsCollector>, start: Instant) -> Self {
        Self {
            metrics,
            start,
            // A client that disconnects mid-stream is not an error.
            success: true,
            recorded: false,
        }
    }

    fn finish(&mut self, success: bool) {
        if !self.recorded {
            self.recorded = true;
            self.metrics
                .record_request(self.start.elapsed().as_secs_f64(), success);
        }
    }
}

impl Drop for RequestGuard {
    fn drop(&mut self) {
        if !self.recorded {
            self.metrics
                .record_request(self.start.elapsed().as_secs_f64(), self.success);
        }
    }
}

async fn chat(
    State(context): State<Arc<AppContext>>,
    Json(request): Json<ChatRequest>,
) -> Response {
    if let Err(e) = request.validate() {
        return (
            StatusCode::UNPROCESSABLE_ENTITY,
            Json(json!({ "error": e.to_string() })),
        )
            .into_response();
    }

    let start = Instant::now();
    match context.pipeline.prepare(&request).await {
        Prepared::Early(reply) => {
            context
                .metrics
                .record_request(start.elapsed().as_secs_f64(), reply.success);
            Json(reply.response).into_response()
        }
        Prepared::Ready(ready) => {
            if request.stream {
                let events = context.pipeline.generate_stream(ready);
                let mut guard = RequestGuard::new(Arc::clone(&context.metrics), start);
                let sse_events = events.map(move |event| {
                    if event.is_terminal() {
                        guard.finish(!matches!(event, StreamEvent::Error { .. }));
                    }
                    Event::default().json_data(&event)
                });
                Sse::new(sse_events).into_response()
            } else {
                let reply = context.pipeline.generate(ready).await;
                context
                    .metrics
                    .record_request(start.elapsed().as_secs_f64(), reply.success);
                Json(reply.response).into_response()
            }
        }
    }
}

async fn health(State(context): State<Arc<AppContext>>) -> Response {
    let inference = context.metrics.check_inference_health().await;
    let available_retrievers = context.registry.available();

    let mut status = "healthy";
    if inference.status != BackendState::Healthy {
        status = "degraded";
    }
    if available_retrievers == 0 {
        status = "unhealthy";
    }

    let knowledge_bases: serde_json::Map<String, serde_json::Value> = StoreCategory::ALL
        .iter()
        .map(|category| {
            (
                category.as_str().to_string(),
                json!(context.config.store_present(*category)),
            )
        })
        .collect();

    Json(json!({
        "status": status,
        "service": "LegalFlash-RAG API",
        "timestamp": chrono::Local::now().to_rfc3339(),
        "checks": {
            "inference_backend": inference,
            "knowledge_bases": knowledge_bases,
            "available_retrievers": available_retrievers,
            "components": context.components,
        }
    }))
    .into_response()
}

async fn metrics(State(context): State<Arc<AppContext>>) -> Response {
    Json(context.metrics.snapshot().await).into_response()
}

async fn metrics_prometheus(State(context): State<Arc<AppContext>>) -> Response {
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        context.metrics.prometheus().await,
    )
        .into_response()
}
