//! HTTP client for a vLLM-compatible completion service.
//!
//! The backend exposes an OpenAI-style completions endpoint: a JSON POST
//! for buffered generation, and the same endpoint with `stream: true` for
//! an SSE response of delta frames terminated by a `[DONE]` sentinel.

use async_trait::async_trait;
use futures_util::StreamExt;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, warn};

use legalflash_core::{
    traits::{CompletionClient, CompletionStream},
    types::CompletionOptions,
    LegalFlashError, Result,
};

/// Timeout for backend health probes.
const HEALTH_TIMEOUT: Duration = Duration::from_secs(5);

/// Request payload for the completions endpoint.
#[derive(Debug, Serialize)]
struct CompletionPayload<'a> {
    prompt: &'a str,
    max_tokens: u32,
    temperature: f32,
    stop: &'a [String],
    stream: bool,
}

/// Buffered completion reply.
#[derive(Debug, Deserialize)]
struct CompletionReply {
    choices: Vec<CompletionChoice>,
}

#[derive(Debug, Deserialize)]
struct CompletionChoice {
    text: String,
}

/// One SSE frame of a streaming completion.
#[derive(Debug, Deserialize)]
struct StreamFrame {
    #[serde(default)]
    choices: Vec<StreamChoice>,
}

#[derive(Debug, Deserialize)]
struct StreamChoice {
    #[serde(default)]
    delta: StreamDelta,
}

#[derive(Debug, Default, Deserialize)]
struct StreamDelta {
    #[serde(default)]
    text: String,
}

/// Client for a vLLM-compatible inference backend.
///
/// The request timeout bounds the whole call, including the time a
/// streaming connection stays open; callers that make short calls (the
/// query rewriter) hold a clone with a tighter timeout.
#[derive(Debug, Clone)]
pub struct VllmClient {
    http: reqwest::Client,
    base_url: String,
    timeout: Duration,
}

impl VllmClient {
    /// Create a client for the given base URL with a 120-second timeout.
    pub fn new<S: Into<String>>(base_url: S) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            timeout: Duration::from_secs(120),
        }
    }

    /// Set the per-request timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn completions_url(&self) -> String {
        format!("{}/v1/completions", self.base_url)
    }

    fn health_url(&self) -> String {
        format!("{}/health", self.base_url)
    }

    async fn post_completion(
        &self,
        prompt: &str,
        options: &CompletionOptions,
        stream: bool,
    ) -> Result<reqwest::Response> {
        let payload = CompletionPayload {
            prompt,
            max_tokens: options.max_tokens,
            temperature: options.temperature,
            stop: &options.stop,
            stream,
        };

        let response = self
            .http
            .post(self.completions_url())
            .timeout(self.timeout)
            .json(&payload)
            .send()
            .await
            .map_err(|e| {
                LegalFlashError::inference(format!(
                    "could not reach inference backend at {}: {e}",
                    self.base_url
                ))
            })?;

        response.error_for_status().map_err(|e| {
            LegalFlashError::inference(format!("inference backend returned an error: {e}"))
        })
    }
}

#[async_trait]
impl CompletionClient for VllmClient {
    async fn complete(&self, prompt: &str, options: &CompletionOptions) -> Result<String> {
        debug!(
            prompt_chars = prompt.chars().count(),
            max_tokens = options.max_tokens,
            "sending completion request"
        );

        let response = self.post_completion(prompt, options, false).await?;
        let reply: CompletionReply = response.json().await.map_err(|e| {
            LegalFlashError::inference(format!("failed to parse completion reply: {e}"))
        })?;

        let choice = reply
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| LegalFlashError::inference("completion reply carried no choices"))?;

        Ok(choice.text)
    }

    async fn complete_stream(
        &self,
        prompt: &str,
        options: &CompletionOptions,
    ) -> Result<CompletionStream> {
        debug!(
            prompt_chars = prompt.chars().count(),
            max_tokens = options.max_tokens,
            "opening streaming completion"
        );

        let response = self.post_completion(prompt, options, true).await?;
        let (tx, rx) = mpsc::channel::<Result<String>>(32);

        // The reader task ends as soon as the receiver is dropped, which
        // releases the backend connection on client disconnect.
        tokio::spawn(async move {
            let mut bytes = response.bytes_stream();
            // Byte buffer: a network chunk can split a multi-byte character,
            // but every complete line is valid UTF-8 on its own.
            let mut buffer: Vec<u8> = Vec::new();

            'read: while let Some(chunk) = bytes.next().await {
                let chunk = match chunk {
                    Ok(chunk) => chunk,
                    Err(e) => {
                        let _ = tx
                            .send(Err(LegalFlashError::inference(format!(
                                "stream interrupted: {e}"
                            ))))
                            .await;
                        return;
                    }
                };
                buffer.extend_from_slice(&chunk);

                while let Some(newline) = buffer.iter().position(|&b| b == b'\n') {
                    let raw: Vec<u8> = buffer.drain(..=newline).collect();
                    let Ok(line) = std::str::from_utf8(&raw) else {
                        continue;
                    };
                    let line = line.trim();

                    let Some(data) = line.strip_prefix("data: ") else {
                        continue;
                    };
                    if data.trim() == "[DONE]" {
                        break 'read;
                    }
                    // Unparseable frames are skipped; generation continues
                    // with the next one.
                    let Ok(frame) = serde_json::from_str::<StreamFrame>(data) else {
                        warn!("skipping unparseable SSE frame");
                        continue;
                    };
                    let Some(text) = frame.choices.into_iter().next().map(|c| c.delta.text) else {
                        continue;
                    };
                    if !text.is_empty() && tx.send(Ok(text)).await.is_err() {
                        return;
                    }
                }
            }
        });

        Ok(Box::pin(ReceiverStream::new(rx)))
    }

    async fn health(&self) -> Result<()> {
        let response = self
            .http
            .get(self.health_url())
            .timeout(HEALTH_TIMEOUT)
            .send()
            .await
            .map_err(|e| {
                LegalFlashError::inference(format!(
                    "inference backend unreachable at {}: {e}",
                    self.base_url
                ))
            })?;

        response.error_for_status().map_err(|e| {
            LegalFlashError::inference(format!("inference backend unhealthy: {e}"))
        })?;
        Ok(())
    }

    fn endpoint(&self) -> &str {
        &self.base_url
    }
}
