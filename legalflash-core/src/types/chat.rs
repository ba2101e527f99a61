//! Chat request/response types and completion options.
//!
//! These are the wire types for the chat endpoint, validated at the HTTP
//! boundary, plus the options passed down to the inference client.

use serde::{Deserialize, Serialize};

use crate::error::{LegalFlashError, Result};

fn default_temperature() -> f32 {
    0.1
}

fn default_max_tokens() -> u32 {
    1024
}

/// A chat request as received by `POST /api/rag/chat`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatRequest {
    /// The user's question.
    pub query: String,

    /// Sampling temperature, in `[0.0, 2.0]`.
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Maximum number of tokens to generate.
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// Whether to stream the answer as server-sent events.
    #[serde(default)]
    pub stream: bool,
}

impl ChatRequest {
    /// Create a request with default generation settings.
    pub fn new<S: Into<String>>(query: S) -> Self {
        Self {
            query: query.into(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            stream: false,
        }
    }

    /// Validate the request at the service boundary.
    ///
    /// Malformed requests are the only condition that surfaces as an HTTP
    /// 4xx; every domain-level failure downstream is reported in-band.
    pub fn validate(&self) -> Result<()> {
        if self.query.trim().is_empty() {
            return Err(LegalFlashError::validation("query must not be empty"));
        }
        if !(0.0..=2.0).contains(&self.temperature) {
            return Err(LegalFlashError::validation(format!(
                "temperature {} out of range [0.0, 2.0]",
                self.temperature
            )));
        }
        if self.max_tokens == 0 {
            return Err(LegalFlashError::validation("max_tokens must be positive"));
        }
        Ok(())
    }
}

/// A truncated preview of one source passage, 1-based indexed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourcePreview {
    /// First 200 characters of the passage (with an ellipsis when cut).
    pub content: String,

    /// 1-based position of the passage in the prompt context.
    pub index: usize,
}

impl SourcePreview {
    /// Maximum preview length in characters.
    pub const MAX_LEN: usize = 200;

    /// Build a preview from full passage content.
    #[must_use]
    pub fn from_content(content: &str, index: usize) -> Self {
        let preview = if content.chars().count() > Self::MAX_LEN {
            let cut: String = content.chars().take(Self::MAX_LEN).collect();
            format!("{cut}...")
        } else {
            content.to_string()
        };
        Self {
            content: preview,
            index,
        }
    }
}

/// A buffered (non-streaming) chat response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatResponse {
    /// Generated answer, or a user-visible diagnostic string on failure.
    pub response: String,

    /// Previews of the passages the answer was grounded on, in prompt order.
    #[serde(default)]
    pub sources: Vec<SourcePreview>,
}

impl ChatResponse {
    /// Build a response carrying only a diagnostic message.
    pub fn message<S: Into<String>>(text: S) -> Self {
        Self {
            response: text.into(),
            sources: Vec::new(),
        }
    }
}

/// One event in a streaming chat response.
///
/// A well-formed stream is exactly one `Start`, zero or more `Chunk`s, then
/// one terminal `Done` or `Error`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEvent {
    /// Generation is about to begin.
    Start,
    /// An incremental piece of generated text.
    Chunk {
        /// The text fragment.
        text: String,
    },
    /// Generation finished; carries the full source list.
    Done {
        /// Previews of the passages the answer was grounded on.
        sources: Vec<SourcePreview>,
    },
    /// Generation failed after the stream was opened.
    Error {
        /// Human-readable diagnostic.
        error: String,
    },
}

impl StreamEvent {
    /// Whether this event terminates the stream.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done { .. } | Self::Error { .. })
    }
}

/// Options passed to the inference client for one completion call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletionOptions {
    /// Sampling temperature.
    pub temperature: f32,

    /// Maximum number of tokens to generate.
    pub max_tokens: u32,

    /// Stop sequences.
    pub stop: Vec<String>,
}

impl Default for CompletionOptions {
    fn default() -> Self {
        Self {
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            stop: Vec::new(),
        }
    }
}

impl CompletionOptions {
    /// Derive completion options from a chat request.
    #[must_use]
    pub fn from_request(request: &ChatRequest) -> Self {
        Self {
            temperature: request.temperature,
            max_tokens: request.max_tokens,
            stop: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_defaults() {
        let req: ChatRequest = serde_json::from_str(r#"{"query": "违约责任"}"#).unwrap();
        assert_eq!(req.temperature, 0.1);
        assert_eq!(req.max_tokens, 1024);
        assert!(!req.stream);
        assert!(req.validate().is_ok());
    }

    #[test]
    fn test_request_validation() {
        assert!(ChatRequest::new("  ").validate().is_err());

        let mut req = ChatRequest::new("问题");
        req.temperature = 2.5;
        assert!(req.validate().is_err());

        let mut req = ChatRequest::new("问题");
        req.max_tokens = 0;
        assert!(req.validate().is_err());
    }

    #[test]
    fn test_source_preview_truncation() {
        let long = "甲".repeat(300);
        let preview = SourcePreview::from_content(&long, 1);
        assert_eq!(preview.content.chars().count(), SourcePreview::MAX_LEN + 3);
        assert!(preview.content.ends_with("..."));

        let short = SourcePreview::from_content("短文本", 2);
        assert_eq!(short.content, "短文本");
        assert_eq!(short.index, 2);
    }

    #[test]
    fn test_stream_event_serde() {
        let event = StreamEvent::Chunk {
            text: "根据".into(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "chunk");
        assert_eq!(json["text"], "根据");

        assert!(StreamEvent::Done { sources: vec![] }.is_terminal());
        assert!(!StreamEvent::Start.is_terminal());
    }
}
