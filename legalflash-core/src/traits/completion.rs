//! Inference client trait.
//!
//! This seam abstracts the external model-serving endpoint. The service
//! only ever needs three things from it: a buffered completion, a streamed
//! completion, and a health probe.

use async_trait::async_trait;
use futures::Stream;
use std::pin::Pin;

use crate::types::CompletionOptions;
use crate::Result;

/// A stream of generated text fragments.
pub type CompletionStream = Pin<Box<dyn Stream<Item = Result<String>> + Send>>;

/// Sends prompts to a text-completion service.
///
/// Implementations talk to an external serving endpoint (vLLM or
/// compatible). Both call shapes take a fully-assembled prompt; prompt
/// construction is the pipeline's job, not the client's.
///
/// # Examples
///
/// ```rust,no_run
/// use legalflash_core::traits::{CompletionClient, CompletionStream};
/// use legalflash_core::types::CompletionOptions;
/// use legalflash_core::Result;
/// use async_trait::async_trait;
///
/// #[derive(Debug)]
/// struct EchoClient;
///
/// #[async_trait]
/// impl CompletionClient for EchoClient {
///     async fn complete(&self, prompt: &str, _options: &CompletionOptions) -> Result<String> {
///         Ok(prompt.to_string())
///     }
///
///     async fn complete_stream(
///         &self,
///         prompt: &str,
///         _options: &CompletionOptions,
///     ) -> Result<CompletionStream> {
///         let text = prompt.to_string();
///         Ok(Box::pin(futures::stream::once(async move { Ok(text) })))
///     }
///
///     fn endpoint(&self) -> &str {
///         "echo"
///     }
/// }
/// ```
#[async_trait]
pub trait CompletionClient: Send + Sync + std::fmt::Debug {
    /// Generate a complete response for the prompt.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend is unreachable, returns a non-success
    /// status, or the reply cannot be parsed.
    async fn complete(&self, prompt: &str, options: &CompletionOptions) -> Result<String>;

    /// Generate a response as a stream of text fragments.
    ///
    /// The stream ends when the backend signals completion. Implementations
    /// must yield fragments as they arrive rather than buffering the full
    /// generation.
    async fn complete_stream(
        &self,
        prompt: &str,
        options: &CompletionOptions,
    ) -> Result<CompletionStream>;

    /// Probe the backend's health surface with a short timeout.
    async fn health(&self) -> Result<()> {
        Ok(())
    }

    /// The endpoint this client talks to, for logs and health payloads.
    fn endpoint(&self) -> &str;
}
