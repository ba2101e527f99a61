//! Query rewriting.
//!
//! Turns a user's conversational question into terse retrieval keywords
//! before vector search. Rewriting is best-effort: any failure, after
//! bounded retries, silently degrades to the original query. This stage
//! never fails the pipeline.

use std::sync::Arc;
use tracing::{info, warn};

use legalflash_core::{
    traits::CompletionClient,
    types::{CompletionOptions, StageOutcome},
};

use crate::prompts::build_rewrite_prompt;

/// A rewrite shorter than this is treated as a failed attempt.
const MIN_REWRITE_CHARS: usize = 3;

/// A rewrite longer than this is assumed to carry explanation text and is
/// cut down to its first line, then to this many characters.
const MAX_REWRITE_CHARS: usize = 100;

/// Rewrites user questions into retrieval keywords via the inference
/// backend.
///
/// Stateless between calls; safe to invoke concurrently for independent
/// requests.
#[derive(Debug, Clone)]
pub struct QueryRewriter {
    client: Arc<dyn CompletionClient>,
    max_retries: usize,
}

impl QueryRewriter {
    /// Create a rewriter with the default retry budget (2 retries).
    pub fn new(client: Arc<dyn CompletionClient>) -> Self {
        Self {
            client,
            max_retries: 2,
        }
    }

    /// Set the number of retries after the first attempt.
    #[must_use]
    pub fn with_max_retries(mut self, max_retries: usize) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Rewrite a query for retrieval.
    ///
    /// Empty or whitespace-only queries come back unchanged without a model
    /// call. Otherwise the backend is asked for keywords; degenerate or
    /// failed replies are retried with the same prompt, and when the retry
    /// budget is exhausted the original query is returned as a fallback.
    pub async fn rewrite(&self, query: &str) -> StageOutcome<String> {
        if query.trim().is_empty() {
            return StageOutcome::Success(query.to_string());
        }

        let prompt = build_rewrite_prompt(query);
        let options = CompletionOptions::default();
        let mut last_failure = String::new();

        for attempt in 1..=self.max_retries + 1 {
            match self.client.complete(&prompt, &options).await {
                Ok(raw) => {
                    if let Some(rewritten) = clean_rewrite_reply(&raw) {
                        info!("query rewritten: '{query}' -> '{rewritten}'");
                        return StageOutcome::Success(rewritten);
                    }
                    last_failure = "degenerate rewrite output".to_string();
                    warn!(
                        "rewrite attempt {attempt}/{} produced degenerate output",
                        self.max_retries + 1
                    );
                }
                Err(e) => {
                    last_failure = e.to_string();
                    warn!(
                        "rewrite attempt {attempt}/{} failed: {e}",
                        self.max_retries + 1
                    );
                }
            }
        }

        warn!("query rewrite exhausted retries, using original query: '{query}'");
        StageOutcome::Fallback {
            value: query.to_string(),
            reason: last_failure,
        }
    }
}

/// Post-process a raw rewrite reply.
///
/// Strips whitespace and surrounding quotes; rejects replies shorter than
/// [`MIN_REWRITE_CHARS`]; cuts over-long replies to their first line and
/// then to [`MAX_REWRITE_CHARS`] characters.
fn clean_rewrite_reply(raw: &str) -> Option<String> {
    let mut rewritten = raw
        .trim()
        .trim_matches('"')
        .trim_matches('\'')
        .trim()
        .to_string();

    if rewritten.chars().count() < MIN_REWRITE_CHARS {
        return None;
    }

    if rewritten.chars().count() > MAX_REWRITE_CHARS {
        if let Some(first_line) = rewritten.lines().next() {
            rewritten = first_line.trim().to_string();
        }
        if rewritten.chars().count() > MAX_REWRITE_CHARS {
            rewritten = rewritten.chars().take(MAX_REWRITE_CHARS).collect();
        }
        if rewritten.chars().count() < MIN_REWRITE_CHARS {
            return None;
        }
    }

    Some(rewritten)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use legalflash_core::{traits::CompletionStream, LegalFlashError, Result};
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Client that returns canned replies in sequence, then repeats the last.
    #[derive(Debug)]
    struct ScriptedClient {
        replies: Vec<Result<String>>,
        calls: AtomicUsize,
    }

    impl ScriptedClient {
        fn new(replies: Vec<Result<String>>) -> Self {
            Self {
                replies,
                calls: AtomicUsize::new(0),
            }
        }

        fn call_count(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl CompletionClient for ScriptedClient {
        async fn complete(&self, _prompt: &str, _options: &CompletionOptions) -> Result<String> {
            let index = self.calls.fetch_add(1, Ordering::SeqCst);
            let reply = self
                .replies
                .get(index)
                .or_else(|| self.replies.last())
                .expect("scripted client needs at least one reply");
            match reply {
                Ok(text) => Ok(text.clone()),
                Err(_) => Err(LegalFlashError::inference("connection refused")),
            }
        }

        async fn complete_stream(
            &self,
            _prompt: &str,
            _options: &CompletionOptions,
        ) -> Result<CompletionStream> {
            unimplemented!("not used by the rewriter")
        }

        fn endpoint(&self) -> &str {
            "scripted"
        }
    }

    #[tokio::test]
    async fn test_empty_query_unchanged_without_model_call() {
        let client = Arc::new(ScriptedClient::new(vec![Ok("ignored".into())]));
        let rewriter = QueryRewriter::new(client.clone());

        let outcome = rewriter.rewrite("   ").await;
        assert_eq!(outcome, StageOutcome::Success("   ".to_string()));
        assert_eq!(client.call_count(), 0);
    }

    #[tokio::test]
    async fn test_successful_rewrite_strips_quotes() {
        let client = Arc::new(ScriptedClient::new(vec![Ok(
            "\"债务违约 违约责任 还款义务\"\n".into()
        )]));
        let rewriter = QueryRewriter::new(client);

        let outcome = rewriter.rewrite("他不还钱咋办？").await;
        assert_eq!(
            outcome,
            StageOutcome::Success("债务违约 违约责任 还款义务".to_string())
        );
    }

    #[tokio::test]
    async fn test_degenerate_reply_retries_then_succeeds() {
        let client = Arc::new(ScriptedClient::new(vec![
            Ok("ok".into()), // 2 chars, degenerate
            Ok("合同续签 合同期限".into()),
        ]));
        let rewriter = QueryRewriter::new(client.clone());

        let outcome = rewriter.rewrite("合同到期了还能续签吗？").await;
        assert_eq!(
            outcome,
            StageOutcome::Success("合同续签 合同期限".to_string())
        );
        assert_eq!(client.call_count(), 2);
    }

    #[tokio::test]
    async fn test_all_attempts_fail_falls_back_to_original() {
        let client = Arc::new(ScriptedClient::new(vec![Err(LegalFlashError::inference(
            "down",
        ))]));
        let rewriter = QueryRewriter::new(client.clone());

        let outcome = rewriter.rewrite("工伤怎么赔偿？").await;
        assert!(outcome.is_fallback());
        assert_eq!(outcome.value(), Some(&"工伤怎么赔偿？".to_string()));
        // 1 initial attempt + 2 retries
        assert_eq!(client.call_count(), 3);
    }

    #[test]
    fn test_clean_reply_truncates_explanations() {
        let long_first_line = "关键词 ".repeat(40);
        let raw = format!("{long_first_line}\n以上是改写结果的说明");
        let cleaned = clean_rewrite_reply(&raw).unwrap();
        assert_eq!(cleaned.chars().count(), MAX_REWRITE_CHARS);

        let multiline = "工伤赔偿 工伤保险\n解释：因为……";
        assert_eq!(
            clean_rewrite_reply(multiline).unwrap(),
            "工伤赔偿 工伤保险\n解释：因为……"
        );
    }

    #[test]
    fn test_clean_reply_rejects_short() {
        assert!(clean_rewrite_reply("").is_none());
        assert!(clean_rewrite_reply("\"a\"").is_none());
        assert!(clean_rewrite_reply("两字").is_none());
        assert!(clean_rewrite_reply("三个字").is_some());
    }
}
