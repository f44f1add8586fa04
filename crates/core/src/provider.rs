//! Provider trait — the abstraction over LLM backends.
//!
//! A Provider knows how to send a conversation to an LLM and get the final
//! assistant text plus any structured tool calls back, streaming text
//! fragments through an optional callback as they arrive.
//!
//! Implementations: OpenAI-compatible (OpenAI, OpenRouter, Ollama, vLLM, …)
//! and Anthropic native, in the `relay-providers` crate.

use async_trait::async_trait;

use crate::error::ProviderError;
use crate::message::{Message, ToolCall};
use crate::params::LlmParams;

/// Push sink for streamed text fragments, invoked in emission order.
pub type ChunkSink = dyn Fn(&str) + Send + Sync;

/// The completed reply for one LLM call.
#[derive(Debug, Clone, Default)]
pub struct ProviderReply {
    /// The final assistant text (may be empty when only tools were called)
    pub text: String,

    /// Structured tool calls the model requested
    pub tool_calls: Vec<ToolCall>,
}

/// The core Provider trait.
///
/// Input constraints: `messages` is non-empty and ends with a `user` or
/// `tool` message; every `tool` message follows an assistant message that
/// emitted the matching call id.
///
/// Output guarantees: on success the reply carries the final text and tool
/// calls; when `stream` is provided, fragments are delivered through it one
/// or more times, in order, before `reply` returns. Implementations MAY
/// suppress streaming while tools are present to stabilize tool-call
/// extraction — the complete text still arrives in the reply.
#[async_trait]
pub trait Provider: Send + Sync {
    /// A human-readable name for this provider (e.g., "ollama", "anthropic").
    fn name(&self) -> &str;

    /// Send a conversation and collect the assistant's reply.
    async fn reply(
        &self,
        messages: &[Message],
        params: &LlmParams,
        stream: Option<&ChunkSink>,
    ) -> Result<ProviderReply, ProviderError>;

    /// Health check — can we reach the provider?
    async fn health_check(&self) -> Result<bool, ProviderError> {
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct CannedProvider;

    #[async_trait]
    impl Provider for CannedProvider {
        fn name(&self) -> &str {
            "canned"
        }

        async fn reply(
            &self,
            _messages: &[Message],
            _params: &LlmParams,
            stream: Option<&ChunkSink>,
        ) -> Result<ProviderReply, ProviderError> {
            if let Some(sink) = stream {
                sink("Hel");
                sink("lo");
            }
            Ok(ProviderReply {
                text: "Hello".into(),
                tool_calls: vec![],
            })
        }
    }

    #[tokio::test]
    async fn stream_chunks_arrive_in_order() {
        let provider = CannedProvider;
        let collected = std::sync::Arc::new(std::sync::Mutex::new(String::new()));
        let collected_for_sink = collected.clone();
        let sink = move |chunk: &str| {
            collected_for_sink.lock().unwrap().push_str(chunk);
        };

        let reply = provider
            .reply(&[Message::user("hi")], &LlmParams::default(), Some(&sink))
            .await
            .unwrap();

        assert_eq!(reply.text, "Hello");
        assert_eq!(*collected.lock().unwrap(), "Hello");
    }

    #[tokio::test]
    async fn default_health_check_passes() {
        assert!(CannedProvider.health_check().await.unwrap());
    }
}
