//! OpenAI-compatible provider implementation.
//!
//! Works with: OpenAI, OpenRouter, Ollama, vLLM, Together AI, and any other
//! endpoint exposing `/v1/chat/completions`.
//!
//! Supports:
//! - Chat completions (non-streaming and streaming SSE)
//! - Tool use / function calling with incremental delta accumulation
//! - The inline JSON tool-call fallback for models that answer in text

use async_trait::async_trait;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace, warn};

use relay_core::error::ProviderError;
use relay_core::message::{Message, Role, ToolCall};
use relay_core::params::{LlmParams, ToolChoice, ToolSpec};
use relay_core::provider::{ChunkSink, Provider, ProviderReply};

use crate::common::extract_inline_tool_call;

/// An OpenAI-compatible LLM adapter.
///
/// This handles the vast majority of providers since most expose an
/// OpenAI-compatible chat completions endpoint.
pub struct OpenAiCompatProvider {
    name: String,
    base_url: String,
    api_key: String,
    model: String,
    client: reqwest::Client,
}

impl OpenAiCompatProvider {
    /// Create a new OpenAI-compatible adapter.
    pub fn new(
        name: impl Into<String>,
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
    ) -> Result<Self, ProviderError> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(120))
            .build()
            .map_err(|e| ProviderError::Network(e.to_string()))?;

        Ok(Self {
            name: name.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            model: model.into(),
            client,
        })
    }

    /// An OpenAI adapter (convenience constructor).
    pub fn openai(api_key: impl Into<String>, model: impl Into<String>) -> Result<Self, ProviderError> {
        Self::new("openai", "https://api.openai.com/v1", api_key, model)
    }

    /// An OpenRouter adapter (convenience constructor).
    pub fn openrouter(api_key: impl Into<String>, model: impl Into<String>) -> Result<Self, ProviderError> {
        Self::new("openrouter", "https://openrouter.ai/api/v1", api_key, model)
    }

    /// An Ollama adapter. Normalizes the base URL onto its `/v1` prefix and
    /// uses the conventional dummy token.
    pub fn ollama(base_url: Option<&str>, model: impl Into<String>) -> Result<Self, ProviderError> {
        let base = match base_url {
            None | Some("") => "http://localhost:11434/v1".to_string(),
            Some(url) if url.trim_end_matches('/').ends_with("/v1") => {
                url.trim_end_matches('/').to_string()
            }
            Some(url) => format!("{}/v1", url.trim_end_matches('/')),
        };
        Self::new("ollama", base, "ollama", model)
    }

    /// The model actually used for a request.
    fn resolve_model<'a>(&'a self, params: &'a LlmParams) -> &'a str {
        if params.model.is_empty() {
            &self.model
        } else {
            &params.model
        }
    }

    /// Convert our messages to the chat-completions wire shape.
    fn to_api_messages(messages: &[Message]) -> Vec<ApiMessage> {
        messages
            .iter()
            .map(|m| ApiMessage {
                role: match m.role {
                    Role::User => "user".into(),
                    Role::Assistant => "assistant".into(),
                    Role::System => "system".into(),
                    Role::Tool => "tool".into(),
                },
                content: Some(m.content.clone()),
                tool_calls: if m.tool_calls.is_empty() {
                    None
                } else {
                    Some(
                        m.tool_calls
                            .iter()
                            .map(|tc| ApiToolCall {
                                id: tc.id.clone(),
                                r#type: "function".into(),
                                function: ApiFunction {
                                    name: tc.name.clone(),
                                    arguments: tc.arguments.clone(),
                                },
                            })
                            .collect(),
                    )
                },
                tool_call_id: m.tool_call_id.clone(),
                name: m.tool_name.clone(),
            })
            .collect()
    }

    fn to_api_tools(tools: &[ToolSpec]) -> Vec<ApiToolDefinition> {
        tools
            .iter()
            .map(|t| ApiToolDefinition {
                r#type: "function".into(),
                function: ApiToolFunction {
                    name: t.name.clone(),
                    description: t.description.clone(),
                    parameters: t.parameters.clone(),
                },
            })
            .collect()
    }

    /// Assemble the request body shared by both paths.
    fn request_body(&self, messages: &[Message], params: &LlmParams, stream: bool) -> serde_json::Value {
        let mut body = serde_json::json!({
            "model": self.resolve_model(params),
            "messages": Self::to_api_messages(messages),
            "stream": stream,
        });

        if params.temperature != 0.0 {
            body["temperature"] = serde_json::json!(params.temperature);
        }
        if params.top_p != 0.0 {
            body["top_p"] = serde_json::json!(params.top_p);
        }
        if params.frequency_penalty != 0.0 {
            body["frequency_penalty"] = serde_json::json!(params.frequency_penalty);
        }
        if params.presence_penalty != 0.0 {
            body["presence_penalty"] = serde_json::json!(params.presence_penalty);
        }
        if params.max_tokens != 0 {
            body["max_tokens"] = serde_json::json!(params.max_tokens);
        }
        if !params.stop.is_empty() {
            body["stop"] = serde_json::json!(params.stop);
        }
        if let Some(seed) = params.seed {
            body["seed"] = serde_json::json!(seed);
        }
        if !params.tools.is_empty() {
            body["tools"] = serde_json::json!(Self::to_api_tools(&params.tools));
            body["tool_choice"] = tool_choice_value(&params.tool_choice);
        }

        body
    }

    async fn post(
        &self,
        body: &serde_json::Value,
        streaming: bool,
    ) -> Result<reqwest::Response, ProviderError> {
        let url = format!("{}/chat/completions", self.base_url);
        let mut request = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json");
        if streaming {
            request = request.header("Accept", "text/event-stream");
        }

        let response = request
            .json(body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ProviderError::Timeout(e.to_string())
                } else {
                    ProviderError::Network(e.to_string())
                }
            })?;

        let status = response.status().as_u16();
        if status == 429 {
            return Err(ProviderError::RateLimited { retry_after_secs: 5 });
        }
        if status == 401 || status == 403 {
            return Err(ProviderError::AuthenticationFailed(
                "Invalid API key or insufficient permissions".into(),
            ));
        }
        if status != 200 {
            let error_body = response.text().await.unwrap_or_default();
            warn!(status, body = %error_body, "Provider returned error");
            return Err(ProviderError::ApiError {
                status_code: status,
                message: error_body,
            });
        }

        Ok(response)
    }

    /// Non-streaming completion.
    async fn complete(
        &self,
        messages: &[Message],
        params: &LlmParams,
    ) -> Result<ProviderReply, ProviderError> {
        let body = self.request_body(messages, params, false);
        debug!(provider = %self.name, model = %self.resolve_model(params), "Sending completion request");

        let response = self.post(&body, false).await?;
        let api_response: ApiResponse = response.json().await.map_err(|e| ProviderError::ApiError {
            status_code: 200,
            message: format!("Failed to parse response: {e}"),
        })?;

        let choice = api_response
            .choices
            .into_iter()
            .next()
            .ok_or(ProviderError::EmptyResponse)?;

        let tool_calls: Vec<ToolCall> = choice
            .message
            .tool_calls
            .unwrap_or_default()
            .into_iter()
            .map(|tc| ToolCall {
                id: tc.id,
                name: tc.function.name,
                arguments: tc.function.arguments,
            })
            .collect();

        Ok(ProviderReply {
            text: choice.message.content.unwrap_or_default(),
            tool_calls,
        })
    }

    /// Streaming completion — forwards content deltas to the sink and
    /// accumulates tool-call deltas until the stream finishes.
    async fn stream(
        &self,
        messages: &[Message],
        params: &LlmParams,
        sink: &ChunkSink,
    ) -> Result<ProviderReply, ProviderError> {
        let mut body = self.request_body(messages, params, true);
        body["stream_options"] = serde_json::json!({ "include_usage": false });
        debug!(provider = %self.name, model = %self.resolve_model(params), "Sending streaming request");

        let response = self.post(&body, true).await?;
        let mut byte_stream = response.bytes_stream();
        let mut buffer = String::new();
        let mut text = String::new();
        let mut accumulators: std::collections::BTreeMap<u32, ToolCallAccumulator> =
            std::collections::BTreeMap::new();
        let mut saw_any = false;

        'outer: while let Some(chunk) = byte_stream.next().await {
            let bytes = chunk.map_err(|e| ProviderError::StreamInterrupted(e.to_string()))?;
            buffer.push_str(&String::from_utf8_lossy(&bytes));

            while let Some(line_end) = buffer.find('\n') {
                let line = buffer[..line_end].trim_end_matches('\r').to_string();
                buffer = buffer[line_end + 1..].to_string();

                // Skip blank lines and SSE comments
                if line.is_empty() || line.starts_with(':') {
                    continue;
                }
                let Some(data) = line.strip_prefix("data: ") else {
                    continue;
                };
                let data = data.trim();
                if data == "[DONE]" {
                    break 'outer;
                }

                match serde_json::from_str::<StreamResponse>(data) {
                    Ok(stream_resp) => {
                        for choice in &stream_resp.choices {
                            saw_any = true;
                            if let Some(content) = &choice.delta.content {
                                if !content.is_empty() {
                                    text.push_str(content);
                                    sink(content);
                                }
                            }
                            if let Some(tc_deltas) = &choice.delta.tool_calls {
                                for tc_delta in tc_deltas {
                                    let acc = accumulators
                                        .entry(tc_delta.index)
                                        .or_default();
                                    if let Some(id) = &tc_delta.id {
                                        acc.id = id.clone();
                                    }
                                    if let Some(func) = &tc_delta.function {
                                        if let Some(name) = &func.name {
                                            acc.name = name.clone();
                                        }
                                        if let Some(args) = &func.arguments {
                                            acc.arguments.push_str(args);
                                        }
                                    }
                                }
                            }
                        }
                    }
                    Err(e) => {
                        trace!(provider = %self.name, data = %data, error = %e, "Ignoring unparseable SSE chunk");
                    }
                }
            }
        }

        if !saw_any && text.is_empty() && accumulators.is_empty() {
            return Err(ProviderError::EmptyResponse);
        }

        let tool_calls = accumulators.into_values().map(ToolCallAccumulator::into_tool_call).collect();
        Ok(ProviderReply { text, tool_calls })
    }
}

#[async_trait]
impl Provider for OpenAiCompatProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn reply(
        &self,
        messages: &[Message],
        params: &LlmParams,
        stream: Option<&ChunkSink>,
    ) -> Result<ProviderReply, ProviderError> {
        // Streaming is suppressed when tools are present to keep tool-call
        // extraction stable across providers.
        let mut reply = match stream {
            Some(sink) if params.tools.is_empty() => self.stream(messages, params, sink).await?,
            _ => self.complete(messages, params).await?,
        };

        // Fallback for models that serialize a tool call into the text body.
        if reply.tool_calls.is_empty() && !reply.text.is_empty() {
            if let Some(tc) = extract_inline_tool_call(&reply.text) {
                debug!(provider = %self.name, tool = %tc.name, "Recovered inline tool call from text");
                reply = ProviderReply {
                    text: String::new(),
                    tool_calls: vec![tc],
                };
            }
        }

        Ok(reply)
    }

    async fn health_check(&self) -> Result<bool, ProviderError> {
        let url = format!("{}/models", self.base_url);
        let response = self
            .client
            .get(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .send()
            .await
            .map_err(|e| ProviderError::Network(e.to_string()))?;
        Ok(response.status().is_success())
    }
}

fn tool_choice_value(choice: &ToolChoice) -> serde_json::Value {
    match choice {
        ToolChoice::None => serde_json::json!("none"),
        ToolChoice::Auto => serde_json::json!("auto"),
        ToolChoice::Named(name) => serde_json::json!({
            "type": "function",
            "function": { "name": name }
        }),
    }
}

// --- OpenAI API types (internal) ---

#[derive(Debug, Serialize, Deserialize)]
struct ApiMessage {
    role: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_calls: Option<Vec<ApiToolCall>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
struct ApiToolCall {
    id: String,
    r#type: String,
    function: ApiFunction,
}

#[derive(Debug, Serialize, Deserialize)]
struct ApiFunction {
    name: String,
    arguments: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct ApiToolDefinition {
    r#type: String,
    function: ApiToolFunction,
}

#[derive(Debug, Serialize, Deserialize)]
struct ApiToolFunction {
    name: String,
    description: String,
    parameters: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    choices: Vec<ApiChoice>,
}

#[derive(Debug, Deserialize)]
struct ApiChoice {
    message: ApiMessage,
}

// --- Streaming SSE types ---

/// A single SSE `data: {...}` chunk from a streaming response.
#[derive(Debug, Deserialize)]
struct StreamResponse {
    #[serde(default)]
    choices: Vec<StreamChoice>,
}

#[derive(Debug, Deserialize)]
struct StreamChoice {
    delta: StreamDelta,
    #[serde(default)]
    #[allow(dead_code)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StreamDelta {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<StreamToolCallDelta>>,
}

/// A tool call delta — arrives incrementally across chunks.
#[derive(Debug, Deserialize)]
struct StreamToolCallDelta {
    index: u32,
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    function: Option<StreamFunctionDelta>,
}

#[derive(Debug, Deserialize)]
struct StreamFunctionDelta {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    arguments: Option<String>,
}

/// Accumulates incremental tool call deltas into a complete tool call.
#[derive(Default)]
struct ToolCallAccumulator {
    id: String,
    name: String,
    arguments: String,
}

impl ToolCallAccumulator {
    fn into_tool_call(self) -> ToolCall {
        ToolCall {
            id: self.id,
            name: self.name,
            arguments: self.arguments,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ollama_constructor_normalizes_url() {
        let p = OpenAiCompatProvider::ollama(None, "llama3.2").unwrap();
        assert_eq!(p.name(), "ollama");
        assert_eq!(p.base_url, "http://localhost:11434/v1");

        let p = OpenAiCompatProvider::ollama(Some("http://box:11434"), "llama3.2").unwrap();
        assert_eq!(p.base_url, "http://box:11434/v1");

        let p = OpenAiCompatProvider::ollama(Some("http://box:11434/v1/"), "llama3.2").unwrap();
        assert_eq!(p.base_url, "http://box:11434/v1");
    }

    #[test]
    fn openrouter_constructor() {
        let p = OpenAiCompatProvider::openrouter("sk-test", "qwen").unwrap();
        assert_eq!(p.name(), "openrouter");
        assert!(p.base_url.contains("openrouter.ai"));
    }

    #[test]
    fn message_conversion() {
        let messages = vec![Message::system("You are helpful"), Message::user("Hello")];
        let api = OpenAiCompatProvider::to_api_messages(&messages);
        assert_eq!(api.len(), 2);
        assert_eq!(api[0].role, "system");
        assert_eq!(api[1].role, "user");
    }

    #[test]
    fn message_conversion_with_tool_calls() {
        let msg = Message::assistant_with_tools(
            "thinking...",
            vec![ToolCall {
                id: "call_1".into(),
                name: "shell".into(),
                arguments: r#"{"command":"ls"}"#.into(),
            }],
        );
        let api = OpenAiCompatProvider::to_api_messages(&[msg]);
        let tc = api[0].tool_calls.as_ref().unwrap();
        assert_eq!(tc.len(), 1);
        assert_eq!(tc[0].function.name, "shell");
        assert_eq!(tc[0].r#type, "function");
    }

    #[test]
    fn message_conversion_tool_response() {
        let msg = Message::tool_result("call_1", "shell", "result data");
        let api = OpenAiCompatProvider::to_api_messages(&[msg]);
        assert_eq!(api[0].role, "tool");
        assert_eq!(api[0].tool_call_id.as_deref(), Some("call_1"));
        assert_eq!(api[0].name.as_deref(), Some("shell"));
    }

    #[test]
    fn request_body_applies_only_set_params() {
        let p = OpenAiCompatProvider::ollama(None, "llama3.2").unwrap();
        let params = LlmParams {
            temperature: 0.2,
            max_tokens: 128,
            ..LlmParams::default()
        };
        let body = p.request_body(&[Message::user("hi")], &params, false);
        assert_eq!(body["model"], "llama3.2");
        assert_eq!(body["temperature"], 0.2);
        assert_eq!(body["max_tokens"], 128);
        assert!(body.get("top_p").is_none());
        assert!(body.get("seed").is_none());
        assert!(body.get("tools").is_none());
    }

    #[test]
    fn request_body_model_override() {
        let p = OpenAiCompatProvider::ollama(None, "llama3.2").unwrap();
        let params = LlmParams {
            model: "qwen2.5".into(),
            ..LlmParams::default()
        };
        let body = p.request_body(&[Message::user("hi")], &params, false);
        assert_eq!(body["model"], "qwen2.5");
    }

    #[test]
    fn request_body_includes_tool_choice_with_tools() {
        let p = OpenAiCompatProvider::ollama(None, "llama3.2").unwrap();
        let mut params = LlmParams::default();
        params.upsert_tool(ToolSpec {
            name: "alarm.set".into(),
            description: "Set an alarm".into(),
            parameters: serde_json::json!({"type": "object"}),
        });
        let body = p.request_body(&[Message::user("hi")], &params, false);
        assert_eq!(body["tools"][0]["function"]["name"], "alarm.set");
        assert_eq!(body["tool_choice"], "auto");
    }

    #[test]
    fn tool_choice_named_function() {
        let v = tool_choice_value(&ToolChoice::Named("notes".into()));
        assert_eq!(v["function"]["name"], "notes");
        assert_eq!(tool_choice_value(&ToolChoice::None), "none");
    }

    // --- SSE parsing tests ---

    #[test]
    fn parse_stream_content_delta() {
        let data = r#"{"choices":[{"delta":{"content":"Hello"},"finish_reason":null}]}"#;
        let parsed: StreamResponse = serde_json::from_str(data).unwrap();
        assert_eq!(parsed.choices[0].delta.content.as_deref(), Some("Hello"));
    }

    #[test]
    fn parse_stream_tool_call_delta() {
        let data = r#"{"choices":[{"delta":{"tool_calls":[{"index":0,"id":"call_abc","function":{"name":"fetch","arguments":""}}]},"finish_reason":null}]}"#;
        let parsed: StreamResponse = serde_json::from_str(data).unwrap();
        let tc = &parsed.choices[0].delta.tool_calls.as_ref().unwrap()[0];
        assert_eq!(tc.index, 0);
        assert_eq!(tc.id.as_deref(), Some("call_abc"));
        assert_eq!(tc.function.as_ref().unwrap().name.as_deref(), Some("fetch"));
    }

    #[test]
    fn tool_call_accumulator_assembly() {
        let mut acc = ToolCallAccumulator::default();
        acc.id = "call_123".into();
        acc.name = "fetch".into();
        acc.arguments.push_str("{\"url\"");
        acc.arguments.push_str(": \"https://example.com\"}");

        let tc = acc.into_tool_call();
        assert_eq!(tc.id, "call_123");
        assert_eq!(tc.arguments, "{\"url\": \"https://example.com\"}");
    }

    #[test]
    fn parse_multiple_tool_calls_in_stream() {
        let data = r#"{"choices":[{"delta":{"tool_calls":[{"index":0,"id":"call_a","function":{"name":"fetch","arguments":""}},{"index":1,"id":"call_b","function":{"name":"shell","arguments":""}}]},"finish_reason":null}]}"#;
        let parsed: StreamResponse = serde_json::from_str(data).unwrap();
        let tcs = parsed.choices[0].delta.tool_calls.as_ref().unwrap();
        assert_eq!(tcs.len(), 2);
        assert_eq!(tcs[1].index, 1);
    }

    #[test]
    fn parse_empty_delta() {
        let data = r#"{"choices":[{"delta":{},"finish_reason":"stop"}]}"#;
        let parsed: StreamResponse = serde_json::from_str(data).unwrap();
        assert!(parsed.choices[0].delta.content.is_none());
        assert!(parsed.choices[0].delta.tool_calls.is_none());
    }
}
