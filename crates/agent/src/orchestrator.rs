//! The turn orchestrator.
//!
//! Owns the conversation history and converts one user utterance into a
//! final assistant reply: pre-middleware → agent loop → post-middleware.

use std::sync::Arc;

use tracing::{debug, info, warn};

use relay_core::chain::{Chain, DecisionResult};
use relay_core::error::{Error, Result};
use relay_core::event::{Event, EventContext, ToolInvocation};
use relay_core::message::{Message, ToolCall};
use relay_core::params::LlmParams;
use relay_core::provider::Provider;
use relay_core::skill::SkillRegistry;
use relay_memory::MemoryStore;

/// Oldest messages are dropped so at most this many survive into a turn.
pub const MAX_HISTORY_MESSAGES: usize = 20;

/// Upper bound on LLM calls within a single turn.
pub const MAX_TOOL_ITERATIONS: usize = 10;

/// A whole turn must finish within this deadline; it supersedes downstream
/// timeouts.
pub const TURN_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(300);

/// Memory snippets recalled per turn.
const MEMORY_RECALL_LIMIT: usize = 2;

/// The memory session turns are indexed under.
const MEMORY_SESSION: &str = "default";

/// Display truncation for tool results in status lines.
const STATUS_RESULT_CHARS: usize = 200;

/// User-facing text hook (stream chunks or status lines).
pub type TextCallback = Arc<dyn Fn(&str) + Send + Sync>;

fn noop_callback() -> TextCallback {
    Arc::new(|_| {})
}

/// Stateful turn executor bound to one provider, one chain, one memory
/// handle, and one skill registry.
///
/// An orchestrator is single-writer: the session layer serializes calls to
/// `send`, so a turn never interleaves with another on the same history.
pub struct Orchestrator {
    provider: Arc<dyn Provider>,
    history: Vec<Message>,
    chain: Option<Arc<Chain>>,
    memory: Option<Arc<MemoryStore>>,
    skills: Arc<SkillRegistry>,
    status_cb: TextCallback,
    stream_cb: TextCallback,
}

impl Orchestrator {
    /// Create an orchestrator with no chain, memory, or skills.
    pub fn new(provider: Arc<dyn Provider>) -> Self {
        Self {
            provider,
            history: Vec::with_capacity(16),
            chain: None,
            memory: None,
            skills: Arc::new(SkillRegistry::new()),
            status_cb: noop_callback(),
            stream_cb: noop_callback(),
        }
    }

    /// Attach a middleware chain.
    pub fn with_chain(mut self, chain: Arc<Chain>) -> Self {
        self.chain = Some(chain);
        self
    }

    /// Attach a memory store handle.
    pub fn with_memory(mut self, memory: Arc<MemoryStore>) -> Self {
        self.memory = Some(memory);
        self
    }

    /// Attach a skill registry.
    pub fn with_skills(mut self, skills: Arc<SkillRegistry>) -> Self {
        self.skills = skills;
        self
    }

    /// Hook for status/diagnostic lines (tool call announcements).
    pub fn with_status_callback(mut self, cb: TextCallback) -> Self {
        self.status_cb = cb;
        self
    }

    /// Hook for user-visible streamed text chunks.
    pub fn with_stream_callback(mut self, cb: TextCallback) -> Self {
        self.stream_cb = cb;
        self
    }

    /// Reset the conversation history.
    pub fn clear(&mut self) {
        self.history.clear();
    }

    /// The committed conversation history.
    pub fn history(&self) -> &[Message] {
        &self.history
    }

    /// Run a turn with an empty channel context.
    pub async fn send(&mut self, input: &str) -> Result<String> {
        self.send_with_context(input, EventContext::new()).await
    }

    /// Run a turn. The whole turn is wrapped in the turn deadline.
    pub async fn send_with_context(
        &mut self,
        input: &str,
        context: EventContext,
    ) -> Result<String> {
        match tokio::time::timeout(TURN_TIMEOUT, self.turn(input, context)).await {
            Ok(result) => result,
            Err(_) => Err(Error::DeadlineExceeded),
        }
    }

    async fn turn(&mut self, input: &str, context: EventContext) -> Result<String> {
        let input = input.trim();
        if input.is_empty() {
            return Err(Error::EmptyInput);
        }
        let is_heartbeat = context.is_heartbeat();

        // 1. Prune history so the turn composes against a bounded window
        if self.history.len() > MAX_HISTORY_MESSAGES {
            let excess = self.history.len() - MAX_HISTORY_MESSAGES;
            self.history.drain(..excess);
        }

        // 2. Memory context, rendered as a preamble block so pruning can't
        //    destroy it
        let memory_context = match &self.memory {
            Some(memory) => {
                let hits = memory.query(MEMORY_SESSION, input, MEMORY_RECALL_LIMIT);
                if hits.is_empty() {
                    String::new()
                } else {
                    format!("<context>\n{}\n</context>", hits.join("\n"))
                }
            }
            None => String::new(),
        };

        // 3. Pre-LLM middleware dispatch
        let mut input = input.to_string();
        let mut params = LlmParams::default();
        let mut context = context;

        if let Some(chain) = self.chain.clone() {
            let mut event = Event::before_request(input.clone(), context);
            let results = chain.dispatch(&mut event).await?;

            let (updated, canceled) = apply_text_decisions(&input, &results);
            if canceled.is_some() {
                // A middleware canceled the request (greeting, cache, a
                // deterministic handler). A non-empty replacement becomes
                // the reply.
                if !updated.trim().is_empty() {
                    if !is_heartbeat {
                        self.history.push(Message::user(&input));
                        self.history.push(Message::assistant(&updated));
                        (self.stream_cb)(&format!("{updated}\n"));
                    }
                    return Ok(updated);
                }
                let reason = canceled
                    .map(|d| d.reason.trim().to_string())
                    .filter(|r| !r.is_empty())
                    .unwrap_or_else(|| "request canceled by middleware".into());
                return Err(Error::CanceledByMiddleware(reason));
            }

            input = updated;
            params = event.params;
            context = event.context;
        }

        // 4. Advertise registry skills alongside middleware-injected tools;
        //    first occurrence wins on name collisions
        for spec in self.skills.specs() {
            params.tools.push(spec);
        }
        params.dedup_tools();

        // 5. Agent loop
        let user_msg = Message::user(&input);
        let mut loop_messages: Vec<Message> = Vec::new();
        let mut final_response = String::new();

        for iteration in 0..MAX_TOOL_ITERATIONS {
            let mut messages =
                Vec::with_capacity(self.history.len() + loop_messages.len() + 2);
            messages.push(Message::system(self.system_prompt(&params, &memory_context)));
            messages.extend(self.history.iter().cloned());
            messages.push(user_msg.clone());
            messages.extend(loop_messages.iter().cloned());

            debug!(iteration, messages = messages.len(), "Agent loop iteration");

            let stream_cb = self.stream_cb.clone();
            let sink = move |chunk: &str| {
                if !is_heartbeat {
                    stream_cb(chunk);
                }
            };
            let reply = self.provider.reply(&messages, &params, Some(&sink)).await?;
            if iteration == 0 && !is_heartbeat {
                (self.stream_cb)("\n");
            }

            final_response = reply.text.clone();
            let tool_calls = reply.tool_calls;
            loop_messages.push(Message::assistant_with_tools(reply.text, tool_calls.clone()));

            if tool_calls.is_empty() {
                break;
            }

            // Execute tool calls concurrently; results land in the order
            // the model emitted the calls regardless of completion order
            let results = self
                .execute_tool_calls(&tool_calls, &context, is_heartbeat)
                .await;
            loop_messages.extend(results);
        }

        // 6. Commit: the user message plus exactly the messages the loop
        //    produced
        if !is_heartbeat {
            self.history.push(user_msg);
            self.history.append(&mut loop_messages);
        }

        // 7. Post-LLM middleware dispatch — best-effort, errors are logged
        //    and swallowed
        if let Some(chain) = self.chain.clone() {
            let mut event =
                Event::after_response(input.clone(), final_response.clone(), context.clone());
            match chain.dispatch(&mut event).await {
                Ok(results) => {
                    let (updated, canceled) = apply_text_decisions(&final_response, &results);
                    if canceled.is_some() {
                        if !updated.trim().is_empty() {
                            final_response = updated;
                        }
                    } else {
                        final_response = updated;
                    }
                }
                Err(e) => {
                    warn!(error = %e, "Post-response middleware dispatch failed");
                }
            }
        }

        // 8. Index the exchange for later recall
        if !is_heartbeat {
            if let Some(memory) = &self.memory {
                memory.index(MEMORY_SESSION, &input);
                memory.index(MEMORY_SESSION, &final_response);
            }
        }

        info!(reply_chars = final_response.len(), "Turn complete");
        Ok(final_response)
    }

    /// Compose the system message for one loop iteration.
    fn system_prompt(&self, params: &LlmParams, memory_context: &str) -> String {
        let now = chrono::Local::now().format("%a, %d %b %Y %H:%M:%S %Z");
        let mut prompt = format!(
            "You are Relay, a terminal AI. You have access to tools. If a tool exists \
             to answer the request, YOU MUST CALL THE TOOL. DO NOT generate text instead \
             of calling tools. Time: {now}"
        );

        if !params.tools.is_empty() {
            let names: Vec<&str> = params.tools.iter().map(|t| t.name.as_str()).collect();
            prompt.push_str("\n\nAvailable tools: ");
            prompt.push_str(&names.join(", "));
            prompt.push_str(". ONLY use these tools.");
        }

        if !memory_context.is_empty() {
            prompt.push_str("\n\n");
            prompt.push_str(memory_context);
        }

        prompt
    }

    /// Run every tool call of one assistant message concurrently, returning
    /// the result messages in emission order.
    async fn execute_tool_calls(
        &self,
        calls: &[ToolCall],
        context: &EventContext,
        is_heartbeat: bool,
    ) -> Vec<Message> {
        let futures = calls
            .iter()
            .map(|call| self.execute_tool_call(call, context, is_heartbeat));
        futures::future::join_all(futures).await
    }

    async fn execute_tool_call(
        &self,
        call: &ToolCall,
        context: &EventContext,
        is_heartbeat: bool,
    ) -> Message {
        if !is_heartbeat {
            (self.status_cb)(&format!("Tool call: {}({})", call.name, call.arguments));
        }

        let result = if let Some(skill) = self.skills.get(&call.name) {
            match serde_json::from_str::<serde_json::Map<String, serde_json::Value>>(
                &call.arguments,
            ) {
                Err(e) => format!("Error: Invalid arguments JSON: {e}"),
                Ok(args) => match skill.execute(&args).await {
                    Ok(output) => output,
                    Err(e) => format!("Error executing tool: {e}"),
                },
            }
        } else {
            // Not a registry skill — give executor middlewares a chance
            match self.execute_middleware_tool(call, context).await {
                Some(output) => output,
                None => format!("Error: Tool '{}' not found.", call.name),
            }
        };

        let result = if result.is_empty() {
            "Success (no output)".to_string()
        } else {
            result
        };

        if !is_heartbeat {
            let display: String = if result.chars().count() > STATUS_RESULT_CHARS {
                result.chars().take(STATUS_RESULT_CHARS).collect::<String>() + "..."
            } else {
                result.clone()
            };
            (self.status_cb)(&format!("   Result: {display}"));
        }

        Message::tool_result(&call.id, &call.name, result)
    }

    /// Offer an unresolved tool call to the chain via a synthetic
    /// after-response event; the first cancel+replace result is the output.
    async fn execute_middleware_tool(
        &self,
        call: &ToolCall,
        base_context: &EventContext,
    ) -> Option<String> {
        let chain = self.chain.as_ref()?;

        let mut context = base_context.clone();
        context.set_tool_calls(vec![ToolInvocation {
            tool: call.name.clone(),
            args: parse_tool_args(&call.arguments),
        }]);

        let mut event = Event::after_response("", "", context);
        let results = chain.dispatch(&mut event).await.ok()?;

        results.into_iter().find_map(|r| {
            if r.decision.cancel {
                r.decision.replace_text
            } else {
                None
            }
        })
    }
}

/// Parse tool-call arguments as a JSON object; invalid JSON falls back to
/// `{"raw": <input>}` so executors still see something usable.
pub fn parse_tool_args(raw: &str) -> serde_json::Map<String, serde_json::Value> {
    match serde_json::from_str::<serde_json::Map<String, serde_json::Value>>(raw) {
        Ok(map) => map,
        Err(_) => {
            let mut map = serde_json::Map::new();
            map.insert("raw".into(), serde_json::Value::String(raw.to_string()));
            map
        }
    }
}

/// Fold replace-text decisions over an initial text, stopping at the first
/// cancel. Returns the final text and the canceling decision, if any.
fn apply_text_decisions(
    initial: &str,
    results: &[DecisionResult],
) -> (String, Option<relay_core::event::Decision>) {
    let mut current = initial.trim().to_string();
    for result in results {
        if let Some(text) = &result.decision.replace_text {
            current = text.trim().to_string();
        }
        if result.decision.cancel {
            return (current, Some(result.decision.clone()));
        }
    }
    (current, None)
}
