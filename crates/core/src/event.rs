//! Middleware lifecycle events and interceptor decisions.
//!
//! An `Event` is the structured record passed through the interceptor chain
//! at a well-defined lifecycle point. Interceptors return a `Decision`; the
//! chain — not the interceptor — applies it to the event, so no interceptor
//! ever observes another's partial mutation mid-decision.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::params::LlmParams;

/// The lifecycle points at which the chain dispatches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventName {
    /// Before the first LLM call of a turn
    BeforeLlmRequest,
    /// After the final LLM reply (and, synthetically, for unresolved tool calls)
    AfterLlmResponse,
    /// Just before the reply is handed back to the channel
    BeforeUserReply,
}

impl EventName {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::BeforeLlmRequest => "before_llm_request",
            Self::AfterLlmResponse => "after_llm_response",
            Self::BeforeUserReply => "before_user_reply",
        }
    }
}

impl std::fmt::Display for EventName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A middleware-level tool call, carried in the event context so executor
/// interceptors can claim it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolInvocation {
    /// The tool name the model asked for
    pub tool: String,

    /// Parsed JSON arguments
    #[serde(default)]
    pub args: serde_json::Map<String, serde_json::Value>,
}

impl ToolInvocation {
    /// Fetch a string argument, empty when absent or not a string.
    pub fn str_arg(&self, key: &str) -> &str {
        self.args.get(key).and_then(|v| v.as_str()).unwrap_or("")
    }

    /// Fetch a numeric argument.
    pub fn num_arg(&self, key: &str) -> Option<f64> {
        self.args.get(key).and_then(|v| v.as_f64())
    }
}

/// A typed value in the event context.
///
/// The context is a side channel between the host, the orchestrator, and the
/// interceptors. Recognized keys get typed variants; anything else rides in
/// the `Json` fallback so plug-ins stay extensible.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ContextValue {
    Bool(bool),
    Int(i64),
    Text(String),
    Slots(HashMap<String, String>),
    ToolCalls(Vec<ToolInvocation>),
    Json(serde_json::Value),
}

/// Side-channel data carried alongside an event.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EventContext {
    #[serde(flatten)]
    values: HashMap<String, ContextValue>,
}

/// Recognized context keys.
pub mod context_keys {
    /// Heartbeat turns suppress user-visible streaming.
    pub const HEARTBEAT: &str = "is_heartbeat";
    /// Tool calls handed to after-response executor interceptors.
    pub const TOOL_CALLS: &str = "tool_calls";
    /// Numeric output-token budget for the parameter capper.
    pub const TOKEN_BUDGET: &str = "token_budget";
    /// Cached NLU parse: intent name.
    pub const NLU_INTENT: &str = "nlu_intent";
    /// Cached NLU parse: confidence 0..=100.
    pub const NLU_CONFIDENCE: &str = "nlu_confidence";
    /// Cached NLU parse: extracted slots.
    pub const NLU_SLOTS: &str = "nlu_slots";
}

impl EventContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn get(&self, key: &str) -> Option<&ContextValue> {
        self.values.get(key)
    }

    pub fn set(&mut self, key: impl Into<String>, value: ContextValue) {
        self.values.insert(key.into(), value);
    }

    /// A boolean flag, typically keyed by middleware id to enable or
    /// disable it per request.
    pub fn flag(&self, key: &str) -> Option<bool> {
        match self.values.get(key) {
            Some(ContextValue::Bool(b)) => Some(*b),
            _ => None,
        }
    }

    pub fn set_flag(&mut self, key: impl Into<String>, value: bool) {
        self.set(key, ContextValue::Bool(value));
    }

    /// Whether this turn is a background heartbeat (non-user-visible).
    pub fn is_heartbeat(&self) -> bool {
        self.flag(context_keys::HEARTBEAT).unwrap_or(false)
    }

    pub fn set_heartbeat(&mut self, value: bool) {
        self.set_flag(context_keys::HEARTBEAT, value);
    }

    /// Tool calls for executor interceptors, empty when absent.
    pub fn tool_calls(&self) -> &[ToolInvocation] {
        match self.values.get(context_keys::TOOL_CALLS) {
            Some(ContextValue::ToolCalls(calls)) => calls,
            _ => &[],
        }
    }

    pub fn set_tool_calls(&mut self, calls: Vec<ToolInvocation>) {
        self.set(context_keys::TOOL_CALLS, ContextValue::ToolCalls(calls));
    }

    /// The output-token budget, if one was supplied by the channel.
    pub fn token_budget(&self) -> Option<i64> {
        match self.values.get(context_keys::TOKEN_BUDGET) {
            Some(ContextValue::Int(n)) => Some(*n),
            _ => None,
        }
    }

    pub fn set_token_budget(&mut self, budget: i64) {
        self.set(context_keys::TOKEN_BUDGET, ContextValue::Int(budget));
    }

    /// Cached NLU parse, if an interceptor already ran the engine.
    pub fn nlu(&self) -> Option<(String, i64, HashMap<String, String>)> {
        let intent = match self.values.get(context_keys::NLU_INTENT) {
            Some(ContextValue::Text(s)) if !s.is_empty() => s.clone(),
            _ => return None,
        };
        let confidence = match self.values.get(context_keys::NLU_CONFIDENCE) {
            Some(ContextValue::Int(n)) => *n,
            _ => 0,
        };
        let slots = match self.values.get(context_keys::NLU_SLOTS) {
            Some(ContextValue::Slots(s)) => s.clone(),
            _ => HashMap::new(),
        };
        Some((intent, confidence, slots))
    }

    pub fn cache_nlu(&mut self, intent: &str, confidence: i64, slots: HashMap<String, String>) {
        self.set(context_keys::NLU_INTENT, ContextValue::Text(intent.into()));
        self.set(context_keys::NLU_CONFIDENCE, ContextValue::Int(confidence));
        self.set(context_keys::NLU_SLOTS, ContextValue::Slots(slots));
    }
}

/// A lifecycle event dispatched through the chain.
#[derive(Debug, Clone)]
pub struct Event {
    /// Which lifecycle point this is
    pub name: EventName,

    /// The user's text (meaningful on `before_llm_request`)
    pub user_text: String,

    /// The model's text (meaningful on `after_llm_response` / `before_user_reply`)
    pub llm_text: String,

    /// Mutable request parameters — replaced wholesale by `override_params`
    pub params: LlmParams,

    /// Retry attempt number
    pub attempt: u32,

    /// Maximum retries the orchestrator will perform
    pub max_retry: u32,

    /// Free-form side-channel data
    pub context: EventContext,
}

impl Event {
    /// A `before_llm_request` event for the given user input.
    pub fn before_request(user_text: impl Into<String>, context: EventContext) -> Self {
        Self {
            name: EventName::BeforeLlmRequest,
            user_text: user_text.into(),
            llm_text: String::new(),
            params: LlmParams::default(),
            attempt: 0,
            max_retry: 0,
            context,
        }
    }

    /// An `after_llm_response` event for the given exchange.
    pub fn after_response(
        user_text: impl Into<String>,
        llm_text: impl Into<String>,
        context: EventContext,
    ) -> Self {
        Self {
            name: EventName::AfterLlmResponse,
            user_text: user_text.into(),
            llm_text: llm_text.into(),
            params: LlmParams::default(),
            attempt: 0,
            max_retry: 0,
            context,
        }
    }

    /// The text this event is "about", per lifecycle point.
    pub fn text(&self) -> &str {
        match self.name {
            EventName::BeforeLlmRequest => &self.user_text,
            EventName::AfterLlmResponse | EventName::BeforeUserReply => &self.llm_text,
        }
    }

    /// Apply a decision in place. Called by the chain between interceptors.
    pub fn apply(&mut self, decision: &Decision) {
        if let Some(params) = &decision.override_params {
            self.params = params.clone();
        }
        if let Some(text) = &decision.replace_text {
            match self.name {
                EventName::BeforeLlmRequest => self.user_text = text.clone(),
                EventName::AfterLlmResponse | EventName::BeforeUserReply => {
                    self.llm_text = text.clone()
                }
            }
        }
    }
}

/// One interceptor's verdict on an event.
#[derive(Debug, Clone, Default)]
pub struct Decision {
    /// Stop the chain for this event
    pub cancel: bool,

    /// Ask the orchestrator to call the LLM again
    pub reprompt: bool,

    /// Human-readable reason, for logs
    pub reason: String,

    /// Replace the event text (user text before the request, model text after)
    pub replace_text: Option<String>,

    /// Replace the request parameters wholesale
    pub override_params: Option<LlmParams>,

    /// Tool calls this interceptor wants the core to execute
    pub tool_calls: Vec<ToolInvocation>,
}

impl Decision {
    /// The no-op decision.
    pub fn pass() -> Self {
        Self::default()
    }

    /// Cancel with a replacement reply.
    pub fn cancel_with(text: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            cancel: true,
            replace_text: Some(text.into()),
            reason: reason.into(),
            ..Self::default()
        }
    }

    /// Continue with rewritten text.
    pub fn rewrite(text: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            replace_text: Some(text.into()),
            reason: reason.into(),
            ..Self::default()
        }
    }

    /// Continue with replaced parameters.
    pub fn override_params(params: LlmParams, reason: impl Into<String>) -> Self {
        Self {
            override_params: Some(params),
            reason: reason.into(),
            ..Self::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_text_follows_lifecycle() {
        let mut e = Event::before_request("ask", EventContext::new());
        assert_eq!(e.text(), "ask");
        e.name = EventName::AfterLlmResponse;
        e.llm_text = "answer".into();
        assert_eq!(e.text(), "answer");
    }

    #[test]
    fn apply_replaces_user_text_before_request() {
        let mut e = Event::before_request("verbose question", EventContext::new());
        e.apply(&Decision::rewrite("short q", "compressed"));
        assert_eq!(e.user_text, "short q");
        assert_eq!(e.llm_text, "");
    }

    #[test]
    fn apply_replaces_llm_text_after_response() {
        let mut e = Event::after_response("q", "raw answer", EventContext::new());
        e.apply(&Decision::rewrite("polished answer", "post-edit"));
        assert_eq!(e.llm_text, "polished answer");
        assert_eq!(e.user_text, "q");
    }

    #[test]
    fn apply_override_replaces_params_wholesale() {
        let mut e = Event::before_request("q", EventContext::new());
        e.params.max_tokens = 9000;
        e.params.temperature = 0.9;
        let capped = LlmParams {
            max_tokens: 256,
            ..LlmParams::default()
        };
        e.apply(&Decision::override_params(capped, "budget"));
        assert_eq!(e.params.max_tokens, 256);
        // Wholesale: the old temperature is gone, not merged
        assert_eq!(e.params.temperature, 0.0);
    }

    #[test]
    fn noop_replace_leaves_event_unchanged() {
        let mut e = Event::before_request("same text", EventContext::new());
        let before = e.user_text.clone();
        e.apply(&Decision::rewrite(before.clone(), "noop"));
        assert_eq!(e.user_text, before);
    }

    #[test]
    fn context_typed_accessors() {
        let mut ctx = EventContext::new();
        assert!(!ctx.is_heartbeat());
        ctx.set_heartbeat(true);
        assert!(ctx.is_heartbeat());

        ctx.set_token_budget(512);
        assert_eq!(ctx.token_budget(), Some(512));

        ctx.set_tool_calls(vec![ToolInvocation {
            tool: "alarm.set".into(),
            args: serde_json::Map::new(),
        }]);
        assert_eq!(ctx.tool_calls().len(), 1);
        assert_eq!(ctx.tool_calls()[0].tool, "alarm.set");
    }

    #[test]
    fn context_nlu_cache_roundtrip() {
        let mut ctx = EventContext::new();
        assert!(ctx.nlu().is_none());

        let mut slots = HashMap::new();
        slots.insert("time".to_string(), "07:30".to_string());
        ctx.cache_nlu("set_alarm", 100, slots);

        let (intent, conf, slots) = ctx.nlu().unwrap();
        assert_eq!(intent, "set_alarm");
        assert_eq!(conf, 100);
        assert_eq!(slots.get("time").map(String::as_str), Some("07:30"));
    }

    #[test]
    fn tool_invocation_arg_helpers() {
        let mut args = serde_json::Map::new();
        args.insert("time".into(), serde_json::json!("7am"));
        args.insert("minutes".into(), serde_json::json!(12.5));
        let inv = ToolInvocation { tool: "timer.set".into(), args };
        assert_eq!(inv.str_arg("time"), "7am");
        assert_eq!(inv.str_arg("missing"), "");
        assert_eq!(inv.num_arg("minutes"), Some(12.5));
    }
}
