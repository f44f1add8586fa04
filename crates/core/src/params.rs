//! LLM request parameters.
//!
//! `LlmParams` is the mutable configuration that middlewares may rewrite
//! before a request reaches the provider. Zero-valued numeric fields mean
//! "leave to the provider default" so interceptors can cap or set only what
//! they care about.

use serde::{Deserialize, Serialize};

/// Configuration passed to the provider for one LLM call.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LlmParams {
    /// Model override — empty means the adapter's configured default
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub model: String,

    /// Sampling temperature (0.0 = provider default)
    #[serde(default)]
    pub temperature: f64,

    /// Nucleus sampling (0.0 = provider default)
    #[serde(default)]
    pub top_p: f64,

    /// Frequency penalty (0.0 = provider default)
    #[serde(default)]
    pub frequency_penalty: f64,

    /// Presence penalty (0.0 = provider default)
    #[serde(default)]
    pub presence_penalty: f64,

    /// Maximum tokens to generate (0 = unset)
    #[serde(default)]
    pub max_tokens: u32,

    /// Stop sequences, in order
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub stop: Vec<String>,

    /// Deterministic sampling seed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<i64>,

    /// Tools the model may call
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<ToolSpec>,

    /// How the model should choose among tools
    #[serde(default)]
    pub tool_choice: ToolChoice,
}

impl LlmParams {
    /// Whether a tool with this name is already registered.
    pub fn has_tool(&self, name: &str) -> bool {
        self.tools.iter().any(|t| t.name == name)
    }

    /// Append a tool spec unless one with the same name exists.
    pub fn upsert_tool(&mut self, spec: ToolSpec) {
        if !self.has_tool(&spec.name) {
            self.tools.push(spec);
        }
    }

    /// Deduplicate tools by name, first occurrence wins.
    ///
    /// Middleware-injected tools that collide with built-in skills keep
    /// whichever descriptor arrived first.
    pub fn dedup_tools(&mut self) {
        if self.tools.len() < 2 {
            return;
        }
        let mut seen = std::collections::HashSet::new();
        self.tools.retain(|t| seen.insert(t.name.clone()));
    }
}

/// A tool descriptor sent to the LLM so it knows what it can call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolSpec {
    /// The tool name
    pub name: String,

    /// Description of what the tool does
    pub description: String,

    /// JSON Schema describing the tool's parameters
    pub parameters: serde_json::Value,
}

/// How the model should choose among the offered tools.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolChoice {
    /// The model must not call tools
    None,
    /// The model decides (default whenever tools are present)
    #[default]
    Auto,
    /// The model must call this specific tool
    Named(String),
}
