//! Shared adapter helpers.
//!
//! The main one is the inline tool-call fallback: some models (notably small
//! local ones) answer with a JSON tool call serialized *in the text* instead
//! of the structured tool-call field. When that happens we extract the first
//! balanced object carrying a `name` plus `arguments`/`parameters` and
//! synthesize a real tool call with a freshly minted id.

use relay_core::message::ToolCall;
use serde::Deserialize;

#[derive(Deserialize)]
struct InlineCall {
    #[serde(default)]
    name: String,
    #[serde(default)]
    arguments: Option<serde_json::Map<String, serde_json::Value>>,
    #[serde(default)]
    parameters: Option<serde_json::Map<String, serde_json::Value>>,
}

/// Try to read a tool call out of assistant text.
///
/// Strips a surrounding markdown code fence, finds the first balanced JSON
/// object, and accepts it when it has a non-empty `name` and either
/// `arguments` or `parameters` (missing both yields empty arguments).
pub fn extract_inline_tool_call(text: &str) -> Option<ToolCall> {
    let mut content = text.trim();
    if let Some(stripped) = content.strip_prefix("```") {
        content = stripped
            .strip_prefix("json")
            .unwrap_or(stripped)
            .trim_start();
        content = content.strip_suffix("```").unwrap_or(content).trim_end();
    }

    let candidate = first_balanced_object(content)?;
    let parsed: InlineCall = serde_json::from_str(candidate).ok()?;
    if parsed.name.is_empty() {
        return None;
    }

    let args = parsed
        .arguments
        .or(parsed.parameters)
        .unwrap_or_default();
    let arguments = serde_json::to_string(&args).ok()?;

    Some(ToolCall {
        id: mint_call_id(),
        name: parsed.name,
        arguments,
    })
}

/// The first balanced `{...}` object in the string, string-literal aware.
fn first_balanced_object(s: &str) -> Option<&str> {
    let start = s.find('{')?;
    let bytes = s.as_bytes();
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, &b) in bytes[start..].iter().enumerate() {
        if escaped {
            escaped = false;
            continue;
        }
        match b {
            b'\\' if in_string => escaped = true,
            b'"' => in_string = !in_string,
            b'{' if !in_string => depth += 1,
            b'}' if !in_string => {
                depth -= 1;
                if depth == 0 {
                    return Some(&s[start..start + offset + 1]);
                }
            }
            _ => {}
        }
    }
    None
}

/// Mint an id for a synthesized tool call.
pub fn mint_call_id() -> String {
    format!("h_{}", uuid::Uuid::new_v4().simple())
}
