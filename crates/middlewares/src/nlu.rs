//! Utterance-template intent engine.
//!
//! Deterministic interceptors match user text against registered utterance
//! templates ("wake me up at {time}") compiled into anchored
//! case-insensitive regexes with non-greedy slot captures. Confidence is
//! binary: a template either matches or it doesn't.

use std::collections::HashMap;
use std::sync::RwLock;

use regex::Regex;
use tracing::warn;

/// The result of a parse operation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IntentResult {
    pub intent: String,
    pub confidence: f64,
    pub slots: HashMap<String, String>,
}

struct IntentMatcher {
    intent: String,
    regex: Regex,
    slot_names: Vec<String>,
}

/// Intent registry shared by the deterministic interceptors.
#[derive(Default)]
pub struct Engine {
    matchers: RwLock<Vec<IntentMatcher>>,
}

impl Engine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an intent with a list of example utterances.
    ///
    /// Utterances may contain slots in the form `{slot_name}`:
    /// `register_intent("set_alarm", &["set alarm for {time}"])`.
    pub fn register_intent(&self, intent: &str, utterances: &[&str]) {
        let mut matchers = self.matchers.write().unwrap_or_else(|e| e.into_inner());
        for utterance in utterances {
            match compile_utterance(intent, utterance) {
                Ok(matcher) => matchers.push(matcher),
                Err(e) => warn!(utterance, error = %e, "Failed to compile utterance"),
            }
        }
    }

    /// Match the input against registered intents. First template wins.
    pub fn parse(&self, input: &str) -> IntentResult {
        let input = input.trim();
        let matchers = self.matchers.read().unwrap_or_else(|e| e.into_inner());

        for matcher in matchers.iter() {
            if let Some(captures) = matcher.regex.captures(input) {
                let mut slots = HashMap::new();
                for (i, name) in matcher.slot_names.iter().enumerate() {
                    if let Some(m) = captures.get(i + 1) {
                        slots.insert(name.clone(), m.as_str().trim().to_string());
                    }
                }
                return IntentResult {
                    intent: matcher.intent.clone(),
                    confidence: 1.0,
                    slots,
                };
            }
        }

        IntentResult::default()
    }
}

/// Compile a template into a matcher.
/// `"set alarm for {time}"` → `(?i)^set\s+alarm\s+for\s+(.*?)$`
fn compile_utterance(intent: &str, utterance: &str) -> Result<IntentMatcher, String> {
    // Collapse runs of whitespace first
    let utterance = utterance.split_whitespace().collect::<Vec<_>>().join(" ");

    let mut pattern_parts: Vec<String> = Vec::new();
    let mut slot_names: Vec<String> = Vec::new();

    let segments: Vec<&str> = utterance.split('{').collect();

    // First segment is the static prefix
    if let Some(prefix) = segments.first() {
        pattern_parts.push(escape_static(prefix));
    }

    for segment in &segments[1..] {
        // Segment looks like "time} optional suffix"
        let Some((slot, suffix)) = segment.split_once('}') else {
            return Err(format!("unclosed brace in utterance: {utterance}"));
        };
        slot_names.push(slot.trim().to_string());

        // Non-greedy captures keep multiple slots separable
        pattern_parts.push("(.*?)".into());
        if !suffix.is_empty() {
            pattern_parts.push(escape_static(suffix));
        }
    }

    let full_pattern = format!("(?i)^{}$", pattern_parts.join(""));
    let regex = Regex::new(&full_pattern).map_err(|e| e.to_string())?;

    Ok(IntentMatcher {
        intent: intent.to_string(),
        regex,
        slot_names,
    })
}

/// Escape static text and make spaces flexible.
fn escape_static(text: &str) -> String {
    regex::escape(text).replace(' ', r"\s+")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn engine_with_alarm() -> Engine {
        let engine = Engine::new();
        engine.register_intent(
            "set_alarm",
            &["set alarm for {time}", "wake me up at {time}"],
        );
        engine
    }

    #[test]
    fn template_matches_and_extracts_slot() {
        let engine = engine_with_alarm();
        let result = engine.parse("set alarm for 07:30");
        assert_eq!(result.intent, "set_alarm");
        assert_eq!(result.confidence, 1.0);
        assert_eq!(result.slots.get("time").map(String::as_str), Some("07:30"));
    }

    #[test]
    fn matching_is_case_insensitive() {
        let engine = engine_with_alarm();
        let result = engine.parse("Wake Me Up At 6am");
        assert_eq!(result.intent, "set_alarm");
        assert_eq!(result.slots.get("time").map(String::as_str), Some("6am"));
    }

    #[test]
    fn flexible_whitespace_in_static_text() {
        let engine = engine_with_alarm();
        let result = engine.parse("set  alarm   for tomorrow 8");
        assert_eq!(result.intent, "set_alarm");
        assert_eq!(
            result.slots.get("time").map(String::as_str),
            Some("tomorrow 8")
        );
    }

    #[test]
    fn no_match_returns_empty_result() {
        let engine = engine_with_alarm();
        let result = engine.parse("what's the weather like?");
        assert_eq!(result.intent, "");
        assert_eq!(result.confidence, 0.0);
        assert!(result.slots.is_empty());
    }

    #[test]
    fn multiple_slots_split_non_greedily() {
        let engine = Engine::new();
        engine.register_intent("remind", &["remind me to {task} at {time}"]);
        let result = engine.parse("remind me to feed the cat at 18:00");
        assert_eq!(result.intent, "remind");
        assert_eq!(
            result.slots.get("task").map(String::as_str),
            Some("feed the cat")
        );
        assert_eq!(result.slots.get("time").map(String::as_str), Some("18:00"));
    }

    #[test]
    fn static_regex_metacharacters_are_escaped() {
        let engine = Engine::new();
        engine.register_intent("ask", &["what is {x}?"]);
        let result = engine.parse("what is 2+2?");
        assert_eq!(result.intent, "ask");
        assert_eq!(result.slots.get("x").map(String::as_str), Some("2+2"));
    }

    #[test]
    fn unclosed_brace_is_skipped_not_fatal() {
        let engine = Engine::new();
        engine.register_intent("broken", &["set {thing"]);
        // The broken template must not register, and parsing still works
        assert_eq!(engine.parse("set {thing").intent, "");
    }

    #[test]
    fn first_registered_template_wins() {
        let engine = Engine::new();
        engine.register_intent("a", &["do {x}"]);
        engine.register_intent("b", &["do {y}"]);
        assert_eq!(engine.parse("do something").intent, "a");
    }
}
