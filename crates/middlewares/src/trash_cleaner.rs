//! Trash cleaner — opt-in stopword compression of user prompts.

use std::collections::HashSet;
use std::sync::OnceLock;

use async_trait::async_trait;
use regex::Regex;

use relay_core::error::MiddlewareError;
use relay_core::event::{Decision, Event, EventName};
use relay_core::middleware::Middleware;

/// Compresses user requests by removing low-signal tokens (stopwords) while
/// keeping negations and technical tokens.
///
/// Enable per request via `context["trash_cleaner"] = true`.
pub struct TrashCleaner;

#[async_trait]
impl Middleware for TrashCleaner {
    fn id(&self) -> &str {
        "trash_cleaner"
    }

    fn priority(&self) -> i32 {
        100
    }

    fn should_load(&self, event: &Event) -> bool {
        event.context.flag("trash_cleaner").unwrap_or(false)
    }

    async fn on_event(&self, event: &mut Event) -> Result<Decision, MiddlewareError> {
        if event.name != EventName::BeforeLlmRequest {
            return Ok(Decision::pass());
        }

        let clean = compress_english_prompt(&event.user_text);
        if clean.trim().is_empty() {
            return Ok(Decision {
                cancel: true,
                reason: "empty after trash cleaning".into(),
                ..Decision::default()
            });
        }
        if clean == event.user_text.trim() {
            return Ok(Decision::pass());
        }
        Ok(Decision::rewrite(clean, "trash_cleaner: compressed user text"))
    }
}

/// Minimal English stopword set.
fn stopwords() -> &'static HashSet<&'static str> {
    static SET: OnceLock<HashSet<&'static str>> = OnceLock::new();
    SET.get_or_init(|| {
        [
            "the", "a", "an", "and", "or", "but", "so", "to", "of", "in", "on", "at", "by",
            "for", "from", "with", "into", "over", "under", "is", "are", "was", "were", "be",
            "been", "being", "it", "this", "that", "these", "those", "i", "you", "we", "they",
            "he", "she", "me", "my", "your", "our", "their", "as", "if", "then", "than",
            "because", "just", "really", "very", "maybe", "basically", "do", "does", "did",
        ]
        .into_iter()
        .collect()
    })
}

/// Words we should never drop (high semantic risk).
fn keep_words() -> &'static HashSet<&'static str> {
    static SET: OnceLock<HashSet<&'static str>> = OnceLock::new();
    SET.get_or_init(|| {
        ["not", "no", "never", "without", "except", "only"]
            .into_iter()
            .collect()
    })
}

/// Tokens that look technical are preserved as-is.
fn tech_hint() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(^[vV]?\d+(\.\d+)+$)|([/_\-])|(^[a-z]+[0-9]+[a-z0-9-]*$)|(^[A-Z]{2,}$)")
            .expect("static regex")
    })
}

fn is_tech_token(token: &str) -> bool {
    tech_hint().is_match(token)
}

/// Tokenize: alphanumeric runs stay together (dots inside technical tokens
/// survive, e.g. `v2.1.0`, `example.com`); punctuation becomes its own
/// token.
fn tokenize(s: &str) -> Vec<String> {
    let chars: Vec<char> = s.chars().collect();
    let mut tokens = Vec::new();
    let mut current = String::new();

    for (i, &c) in chars.iter().enumerate() {
        if c.is_alphanumeric() {
            current.push(c);
        } else if c == '.'
            && !current.is_empty()
            && current.chars().last().is_some_and(char::is_alphanumeric)
            && chars.get(i + 1).is_some_and(|n| n.is_alphanumeric())
        {
            current.push(c);
        } else if c.is_whitespace() {
            if !current.is_empty() {
                tokens.push(std::mem::take(&mut current));
            }
        } else {
            if !current.is_empty() {
                tokens.push(std::mem::take(&mut current));
            }
            tokens.push(c.to_string());
        }
    }
    if !current.is_empty() {
        tokens.push(current);
    }
    tokens
}

fn compress_english_prompt(input: &str) -> String {
    let tokens = tokenize(input);
    let mut out: Vec<String> = Vec::with_capacity(tokens.len());

    for token in tokens {
        // Punctuation tokens: keep the minimal set
        if token.chars().count() == 1
            && ".,;:!?()[]{}".contains(token.chars().next().unwrap_or(' '))
        {
            out.push(token);
            continue;
        }

        let lower = token.to_lowercase();

        if keep_words().contains(lower.as_str()) {
            out.push(lower);
            continue;
        }

        if stopwords().contains(lower.as_str()) && !is_tech_token(&token) {
            continue;
        }

        if is_tech_token(&token) {
            out.push(token); // preserve casing for acronyms/ids
        } else {
            out.push(lower);
        }
    }

    let mut result = out.join(" ");
    static SPACE_BEFORE_PUNCT: OnceLock<Regex> = OnceLock::new();
    static SPACE_AFTER_OPEN: OnceLock<Regex> = OnceLock::new();
    static MULTI_SPACE: OnceLock<Regex> = OnceLock::new();
    let before = SPACE_BEFORE_PUNCT
        .get_or_init(|| Regex::new(r"\s+([.,;:!?()\]\}])").expect("static regex"));
    let after = SPACE_AFTER_OPEN.get_or_init(|| Regex::new(r"([(\[\{])\s+").expect("static regex"));
    let multi = MULTI_SPACE.get_or_init(|| Regex::new(r"\s+").expect("static regex"));

    result = before.replace_all(&result, "$1").to_string();
    result = after.replace_all(&result, "$1").to_string();
    result = multi.replace_all(&result, " ").to_string();
    result.trim().to_string()
}
