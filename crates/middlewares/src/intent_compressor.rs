//! Intent compressor — verbose requests become short intent abbreviations.
//!
//! Example: "build a landing page in react for an institutional site" →
//! "react landing: institutional".
//!
//! Enable per request via `context["intent_compressor"]` (default true).
//! Optional:
//!   `context["intent_compressor_mode"]` = "safe" | "aggr" (default aggr)
//!   `context["intent_compressor_min_score"]` = int (default 3)
//!
//! Code spans, URLs, and email addresses are blanked out before detection
//! so they can't skew the intent; a `cstr` suffix marks inputs carrying
//! constraints or negations.

use std::sync::OnceLock;

use async_trait::async_trait;
use regex::Regex;

use relay_core::error::MiddlewareError;
use relay_core::event::{ContextValue, Decision, Event, EventName};
use relay_core::middleware::Middleware;

pub struct IntentCompressor;

#[async_trait]
impl Middleware for IntentCompressor {
    fn id(&self) -> &str {
        "intent_compressor"
    }

    fn priority(&self) -> i32 {
        90
    }

    fn should_load(&self, event: &Event) -> bool {
        event.context.flag("intent_compressor").unwrap_or(true)
    }

    async fn on_event(&self, event: &mut Event) -> Result<Decision, MiddlewareError> {
        if event.name != EventName::BeforeLlmRequest {
            return Ok(Decision::pass());
        }

        let original = event.user_text.trim();
        if original.is_empty() {
            return Ok(Decision::pass());
        }

        let mode = match event.context.get("intent_compressor_mode") {
            Some(ContextValue::Text(m)) if !m.is_empty() => m.trim().to_lowercase(),
            _ => "aggr".to_string(),
        };
        let min_score = match event.context.get("intent_compressor_min_score") {
            Some(ContextValue::Int(n)) if *n > 0 => *n as usize,
            _ => 3,
        };

        let out = compress_intent(original, &mode, min_score);
        if out.is_empty() || out == original {
            return Ok(Decision::pass());
        }
        Ok(Decision::rewrite(out, "intent_compressor: intent abbreviation"))
    }
}

/* ------------------------------ Core logic ------------------------------ */

struct IntentRule {
    label: &'static str,
    need_any: &'static [&'static str],
    boost: Option<&'static str>,
}

const INTENTS: &[IntentRule] = &[
    IntentRule {
        label: "landing",
        need_any: &["landing", "landingpage", "lp", "homepage", "home"],
        boost: Some(r"(?i)\b(institutional|company|corporate|business)\s+(site|website)\b"),
    },
    IntentRule {
        label: "site",
        need_any: &["website", "site", "webapp", "web app"],
        boost: None,
    },
    IntentRule {
        label: "api",
        need_any: &["api", "endpoint", "rest", "graphql"],
        boost: None,
    },
    IntentRule {
        label: "docs",
        need_any: &["docs", "documentation", "readme", "guide", "prd"],
        boost: None,
    },
    IntentRule {
        label: "cicd",
        need_any: &["ci", "cd", "cicd", "pipeline", "github actions", "gitlab ci"],
        boost: None,
    },
    IntentRule {
        label: "infra",
        need_any: &[
            "kubernetes",
            "k8s",
            "terraform",
            "cloudflare",
            "aws",
            "gcp",
            "azure",
            "docker",
        ],
        boost: None,
    },
    IntentRule {
        label: "bugfix",
        need_any: &["bug", "fix", "error", "issue", "broken", "crash"],
        boost: None,
    },
    IntentRule {
        label: "refactor",
        need_any: &["refactor", "cleanup", "restructure", "improve code"],
        boost: None,
    },
];

const STACK_TAGS: &[(&str, &[&str])] = &[
    ("react", &["react", "next.js", "nextjs"]),
    ("vue", &["vue", "nuxt"]),
    ("svelte", &["svelte", "sveltekit"]),
    ("angular", &["angular"]),
    ("node", &["node", "nodejs", "express", "nestjs"]),
    ("go", &["golang"]),
    ("python", &["python", "fastapi", "flask", "django"]),
    ("rails", &["rails", "ruby on rails"]),
    ("rust", &["rust", "axum", "tokio"]),
];

const QUALIFIERS: &[(&str, &[&str])] = &[
    ("institutional", &["institutional", "corporate", "company", "business"]),
    ("ecommerce", &["e-commerce", "ecommerce", "shop", "store"]),
    ("blog", &["blog", "posts", "markdown"]),
    ("dashboard", &["dashboard", "admin"]),
    ("mobile", &["mobile", "android", "ios", "react native"]),
];

fn constraint_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"(?i)\b(don't|do not|dont|not|never|without|except|only|must|avoid|keep|preserve|remove)\b",
        )
        .expect("static regex")
    })
}

fn protected_res() -> &'static [Regex; 4] {
    static RES: OnceLock<[Regex; 4]> = OnceLock::new();
    RES.get_or_init(|| {
        [
            Regex::new(r"(?s)```.*?```").expect("static regex"),
            Regex::new(r"`[^`\n]+`").expect("static regex"),
            Regex::new(r#"\bhttps?://[^\s<>()\[\]{}"'`]+"#).expect("static regex"),
            Regex::new(r"(?i)\b[A-Z0-9._%+\-]+@[A-Z0-9.\-]+\.[A-Z]{2,}\b").expect("static regex"),
        ]
    })
}

fn compress_intent(input: &str, mode: &str, min_score: usize) -> String {
    let s = protect_spans(input);
    let s = normalize(&s);

    let stacks = detect_stacks(&s);
    let (intent_labels, score) = detect_intents(&s);

    let threshold = if mode == "safe" { min_score + 1 } else { min_score };
    if score < threshold || (stacks.is_empty() && intent_labels.is_empty()) {
        return String::new();
    }

    let qualifiers = detect_qualifiers(&s, 2);

    let cstr = if constraint_re().is_match(&s) { " cstr" } else { "" };

    let mut head = stacks;
    head.extend(intent_labels);
    let head = unique_keep_order(head);
    if head.is_empty() {
        return String::new();
    }

    let mut out = head.join(" ");
    if !qualifiers.is_empty() {
        out.push_str(": ");
        out.push_str(&qualifiers.join(","));
    }
    out.push_str(cstr);
    out.trim().to_string()
}

/// Blank out code spans, URLs, and emails so they can't skew detection.
fn protect_spans(s: &str) -> String {
    let mut out = s.to_string();
    for re in protected_res() {
        out = re.replace_all(&out, " ").to_string();
    }
    out
}

/// Lowercase; separators and punctuation collapse to single spaces.
fn normalize(s: &str) -> String {
    let s = s.to_lowercase();
    let mut out = String::with_capacity(s.len());
    let mut prev_space = false;

    for c in s.chars() {
        if c.is_alphanumeric() {
            out.push(c);
            prev_space = false;
        } else if !prev_space {
            out.push(' ');
            prev_space = true;
        }
    }
    out.trim().to_string()
}

fn contains_word(padded: &str, word: &str) -> bool {
    padded.contains(&format!(" {} ", word.trim().to_lowercase()))
}

fn detect_stacks(s: &str) -> Vec<String> {
    let padded = format!(" {s} ");
    let mut out = Vec::new();
    for (tag, matches) in STACK_TAGS {
        if matches.iter().any(|m| contains_word(&padded, m)) {
            out.push(tag.to_string());
        }
    }
    let mut out = unique_keep_order(out);
    out.truncate(2);
    out
}

fn detect_intents(s: &str) -> (Vec<String>, usize) {
    let padded = format!(" {s} ");
    let mut scored: Vec<(&'static str, usize)> = Vec::new();

    for rule in INTENTS {
        let mut score = rule
            .need_any
            .iter()
            .filter(|k| contains_word(&padded, k))
            .count();
        if let Some(boost) = rule.boost {
            if Regex::new(boost).is_ok_and(|re| re.is_match(s)) {
                score += 2;
            }
        }
        if score > 0 {
            scored.push((rule.label, score));
        }
    }

    scored.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(b.0)));

    let mut labels = Vec::new();
    let mut total = 0;
    for (label, score) in scored.into_iter().take(2) {
        labels.push(label.to_string());
        total += score;
    }
    (unique_keep_order(labels), total)
}

fn detect_qualifiers(s: &str, limit: usize) -> Vec<String> {
    let padded = format!(" {s} ");
    let mut out = Vec::new();
    for (name, matches) in QUALIFIERS {
        if matches.iter().any(|m| contains_word(&padded, m)) {
            out.push(name.to_string());
        }
    }
    let mut out = unique_keep_order(out);
    out.truncate(limit);
    out
}

fn unique_keep_order(items: Vec<String>) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    items
        .into_iter()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty() && seen.insert(v.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use relay_core::event::EventContext;

    #[test]
    fn landing_page_request_compresses() {
        let out = compress_intent(
            "build a landing page in react for an institutional company website",
            "aggr",
            3,
        );
        assert!(out.starts_with("react landing"), "got: {out}");
        assert!(out.contains("institutional"));
    }

    #[test]
    fn low_signal_input_stays_untouched() {
        assert_eq!(compress_intent("tell me a joke", "aggr", 3), "");
    }

    #[test]
    fn safe_mode_raises_the_bar() {
        let input = "fix the landing page error";
        // aggr at min 3 picks it up, safe needs one more point
        assert!(!compress_intent(input, "aggr", 2).is_empty());
        assert_eq!(compress_intent(input, "safe", 3), "");
    }

    #[test]
    fn constraints_add_the_cstr_suffix() {
        let out = compress_intent(
            "fix the login bug in the python api but do not touch the error schema",
            "aggr",
            3,
        );
        assert!(out.ends_with(" cstr"), "got: {out}");
    }

    #[test]
    fn urls_do_not_skew_detection() {
        let out = compress_intent("read https://react.dev/learn please", "aggr", 1);
        // "react" only appears inside the URL, which is blanked out
        assert!(!out.contains("react"));
    }

    #[test]
    fn code_fences_are_protected() {
        let input = "what does this do?\n```\nkubernetes docker aws terraform pipeline\n```";
        assert_eq!(compress_intent(input, "aggr", 3), "");
    }

    #[test]
    fn normalize_collapses_separators() {
        assert_eq!(normalize("Next.js + Node/Express!!"), "next js node express");
    }

    #[tokio::test]
    async fn enabled_by_default_and_flag_disables() {
        let event = Event::before_request("x", EventContext::new());
        assert!(IntentCompressor.should_load(&event));

        let mut ctx = EventContext::new();
        ctx.set_flag("intent_compressor", false);
        let event = Event::before_request("x", ctx);
        assert!(!IntentCompressor.should_load(&event));
    }

    #[tokio::test]
    async fn rewrite_decision_carries_reason() {
        let mut event = Event::before_request(
            "build a landing page in react for an institutional company website",
            EventContext::new(),
        );
        let decision = IntentCompressor.on_event(&mut event).await.unwrap();
        assert!(decision.replace_text.is_some());
        assert!(decision.reason.contains("intent_compressor"));
    }
}
