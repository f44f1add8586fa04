//! Chain debug log — one JSONL record per interceptor invocation.
//!
//! When a writer is attached, every dispatch step appends a line with the
//! event name, interceptor id/priority, skip/cancel flags, and input/output
//! character and estimated-token counts, so the savings from rewriting
//! interceptors are visible per request.

use std::io::Write;
use std::sync::{Mutex, OnceLock};

use regex::Regex;
use serde::Serialize;

use crate::event::{Decision, Event};

/// A single debug record, serialized as one JSON line.
#[derive(Debug, Serialize)]
struct DebugEntry<'a> {
    ts: String,
    event: &'a str,
    middleware: &'a str,
    priority: i32,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    skipped: bool,
    #[serde(skip_serializing_if = "str::is_empty")]
    reason: &'a str,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    cancel: bool,
    in_chars: usize,
    out_chars: usize,
    in_tokens_est: usize,
    out_tokens_est: usize,
    saved_tokens_est: i64,
    #[serde(skip_serializing_if = "is_zero")]
    saved_pct: f64,
}

fn is_zero(v: &f64) -> bool {
    *v == 0.0
}

/// Writer holder shared by the chain. `None` disables logging.
#[derive(Default)]
pub struct DebugLog {
    writer: Mutex<Option<Box<dyn Write + Send>>>,
}

impl DebugLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach (or detach, with `None`) the JSONL writer.
    pub fn set_writer(&self, writer: Option<Box<dyn Write + Send>>) {
        if let Ok(mut guard) = self.writer.lock() {
            *guard = writer;
        }
    }

    pub fn enabled(&self) -> bool {
        self.writer.lock().map(|w| w.is_some()).unwrap_or(false)
    }

    /// Record one interceptor invocation. Write failures are ignored — the
    /// log is diagnostic, never load-bearing.
    pub fn record(
        &self,
        event: &Event,
        middleware_id: &str,
        priority: i32,
        skipped: bool,
        in_text: &str,
        out_text: &str,
        decision: &Decision,
    ) {
        let Ok(mut guard) = self.writer.lock() else {
            return;
        };
        let Some(writer) = guard.as_mut() else {
            return;
        };

        let in_chars = in_text.chars().count();
        let out_chars = out_text.chars().count();
        let in_tokens = estimate_tokens(in_text);
        let out_tokens = estimate_tokens(out_text);
        let saved = in_tokens as i64 - out_tokens as i64;
        let saved_pct = if in_tokens > 0 {
            saved as f64 / in_tokens as f64
        } else {
            0.0
        };

        let entry = DebugEntry {
            ts: chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Nanos, true),
            event: event.name.as_str(),
            middleware: middleware_id,
            priority,
            skipped,
            reason: &decision.reason,
            cancel: decision.cancel,
            in_chars,
            out_chars,
            in_tokens_est: in_tokens,
            out_tokens_est: out_tokens,
            saved_tokens_est: saved,
            saved_pct,
        };

        if let Ok(line) = serde_json::to_string(&entry) {
            let _ = writeln!(writer, "{line}");
        }
    }
}

/// Matches "word-like" chunks (including dotted/slashed technical tokens),
/// otherwise falls back to single non-space characters.
fn tokenish() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"[\p{L}\p{N}]+(?:[._/\\-][\p{L}\p{N}]+)*|[^\s]").expect("static regex")
    })
}

/// Estimate the token count of a string.
///
/// Counts token-ish chunks; the minimum is capped by a chars/4 heuristic so
/// tiny punctuation-heavy strings don't look too cheap.
pub fn estimate_tokens(s: &str) -> usize {
    if s.is_empty() {
        return 0;
    }
    let chunks = tokenish().find_iter(s).count();
    let char_heuristic = s.chars().count().div_ceil(4);
    chunks.max(char_heuristic)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{EventContext, EventName};
    use std::sync::{Arc, Mutex as StdMutex};

    #[test]
    fn estimate_empty_is_zero() {
        assert_eq!(estimate_tokens(""), 0);
    }

    #[test]
    fn estimate_counts_words() {
        // 5 chunks vs ceil(22/4) = 6 — the char floor wins
        assert_eq!(estimate_tokens("set an alarm for seven"), 6);
    }

    #[test]
    fn estimate_floor_is_chars_over_four() {
        // One long chunk, 16 chars → ceil(16/4) = 4 beats the single chunk
        assert_eq!(estimate_tokens("aaaaaaaaaaaaaaaa"), 4);
    }

    #[test]
    fn estimate_keeps_technical_tokens_whole() {
        // "v2.1.0" and "example.com" each count as one chunk; the chars/4
        // floor then dominates (18 chars → 5)
        let n = estimate_tokens("v2.1.0 example.com");
        assert_eq!(n, 5);
    }

    /// A Write impl that appends into a shared buffer.
    struct SharedBuf(Arc<StdMutex<Vec<u8>>>);

    impl std::io::Write for SharedBuf {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }
        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn record_writes_one_json_line() {
        let buf = Arc::new(StdMutex::new(Vec::new()));
        let log = DebugLog::new();
        log.set_writer(Some(Box::new(SharedBuf(buf.clone()))));

        let mut event = Event::before_request("hello world", EventContext::new());
        event.name = EventName::BeforeLlmRequest;
        let decision = Decision::cancel_with("hi", "greeting");

        log.record(&event, "greeting", 110, false, "hello world", "hi", &decision);

        let bytes = buf.lock().unwrap().clone();
        let line = String::from_utf8(bytes).unwrap();
        assert!(line.ends_with('\n'));
        let parsed: serde_json::Value = serde_json::from_str(line.trim()).unwrap();
        assert_eq!(parsed["event"], "before_llm_request");
        assert_eq!(parsed["middleware"], "greeting");
        assert_eq!(parsed["priority"], 110);
        assert_eq!(parsed["cancel"], true);
        assert_eq!(parsed["in_chars"], 11);
        assert_eq!(parsed["out_chars"], 2);
        assert!(parsed["saved_tokens_est"].as_i64().unwrap() > 0);
    }

    #[test]
    fn record_without_writer_is_noop() {
        let log = DebugLog::new();
        let event = Event::before_request("x", EventContext::new());
        // Must not panic or block
        log.record(&event, "m", 0, false, "x", "x", &Decision::pass());
        assert!(!log.enabled());
    }
}
