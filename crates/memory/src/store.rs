//! The in-memory document store and its lexical scorer.

use std::collections::{HashMap, HashSet};
use std::sync::RwLock;

use tracing::trace;

/// A simple in-memory KV + lexical scorer that retrieves short snippets
/// for token-efficient context.
///
/// Readers run concurrently; writes take the exclusive side of the lock.
/// Duplicates are kept on purpose — repeated facts should keep their
/// recency weighting.
pub struct MemoryStore {
    docs: RwLock<HashMap<String, Vec<String>>>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            docs: RwLock::new(HashMap::new()),
        }
    }

    /// Add a document under a session key. Empty (after trim) text is dropped.
    pub fn index(&self, session: &str, text: &str) {
        let text = text.trim();
        if text.is_empty() {
            return;
        }
        let mut docs = self.docs.write().unwrap_or_else(|e| e.into_inner());
        docs.entry(session.to_string())
            .or_default()
            .push(text.to_string());
        trace!(session, "Indexed memory snippet");
    }

    /// Return up to `k` snippets ranked by a simple token overlap score.
    ///
    /// Ties break toward the shorter document. Empty session, empty query,
    /// or `k == 0` all return nothing.
    pub fn query(&self, session: &str, query: &str, k: usize) -> Vec<String> {
        if query.trim().is_empty() || k == 0 {
            return Vec::new();
        }
        let docs: Vec<String> = {
            let map = self.docs.read().unwrap_or_else(|e| e.into_inner());
            match map.get(session) {
                Some(d) if !d.is_empty() => d.clone(),
                _ => return Vec::new(),
            }
        };

        let query_set = token_set(query);
        let mut scored: Vec<(usize, &String)> = docs
            .iter()
            .filter_map(|d| {
                let score = overlap(&query_set, &token_set(d));
                (score > 0).then_some((score, d))
            })
            .collect();

        if scored.is_empty() {
            return Vec::new();
        }

        scored.sort_by(|a, b| b.0.cmp(&a.0).then(a.1.len().cmp(&b.1.len())));
        scored.truncate(k);
        scored.into_iter().map(|(_, d)| d.clone()).collect()
    }

    /// Number of documents held for a session.
    pub fn count(&self, session: &str) -> usize {
        let map = self.docs.read().unwrap_or_else(|e| e.into_inner());
        map.get(session).map(Vec::len).unwrap_or(0)
    }

    /// Drop all documents for a session.
    pub fn clear(&self, session: &str) {
        let mut map = self.docs.write().unwrap_or_else(|e| e.into_inner());
        map.remove(session);
    }
}

/// Lowercased set of ≥2-char words with trailing punctuation trimmed.
fn token_set(s: &str) -> HashSet<String> {
    s.to_lowercase()
        .split_whitespace()
        .map(|w| w.trim_matches(|c: char| ".,;:!?()[]{}\"'".contains(c)))
        .filter(|w| w.len() >= 2)
        .map(str::to_string)
        .collect()
}

fn overlap(a: &HashSet<String>, b: &HashSet<String>) -> usize {
    if a.is_empty() || b.is_empty() {
        return 0;
    }
    a.intersection(b).count()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn index_and_query() {
        let store = MemoryStore::new();
        store.index("default", "The capital of France is Paris");
        store.index("default", "Rust has fearless concurrency");

        let hits = store.query("default", "capital of France", 2);
        assert_eq!(hits.len(), 1);
        assert!(hits[0].contains("Paris"));
    }

    #[test]
    fn empty_text_is_dropped() {
        let store = MemoryStore::new();
        store.index("default", "   ");
        assert_eq!(store.count("default"), 0);
    }

    #[test]
    fn text_is_trimmed_on_index() {
        let store = MemoryStore::new();
        store.index("default", "  remember this fact  ");
        let hits = store.query("default", "remember fact", 1);
        assert_eq!(hits, vec!["remember this fact"]);
    }

    #[test]
    fn duplicates_are_kept() {
        let store = MemoryStore::new();
        store.index("default", "user likes coffee");
        store.index("default", "user likes coffee");
        assert_eq!(store.count("default"), 2);
    }

    #[test]
    fn query_empty_cases() {
        let store = MemoryStore::new();
        store.index("default", "something to find");

        assert!(store.query("default", "", 3).is_empty());
        assert!(store.query("default", "something", 0).is_empty());
        assert!(store.query("other-session", "something", 3).is_empty());
        assert!(store.query("default", "unrelated words", 3).is_empty());
    }

    #[test]
    fn ranking_prefers_higher_overlap() {
        let store = MemoryStore::new();
        store.index("s", "alpha beta");
        store.index("s", "alpha beta gamma delta");

        let hits = store.query("s", "alpha beta gamma", 2);
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0], "alpha beta gamma delta");
    }

    #[test]
    fn ties_break_toward_shorter_document() {
        let store = MemoryStore::new();
        store.index("s", "alpha beta and a very long tail of extra words");
        store.index("s", "alpha beta");

        let hits = store.query("s", "alpha beta", 2);
        assert_eq!(hits[0], "alpha beta");
    }

    #[test]
    fn k_limits_results() {
        let store = MemoryStore::new();
        for i in 0..5 {
            store.index("s", &format!("note number {i} mentions topic"));
        }
        let hits = store.query("s", "topic", 2);
        assert_eq!(hits.len(), 2);
    }

    #[test]
    fn short_tokens_are_ignored() {
        let store = MemoryStore::new();
        store.index("s", "a b c");
        // Every token is under two chars, so nothing can match
        assert!(store.query("s", "a b", 3).is_empty());
    }

    #[test]
    fn punctuation_is_trimmed_for_matching() {
        let store = MemoryStore::new();
        store.index("s", "Deploy finished successfully!");
        let hits = store.query("s", "successfully", 1);
        assert_eq!(hits.len(), 1);
    }

    #[test]
    fn clear_session() {
        let store = MemoryStore::new();
        store.index("s", "ephemeral");
        store.clear("s");
        assert_eq!(store.count("s"), 0);
    }

    #[test]
    fn concurrent_readers_and_writer() {
        use std::sync::Arc;
        let store = Arc::new(MemoryStore::new());
        store.index("s", "seed document about concurrency");

        let mut handles = Vec::new();
        for _ in 0..4 {
            let store = store.clone();
            handles.push(std::thread::spawn(move || {
                for _ in 0..100 {
                    let _ = store.query("s", "concurrency", 2);
                }
            }));
        }
        for i in 0..100 {
            store.index("s", &format!("extra doc {i} about concurrency"));
        }
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(store.count("s"), 101);
    }
}
