//! Session-keyed lexical memory for Relay.
//!
//! A deliberately small retrieval layer: sessions accumulate short text
//! snippets, and queries rank them by token overlap. No embeddings, no
//! persistence — best-effort recall for token-efficient context.

mod store;

pub use store::MemoryStore;
