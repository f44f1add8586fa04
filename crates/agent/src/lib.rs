//! The Relay turn machinery — the heart of the runtime.
//!
//! A turn converts one user utterance into a final assistant reply:
//!
//! 1. **Normalize** the input and prune old history
//! 2. **Recall** memory context for the prompt preamble
//! 3. **Pre-dispatch** the middleware chain (may cancel, rewrite, retune)
//! 4. **Loop**: call the provider, execute requested tools, repeat until the
//!    model answers with text (or the iteration cap is reached)
//! 5. **Post-dispatch** the chain over the reply (best-effort)
//! 6. **Commit** history and index memory
//!
//! Sessions wrap orchestrators with per-channel lifetimes and an idle
//! sweeper; the runtime bootstrap wires configuration, provider, chain,
//! memory, skills, and the shared browser into both.

pub mod orchestrator;
pub mod runtime;
pub mod sessions;
pub mod stream;

pub use orchestrator::{parse_tool_args, Orchestrator, TextCallback};
pub use runtime::Runtime;
pub use sessions::{CleanupFn, SessionManager, SessionParts};
pub use stream::BoundedSink;
