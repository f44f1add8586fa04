//! Middleware trait — the abstraction over request/response interceptors.
//!
//! Interceptors encode policy, not mechanism: they observe or rewrite events
//! around the LLM call, and the core must tolerate the absence of all of
//! them. Concrete interceptors live in the `relay-middlewares` crate.

use async_trait::async_trait;

use crate::error::MiddlewareError;
use crate::event::{Decision, Event};

/// The core Middleware trait.
///
/// An interceptor is identified by `id`, ordered by `priority` (descending,
/// ties broken by registration order), and invoked via `on_event` at each
/// lifecycle point. Returning an error halts the dispatch; returning a
/// `Decision` lets the chain apply it and continue (or stop, on cancel).
///
/// Interceptors may cache derived data in `event.context` (e.g. an NLU
/// parse), but text and parameter changes go through the `Decision` — the
/// chain alone applies those.
#[async_trait]
pub trait Middleware: Send + Sync {
    /// Stable identifier, also used by the configuration disable-list.
    fn id(&self) -> &str;

    /// Dispatch priority. Higher runs earlier.
    fn priority(&self) -> i32;

    /// Whether this interceptor applies to the event at all.
    ///
    /// Returning `false` records a "skipped" entry in the dispatch result
    /// and moves on without invoking `on_event`.
    fn should_load(&self, _event: &Event) -> bool {
        true
    }

    /// Inspect the event and return a verdict.
    async fn on_event(&self, event: &mut Event) -> Result<Decision, MiddlewareError>;
}
