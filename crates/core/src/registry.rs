//! Middleware registry — the explicit plug-in enumeration point.
//!
//! The host constructs a registry, plug-in crates contribute interceptors,
//! and `build_chain` turns the result into a dispatchable chain, honoring
//! the configuration disable-list. No hidden init-order dependency: the
//! order of `register` calls is the registration order.

use std::collections::HashSet;
use std::sync::Arc;

use tracing::info;

use crate::chain::Chain;
use crate::middleware::Middleware;

/// Environment variable holding a comma-separated list of interceptor ids
/// to leave out of the chain.
pub const DISABLED_MIDDLEWARES_VAR: &str = "RELAY_DISABLED_MIDDLEWARES";

/// Accumulates interceptors declared by plug-ins at startup.
#[derive(Default)]
pub struct MiddlewareRegistry {
    entries: Vec<Arc<dyn Middleware>>,
}

impl MiddlewareRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an interceptor.
    pub fn register(&mut self, middleware: Arc<dyn Middleware>) {
        self.entries.push(middleware);
    }

    /// All registered interceptors, in registration order.
    pub fn registered(&self) -> &[Arc<dyn Middleware>] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Build a chain from the registry.
    ///
    /// Returns `None` when the registry is empty. Interceptors whose id
    /// appears in `RELAY_DISABLED_MIDDLEWARES` are filtered out. If a debug
    /// writer is provided, it is attached for JSONL debug logs.
    pub fn build_chain(&self, debug_writer: Option<Box<dyn std::io::Write + Send>>) -> Option<Chain> {
        if self.entries.is_empty() {
            return None;
        }

        let disabled = disabled_ids(std::env::var(DISABLED_MIDDLEWARES_VAR).ok().as_deref());
        let chain = Chain::new();
        for mw in &self.entries {
            if disabled.contains(mw.id()) {
                info!(middleware = mw.id(), "Middleware disabled by configuration");
                continue;
            }
            chain.use_middleware(mw.clone());
        }

        if let Some(writer) = debug_writer {
            chain.set_debug_writer(Some(writer));
        }
        Some(chain)
    }
}

/// Parse the comma-separated disable-list.
fn disabled_ids(raw: Option<&str>) -> HashSet<String> {
    raw.unwrap_or_default()
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}
