//! The middleware chain — a priority-ordered dispatcher with a debug log.
//!
//! Interceptors run in descending priority order; equal priorities keep
//! their registration order. Dispatch snapshots the interceptor list so the
//! lock is never held across an `await`.

use std::sync::{Arc, RwLock};

use tracing::trace;

use crate::debug::DebugLog;
use crate::error::MiddlewareError;
use crate::event::{Decision, Event};
use crate::middleware::Middleware;

/// One interceptor's contribution to a dispatch.
#[derive(Debug, Clone)]
pub struct DecisionResult {
    pub middleware_id: String,
    pub priority: i32,
    pub decision: Decision,
}

/// Executes middlewares in descending priority order.
pub struct Chain {
    middlewares: RwLock<Vec<Arc<dyn Middleware>>>,
    debug: DebugLog,
}

impl Default for Chain {
    fn default() -> Self {
        Self::new()
    }
}

impl Chain {
    /// Create an empty chain.
    pub fn new() -> Self {
        Self {
            middlewares: RwLock::new(Vec::new()),
            debug: DebugLog::new(),
        }
    }

    /// Create a chain pre-loaded with the given interceptors.
    pub fn with_middlewares(middlewares: impl IntoIterator<Item = Arc<dyn Middleware>>) -> Self {
        let chain = Self::new();
        for mw in middlewares {
            chain.use_middleware(mw);
        }
        chain
    }

    /// Attach (or detach) the JSONL debug writer.
    pub fn set_debug_writer(&self, writer: Option<Box<dyn std::io::Write + Send>>) {
        self.debug.set_writer(writer);
    }

    /// Add an interceptor, keeping the list sorted.
    ///
    /// The sort is stable, so interceptors with equal priority dispatch in
    /// registration order. Ordering is computed here, not per dispatch.
    pub fn use_middleware(&self, middleware: Arc<dyn Middleware>) {
        let mut mws = self.middlewares.write().unwrap_or_else(|e| e.into_inner());
        mws.push(middleware);
        mws.sort_by_key(|m| std::cmp::Reverse(m.priority()));
    }

    /// The registered interceptor ids, in dispatch order.
    pub fn list(&self) -> Vec<(String, i32)> {
        let mws = self.middlewares.read().unwrap_or_else(|e| e.into_inner());
        mws.iter()
            .map(|m| (m.id().to_string(), m.priority()))
            .collect()
    }

    /// Number of registered interceptors.
    pub fn len(&self) -> usize {
        self.middlewares.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Run all interceptors for the given event.
    ///
    /// Stops early when an interceptor cancels; halts with the error when
    /// one fails. Every invoked (or skipped) interceptor leaves an entry in
    /// the returned result list, so callers get per-interceptor visibility
    /// even for no-op decisions.
    pub async fn dispatch(
        &self,
        event: &mut Event,
    ) -> Result<Vec<DecisionResult>, MiddlewareError> {
        // Snapshot so no lock is held across interceptor awaits.
        let snapshot: Vec<Arc<dyn Middleware>> = {
            let mws = self.middlewares.read().unwrap_or_else(|e| e.into_inner());
            mws.clone()
        };

        let mut results = Vec::with_capacity(snapshot.len());

        for mw in snapshot {
            let before_text = event.text().to_string();

            if !mw.should_load(event) {
                let decision = Decision {
                    reason: "skipped (should_load=false)".into(),
                    ..Decision::default()
                };
                self.debug
                    .record(event, mw.id(), mw.priority(), true, &before_text, &before_text, &decision);
                results.push(DecisionResult {
                    middleware_id: mw.id().to_string(),
                    priority: mw.priority(),
                    decision,
                });
                continue;
            }

            let decision = match mw.on_event(event).await {
                Ok(d) => d,
                Err(e) => {
                    let failure = Decision {
                        cancel: true,
                        reason: e.to_string(),
                        ..Decision::default()
                    };
                    self.debug
                        .record(event, mw.id(), mw.priority(), false, &before_text, event.text(), &failure);
                    return Err(e);
                }
            };

            event.apply(&decision);
            let after_text = event.text().to_string();
            self.debug
                .record(event, mw.id(), mw.priority(), false, &before_text, &after_text, &decision);

            trace!(
                middleware = mw.id(),
                event = %event.name,
                cancel = decision.cancel,
                "Dispatched interceptor"
            );

            let canceled = decision.cancel;
            results.push(DecisionResult {
                middleware_id: mw.id().to_string(),
                priority: mw.priority(),
                decision,
            });
            if canceled {
                break;
            }
        }

        Ok(results)
    }
}
