//! Per-channel session cache with idle expiry.
//!
//! A session binds a channel-specific key (chat id, user id, "cli") to one
//! orchestrator. The map lock is coarse and short-lived; each session has
//! its own lock so turns serialize per session without blocking others.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::future::BoxFuture;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use relay_core::error::Result;
use relay_core::event::EventContext;

use crate::orchestrator::Orchestrator;

/// How often the sweeper scans for idle sessions.
pub const SWEEP_INTERVAL: Duration = Duration::from_secs(30 * 60);

/// Sessions idle longer than this are destroyed.
pub const IDLE_TIMEOUT: Duration = Duration::from_secs(2 * 60 * 60);

/// Hook run when a session is destroyed (releases driver resources).
pub type CleanupFn = Box<dyn Fn() + Send + Sync>;

/// What the session factory produces for each new session.
pub struct SessionParts {
    pub orchestrator: Orchestrator,
    pub cleanup: Option<CleanupFn>,
}

/// Builds the parts for a new session — the same init path single-shot
/// execution uses.
pub type SessionFactory =
    Arc<dyn Fn() -> BoxFuture<'static, Result<SessionParts>> + Send + Sync>;

struct Session {
    orchestrator: Mutex<Orchestrator>,
    last_used: std::sync::Mutex<Instant>,
    cleanup: Option<CleanupFn>,
}

impl Session {
    fn touch(&self) {
        *self.last_used.lock().unwrap_or_else(|e| e.into_inner()) = Instant::now();
    }

    fn idle_for(&self) -> Duration {
        self.last_used
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .elapsed()
    }

    fn run_cleanup(&self) {
        if let Some(cleanup) = &self.cleanup {
            cleanup();
        }
    }
}

/// Keyed map from channel-specific id to live sessions.
pub struct SessionManager {
    sessions: Mutex<HashMap<String, Arc<Session>>>,
    factory: SessionFactory,
}

impl SessionManager {
    pub fn new(factory: SessionFactory) -> Arc<Self> {
        Arc::new(Self {
            sessions: Mutex::new(HashMap::new()),
            factory,
        })
    }

    async fn get_or_create(&self, key: &str) -> Result<Arc<Session>> {
        let mut sessions = self.sessions.lock().await;
        if let Some(session) = sessions.get(key) {
            return Ok(session.clone());
        }

        info!(session = key, "Initializing new session");
        let parts = (self.factory)().await?;
        let session = Arc::new(Session {
            orchestrator: Mutex::new(parts.orchestrator),
            last_used: std::sync::Mutex::new(Instant::now()),
            cleanup: parts.cleanup,
        });
        sessions.insert(key.to_string(), session.clone());
        Ok(session)
    }

    /// Run a turn on the session for `key`, creating it on first use.
    pub async fn send(&self, key: &str, text: &str) -> Result<String> {
        self.send_with_context(key, text, EventContext::new()).await
    }

    /// Run a turn with a channel context. Turns on the same session are
    /// serialized by the session's own lock.
    pub async fn send_with_context(
        &self,
        key: &str,
        text: &str,
        context: EventContext,
    ) -> Result<String> {
        let session = self.get_or_create(key).await?;
        session.touch();
        let mut orchestrator = session.orchestrator.lock().await;
        orchestrator.send_with_context(text, context).await
    }

    /// Reset the history of an existing session. Unknown keys are a no-op.
    pub async fn clear(&self, key: &str) -> Result<()> {
        let session = {
            let sessions = self.sessions.lock().await;
            sessions.get(key).cloned()
        };
        if let Some(session) = session {
            session.touch();
            session.orchestrator.lock().await.clear();
        }
        Ok(())
    }

    /// Number of live sessions.
    pub async fn len(&self) -> usize {
        self.sessions.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Destroy sessions idle for at least `max_idle`; returns how many.
    pub async fn sweep_idle(&self, max_idle: Duration) -> usize {
        let mut sessions = self.sessions.lock().await;
        let expired: Vec<String> = sessions
            .iter()
            .filter(|(_, s)| s.idle_for() >= max_idle)
            .map(|(k, _)| k.clone())
            .collect();

        for key in &expired {
            if let Some(session) = sessions.remove(key) {
                debug!(session = key, "Cleaning up inactive session");
                session.run_cleanup();
            }
        }
        expired.len()
    }

    /// Spawn the periodic sweeper. It stops when the manager is dropped.
    pub fn start_sweeper(self: &Arc<Self>) -> tokio::task::JoinHandle<()> {
        let manager = Arc::downgrade(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(SWEEP_INTERVAL);
            ticker.tick().await; // the first tick fires immediately
            loop {
                ticker.tick().await;
                let Some(manager) = manager.upgrade() else {
                    return;
                };
                let swept = manager.sweep_idle(IDLE_TIMEOUT).await;
                if swept > 0 {
                    info!(count = swept, "Swept idle sessions");
                }
            }
        })
    }

    /// Destroy every session, invoking cleanup hooks. Used at shutdown.
    pub async fn shutdown(&self) {
        let mut sessions = self.sessions.lock().await;
        for (key, session) in sessions.drain() {
            debug!(session = %key, "Cleaning up session at shutdown");
            session.run_cleanup();
        }
    }
}

impl Drop for SessionManager {
    fn drop(&mut self) {
        // Cleanup hooks for anything still alive; best-effort since drop
        // can't await the map lock
        if let Ok(sessions) = self.sessions.try_lock() {
            for session in sessions.values() {
                session.run_cleanup();
            }
        } else {
            warn!("Session map locked at drop; skipping cleanup hooks");
        }
    }
}
