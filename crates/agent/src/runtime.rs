//! Runtime bootstrap — the single init path for every entry point.
//!
//! Wires configuration → provider → middleware chain → memory → browser →
//! skills into orchestrators and session managers. The CLI, single-shot
//! execution, and channel adapters all build through here so sessions are
//! indistinguishable from one another.

use std::sync::Arc;

use tracing::{info, warn};

use relay_browser::{BrowserConfig, Controller};
use relay_config::AppConfig;
use relay_core::chain::Chain;
use relay_core::error::{Error, Result};
use relay_core::provider::Provider;
use relay_core::registry::MiddlewareRegistry;
use relay_core::skill::SkillRegistry;
use relay_memory::MemoryStore;

use crate::orchestrator::{Orchestrator, TextCallback};
use crate::sessions::{SessionFactory, SessionManager, SessionParts};

/// Long-lived process state shared by every session.
///
/// The middleware chain, skill registry, memory store, provider adapter and
/// browser controller are built once; orchestrators hold `Arc` handles.
pub struct Runtime {
    config: AppConfig,
    provider: Arc<dyn Provider>,
    chain: Option<Arc<Chain>>,
    memory: Arc<MemoryStore>,
    skills: Arc<SkillRegistry>,
    browser: Arc<Controller>,
}

impl Runtime {
    /// Build the runtime from configuration and a populated middleware
    /// registry.
    ///
    /// Applies middleware env settings before the chain is built so the
    /// disable-list is visible, opens the JSONL debug log, launches the
    /// shared browser, and assembles the default skill registry.
    pub async fn new(config: AppConfig, registry: MiddlewareRegistry) -> Result<Arc<Self>> {
        config.apply_middleware_settings();

        let provider = relay_providers::build_provider(
            &config.provider,
            &config.model,
            config.base_url.as_deref(),
            config.api_key.as_deref(),
        )
        .map_err(Error::Provider)?;

        let chain = registry.build_chain(open_debug_log()).map(Arc::new);
        if let Some(chain) = &chain {
            info!(middlewares = chain.len(), "Built middleware chain");
        }

        let memory = Arc::new(MemoryStore::new());

        let browser = Arc::new(Controller::new(BrowserConfig::default()));
        if let Err(e) = browser.start().await {
            warn!(error = %e, "Failed to start browser; browser skill disabled");
        }

        let scripts_dir = config.resolved_scripts_dir();
        let skills = Arc::new(relay_skills::default_registry(
            memory.clone(),
            browser.is_running().then(|| browser.clone()),
            Some(scripts_dir.as_path()),
        ));
        info!(skills = skills.len(), "Loaded skills");

        Ok(Arc::new(Self {
            config,
            provider,
            chain,
            memory,
            skills,
            browser,
        }))
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn provider(&self) -> &Arc<dyn Provider> {
        &self.provider
    }

    /// Build one orchestrator over the shared parts.
    pub fn build_orchestrator(&self) -> Orchestrator {
        let mut orchestrator = Orchestrator::new(self.provider.clone())
            .with_memory(self.memory.clone())
            .with_skills(self.skills.clone());
        if let Some(chain) = &self.chain {
            orchestrator = orchestrator.with_chain(chain.clone());
        }
        orchestrator
    }

    /// Build a session manager whose factory goes through this runtime.
    pub fn session_manager(
        self: &Arc<Self>,
        stream_cb: TextCallback,
        status_cb: TextCallback,
    ) -> Arc<SessionManager> {
        let runtime = self.clone();
        let factory: SessionFactory = Arc::new(move || {
            let runtime = runtime.clone();
            let stream_cb = stream_cb.clone();
            let status_cb = status_cb.clone();
            Box::pin(async move {
                Ok(SessionParts {
                    orchestrator: runtime
                        .build_orchestrator()
                        .with_stream_callback(stream_cb)
                        .with_status_callback(status_cb),
                    cleanup: None,
                })
            })
        });
        SessionManager::new(factory)
    }

    /// Run one turn against a throwaway orchestrator (single-shot mode).
    pub async fn execute(&self, input: &str) -> Result<String> {
        let mut orchestrator = self.build_orchestrator();
        orchestrator.send(input).await
    }

    /// Release process-wide resources. The session manager calls this after
    /// its own shutdown.
    pub fn shutdown(&self) {
        self.browser.stop();
    }
}

/// Open the middleware debug log for appending. Failures only disable the
/// log.
fn open_debug_log() -> Option<Box<dyn std::io::Write + Send>> {
    let path = AppConfig::middleware_log_path();
    if let Some(parent) = path.parent() {
        let _ = std::fs::create_dir_all(parent);
    }
    match std::fs::OpenOptions::new().create(true).append(true).open(&path) {
        Ok(file) => Some(Box::new(file)),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Failed to open middleware debug log");
            None
        }
    }
}
