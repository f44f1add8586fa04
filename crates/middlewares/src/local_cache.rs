//! Local response cache.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use async_trait::async_trait;

use relay_core::error::MiddlewareError;
use relay_core::event::{Decision, Event, EventName};
use relay_core::middleware::Middleware;

const DEFAULT_TTL: Duration = Duration::from_secs(5 * 60);

struct CacheEntry {
    response: String,
    stored_at: Instant,
}

/// Skips the LLM if the exact prompt was answered recently.
///
/// On `before_llm_request` a fresh hit cancels with the cached reply; on
/// `after_llm_response` the exchange is stored. Entries expire on read.
pub struct LocalCache {
    ttl: Duration,
    entries: Mutex<HashMap<String, CacheEntry>>,
}

impl LocalCache {
    pub fn new() -> Self {
        Self::with_ttl(DEFAULT_TTL)
    }

    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: Mutex::new(HashMap::new()),
        }
    }
}

impl Default for LocalCache {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Middleware for LocalCache {
    fn id(&self) -> &str {
        "local-cache"
    }

    fn priority(&self) -> i32 {
        // Run after the deterministic handlers and rewriters, right before
        // the LLM call.
        80
    }

    async fn on_event(&self, event: &mut Event) -> Result<Decision, MiddlewareError> {
        let mut entries = self
            .entries
            .lock()
            .map_err(|_| MiddlewareError::execution("local-cache", "poisoned cache lock"))?;

        match event.name {
            EventName::BeforeLlmRequest => {
                if let Some(entry) = entries.get(&event.user_text) {
                    if entry.stored_at.elapsed() < self.ttl {
                        let response = entry.response.clone();
                        return Ok(Decision::cancel_with(response, "served from local cache"));
                    }
                    entries.remove(&event.user_text);
                }
            }
            EventName::AfterLlmResponse => {
                if !event.user_text.is_empty() && !event.llm_text.is_empty() {
                    entries.insert(
                        event.user_text.clone(),
                        CacheEntry {
                            response: event.llm_text.clone(),
                            stored_at: Instant::now(),
                        },
                    );
                }
            }
            EventName::BeforeUserReply => {}
        }

        Ok(Decision::pass())
    }
}
