//! Concrete interceptors for the Relay middleware chain.
//!
//! Interceptors encode policy, not mechanism — the runtime works with all,
//! some, or none of them enabled. `register_defaults` is the explicit
//! enumeration point: the host calls it once at startup and the
//! configuration disable-list does the rest.
//!
//! Dispatch order (priority descending, ties by registration):
//! deterministic handlers first (110), text rewriters next (100/90), the
//! response cache last before the LLM (80), tool executors after the
//! response (70/60).

pub mod alarm;
pub mod greeting;
pub mod intent_compressor;
pub mod local_cache;
pub mod nlu;
pub mod notes;
pub mod token_budget;
pub mod trash_cleaner;
pub mod weather;

pub use alarm::{AlarmDeterministic, AlarmExec, AlarmMode};
pub use greeting::Greeting;
pub use intent_compressor::IntentCompressor;
pub use local_cache::LocalCache;
pub use nlu::{Engine, IntentResult};
pub use notes::{NotesExec, NotesMode, NotesStore};
pub use token_budget::BudgetLimiter;
pub use trash_cleaner::TrashCleaner;
pub use weather::Weather;

use std::path::PathBuf;
use std::sync::Arc;

use relay_core::registry::MiddlewareRegistry;

/// Register the default interceptor set.
///
/// One shared NLU engine backs the alarm and weather interceptors; the
/// alarm and notes stores persist under `~/.relay/`.
pub fn register_defaults(registry: &mut MiddlewareRegistry) {
    let engine = Arc::new(Engine::new());
    alarm::register_intents(&engine);
    weather::register_intents(&engine);

    let home = relay_home();
    let alarms_path = home.join("alarms.json");

    registry.register(Arc::new(Greeting));
    registry.register(Arc::new(AlarmDeterministic::new(
        engine.clone(),
        alarms_path.clone(),
    )));
    registry.register(Arc::new(AlarmMode::new(engine.clone())));
    registry.register(Arc::new(Weather::new(engine)));
    registry.register(Arc::new(TrashCleaner));
    registry.register(Arc::new(BudgetLimiter));
    registry.register(Arc::new(IntentCompressor));
    registry.register(Arc::new(LocalCache::new()));
    registry.register(Arc::new(AlarmExec::new(alarms_path)));
    registry.register(Arc::new(NotesMode));
    registry.register(Arc::new(NotesExec::new(home.join("notes.json"))));
}

/// `~/.relay`, the directory interceptor stores persist under.
fn relay_home() -> PathBuf {
    let home = std::env::var("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("/tmp"));
    home.join(".relay")
}
