//! Built-in skills for Relay.
//!
//! Skills are the local functions the model may invoke: shell commands,
//! file access, URL fetching, memory, the shared headless browser, and any
//! executable dropped into the configured scripts directory.

pub mod browser;
pub mod fetch;
pub mod file;
pub mod memory;
pub mod script;
pub mod shell;

pub use browser::BrowserSkill;
pub use fetch::FetchSkill;
pub use file::FileSkill;
pub use memory::MemorySkill;
pub use script::{discover_scripts, ScriptSkill};
pub use shell::ShellSkill;

use std::path::Path;
use std::sync::Arc;

use relay_browser::Controller;
use relay_core::skill::SkillRegistry;
use relay_memory::MemoryStore;

/// Assemble the default skill registry.
///
/// The browser skill is registered only when a controller is supplied;
/// script skills only when the directory exists.
pub fn default_registry(
    memory: Arc<MemoryStore>,
    browser: Option<Arc<Controller>>,
    scripts_dir: Option<&Path>,
) -> SkillRegistry {
    let mut registry = SkillRegistry::new();
    registry.register(Arc::new(ShellSkill::new()));
    registry.register(Arc::new(FileSkill::new()));
    registry.register(Arc::new(FetchSkill::new()));
    registry.register(Arc::new(MemorySkill::new(memory)));

    if let Some(controller) = browser {
        registry.register(Arc::new(BrowserSkill::new(controller)));
    }

    if let Some(dir) = scripts_dir {
        for skill in discover_scripts(dir) {
            registry.register(Arc::new(skill));
        }
    }

    registry
}
