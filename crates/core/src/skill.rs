//! Skill trait — the abstraction over agent capabilities.
//!
//! Skills are what give the agent the ability to act in the world:
//! execute shell commands, read/write files, fetch URLs, drive a browser.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;

use crate::error::SkillError;
use crate::params::ToolSpec;

/// The core Skill trait.
///
/// Each skill (shell, file, fetch, memory, browser, ...) implements this
/// trait. Skills are registered in the SkillRegistry and exposed to the
/// model as tools. `execute` is expected to be bounded in runtime —
/// long-running skills enforce their own timeouts. Skills truncate their own
/// *display* output; the full text is returned to the caller for inclusion
/// in the next LLM turn.
#[async_trait]
pub trait Skill: Send + Sync {
    /// The unique name of this skill (e.g., "shell", "file").
    fn name(&self) -> &str;

    /// A description of what this skill does (sent to the LLM).
    fn description(&self) -> &str;

    /// JSON Schema describing this skill's parameters.
    fn parameters(&self) -> serde_json::Value;

    /// Execute the skill with the given arguments.
    async fn execute(
        &self,
        args: &serde_json::Map<String, serde_json::Value>,
    ) -> Result<String, SkillError>;

    /// Convert this skill into a tool descriptor for the LLM.
    fn to_spec(&self) -> ToolSpec {
        ToolSpec {
            name: self.name().to_string(),
            description: self.description().to_string(),
            parameters: self.parameters(),
        }
    }
}

/// A registry of available skills.
///
/// The orchestrator uses this to:
/// 1. Get tool descriptors to advertise to the LLM
/// 2. Look up and execute skills when the LLM requests them
///
/// Built once at startup and shared behind `Arc`; read-heavy, write-never
/// after that, so no interior locking is needed.
#[derive(Default)]
pub struct SkillRegistry {
    skills: HashMap<String, Arc<dyn Skill>>,
}

impl SkillRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a skill. Replaces any existing skill with the same name.
    pub fn register(&mut self, skill: Arc<dyn Skill>) {
        self.skills.insert(skill.name().to_string(), skill);
    }

    /// Get a skill by name.
    pub fn get(&self, name: &str) -> Option<&Arc<dyn Skill>> {
        self.skills.get(name)
    }

    /// All registered skills.
    pub fn list(&self) -> Vec<&Arc<dyn Skill>> {
        self.skills.values().collect()
    }

    /// All registered skill names, sorted for stable prompts.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.skills.keys().cloned().collect();
        names.sort();
        names
    }

    /// Tool descriptors for every registered skill.
    pub fn specs(&self) -> Vec<ToolSpec> {
        let mut specs: Vec<ToolSpec> = self.skills.values().map(|s| s.to_spec()).collect();
        specs.sort_by(|a, b| a.name.cmp(&b.name));
        specs
    }

    pub fn len(&self) -> usize {
        self.skills.len()
    }

    pub fn is_empty(&self) -> bool {
        self.skills.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// A simple test skill.
    struct EchoSkill;

    #[async_trait]
    impl Skill for EchoSkill {
        fn name(&self) -> &str {
            "echo"
        }
        fn description(&self) -> &str {
            "Echoes back the input"
        }
        fn parameters(&self) -> serde_json::Value {
            serde_json::json!({
                "type": "object",
                "properties": {
                    "text": { "type": "string" }
                },
                "required": ["text"]
            })
        }
        async fn execute(
            &self,
            args: &serde_json::Map<String, serde_json::Value>,
        ) -> Result<String, SkillError> {
            Ok(args.get("text").and_then(|v| v.as_str()).unwrap_or("").to_string())
        }
    }

    #[test]
    fn registry_register_and_lookup() {
        let mut registry = SkillRegistry::new();
        registry.register(Arc::new(EchoSkill));
        assert!(registry.get("echo").is_some());
        assert!(registry.get("nonexistent").is_none());
    }

    #[test]
    fn registry_specs() {
        let mut registry = SkillRegistry::new();
        registry.register(Arc::new(EchoSkill));
        let specs = registry.specs();
        assert_eq!(specs.len(), 1);
        assert_eq!(specs[0].name, "echo");
        assert!(specs[0].parameters["properties"]["text"].is_object());
    }

    #[tokio::test]
    async fn registry_execute_skill() {
        let mut registry = SkillRegistry::new();
        registry.register(Arc::new(EchoSkill));

        let mut args = serde_json::Map::new();
        args.insert("text".into(), serde_json::json!("hello world"));
        let out = registry.get("echo").unwrap().execute(&args).await.unwrap();
        assert_eq!(out, "hello world");
    }

    #[test]
    fn names_are_sorted() {
        struct Named(&'static str);

        #[async_trait]
        impl Skill for Named {
            fn name(&self) -> &str {
                self.0
            }
            fn description(&self) -> &str {
                "n/a"
            }
            fn parameters(&self) -> serde_json::Value {
                serde_json::json!({"type": "object"})
            }
            async fn execute(
                &self,
                _args: &serde_json::Map<String, serde_json::Value>,
            ) -> Result<String, SkillError> {
                Ok(String::new())
            }
        }

        let mut registry = SkillRegistry::new();
        registry.register(Arc::new(Named("shell")));
        registry.register(Arc::new(Named("browser")));
        registry.register(Arc::new(Named("fetch")));
        assert_eq!(registry.names(), vec!["browser", "fetch", "shell"]);
    }
}
