//! Memory skill — lets the model store and retrieve facts.

use async_trait::async_trait;
use std::sync::Arc;

use relay_core::error::SkillError;
use relay_core::skill::Skill;
use relay_memory::MemoryStore;

/// The session key under which user facts are kept.
const FACTS_SESSION: &str = "user_facts";

/// Stores or retrieves information from the shared memory store.
pub struct MemorySkill {
    store: Arc<MemoryStore>,
}

impl MemorySkill {
    pub fn new(store: Arc<MemoryStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Skill for MemorySkill {
    fn name(&self) -> &str {
        "memory"
    }

    fn description(&self) -> &str {
        "Stores or retrieves information from long-term memory."
    }

    fn parameters(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "action": {
                    "type": "string",
                    "enum": ["remember", "recall"],
                    "description": "Action to perform."
                },
                "key": {
                    "type": "string",
                    "description": "The key or topic (for remember)."
                },
                "value": {
                    "type": "string",
                    "description": "The information to store (for remember)."
                },
                "query": {
                    "type": "string",
                    "description": "The search query (for recall)."
                }
            },
            "required": ["action"]
        })
    }

    async fn execute(
        &self,
        args: &serde_json::Map<String, serde_json::Value>,
    ) -> Result<String, SkillError> {
        let action = args.get("action").and_then(|v| v.as_str()).unwrap_or("");

        match action {
            "remember" => {
                let key = args.get("key").and_then(|v| v.as_str()).unwrap_or("");
                let value = args
                    .get("value")
                    .and_then(|v| v.as_str())
                    .filter(|v| !v.is_empty())
                    .ok_or_else(|| {
                        SkillError::InvalidArguments("value is required for remember".into())
                    })?;

                let text = if key.is_empty() {
                    value.to_string()
                } else {
                    format!("{key}: {value}")
                };
                self.store.index(FACTS_SESSION, &text);
                Ok(format!("Remembered: {text}"))
            }

            "recall" => {
                let query = args
                    .get("query")
                    .and_then(|v| v.as_str())
                    .filter(|q| !q.is_empty())
                    .ok_or_else(|| {
                        SkillError::InvalidArguments("query is required for recall".into())
                    })?;

                let hits = self.store.query(FACTS_SESSION, query, 5);
                if hits.is_empty() {
                    return Ok("No relevant memories found.".into());
                }
                let mut out = String::new();
                for hit in hits {
                    out.push_str("- ");
                    out.push_str(&hit);
                    out.push('\n');
                }
                Ok(out)
            }

            other => Err(SkillError::InvalidArguments(format!(
                "unknown action: {other}"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(json: serde_json::Value) -> serde_json::Map<String, serde_json::Value> {
        json.as_object().unwrap().clone()
    }

    #[tokio::test]
    async fn remember_then_recall() {
        let store = Arc::new(MemoryStore::new());
        let skill = MemorySkill::new(store);

        let out = skill
            .execute(&args(serde_json::json!({
                "action": "remember",
                "key": "favorite color",
                "value": "blue"
            })))
            .await
            .unwrap();
        assert_eq!(out, "Remembered: favorite color: blue");

        let out = skill
            .execute(&args(serde_json::json!({
                "action": "recall",
                "query": "favorite color"
            })))
            .await
            .unwrap();
        assert!(out.contains("blue"));
    }

    #[tokio::test]
    async fn recall_without_matches() {
        let skill = MemorySkill::new(Arc::new(MemoryStore::new()));
        let out = skill
            .execute(&args(serde_json::json!({"action": "recall", "query": "anything"})))
            .await
            .unwrap();
        assert_eq!(out, "No relevant memories found.");
    }

    #[tokio::test]
    async fn remember_requires_value() {
        let skill = MemorySkill::new(Arc::new(MemoryStore::new()));
        let err = skill
            .execute(&args(serde_json::json!({"action": "remember", "key": "k"})))
            .await
            .unwrap_err();
        assert!(matches!(err, SkillError::InvalidArguments(_)));
    }

    #[tokio::test]
    async fn unknown_action_rejected() {
        let skill = MemorySkill::new(Arc::new(MemoryStore::new()));
        let err = skill
            .execute(&args(serde_json::json!({"action": "forget"})))
            .await
            .unwrap_err();
        assert!(matches!(err, SkillError::InvalidArguments(_)));
    }
}
