//! Browser skill — read or screenshot a page via the shared controller.

use async_trait::async_trait;
use std::sync::Arc;

use relay_browser::Controller;
use relay_core::error::SkillError;
use relay_core::skill::Skill;

const MAX_TEXT_CHARS: usize = 8000;

/// Browses a URL through the shared headless Chrome controller.
pub struct BrowserSkill {
    controller: Arc<Controller>,
}

impl BrowserSkill {
    pub fn new(controller: Arc<Controller>) -> Self {
        Self { controller }
    }
}

#[async_trait]
impl Skill for BrowserSkill {
    fn name(&self) -> &str {
        "browser"
    }

    fn description(&self) -> &str {
        "Browses a URL and extracts text content. Use this to read web pages."
    }

    fn parameters(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "action": {
                    "type": "string",
                    "enum": ["read", "screenshot"],
                    "description": "Action to perform."
                },
                "url": {
                    "type": "string",
                    "description": "The URL to visit."
                }
            },
            "required": ["action", "url"]
        })
    }

    async fn execute(
        &self,
        args: &serde_json::Map<String, serde_json::Value>,
    ) -> Result<String, SkillError> {
        let action = args.get("action").and_then(|v| v.as_str()).unwrap_or("");
        let url = args
            .get("url")
            .and_then(|v| v.as_str())
            .filter(|u| !u.is_empty())
            .ok_or_else(|| SkillError::InvalidArguments("url is required".into()))?;

        match action {
            "read" => {
                let mut text = self.controller.navigate_and_extract(url).await.map_err(|e| {
                    SkillError::ExecutionFailed {
                        skill: "browser".into(),
                        reason: e.to_string(),
                    }
                })?;
                if text.chars().count() > MAX_TEXT_CHARS {
                    text = text.chars().take(MAX_TEXT_CHARS).collect::<String>()
                        + "\n...(truncated)";
                }
                Ok(text)
            }

            "screenshot" => {
                let png = self.controller.screenshot(url).await.map_err(|e| {
                    SkillError::ExecutionFailed {
                        skill: "browser".into(),
                        reason: e.to_string(),
                    }
                })?;
                Ok(format!(
                    "Screenshot taken ({} bytes). (Display not supported in CLI)",
                    png.len()
                ))
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
    use relay_browser::BrowserConfig;

    fn skill() -> BrowserSkill {
        BrowserSkill::new(Arc::new(Controller::new(BrowserConfig {
            enabled: false,
            headless: true,
        })))
    }

    fn args(json: serde_json::Value) -> serde_json::Map<String, serde_json::Value> {
        json.as_object().unwrap().clone()
    }

    #[tokio::test]
    async fn unknown_action_rejected() {
        let err = skill()
            .execute(&args(serde_json::json!({"action": "click", "url": "https://example.com"})))
            .await
            .unwrap_err();
        assert!(matches!(err, SkillError::InvalidArguments(_)));
    }

    #[tokio::test]
    async fn missing_url_rejected() {
        let err = skill()
            .execute(&args(serde_json::json!({"action": "read"})))
            .await
            .unwrap_err();
        assert!(matches!(err, SkillError::InvalidArguments(_)));
    }

    #[tokio::test]
    async fn stopped_controller_reports_failure() {
        let err = skill()
            .execute(&args(serde_json::json!({"action": "read", "url": "https://example.com"})))
            .await
            .unwrap_err();
        assert!(matches!(err, SkillError::ExecutionFailed { .. }));
    }
}
