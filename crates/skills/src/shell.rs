//! Shell skill — run a command line through `sh -c`.

use async_trait::async_trait;
use tokio::process::Command;
use tracing::debug;

use relay_core::error::SkillError;
use relay_core::skill::Skill;

const DEFAULT_TIMEOUT_SECS: u64 = 30;
const MAX_OUTPUT_CHARS: usize = 4000;

/// Executes shell commands with a per-call timeout.
pub struct ShellSkill {
    default_timeout_secs: u64,
}

impl ShellSkill {
    pub fn new() -> Self {
        Self {
            default_timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }

    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.default_timeout_secs = secs;
        self
    }
}

impl Default for ShellSkill {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Skill for ShellSkill {
    fn name(&self) -> &str {
        "shell"
    }

    fn description(&self) -> &str {
        "Executes a shell command. Use this to run system commands, list files, etc."
    }

    fn parameters(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "command": {
                    "type": "string",
                    "description": "The shell command to execute."
                },
                "timeout": {
                    "type": "integer",
                    "description": "Timeout in seconds (default 30)."
                }
            },
            "required": ["command"]
        })
    }

    async fn execute(
        &self,
        args: &serde_json::Map<String, serde_json::Value>,
    ) -> Result<String, SkillError> {
        let command = args
            .get("command")
            .and_then(|v| v.as_str())
            .filter(|c| !c.is_empty())
            .ok_or_else(|| SkillError::InvalidArguments("command is required".into()))?;

        let timeout_secs = args
            .get("timeout")
            .and_then(|v| v.as_u64())
            .unwrap_or(self.default_timeout_secs);

        debug!(command, timeout_secs, "Running shell command");

        let run = Command::new("sh").arg("-c").arg(command).output();
        let output = tokio::time::timeout(std::time::Duration::from_secs(timeout_secs), run)
            .await
            .map_err(|_| SkillError::Timeout {
                skill: "shell".into(),
                timeout_secs,
            })?
            .map_err(|e| SkillError::ExecutionFailed {
                skill: "shell".into(),
                reason: e.to_string(),
            })?;

        let mut combined = String::from_utf8_lossy(&output.stdout).to_string();
        combined.push_str(&String::from_utf8_lossy(&output.stderr));

        // Command failures go back as text so the model can react
        if !output.status.success() {
            return Ok(format!("Error: {}\nOutput: {}", output.status, combined));
        }

        let mut text = combined.trim().to_string();
        if text.chars().count() > MAX_OUTPUT_CHARS {
            text = text.chars().take(MAX_OUTPUT_CHARS).collect::<String>() + "\n...(truncated)";
        }
        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(json: serde_json::Value) -> serde_json::Map<String, serde_json::Value> {
        json.as_object().unwrap().clone()
    }

    #[tokio::test]
    async fn runs_simple_command() {
        let skill = ShellSkill::new();
        let out = skill
            .execute(&args(serde_json::json!({"command": "echo relay"})))
            .await
            .unwrap();
        assert_eq!(out, "relay");
    }

    #[tokio::test]
    async fn missing_command_is_invalid() {
        let skill = ShellSkill::new();
        let err = skill.execute(&args(serde_json::json!({}))).await.unwrap_err();
        assert!(matches!(err, SkillError::InvalidArguments(_)));
    }

    #[tokio::test]
    async fn failing_command_reported_as_text() {
        let skill = ShellSkill::new();
        let out = skill
            .execute(&args(serde_json::json!({"command": "exit 3"})))
            .await
            .unwrap();
        assert!(out.starts_with("Error:"));
    }

    #[tokio::test]
    async fn timeout_is_enforced() {
        let skill = ShellSkill::new();
        let err = skill
            .execute(&args(serde_json::json!({"command": "sleep 5", "timeout": 1})))
            .await
            .unwrap_err();
        assert!(matches!(err, SkillError::Timeout { .. }));
    }

    #[tokio::test]
    async fn long_output_is_truncated() {
        let skill = ShellSkill::new();
        let out = skill
            .execute(&args(serde_json::json!({"command": "yes x | head -3000"})))
            .await
            .unwrap();
        assert!(out.ends_with("...(truncated)"));
        assert!(out.chars().count() <= MAX_OUTPUT_CHARS + 20);
    }
}
