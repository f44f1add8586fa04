//! Script skills — executables in the scripts directory become tools.
//!
//! Each executable file in `scripts_dir` is exposed to the model as skill
//! `script_<stem>`. The script receives its arguments as a single JSON
//! object on stdin and its stdout becomes the tool result.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, warn};

use relay_core::error::SkillError;
use relay_core::skill::Skill;

const DEFAULT_TIMEOUT_SECS: u64 = 60;
const MAX_OUTPUT_CHARS: usize = 4000;

/// A skill backed by an executable script.
pub struct ScriptSkill {
    name: String,
    description: String,
    path: PathBuf,
    timeout_secs: u64,
}

impl ScriptSkill {
    pub fn new(path: PathBuf) -> Self {
        let stem = path
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| "unnamed".into());
        let file_name = path
            .file_name()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_default();
        Self {
            name: format!("script_{stem}"),
            description: format!("Execute local script: {file_name}"),
            path,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }

    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }
}

#[async_trait]
impl Skill for ScriptSkill {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn parameters(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "input": {
                    "type": "object",
                    "description": "Arguments passed to the script as JSON on stdin."
                }
            }
        })
    }

    async fn execute(
        &self,
        args: &serde_json::Map<String, serde_json::Value>,
    ) -> Result<String, SkillError> {
        let input = args
            .get("input")
            .cloned()
            .unwrap_or(serde_json::Value::Object(args.clone()));
        let stdin_payload = serde_json::to_string(&input).unwrap_or_else(|_| "{}".into());

        debug!(script = %self.path.display(), "Running script skill");

        let mut child = Command::new(&self.path)
            .stdin(std::process::Stdio::piped())
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::piped())
            .spawn()
            .map_err(|e| SkillError::ExecutionFailed {
                skill: self.name.clone(),
                reason: e.to_string(),
            })?;

        if let Some(mut stdin) = child.stdin.take() {
            let _ = stdin.write_all(stdin_payload.as_bytes()).await;
            // Closing stdin lets line-reading scripts terminate
        }

        let output = tokio::time::timeout(
            std::time::Duration::from_secs(self.timeout_secs),
            child.wait_with_output(),
        )
        .await
        .map_err(|_| SkillError::Timeout {
            skill: self.name.clone(),
            timeout_secs: self.timeout_secs,
        })?
        .map_err(|e| SkillError::ExecutionFailed {
            skill: self.name.clone(),
            reason: e.to_string(),
        })?;

        let mut text = String::from_utf8_lossy(&output.stdout).trim().to_string();
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Ok(format!("Error: {}\nOutput: {}{}", output.status, text, stderr));
        }
        if text.chars().count() > MAX_OUTPUT_CHARS {
            text = text.chars().take(MAX_OUTPUT_CHARS).collect::<String>() + "\n...(truncated)";
        }
        Ok(text)
    }
}

/// Discover executable files in a directory as script skills.
pub fn discover_scripts(dir: &Path) -> Vec<ScriptSkill> {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return Vec::new();
    };

    let mut skills = Vec::new();
    for entry in entries.flatten() {
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        if !is_executable(&path) {
            continue;
        }
        debug!(script = %path.display(), "Discovered script skill");
        skills.push(ScriptSkill::new(path));
    }

    if skills.is_empty() {
        warn!(dir = %dir.display(), "No executable scripts found");
    }
    skills.sort_by(|a, b| a.name.cmp(&b.name));
    skills
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    path.metadata()
        .map(|m| m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(_path: &Path) -> bool {
    true
}
