//! File skill — read and write local files.

use async_trait::async_trait;
use std::path::Path;

use relay_core::error::SkillError;
use relay_core::skill::Skill;

const MAX_READ_CHARS: usize = 8000;

/// Reads and writes files on the local filesystem.
pub struct FileSkill;

impl FileSkill {
    pub fn new() -> Self {
        Self
    }
}

impl Default for FileSkill {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Skill for FileSkill {
    fn name(&self) -> &str {
        "file"
    }

    fn description(&self) -> &str {
        "Reads or writes files on the local filesystem."
    }

    fn parameters(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "method": {
                    "type": "string",
                    "enum": ["read", "write"],
                    "description": "The operation to perform."
                },
                "path": {
                    "type": "string",
                    "description": "The file path."
                },
                "content": {
                    "type": "string",
                    "description": "Content to write (for write method)."
                },
                "append": {
                    "type": "boolean",
                    "description": "Append to file instead of overwriting (for write method)."
                }
            },
            "required": ["method", "path"]
        })
    }

    async fn execute(
        &self,
        args: &serde_json::Map<String, serde_json::Value>,
    ) -> Result<String, SkillError> {
        let method = args.get("method").and_then(|v| v.as_str()).unwrap_or("");
        let path = args
            .get("path")
            .and_then(|v| v.as_str())
            .filter(|p| !p.is_empty())
            .ok_or_else(|| SkillError::InvalidArguments("path is required".into()))?;

        match method {
            "read" => {
                let data = tokio::fs::read_to_string(path).await.map_err(|e| {
                    SkillError::ExecutionFailed {
                        skill: "file".into(),
                        reason: format!("read failed: {e}"),
                    }
                })?;
                let mut content = data;
                if content.chars().count() > MAX_READ_CHARS {
                    content =
                        content.chars().take(MAX_READ_CHARS).collect::<String>() + "\n...(truncated)";
                }
                Ok(content)
            }

            "write" => {
                let content = args.get("content").and_then(|v| v.as_str()).unwrap_or("");
                let append = args
                    .get("append")
                    .and_then(|v| v.as_bool())
                    .unwrap_or(false);

                if let Some(parent) = Path::new(path).parent() {
                    let _ = tokio::fs::create_dir_all(parent).await;
                }

                if append {
                    use tokio::io::AsyncWriteExt;
                    let mut file = tokio::fs::OpenOptions::new()
                        .create(true)
                        .append(true)
                        .open(path)
                        .await
                        .map_err(|e| SkillError::ExecutionFailed {
                            skill: "file".into(),
                            reason: format!("open failed: {e}"),
                        })?;
                    file.write_all(content.as_bytes()).await.map_err(|e| {
                        SkillError::ExecutionFailed {
                            skill: "file".into(),
                            reason: format!("write failed: {e}"),
                        }
                    })?;
                } else {
                    tokio::fs::write(path, content).await.map_err(|e| {
                        SkillError::ExecutionFailed {
                            skill: "file".into(),
                            reason: format!("write failed: {e}"),
                        }
                    })?;
                }

                Ok(format!("Written {} bytes to {}", content.len(), path))
            }

            other => Err(SkillError::InvalidArguments(format!(
                "unknown method: {other}"
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
    async fn write_then_read_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("note.txt");
        let skill = FileSkill::new();

        let out = skill
            .execute(&args(serde_json::json!({
                "method": "write",
                "path": path.to_str().unwrap(),
                "content": "hello file"
            })))
            .await
            .unwrap();
        assert!(out.contains("10 bytes"));

        let read = skill
            .execute(&args(serde_json::json!({
                "method": "read",
                "path": path.to_str().unwrap()
            })))
            .await
            .unwrap();
        assert_eq!(read, "hello file");
    }

    #[tokio::test]
    async fn append_mode_appends() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("log.txt");
        let skill = FileSkill::new();
        let path_str = path.to_str().unwrap();

        for chunk in ["one", "two"] {
            skill
                .execute(&args(serde_json::json!({
                    "method": "write",
                    "path": path_str,
                    "content": chunk,
                    "append": true
                })))
                .await
                .unwrap();
        }

        let read = skill
            .execute(&args(serde_json::json!({"method": "read", "path": path_str})))
            .await
            .unwrap();
        assert_eq!(read, "onetwo");
    }

    #[tokio::test]
    async fn write_creates_parent_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/deep/file.txt");
        let skill = FileSkill::new();

        skill
            .execute(&args(serde_json::json!({
                "method": "write",
                "path": path.to_str().unwrap(),
                "content": "x"
            })))
            .await
            .unwrap();
        assert!(path.exists());
    }

    #[tokio::test]
    async fn read_missing_file_fails() {
        let skill = FileSkill::new();
        let err = skill
            .execute(&args(serde_json::json!({
                "method": "read",
                "path": "/nonexistent/definitely/missing.txt"
            })))
            .await
            .unwrap_err();
        assert!(matches!(err, SkillError::ExecutionFailed { .. }));
    }

    #[tokio::test]
    async fn unknown_method_rejected() {
        let skill = FileSkill::new();
        let err = skill
            .execute(&args(serde_json::json!({"method": "delete", "path": "/tmp/x"})))
            .await
            .unwrap_err();
        assert!(matches!(err, SkillError::InvalidArguments(_)));
    }
}
