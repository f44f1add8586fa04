//! Fetch skill — HTTP GET with naive text extraction.

use async_trait::async_trait;

use relay_core::error::SkillError;
use relay_core::skill::Skill;

const BODY_LIMIT_BYTES: usize = 64 * 1024;
const MAX_TEXT_CHARS: usize = 4000;

/// Fetches content from a URL.
pub struct FetchSkill {
    client: reqwest::Client,
}

impl FetchSkill {
    pub fn new() -> Self {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .unwrap_or_default();
        Self { client }
    }
}

impl Default for FetchSkill {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Skill for FetchSkill {
    fn name(&self) -> &str {
        "fetch"
    }

    fn description(&self) -> &str {
        "Fetches content from a URL."
    }

    fn parameters(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "url": {
                    "type": "string",
                    "description": "The URL to fetch."
                }
            },
            "required": ["url"]
        })
    }

    async fn execute(
        &self,
        args: &serde_json::Map<String, serde_json::Value>,
    ) -> Result<String, SkillError> {
        let url = args
            .get("url")
            .and_then(|v| v.as_str())
            .filter(|u| !u.is_empty())
            .ok_or_else(|| SkillError::InvalidArguments("url is required".into()))?;

        let response = self.client.get(url).send().await.map_err(|e| {
            SkillError::ExecutionFailed {
                skill: "fetch".into(),
                reason: format!("fetch failed: {e}"),
            }
        })?;

        let status = response.status().as_u16();
        let body = response.bytes().await.map_err(|e| SkillError::ExecutionFailed {
            skill: "fetch".into(),
            reason: e.to_string(),
        })?;
        let body = &body[..body.len().min(BODY_LIMIT_BYTES)];

        let mut text = strip_html(&String::from_utf8_lossy(body));
        if text.chars().count() > MAX_TEXT_CHARS {
            text = text.chars().take(MAX_TEXT_CHARS).collect::<String>() + "\n...(truncated)";
        }
        Ok(format!("HTTP {status}\n\n{text}"))
    }
}

/// Minimal HTML stripper — drops tags and collapses whitespace.
fn strip_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut in_tag = false;
    for c in s.chars() {
        match c {
            '<' => in_tag = true,
            '>' => {
                in_tag = false;
                out.push(' ');
            }
            _ if !in_tag => out.push(c),
            _ => {}
        }
    }
    out.split_whitespace().collect::<Vec<_>>().join(" ")
}
