//! Notes interceptors — a personal note store behind a tool.
//!
//! `NotesMode` injects the `notes` tool spec before the LLM call;
//! `NotesExec` executes the calls the model makes against a JSON file
//! store.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

use relay_core::error::MiddlewareError;
use relay_core::event::{Decision, Event, EventName, ToolInvocation};
use relay_core::middleware::Middleware;
use relay_core::params::{ToolChoice, ToolSpec};

fn note_tool() -> ToolSpec {
    ToolSpec {
        name: "notes".into(),
        description: "Save, view, list, or delete personal notes and reminders.".into(),
        parameters: serde_json::json!({
            "type": "object",
            "properties": {
                "action": {
                    "type": "string",
                    "description": "One of add, view, list, delete.",
                    "enum": ["add", "view", "list", "delete"]
                },
                "title": {
                    "type": "string",
                    "description": "Note title (required for add/view/delete)."
                },
                "body": {
                    "type": "string",
                    "description": "Note body (required for add)."
                },
                "query": {
                    "type": "string",
                    "description": "Optional substring to filter listed notes."
                }
            },
            "required": ["action"]
        }),
    }
}

/* ------------------------------- NotesMode ------------------------------- */

/// Injects the notes tool schema before the LLM call.
pub struct NotesMode;

#[async_trait]
impl Middleware for NotesMode {
    fn id(&self) -> &str {
        "notes_mode"
    }

    fn priority(&self) -> i32 {
        70
    }

    fn should_load(&self, event: &Event) -> bool {
        event.name == EventName::BeforeLlmRequest
    }

    async fn on_event(&self, event: &mut Event) -> Result<Decision, MiddlewareError> {
        if event.name != EventName::BeforeLlmRequest {
            return Ok(Decision::pass());
        }

        let mut params = event.params.clone();
        params.upsert_tool(note_tool());
        params.tool_choice = ToolChoice::Auto;
        Ok(Decision::override_params(
            params,
            "notes_mode: inject tool schema",
        ))
    }
}

/* ------------------------------- NotesExec ------------------------------- */

/// Runs notes tool calls after the model responds.
pub struct NotesExec {
    store: NotesStore,
}

impl NotesExec {
    pub fn new(path: PathBuf) -> Self {
        Self {
            store: NotesStore::open(path),
        }
    }

    fn run_call(&self, call: &ToolInvocation) -> String {
        let action = call.str_arg("action").trim().to_lowercase();
        let title = call.str_arg("title").trim().to_string();
        let body = call.str_arg("body").trim().to_string();
        let query = call.str_arg("query").trim().to_string();

        match action.as_str() {
            "add" => {
                if title.is_empty() || body.is_empty() {
                    return "notes.add requires title and body".into();
                }
                match self.store.add(&title, &body) {
                    Ok(()) => format!("saved note '{title}'"),
                    Err(e) => format!("notes.add failed: {e}"),
                }
            }
            "view" | "get" => {
                if title.is_empty() {
                    return "notes.view requires title".into();
                }
                match self.store.get(&title) {
                    Some(body) => format!("{title}:\n{body}"),
                    None => format!("note '{title}' not found"),
                }
            }
            "list" => {
                let items = self.store.list(&query);
                if items.is_empty() {
                    "no notes found".into()
                } else {
                    format!("notes:\n{}", items.join("\n"))
                }
            }
            "delete" | "remove" => {
                if title.is_empty() {
                    return "notes.delete requires title".into();
                }
                match self.store.delete(&title) {
                    Ok(true) => format!("deleted note '{title}'"),
                    Ok(false) => format!("note '{title}' not found"),
                    Err(e) => format!("notes.delete failed: {e}"),
                }
            }
            other => format!("unsupported notes action '{other}'"),
        }
    }
}

#[async_trait]
impl Middleware for NotesExec {
    fn id(&self) -> &str {
        "notes_exec"
    }

    fn priority(&self) -> i32 {
        60
    }

    fn should_load(&self, event: &Event) -> bool {
        !event.context.tool_calls().is_empty()
    }

    async fn on_event(&self, event: &mut Event) -> Result<Decision, MiddlewareError> {
        if event.name != EventName::AfterLlmResponse {
            return Ok(Decision::pass());
        }

        let outputs: Vec<String> = event
            .context
            .tool_calls()
            .iter()
            .filter(|call| call.tool == "notes")
            .map(|call| self.run_call(call))
            .collect();

        if outputs.is_empty() {
            return Ok(Decision::pass());
        }
        Ok(Decision::cancel_with(outputs.join("\n\n"), "notes_exec"))
    }
}

/* ------------------------------- The store ------------------------------- */

#[derive(Debug, Clone, Serialize, Deserialize)]
struct NoteEntry {
    body: String,
    created: DateTime<Utc>,
    updated: DateTime<Utc>,
}

/// Title-keyed note store persisted as a JSON file.
pub struct NotesStore {
    path: PathBuf,
    notes: Mutex<HashMap<String, NoteEntry>>,
}

impl NotesStore {
    /// Open a store, loading any existing file. Corrupt files start empty.
    pub fn open(path: PathBuf) -> Self {
        let notes = match std::fs::read_to_string(&path) {
            Ok(data) => serde_json::from_str(&data).unwrap_or_else(|e| {
                warn!(path = %path.display(), error = %e, "Ignoring unreadable notes file");
                HashMap::new()
            }),
            Err(_) => HashMap::new(),
        };
        Self {
            path,
            notes: Mutex::new(notes),
        }
    }

    pub fn add(&self, title: &str, body: &str) -> Result<(), String> {
        let mut notes = self.notes.lock().unwrap_or_else(|e| e.into_inner());
        let now = Utc::now();
        let created = notes.get(title).map(|n| n.created).unwrap_or(now);
        notes.insert(
            title.to_string(),
            NoteEntry {
                body: body.to_string(),
                created,
                updated: now,
            },
        );
        self.persist(&notes)
    }

    pub fn get(&self, title: &str) -> Option<String> {
        let notes = self.notes.lock().unwrap_or_else(|e| e.into_inner());
        notes.get(title).map(|n| n.body.clone())
    }

    pub fn list(&self, filter: &str) -> Vec<String> {
        let notes = self.notes.lock().unwrap_or_else(|e| e.into_inner());
        let query = filter.trim().to_lowercase();
        let mut out: Vec<String> = notes
            .iter()
            .filter(|(title, entry)| {
                query.is_empty()
                    || title.to_lowercase().contains(&query)
                    || entry.body.to_lowercase().contains(&query)
            })
            .map(|(title, entry)| {
                format!(
                    "{title} (updated {})",
                    entry.updated.format("%a, %d %b %Y %H:%M:%S UTC")
                )
            })
            .collect();
        out.sort();
        out
    }

    pub fn delete(&self, title: &str) -> Result<bool, String> {
        let mut notes = self.notes.lock().unwrap_or_else(|e| e.into_inner());
        if notes.remove(title).is_none() {
            return Ok(false);
        }
        self.persist(&notes)?;
        Ok(true)
    }

    fn persist(&self, notes: &HashMap<String, NoteEntry>) -> Result<(), String> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| e.to_string())?;
        }
        let data = serde_json::to_string_pretty(notes).map_err(|e| e.to_string())?;
        std::fs::write(&self.path, data).map_err(|e| e.to_string())
    }
}
