//! Alarm interceptors.
//!
//! Policy, by NLU confidence:
//! - below 50: do nothing
//! - 50..79:   expose `alarm.set`, the LLM decides (tool_choice auto)
//! - 80+:      deterministic (cancel; the LLM is never called)
//!
//! Three interceptors share the policy: `AlarmDeterministic` short-circuits
//! high-confidence requests, `AlarmMode` keeps the tool specs available,
//! and `AlarmExec` executes `alarm.set` / `timer.set` tool calls the model
//! emits.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, OnceLock};

use async_trait::async_trait;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::warn;

use relay_core::error::MiddlewareError;
use relay_core::event::{Decision, Event, EventName, ToolInvocation};
use relay_core::middleware::Middleware;
use relay_core::params::ToolSpec;

use crate::nlu::Engine;

const CONFIDENCE_LOW: i64 = 50;
const CONFIDENCE_HIGH: i64 = 80;

/// Register the set-alarm utterance templates on the shared engine.
pub fn register_intents(engine: &Engine) {
    engine.register_intent(
        "set_alarm",
        &[
            "set alarm for {time}",
            "set an alarm for {time}",
            "wake me up at {time}",
            "wake me up {time}",
            "create alarm for {time}",
            "alarm at {time}",
            "set alarm at {time}",
        ],
    );
}

/// NLU lookup with caching in the event context: template engine first,
/// keyword heuristic second.
fn alarm_nlu(engine: &Engine, event: &mut Event) -> (String, i64, HashMap<String, String>) {
    if let Some((intent, confidence, slots)) = event.context.nlu() {
        return (intent, confidence, slots);
    }

    let parsed = engine.parse(&event.user_text);
    if parsed.intent == "set_alarm" && parsed.confidence > 0.0 {
        event.context.cache_nlu("set_alarm", 100, parsed.slots.clone());
        return ("set_alarm".into(), 100, parsed.slots);
    }

    let (intent, confidence, slots) = alarm_heuristic(&event.user_text);
    event.context.cache_nlu(&intent, confidence, slots.clone());
    (intent, confidence, slots)
}

fn time_hhmm_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)\b([01]?\d|2[0-3]):[0-5]\d\b").expect("static regex"))
}

fn time_ampm_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)\b(1[0-2]|0?[1-9])\s*(am|pm)\b").expect("static regex"))
}

fn after_at_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)\b(?:at|for)\s+(.+)$").expect("static regex"))
}

/// Keyword fallback when no template matched: alarm-like phrasing scores
/// mid confidence, with a best-effort time slot.
fn alarm_heuristic(input: &str) -> (String, i64, HashMap<String, String>) {
    let s = input.trim().to_lowercase();
    if s.is_empty() {
        return (String::new(), 0, HashMap::new());
    }

    let alarm_like = ["alarm", "wake me up", "set an alarm", "set alarm"]
        .iter()
        .any(|k| s.contains(k));
    if !alarm_like {
        return (String::new(), 0, HashMap::new());
    }

    let mut slots = HashMap::new();
    if let Some(m) = time_hhmm_re().find(input) {
        slots.insert("time".to_string(), m.as_str().to_string());
    } else if let Some(c) = time_ampm_re().captures(input) {
        let time = format!(
            "{}{}",
            c.get(1).map_or("", |m| m.as_str()),
            c.get(2).map_or("", |m| m.as_str())
        );
        slots.insert("time".to_string(), time.trim().to_string());
    } else if let Some(c) = after_at_re().captures(input) {
        if let Some(m) = c.get(1) {
            slots.insert("time".to_string(), m.as_str().trim().to_string());
        }
    }

    ("set_alarm".into(), 60, slots)
}

/* ------------------------------ Persistence ------------------------------ */

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredAlarm {
    pub time: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub label: String,
}

/// Append an alarm to the JSON file store.
fn persist_alarm(path: &PathBuf, alarm: StoredAlarm) -> Result<(), String> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| e.to_string())?;
    }

    let mut alarms: Vec<StoredAlarm> = std::fs::read_to_string(path)
        .ok()
        .and_then(|data| serde_json::from_str(&data).ok())
        .unwrap_or_default();
    alarms.push(alarm);

    let data = serde_json::to_string_pretty(&alarms).map_err(|e| e.to_string())?;
    std::fs::write(path, data).map_err(|e| e.to_string())
}

/* ------------------------------ Tool specs ------------------------------ */

pub fn alarm_set_tool() -> ToolSpec {
    ToolSpec {
        name: "alarm.set".into(),
        description: "Set an alarm at a given time".into(),
        parameters: serde_json::json!({
            "type": "object",
            "properties": {
                "time": {
                    "type": "string",
                    "description": "Time for the alarm (e.g. 07:30, 7am, tomorrow 8)"
                },
                "label": {
                    "type": "string",
                    "description": "Optional description"
                }
            },
            "required": ["time"]
        }),
    }
}

pub fn timer_set_tool() -> ToolSpec {
    ToolSpec {
        name: "timer.set".into(),
        description: "Start a countdown timer for a number of minutes".into(),
        parameters: serde_json::json!({
            "type": "object",
            "properties": {
                "minutes": {
                    "type": "number",
                    "description": "Timer length in minutes"
                },
                "message": {
                    "type": "string",
                    "description": "Notification message when the timer finishes"
                }
            },
            "required": ["minutes"]
        }),
    }
}

/* --------------------- AlarmDeterministic (before request) --------------------- */

/// Handles high-confidence set-alarm requests locally, without the LLM.
pub struct AlarmDeterministic {
    engine: Arc<Engine>,
    store_path: PathBuf,
}

impl AlarmDeterministic {
    pub fn new(engine: Arc<Engine>, store_path: PathBuf) -> Self {
        Self { engine, store_path }
    }
}

#[async_trait]
impl Middleware for AlarmDeterministic {
    fn id(&self) -> &str {
        "alarm_deterministic"
    }

    fn priority(&self) -> i32 {
        110
    }

    fn should_load(&self, event: &Event) -> bool {
        event.name == EventName::BeforeLlmRequest
    }

    async fn on_event(&self, event: &mut Event) -> Result<Decision, MiddlewareError> {
        if event.name != EventName::BeforeLlmRequest {
            return Ok(Decision::pass());
        }

        let (intent, confidence, slots) = alarm_nlu(&self.engine, event);
        if intent != "set_alarm" || confidence < CONFIDENCE_HIGH {
            return Ok(Decision::pass());
        }

        let time = slots
            .get("time")
            .map(|t| t.trim())
            .filter(|t| !t.is_empty())
            .unwrap_or("unknown")
            .to_string();

        if let Err(e) = persist_alarm(
            &self.store_path,
            StoredAlarm {
                time: time.clone(),
                label: String::new(),
            },
        ) {
            warn!(error = %e, "Failed to persist alarm");
        }

        let response = serde_json::json!({
            "action": "set_alarm",
            "time": time,
            "status": "success",
            "message": format!("Alarm set for {time} (persisted)."),
        });

        Ok(Decision::cancel_with(
            response.to_string(),
            "alarm_deterministic: high-confidence; handled locally",
        ))
    }
}

/* --------------------------- AlarmMode (tool injector) --------------------------- */

/// Keeps the alarm/timer tool specs available to the model.
pub struct AlarmMode {
    engine: Arc<Engine>,
}

impl AlarmMode {
    pub fn new(engine: Arc<Engine>) -> Self {
        Self { engine }
    }
}

#[async_trait]
impl Middleware for AlarmMode {
    fn id(&self) -> &str {
        "alarm_mode"
    }

    fn priority(&self) -> i32 {
        110
    }

    fn should_load(&self, event: &Event) -> bool {
        event.name == EventName::BeforeLlmRequest
    }

    async fn on_event(&self, event: &mut Event) -> Result<Decision, MiddlewareError> {
        if event.name != EventName::BeforeLlmRequest {
            return Ok(Decision::pass());
        }

        let mut params = event.params.clone();
        params.upsert_tool(alarm_set_tool());
        params.upsert_tool(timer_set_tool());

        let (intent, confidence, _) = alarm_nlu(&self.engine, event);
        let reason = if intent == "set_alarm"
            && (CONFIDENCE_LOW..CONFIDENCE_HIGH).contains(&confidence)
        {
            "alarm_mode: mid-confidence; tool enabled; LLM decides"
        } else {
            "alarm_mode: providing tool to LLM"
        };

        Ok(Decision::override_params(params, reason))
    }
}

/* ------------------------------- AlarmExec ------------------------------- */

/// Executes `alarm.set` / `timer.set` tool calls emitted by the model.
///
/// Runs on `after_llm_response` and cancels further processing when it
/// handled at least one call.
pub struct AlarmExec {
    store_path: PathBuf,
}

impl AlarmExec {
    pub fn new(store_path: PathBuf) -> Self {
        Self { store_path }
    }

    fn run_alarm_tool(&self, call: &ToolInvocation) -> String {
        let time = call.str_arg("time").trim().to_string();
        let label = call.str_arg("label").trim().to_string();

        if time.is_empty() {
            return r#"alarm.set: missing required arg "time""#.into();
        }

        if let Err(e) = persist_alarm(
            &self.store_path,
            StoredAlarm {
                time: time.clone(),
                label: label.clone(),
            },
        ) {
            return format!("alarm.set failed: {e}");
        }

        if label.is_empty() {
            format!("ok: alarm set for {time} (persisted)")
        } else {
            format!("ok: alarm set for {time} ({label}) (persisted)")
        }
    }

    fn run_timer_tool(&self, call: &ToolInvocation) -> String {
        let minutes = match call.num_arg("minutes") {
            Some(m) if m > 0.0 => m,
            _ => return "timer.set: invalid or missing 'minutes' argument".into(),
        };
        let message = {
            let m = call.str_arg("message");
            if m.is_empty() { "Timer finished!" } else { m }
        };
        let seconds = (minutes * 60.0) as u64;

        let notify = if cfg!(target_os = "macos") {
            format!(
                "sleep {seconds} && osascript -e 'display notification \"{message}\" with title \"Relay Timer\"'"
            )
        } else if cfg!(target_os = "linux") {
            format!("sleep {seconds} && notify-send \"Relay Timer\" \"{message}\"")
        } else {
            return "timer.set: background timers are currently only supported on Linux and macOS"
                .into();
        };

        // The child is deliberately not awaited: it survives as a detached
        // process so the timer outlives the turn.
        match std::process::Command::new("sh").arg("-c").arg(&notify).spawn() {
            Ok(_) => format!("ok: timer set for {minutes:.1} minutes with message: '{message}'"),
            Err(e) => format!("timer.set failed to start: {e}"),
        }
    }
}

#[async_trait]
impl Middleware for AlarmExec {
    fn id(&self) -> &str {
        "alarm_exec"
    }

    fn priority(&self) -> i32 {
        70
    }

    fn should_load(&self, event: &Event) -> bool {
        !event.context.tool_calls().is_empty()
    }

    async fn on_event(&self, event: &mut Event) -> Result<Decision, MiddlewareError> {
        if event.name != EventName::AfterLlmResponse {
            return Ok(Decision::pass());
        }

        let calls = event.context.tool_calls().to_vec();
        if calls.is_empty() {
            return Ok(Decision::pass());
        }

        let mut outputs = Vec::new();
        let mut handled = false;
        for call in &calls {
            let output = match call.tool.as_str() {
                "alarm.set" => {
                    handled = true;
                    self.run_alarm_tool(call)
                }
                "timer.set" => {
                    handled = true;
                    self.run_timer_tool(call)
                }
                _ => continue,
            };
            if !output.trim().is_empty() {
                outputs.push(output);
            }
        }

        if !handled {
            return Ok(Decision::pass());
        }
        Ok(Decision::cancel_with(outputs.join("\n\n"), "alarm_exec"))
    }
}
