//! Greeting short-circuit.

use async_trait::async_trait;

use relay_core::error::MiddlewareError;
use relay_core::event::{Decision, Event, EventName};
use relay_core::middleware::Middleware;

/// Intercepts simple salutations and responds immediately without hitting
/// the LLM.
pub struct Greeting;

#[async_trait]
impl Middleware for Greeting {
    fn id(&self) -> &str {
        "greeting"
    }

    fn priority(&self) -> i32 {
        110 // run early
    }

    fn should_load(&self, event: &Event) -> bool {
        event.context.flag("greeting").unwrap_or(true)
    }

    async fn on_event(&self, event: &mut Event) -> Result<Decision, MiddlewareError> {
        if event.name != EventName::BeforeLlmRequest {
            return Ok(Decision::pass());
        }
        let user = event.user_text.trim();
        if user.is_empty() {
            return Ok(Decision::pass());
        }

        if is_greeting_only(user) {
            return Ok(Decision::cancel_with(
                "Hi, how can I assist you today?",
                "greeting",
            ));
        }
        Ok(Decision::pass())
    }
}

/* ---------------------------- Helpers ---------------------------- */

const GREET_WORDS: &[&str] = &[
    "hi",
    "hello",
    "hey",
    "heya",
    "howdy",
    "yo",
    "good",
    "morning",
    "afternoon",
    "evening",
    "greetings",
];

fn is_greeting_only(s: &str) -> bool {
    let s = strip_punct(s);
    let s = s.trim();
    if s.is_empty() {
        return false;
    }
    let words: Vec<&str> = s.split_whitespace().collect();
    if words.is_empty() || words.len() > 4 {
        return false;
    }

    for (i, word) in words.iter().enumerate() {
        let w = strip_punct(word).to_lowercase();
        if w.is_empty() {
            return false;
        }
        // allow "good morning"/"good evening"
        if GREET_WORDS.contains(&w.as_str()) {
            continue;
        }
        // allow polite filler
        if w == "there" && i == words.len() - 1 {
            continue;
        }
        return false;
    }
    true
}

fn strip_punct(s: &str) -> String {
    s.chars()
        .filter(|&c| !(c.is_ascii_punctuation() && c != '\''))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use relay_core::event::EventContext;

    async fn run(text: &str) -> Decision {
        let mut event = Event::before_request(text, EventContext::new());
        Greeting.on_event(&mut event).await.unwrap()
    }

    #[tokio::test]
    async fn plain_greetings_short_circuit() {
        for text in ["hi", "Hello!", "hey there", "good morning", "Howdy"] {
            let decision = run(text).await;
            assert!(decision.cancel, "{text} should cancel");
            assert_eq!(
                decision.replace_text.as_deref(),
                Some("Hi, how can I assist you today?")
            );
        }
    }

    #[tokio::test]
    async fn real_questions_pass_through() {
        for text in [
            "hi, can you check the weather in Berlin?",
            "hello world program in rust",
            "set an alarm for 7",
        ] {
            let decision = run(text).await;
            assert!(!decision.cancel, "{text} should pass");
        }
    }

    #[tokio::test]
    async fn long_salutations_pass_through() {
        let decision = run("good morning my dear assistant friend").await;
        assert!(!decision.cancel);
    }

    #[tokio::test]
    async fn after_response_events_are_ignored() {
        let mut event = Event::after_response("hi", "reply", EventContext::new());
        let decision = Greeting.on_event(&mut event).await.unwrap();
        assert!(!decision.cancel);
    }

    #[test]
    fn context_flag_controls_loading() {
        let mut ctx = EventContext::new();
        let event = Event::before_request("hi", ctx.clone());
        assert!(Greeting.should_load(&event));

        ctx.set_flag("greeting", false);
        let event = Event::before_request("hi", ctx);
        assert!(!Greeting.should_load(&event));
    }
}
