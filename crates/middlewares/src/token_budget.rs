//! Parameter capper — enforce a per-request output-token budget.

use async_trait::async_trait;

use relay_core::error::MiddlewareError;
use relay_core::event::{Decision, Event, EventName};
use relay_core::middleware::Middleware;

/// Caps `max_tokens` at the budget carried in the event context.
///
/// Prefers the smaller of the existing `max_tokens` and the provided
/// budget; a zero `max_tokens` counts as unbounded and gets capped.
pub struct BudgetLimiter;

#[async_trait]
impl Middleware for BudgetLimiter {
    fn id(&self) -> &str {
        "token_budget"
    }

    fn priority(&self) -> i32 {
        90
    }

    // Always loads; no-ops when no budget is present.
    fn should_load(&self, _event: &Event) -> bool {
        true
    }

    async fn on_event(&self, event: &mut Event) -> Result<Decision, MiddlewareError> {
        if event.name != EventName::BeforeLlmRequest {
            return Ok(Decision::pass());
        }
        let Some(budget) = event.context.token_budget().filter(|b| *b > 0) else {
            return Ok(Decision::pass());
        };
        let budget = budget as u32;

        if event.params.max_tokens == 0 || event.params.max_tokens > budget {
            let mut params = event.params.clone();
            params.max_tokens = budget;
            return Ok(Decision::override_params(
                params,
                "token_budget: capped max_tokens",
            ));
        }

        Ok(Decision::pass())
    }
}
