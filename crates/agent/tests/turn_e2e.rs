//! End-to-end turn scenarios wiring the orchestrator to real interceptors.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use relay_agent::Orchestrator;
use relay_core::chain::Chain;
use relay_core::error::ProviderError;
use relay_core::message::{Message, ToolCall};
use relay_core::params::LlmParams;
use relay_core::provider::{ChunkSink, Provider, ProviderReply};
use relay_core::registry::MiddlewareRegistry;
use relay_middlewares::{AlarmExec, AlarmMode, Engine, Greeting, LocalCache};

/// Counts calls and pops scripted replies; repeats the last one when the
/// script runs out.
struct CountingProvider {
    replies: Mutex<Vec<ProviderReply>>,
    calls: AtomicUsize,
}

impl CountingProvider {
    fn new(mut replies: Vec<ProviderReply>) -> Arc<Self> {
        replies.reverse();
        Arc::new(Self {
            replies: Mutex::new(replies),
            calls: AtomicUsize::new(0),
        })
    }

    fn text(reply: &str) -> Arc<Self> {
        Self::new(vec![ProviderReply {
            text: reply.into(),
            tool_calls: vec![],
        }])
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Provider for CountingProvider {
    fn name(&self) -> &str {
        "counting"
    }

    async fn reply(
        &self,
        _messages: &[Message],
        _params: &LlmParams,
        _stream: Option<&ChunkSink>,
    ) -> Result<ProviderReply, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let mut replies = self.replies.lock().unwrap();
        if replies.len() > 1 {
            Ok(replies.pop().unwrap())
        } else {
            Ok(replies.first().cloned().unwrap_or_default())
        }
    }
}

fn chain_with(middlewares: Vec<Arc<dyn relay_core::middleware::Middleware>>) -> Arc<Chain> {
    let chain = Chain::new();
    for mw in middlewares {
        chain.use_middleware(mw);
    }
    Arc::new(chain)
}

#[tokio::test]
async fn cached_round_trip_skips_the_adapter() {
    let provider = CountingProvider::text("The capital of France is Paris.");
    let chain = chain_with(vec![Arc::new(LocalCache::new())]);
    let mut orch = Orchestrator::new(provider.clone()).with_chain(chain);

    let first = orch.send("What is the capital of France?").await.unwrap();
    assert_eq!(first, "The capital of France is Paris.");
    assert_eq!(provider.calls(), 1);

    // Within the cache window the adapter must not be called
    let second = orch.send("What is the capital of France?").await.unwrap();
    assert_eq!(second, first);
    assert_eq!(provider.calls(), 1);

    // A different question still reaches the adapter
    orch.send("What about Spain?").await.unwrap();
    assert_eq!(provider.calls(), 2);
}

#[tokio::test]
async fn cache_expiry_reaches_the_adapter_again() {
    let provider = CountingProvider::text("42");
    let chain = chain_with(vec![Arc::new(LocalCache::with_ttl(Duration::from_millis(
        40,
    )))]);
    let mut orch = Orchestrator::new(provider.clone()).with_chain(chain);

    orch.send("meaning of life?").await.unwrap();
    orch.send("meaning of life?").await.unwrap();
    assert_eq!(provider.calls(), 1);

    tokio::time::sleep(Duration::from_millis(80)).await;

    orch.send("meaning of life?").await.unwrap();
    assert_eq!(provider.calls(), 2);
}

#[tokio::test]
async fn greeting_short_circuits_before_the_adapter() {
    let provider = CountingProvider::text("should not run");
    let chain = chain_with(vec![Arc::new(Greeting)]);
    let mut orch = Orchestrator::new(provider.clone()).with_chain(chain);

    let reply = orch.send("hey there").await.unwrap();
    assert_eq!(reply, "Hi, how can I assist you today?");
    assert_eq!(provider.calls(), 0);

    // History carries the exchange as if the model had answered
    assert_eq!(orch.history().len(), 2);
}

#[tokio::test]
async fn injected_tool_round_trips_through_the_executor() {
    // The model sees the injected alarm.set tool and calls it; the registry
    // has no such skill, so the executor interceptor handles it.
    let provider = CountingProvider::new(vec![
        ProviderReply {
            text: String::new(),
            tool_calls: vec![ToolCall {
                id: "call_1".into(),
                name: "alarm.set".into(),
                arguments: r#"{"time":"06:15","label":"run"}"#.into(),
            }],
        },
        ProviderReply {
            text: "Your alarm is ready.".into(),
            tool_calls: vec![],
        },
    ]);

    let engine = Arc::new(Engine::new());
    let dir = tempfile::tempdir().unwrap();
    let chain = chain_with(vec![
        Arc::new(AlarmMode::new(engine)),
        Arc::new(AlarmExec::new(dir.path().join("alarms.json"))),
    ]);
    let mut orch = Orchestrator::new(provider.clone()).with_chain(chain);

    let reply = orch.send("I need an early start tomorrow").await.unwrap();
    assert_eq!(reply, "Your alarm is ready.");
    assert_eq!(provider.calls(), 2);

    // user, assistant-with-tool-call, tool result, assistant-final
    let history = orch.history();
    assert_eq!(history.len(), 4);
    assert_eq!(
        history[2].content,
        "ok: alarm set for 06:15 (run) (persisted)"
    );
    assert_eq!(history[2].tool_name.as_deref(), Some("alarm.set"));
}

#[tokio::test]
async fn disable_list_filters_the_registry_chain() {
    std::env::set_var("RELAY_DISABLED_MIDDLEWARES", "greeting");
    let mut registry = MiddlewareRegistry::new();
    registry.register(Arc::new(Greeting));
    registry.register(Arc::new(LocalCache::new()));
    let chain = registry.build_chain(None).unwrap();
    std::env::remove_var("RELAY_DISABLED_MIDDLEWARES");

    let provider = CountingProvider::text("answered by the model");
    let mut orch = Orchestrator::new(provider.clone()).with_chain(Arc::new(chain));

    // With greeting disabled, a salutation reaches the adapter
    let reply = orch.send("hey there").await.unwrap();
    assert_eq!(reply, "answered by the model");
    assert_eq!(provider.calls(), 1);
}
