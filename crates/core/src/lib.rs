//! # Relay Core
//!
//! Domain types, traits, and the middleware chain for the Relay agent
//! runtime. This crate defines the contracts that every other crate
//! implements against.
//!
//! ## Design Philosophy
//!
//! Every subsystem is defined as a trait here. Implementations live in their
//! respective crates. This enables:
//! - Swapping implementations via configuration
//! - Easy testing with mock/stub implementations
//! - Clean dependency graph (all crates depend inward on core)

pub mod chain;
pub mod debug;
pub mod error;
pub mod event;
pub mod message;
pub mod middleware;
pub mod params;
pub mod provider;
pub mod registry;
pub mod skill;

// Re-export key types at crate root for ergonomics
pub use chain::{Chain, DecisionResult};
pub use error::{Error, MiddlewareError, ProviderError, Result, SkillError};
pub use event::{ContextValue, Decision, Event, EventContext, EventName, ToolInvocation};
pub use message::{Message, Role, ToolCall};
pub use middleware::Middleware;
pub use params::{LlmParams, ToolChoice, ToolSpec};
pub use provider::{ChunkSink, Provider, ProviderReply};
pub use registry::MiddlewareRegistry;
pub use skill::{Skill, SkillRegistry};
