//! LLM provider adapters for Relay.
//!
//! All adapters implement the `relay_core::Provider` trait. The factory
//! selects the correct adapter from configuration; each adapter translates
//! the abstract model (roles, tool descriptors, parameters) into its
//! provider-specific wire shape.

pub mod anthropic;
pub mod common;
pub mod factory;
pub mod openai_compat;

pub use anthropic::AnthropicProvider;
pub use factory::{build_provider, ProviderKind};
pub use openai_compat::OpenAiCompatProvider;
