//! Provider factory — configuration string → adapter.
//!
//! API keys resolve from `RELAY_<PROVIDER>_API_KEY` first, then the key the
//! caller passed (typically from the config file).

use std::sync::Arc;

use tracing::info;

use relay_core::error::ProviderError;
use relay_core::provider::Provider;

use crate::anthropic::AnthropicProvider;
use crate::openai_compat::OpenAiCompatProvider;

/// The providers the runtime knows how to build.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderKind {
    Ollama,
    OpenAi,
    OpenRouter,
    Anthropic,
}

impl ProviderKind {
    pub fn parse(name: &str) -> Result<Self, ProviderError> {
        match name.trim().to_lowercase().as_str() {
            "ollama" => Ok(Self::Ollama),
            "openai" => Ok(Self::OpenAi),
            "openrouter" => Ok(Self::OpenRouter),
            "anthropic" => Ok(Self::Anthropic),
            other => Err(ProviderError::NotConfigured(format!(
                "unsupported provider: {other}"
            ))),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ollama => "ollama",
            Self::OpenAi => "openai",
            Self::OpenRouter => "openrouter",
            Self::Anthropic => "anthropic",
        }
    }
}

/// Resolve the API key for a provider: environment first, config second.
fn resolve_api_key(kind: ProviderKind, configured: Option<&str>) -> Option<String> {
    let var = format!("RELAY_{}_API_KEY", kind.as_str().to_uppercase());
    std::env::var(&var)
        .ok()
        .filter(|k| !k.is_empty())
        .or_else(|| configured.map(str::to_string).filter(|k| !k.is_empty()))
}

/// Build a provider adapter from configuration values.
pub fn build_provider(
    provider: &str,
    model: &str,
    base_url: Option<&str>,
    api_key: Option<&str>,
) -> Result<Arc<dyn Provider>, ProviderError> {
    let kind = ProviderKind::parse(provider)?;
    info!(provider = kind.as_str(), model, "Building provider adapter");

    match kind {
        ProviderKind::Ollama => Ok(Arc::new(OpenAiCompatProvider::ollama(base_url, model)?)),
        ProviderKind::OpenAi => {
            let key = resolve_api_key(kind, api_key).ok_or_else(|| {
                ProviderError::NotConfigured("openai requires an API key".into())
            })?;
            match base_url {
                Some(url) if !url.is_empty() => {
                    Ok(Arc::new(OpenAiCompatProvider::new("openai", url, key, model)?))
                }
                _ => Ok(Arc::new(OpenAiCompatProvider::openai(key, model)?)),
            }
        }
        ProviderKind::OpenRouter => {
            let key = resolve_api_key(kind, api_key).ok_or_else(|| {
                ProviderError::NotConfigured("openrouter requires an API key".into())
            })?;
            Ok(Arc::new(OpenAiCompatProvider::openrouter(key, model)?))
        }
        ProviderKind::Anthropic => {
            let key = resolve_api_key(kind, api_key).ok_or_else(|| {
                ProviderError::NotConfigured("anthropic requires an API key".into())
            })?;
            let adapter = AnthropicProvider::new(key, model)?;
            let adapter = match base_url {
                Some(url) if !url.is_empty() => adapter.with_base_url(url),
                _ => adapter,
            };
            Ok(Arc::new(adapter))
        }
    }
}
