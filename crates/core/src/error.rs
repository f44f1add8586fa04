//! Error types for the Relay domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each bounded context has its own error variant.

use thiserror::Error;

/// The top-level error type for all Relay operations.
#[derive(Debug, Error)]
pub enum Error {
    // --- Invalid input ---
    #[error("empty input")]
    EmptyInput,

    // --- Middleware errors ---
    #[error("Middleware error: {0}")]
    Middleware(#[from] MiddlewareError),

    /// A middleware canceled the turn without supplying a replacement reply.
    #[error("{0}")]
    CanceledByMiddleware(String),

    // --- Provider errors ---
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    // --- Skill errors ---
    #[error("Skill error: {0}")]
    Skill(#[from] SkillError),

    // --- Cancellation / deadline ---
    #[error("turn deadline exceeded")]
    DeadlineExceeded,

    // --- Configuration errors ---
    #[error("Configuration error: {message}")]
    Config { message: String },

    // --- Serialization ---
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // --- Generic ---
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

// --- Bounded context errors ---

#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    #[error("API request failed: {message} (status: {status_code})")]
    ApiError { status_code: u16, message: String },

    #[error("Rate limited by provider, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("empty response from model")]
    EmptyResponse,

    #[error("Stream interrupted: {0}")]
    StreamInterrupted(String),

    #[error("Provider not configured: {0}")]
    NotConfigured(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Network error: {0}")]
    Network(String),
}

#[derive(Debug, Error)]
pub enum MiddlewareError {
    #[error("{id}: {reason}")]
    Execution { id: String, reason: String },
}

impl MiddlewareError {
    /// Convenience constructor for interceptor failures.
    pub fn execution(id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Execution {
            id: id.into(),
            reason: reason.into(),
        }
    }
}

#[derive(Debug, Error)]
pub enum SkillError {
    #[error("Skill not found: {0}")]
    NotFound(String),

    #[error("Invalid skill arguments: {0}")]
    InvalidArguments(String),

    #[error("Skill execution failed: {skill} — {reason}")]
    ExecutionFailed { skill: String, reason: String },

    #[error("Skill timed out: {skill} after {timeout_secs}s")]
    Timeout { skill: String, timeout_secs: u64 },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_error_displays_correctly() {
        let err = Error::Provider(ProviderError::ApiError {
            status_code: 429,
            message: "Too many requests".into(),
        });
        assert!(err.to_string().contains("429"));
        assert!(err.to_string().contains("Too many requests"));
    }

    #[test]
    fn skill_error_displays_correctly() {
        let err = Error::Skill(SkillError::Timeout {
            skill: "shell".into(),
            timeout_secs: 30,
        });
        assert!(err.to_string().contains("shell"));
        assert!(err.to_string().contains("30"));
    }

    #[test]
    fn empty_input_message_is_stable() {
        // Callers match on this exact text
        assert_eq!(Error::EmptyInput.to_string(), "empty input");
    }

    #[test]
    fn middleware_error_includes_id() {
        let err = MiddlewareError::execution("local-cache", "poisoned lock");
        assert!(err.to_string().starts_with("local-cache:"));
    }
}
