//! Typed outcomes for calls into external collaborators.
//!
//! Every search backend, renderer, and completion call returns
//! `Result<T, BackendError>`. Pipeline stages match on the error and take
//! their documented fallback branch; none of these errors ever reaches the
//! caller of the pipeline.

/// Failure of a single external call.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BackendError {
    #[error("{backend} timed out after {timeout_secs}s")]
    Timeout { backend: String, timeout_secs: u64 },

    #[error("{backend} transport error: {message}")]
    Transport { backend: String, message: String },

    #[error("{backend} returned HTTP {status}")]
    Http { backend: String, status: u16 },

    #[error("{backend} response could not be parsed: {message}")]
    Parse { backend: String, message: String },

    #[error("{backend} is unavailable: {message}")]
    Unavailable { backend: String, message: String },

    #[error("{backend} is disabled")]
    Disabled { backend: String },
}

impl BackendError {
    pub fn timeout(backend: impl Into<String>, timeout_secs: u64) -> Self {
        BackendError::Timeout {
            backend: backend.into(),
            timeout_secs,
        }
    }

    pub fn transport(backend: impl Into<String>, message: impl ToString) -> Self {
        BackendError::Transport {
            backend: backend.into(),
            message: message.to_string(),
        }
    }

    pub fn parse(backend: impl Into<String>, message: impl ToString) -> Self {
        BackendError::Parse {
            backend: backend.into(),
            message: message.to_string(),
        }
    }

    pub fn unavailable(backend: impl Into<String>, message: impl ToString) -> Self {
        BackendError::Unavailable {
            backend: backend.into(),
            message: message.to_string(),
        }
    }

    /// Short machine-readable label for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            BackendError::Timeout { .. } => "timeout",
            BackendError::Transport { .. } => "transport",
            BackendError::Http { .. } => "http",
            BackendError::Parse { .. } => "parse",
            BackendError::Unavailable { .. } => "unavailable",
            BackendError::Disabled { .. } => "disabled",
        }
    }

    /// Whether retrying the same call could plausibly succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            BackendError::Timeout { .. } | BackendError::Transport { .. } => true,
            BackendError::Http { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }
}
