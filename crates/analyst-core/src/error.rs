use thiserror::Error;

pub type Result<T> = std::result::Result<T, AnalystError>;

#[derive(Debug, Error)]
pub enum AnalystError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    /// The model API call did not succeed. `status` is the HTTP status when
    /// the remote answered at all.
    #[error("Upstream error: {message}")]
    Upstream {
        status: Option<u16>,
        message: String,
    },

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl AnalystError {
    pub fn upstream(message: impl Into<String>) -> Self {
        AnalystError::Upstream {
            status: None,
            message: message.into(),
        }
    }

    pub fn upstream_status(status: u16, message: impl Into<String>) -> Self {
        AnalystError::Upstream {
            status: Some(status),
            message: message.into(),
        }
    }

    /// Whether a retry of the same call could plausibly succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, AnalystError::Upstream { .. })
    }
}
