use thiserror::Error;

/// The error taxonomy shared across the dispatch pipeline.
///
/// Every variant corresponds to one of the recoverable or terminal conditions
/// the dispatch engine must distinguish between; see the crate-level retry
/// decision tree for how each one is handled.
#[derive(Debug, Error)]
pub enum ProxyError {
    #[error("upstream rejected credentials")]
    AuthInvalid,

    #[error("rate limited, retry after {reset_ms}ms")]
    RateLimited { reset_ms: u64 },

    #[error("quota exhausted, retry after {reset_ms}ms")]
    QuotaExhausted { reset_ms: u64 },

    #[error("upstream returned an empty response")]
    EmptyResponse,

    #[error("upstream server error: {status}")]
    UpstreamServerError { status: u16 },

    #[error("network error: {0}")]
    NetworkError(#[from] reqwest::Error),

    #[error("no accounts available for model {model}")]
    NoAccountsAvailable { model: String },

    #[error("max retries exceeded")]
    MaxRetriesExceeded,

    #[error("bad request ({status}): {body}")]
    BadRequest { status: u16, body: String },

    #[error("upstream connection closed mid-stream")]
    UpstreamDisconnect,

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl ProxyError {
    /// Whether this error carries a reset instant the client should be told to wait for.
    pub fn retry_after_ms(&self) -> Option<u64> {
        match self {
            ProxyError::RateLimited { reset_ms } | ProxyError::QuotaExhausted { reset_ms } => {
                Some(*reset_ms)
            }
            _ => None,
        }
    }

    /// The HTTP status this error surfaces as when it escapes the dispatch engine
    /// (as opposed to being recovered locally by a retry).
    pub fn status_code(&self) -> u16 {
        match self {
            ProxyError::QuotaExhausted { .. }
            | ProxyError::NoAccountsAvailable { .. }
            | ProxyError::MaxRetriesExceeded
            | ProxyError::RateLimited { .. } => 429,
            ProxyError::AuthInvalid => 401,
            ProxyError::BadRequest { status, .. } => *status,
            ProxyError::UpstreamServerError { status } => *status,
            _ => 500,
        }
    }
}

pub type Result<T> = std::result::Result<T, ProxyError>;
