/// Shared error type used across all Concierge crates.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("IO: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP: {0}")]
    Http(String),

    #[error("timeout: {0}")]
    Timeout(String),

    #[error("provider {provider}: {message}")]
    Provider { provider: String, message: String },

    /// The provider's circuit breaker is open.
    #[error("provider '{0}' is unavailable (circuit open)")]
    ProviderUnavailable(String),

    /// Preferred provider and every failover candidate refused.
    #[error("no usable LLM provider")]
    AllProvidersUnavailable,

    #[error("auth: {0}")]
    Auth(String),

    /// Per-run token budget exhausted.
    #[error("token budget exceeded: {used} > {limit}")]
    BudgetExceeded { used: u64, limit: u64 },

    /// The turn-level cancel signal was observed.
    #[error("cancelled")]
    Cancelled,

    #[error("skill not found: {0}")]
    SkillNotFound(String),

    #[error("config: {0}")]
    Config(String),

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, Error>;

/// Substring classes that mark a provider or tool failure as transient.
///
/// Shared by the resilient provider wrapper (retry/backoff) and the agent
/// loop's single automatic tool retry.
const RETRYABLE_MARKERS: [&str; 6] = ["429", "500", "503", "rate limit", "overloaded", "timeout"];

/// Case-insensitive check whether an error message describes a transient
/// failure worth retrying.
pub fn is_retryable_message(message: &str) -> bool {
    let lower = message.to_lowercase();
    RETRYABLE_MARKERS.iter().any(|m| lower.contains(m))
}

impl Error {
    /// Whether this error is in the transient class (retry + failover
    /// candidates). Auth, budget, schema, and cancellation are not.
    pub fn is_transient(&self) -> bool {
        match self {
            Error::Timeout(_) | Error::Http(_) => true,
            Error::Provider { message, .. } => is_retryable_message(message),
            Error::Other(message) => is_retryable_message(message),
            _ => false,
        }
    }
}
