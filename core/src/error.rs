//! Error taxonomy for the task assistant core.
//!
//! Propagation policy: `ParseError`, `ValidationError`, and `NotFound`
//! become polite user messages; `Timeout`/`TransportError` are recoverable
//! and retried by callers; `Conflict` on an atomic consume is a race
//! outcome, not a bug; `Internal` is logged and surfaced generically.

/// Result type alias used across the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Error kinds for the memory fabric and router.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Invalid command: {0}")]
    Parse(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Timeout after {0:?}")]
    Timeout(std::time::Duration),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Cancelled")]
    Cancelled,

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(#[from] toml::de::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Whether the caller may usefully retry the operation that produced
    /// this error. Timeouts and transport errors are retryable; parse,
    /// validation and not-found errors are not (the input itself is wrong).
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Error::Timeout(_) | Error::Transport(_) | Error::Conflict(_)
        )
    }

    /// Render a short, stack-trace-free message safe to show a user.
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            Error::Parse(msg) => format!("Invalid command: {msg}"),
            Error::Validation(msg) => format!("I couldn't understand that: {msg}"),
            Error::NotFound(what) => format!("I couldn't find {what}."),
            Error::Timeout(_) | Error::Transport(_) => {
                "That took too long or the service is unreachable. Please try again.".to_string()
            }
            Error::Cancelled => "Request cancelled.".to_string(),
            _ => "Something went wrong on my end.".to_string(),
        }
    }
}
