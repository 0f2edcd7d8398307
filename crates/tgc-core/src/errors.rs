/// Core error type.
///
/// Adapter crates map their specific errors into this type so the delivery
/// engine can tell benign, transient and account-fatal failures apart.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("config error: {0}")]
    Config(String),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// Transport or HTTP failure of an external collaborator. Retryable.
    #[error("external error: {0}")]
    External(String),

    /// Structurally valid but unusable generation response. Not retryable.
    #[error("generation error: {0}")]
    Generation(String),

    /// The platform answered "too many requests".
    #[error("rate limited: too many requests")]
    RateLimited,

    /// A join request is waiting for administrator approval.
    #[error("join request pending approval")]
    JoinPending,

    #[error("operation cancelled")]
    Cancelled,
}

impl Error {
    /// Whether a bounded retry may help.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::External(_) | Error::Io(_))
    }

    /// Whether a failed join should suppress the chat for a while.
    pub fn blocks_chat(&self) -> bool {
        matches!(self, Error::JoinPending | Error::RateLimited)
    }
}

pub type Result<T> = std::result::Result<T, Error>;
