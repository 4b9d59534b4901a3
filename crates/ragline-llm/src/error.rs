use std::fmt;
use std::time::Duration;

/// Failure of the embedding function.
#[derive(Debug, thiserror::Error)]
pub enum EmbeddingError {
    #[error("embedding backend unavailable: {0}")]
    Unavailable(String),

    #[error("embedding timed out after {0:?}")]
    Timeout(Duration),

    #[error("malformed embedding output: {0}")]
    Malformed(String),

    #[error("empty response from {provider}")]
    EmptyResponse { provider: &'static str },
}

/// Reason code attached to a [`GenerationFailure`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureReason {
    /// No complete response arrived within the caller-supplied timeout.
    Timeout,
    /// The backend answered with a non-success HTTP status.
    Status(u16),
    /// The backend answered 2xx but the body was not the expected JSON shape.
    MalformedResponse,
    /// Connection refused, reset, DNS failure and similar transport faults.
    Transport,
}

impl FailureReason {
    /// Whether a fresh attempt could plausibly succeed.
    ///
    /// Timeouts are excluded so that a stalled backend never pushes a request
    /// past its deadline.
    #[must_use]
    pub fn is_retryable(self) -> bool {
        match self {
            Self::Transport => true,
            Self::Status(code) => code == 429 || (500..600).contains(&code),
            Self::Timeout | Self::MalformedResponse => false,
        }
    }
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Timeout => f.write_str("timeout"),
            Self::Status(code) => write!(f, "status({code})"),
            Self::MalformedResponse => f.write_str("malformed_response"),
            Self::Transport => f.write_str("transport"),
        }
    }
}

/// Recoverable generation outcome. Returned as a value, never raised.
#[derive(Debug, Clone, thiserror::Error)]
#[error("generation failed ({reason}): {detail}")]
pub struct GenerationFailure {
    pub reason: FailureReason,
    pub detail: String,
}

impl GenerationFailure {
    #[must_use]
    pub fn new(reason: FailureReason, detail: impl Into<String>) -> Self {
        Self {
            reason,
            detail: detail.into(),
        }
    }

    pub(crate) fn from_reqwest(err: &reqwest::Error) -> Self {
        let reason = if err.is_timeout() {
            FailureReason::Timeout
        } else if err.is_decode() {
            FailureReason::MalformedResponse
        } else {
            FailureReason::Transport
        };
        Self::new(reason, err.to_string())
    }
}
