use thiserror::Error;

/// Failure of a single fetch attempt against an upstream price source.
///
/// All variants are recovered by the poller's backoff; none reach subscribers.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    /// The upstream answered with a non-2xx status (e.g. 429 when rate-limited).
    #[error("upstream returned HTTP {0}")]
    UpstreamStatus(u16),

    /// The body was not JSON or carried no usable positive price.
    #[error("malformed upstream response: {0}")]
    MalformedResponse(String),

    /// Connection, DNS, body read or timeout failure.
    #[error("transport error: {0}")]
    Transport(String),
}

impl FetchError {
    /// Short label for metrics and structured logs.
    pub fn kind(&self) -> &'static str {
        match self {
            FetchError::UpstreamStatus(_) => "upstream_status",
            FetchError::MalformedResponse(_) => "malformed_response",
            FetchError::Transport(_) => "transport",
        }
    }
}

impl From<reqwest::Error> for FetchError {
    fn from(err: reqwest::Error) -> Self {
        if let Some(status) = err.status() {
            return FetchError::UpstreamStatus(status.as_u16());
        }
        if err.is_decode() {
            return FetchError::MalformedResponse(err.to_string());
        }
        FetchError::Transport(err.to_string())
    }
}

impl From<tokio::time::error::Elapsed> for FetchError {
    fn from(_: tokio::time::error::Elapsed) -> Self {
        FetchError::Transport("request timed out".to_string())
    }
}
