use reqwest::StatusCode;

/// Errors produced while opening or reading a [`crate::Stream`].
#[derive(Debug, thiserror::Error)]
pub enum StreamError {
    #[error("stream is already open")]
    AlreadyOpen,

    #[error("stream has not been opened")]
    NotOpen,

    #[error("stream is closed")]
    Closed,

    #[error("stream cancelled")]
    Cancelled,

    #[error("invalid URL `{input}`: {reason}")]
    InvalidUrl { input: String, reason: String },

    #[error("HTTP request failed: {source}")]
    Network {
        #[from]
        source: reqwest::Error,
    },

    #[error("request failed with HTTP {status} during {operation} for {url}")]
    HttpStatus {
        status: StatusCode,
        url: String,
        operation: &'static str,
    },

    #[error("playlist error: {reason}")]
    Playlist { reason: String },

    #[error("segment fetch error: {reason}")]
    SegmentFetch { reason: String, retryable: bool },

    #[error("helper process error: {reason}")]
    Process { reason: String },

    #[error("I/O error: {source}")]
    Io {
        #[from]
        source: std::io::Error,
    },

    #[error("operation timed out: {reason}")]
    Timeout { reason: String },
}

impl StreamError {
    pub fn invalid_url(input: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidUrl {
            input: input.into(),
            reason: reason.into(),
        }
    }

    pub fn playlist(reason: impl Into<String>) -> Self {
        Self::Playlist {
            reason: reason.into(),
        }
    }

    pub fn process(reason: impl Into<String>) -> Self {
        Self::Process {
            reason: reason.into(),
        }
    }

    pub fn timeout(reason: impl Into<String>) -> Self {
        Self::Timeout {
            reason: reason.into(),
        }
    }

    pub fn http_status(
        status: StatusCode,
        url: impl Into<String>,
        operation: &'static str,
    ) -> Self {
        Self::HttpStatus {
            status,
            url: url.into(),
            operation,
        }
    }

    /// Whether a failed operation is worth another attempt.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::AlreadyOpen | Self::NotOpen | Self::Closed | Self::Cancelled => false,
            Self::InvalidUrl { .. } | Self::Playlist { .. } | Self::Process { .. } => false,
            Self::HttpStatus { status, .. } => {
                status.is_server_error() || *status == StatusCode::TOO_MANY_REQUESTS
            }
            Self::SegmentFetch { retryable, .. } => *retryable,
            Self::Network { .. } | Self::Io { .. } | Self::Timeout { .. } => true,
        }
    }
}

/// Errors produced by the relay pipeline.
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    #[error("failed to spawn player: {source}")]
    PlayerSpawn { source: std::io::Error },

    #[error("player command is empty")]
    EmptyPlayerCommand,

    #[error("player exited before producing a usable stdin handle")]
    PlayerStdinUnavailable,

    #[error("relay failed after reconnect attempts: {source}")]
    RelayFailed { source: StreamError },
}
