use thiserror::Error;

/// Errors raised while mapping a URL to a channel or discovering its
/// streams. `NoMatchingPlugin` comes from the registry itself; the rest are
/// produced by individual plugins and surfaced verbatim.
#[derive(Debug, Error)]
pub enum ResolutionError {
    #[error("no plugin can handle URL `{url}`")]
    NoMatchingPlugin { url: String },

    #[error("content not found: {0}")]
    NotFound(String),

    #[error("authentication required: {0}")]
    AuthRequired(String),

    #[error("content is geo-blocked: {0}")]
    GeoBlocked(String),

    #[error("invalid url: {0}")]
    InvalidUrl(String),

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("stream error: {0}")]
    Stream(#[from] sluice_engine::StreamError),

    #[error("{0}")]
    Other(String),
}
