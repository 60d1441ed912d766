use sluice_engine::{RelayError, StreamError};
use sluice_plugins::ResolutionError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ManagerError {
    #[error(transparent)]
    Resolution(#[from] ResolutionError),

    #[error(transparent)]
    Stream(#[from] StreamError),

    #[error(transparent)]
    Relay(#[from] RelayError),

    #[error("no playable streams found for {url}")]
    NoStreams { url: String },

    #[error("quality '{quality}' not available (have: {available})")]
    QualityNotAvailable { quality: String, available: String },

    #[error("no free port left in the configured range")]
    PortsExhausted,

    #[error("no session on port {port}")]
    UnknownSession { port: u16 },

    #[error("player exited during session startup on port {port}")]
    PlayerExited { port: u16 },
}
