//! Stream abstraction: three structurally different delivery protocols
//! behind one open/read/close contract.

mod http;
mod playlist;
mod process;

pub use http::HttpStream;
pub use playlist::PlaylistStream;
pub use process::ProcessStream;

use async_trait::async_trait;

use crate::error::StreamError;

/// The open/read/close contract shared by every stream variant.
///
/// A source is stateless until `open()`; opening an already-open source is
/// [`StreamError::AlreadyOpen`], never silently ignored. `read` returning
/// `Ok(0)` means end-of-stream and is never used to signal an error. After
/// `close()`, reads fail with [`StreamError::Closed`]; a closed source may be
/// reopened (the relay pipeline uses this for its reconnect attempt).
#[async_trait]
pub trait ByteSource: Send {
    async fn open(&mut self) -> Result<(), StreamError>;
    async fn read(&mut self, buf: &mut [u8]) -> Result<usize, StreamError>;
    async fn close(&mut self);
}

/// A resolved, playable stream handle. Closed set of variants selected at
/// construction time, never re-typed at runtime.
pub enum Stream {
    /// Chunked progressive HTTP.
    Http(HttpStream),
    /// Segmented playlist streaming.
    Playlist(PlaylistStream),
    /// Externally-demuxed subprocess output (the RTMP path).
    Process(ProcessStream),
}

impl Stream {
    pub fn kind(&self) -> &'static str {
        match self {
            Stream::Http(_) => "http",
            Stream::Playlist(_) => "playlist",
            Stream::Process(_) => "process",
        }
    }
}

impl std::fmt::Debug for Stream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Stream").field("kind", &self.kind()).finish()
    }
}

#[async_trait]
impl ByteSource for Stream {
    async fn open(&mut self) -> Result<(), StreamError> {
        match self {
            Stream::Http(s) => s.open().await,
            Stream::Playlist(s) => s.open().await,
            Stream::Process(s) => s.open().await,
        }
    }

    async fn read(&mut self, buf: &mut [u8]) -> Result<usize, StreamError> {
        match self {
            Stream::Http(s) => s.read(buf).await,
            Stream::Playlist(s) => s.read(buf).await,
            Stream::Process(s) => s.read(buf).await,
        }
    }

    async fn close(&mut self) {
        match self {
            Stream::Http(s) => s.close().await,
            Stream::Playlist(s) => s.close().await,
            Stream::Process(s) => s.close().await,
        }
    }
}
