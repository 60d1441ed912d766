use async_trait::async_trait;
use reqwest::Client;
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::config::PlaylistConfig;
use crate::error::StreamError;
use crate::events::EventSink;
use crate::playlist::PlaylistState;
use crate::stream::ByteSource;

/// Segmented playlist stream. Construction is cheap; the manifest is first
/// fetched on `open()`. Each open creates a fresh playlist cursor, never
/// shared with other stream instances.
pub struct PlaylistStream {
    client: Client,
    config: PlaylistConfig,
    manifest_url: Url,
    events: Option<EventSink>,
    state: State,
}

enum State {
    New,
    Open(Box<PlaylistState>),
    Closed,
}

impl PlaylistStream {
    pub fn new(client: Client, config: PlaylistConfig, manifest_url: Url) -> Self {
        Self {
            client,
            config,
            manifest_url,
            events: None,
            state: State::New,
        }
    }

    /// Attach a sink receiving non-fatal playlist events.
    pub fn with_event_sink(mut self, sink: EventSink) -> Self {
        self.events = Some(sink);
        self
    }
}

#[async_trait]
impl ByteSource for PlaylistStream {
    async fn open(&mut self) -> Result<(), StreamError> {
        match self.state {
            State::Open(_) => return Err(StreamError::AlreadyOpen),
            State::New | State::Closed => {}
        }
        let cursor = PlaylistState::open(
            self.client.clone(),
            self.config.clone(),
            self.manifest_url.clone(),
            self.events.clone(),
            CancellationToken::new(),
        )
        .await?;
        self.state = State::Open(Box::new(cursor));
        Ok(())
    }

    async fn read(&mut self, buf: &mut [u8]) -> Result<usize, StreamError> {
        match &mut self.state {
            State::New => Err(StreamError::NotOpen),
            State::Closed => Err(StreamError::Closed),
            State::Open(cursor) => cursor.read(buf).await,
        }
    }

    async fn close(&mut self) {
        if let State::Open(mut cursor) = std::mem::replace(&mut self.state, State::Closed) {
            cursor.cancel();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stream() -> PlaylistStream {
        PlaylistStream::new(
            Client::new(),
            PlaylistConfig::default(),
            Url::parse("http://127.0.0.1:9/index.m3u8").unwrap(),
        )
    }

    #[tokio::test]
    async fn read_before_open_fails() {
        let mut s = stream();
        let mut buf = [0u8; 8];
        assert!(matches!(s.read(&mut buf).await, Err(StreamError::NotOpen)));
    }

    #[tokio::test]
    async fn read_after_close_fails_deterministically() {
        let mut s = stream();
        s.close().await;
        let mut buf = [0u8; 8];
        assert!(matches!(s.read(&mut buf).await, Err(StreamError::Closed)));
    }
}
