use async_trait::async_trait;
use bytes::{Buf, Bytes};
use reqwest::{Client, Response};
use tracing::debug;
use url::Url;

use crate::error::StreamError;
use crate::stream::ByteSource;

/// Chunked progressive HTTP stream: one GET request, the response body is
/// the byte source. No retry on mid-stream disconnect; the relay pipeline
/// decides whether to reconnect.
pub struct HttpStream {
    client: Client,
    url: Url,
    state: State,
}

enum State {
    New,
    Open { response: Response, buffer: Bytes },
    Drained,
    Closed,
}

impl HttpStream {
    pub fn new(client: Client, url: Url) -> Self {
        Self {
            client,
            url,
            state: State::New,
        }
    }

    pub fn url(&self) -> &Url {
        &self.url
    }
}

#[async_trait]
impl ByteSource for HttpStream {
    async fn open(&mut self) -> Result<(), StreamError> {
        match self.state {
            State::Open { .. } | State::Drained => return Err(StreamError::AlreadyOpen),
            State::New | State::Closed => {}
        }
        // No overall deadline: progressive bodies are long-lived.
        let response = self.client.get(self.url.clone()).send().await?;
        if !response.status().is_success() {
            return Err(StreamError::http_status(
                response.status(),
                self.url.as_str(),
                "stream open",
            ));
        }
        debug!(url = %self.url, status = %response.status(), "opened http stream");
        self.state = State::Open {
            response,
            buffer: Bytes::new(),
        };
        Ok(())
    }

    async fn read(&mut self, buf: &mut [u8]) -> Result<usize, StreamError> {
        match &mut self.state {
            State::New => Err(StreamError::NotOpen),
            State::Closed => Err(StreamError::Closed),
            State::Drained => Ok(0),
            State::Open { response, buffer } => {
                while buffer.is_empty() {
                    match response.chunk().await? {
                        Some(chunk) => *buffer = chunk,
                        None => {
                            self.state = State::Drained;
                            return Ok(0);
                        }
                    }
                }
                let n = buffer.len().min(buf.len());
                buf[..n].copy_from_slice(&buffer[..n]);
                buffer.advance(n);
                Ok(n)
            }
        }
    }

    async fn close(&mut self) {
        // Dropping the response tears down the connection.
        self.state = State::Closed;
    }
}
