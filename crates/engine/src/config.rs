use std::time::Duration;

use reqwest::Client;
use reqwest::header::{ACCEPT, HeaderMap, HeaderValue};

use crate::error::StreamError;
use crate::retry::RetryPolicy;

pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/142.0.0.0 Safari/537.36";

/// HTTP client settings shared by every stream variant.
#[derive(Debug, Clone)]
pub struct HttpConfig {
    pub user_agent: String,
    /// Time to establish the initial connection.
    pub connect_timeout: Duration,
    /// Timeout applied to bounded requests (manifests, segments). Long-lived
    /// progressive bodies are opened without an overall deadline.
    pub request_timeout: Duration,
    pub headers: HeaderMap,
}

impl Default for HttpConfig {
    fn default() -> Self {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("*/*"));
        Self {
            user_agent: DEFAULT_USER_AGENT.to_owned(),
            connect_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(20),
            headers,
        }
    }
}

/// Policy knobs for the playlist engine.
#[derive(Debug, Clone)]
pub struct PlaylistConfig {
    /// Timeout for a single manifest fetch.
    pub manifest_fetch_timeout: Duration,
    /// Timeout for a single segment fetch attempt.
    pub segment_fetch_timeout: Duration,
    /// Lower bound for the live refresh interval. The effective interval is
    /// half the manifest's target duration, clamped to at least this value.
    pub min_refresh_interval: Duration,
    /// Consecutive refreshes yielding no new segments before a live stream is
    /// declared ended.
    pub max_empty_refreshes: u32,
    /// Retry policy for individual segment fetches.
    pub segment_retry: RetryPolicy,
}

impl Default for PlaylistConfig {
    fn default() -> Self {
        Self {
            manifest_fetch_timeout: Duration::from_secs(10),
            segment_fetch_timeout: Duration::from_secs(20),
            min_refresh_interval: Duration::from_secs(1),
            max_empty_refreshes: 8,
            segment_retry: RetryPolicy {
                max_retries: 2,
                base_delay: Duration::from_millis(500),
                max_delay: Duration::from_secs(5),
                jitter: true,
            },
        }
    }
}

/// Relay pipeline settings.
#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// Size of the read/write chunks moved from the stream to the consumer.
    pub chunk_size: usize,
    /// Reconnect attempts after a transient stream failure.
    pub reconnect_attempts: u32,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            chunk_size: 8192,
            reconnect_attempts: 1,
        }
    }
}

/// Settings for externally-demuxed (helper subprocess) streams.
#[derive(Debug, Clone)]
pub struct ProcessConfig {
    /// Program used to demux RTMP sources.
    pub rtmpdump: String,
    /// How long to wait after spawn before checking for a premature exit.
    pub spawn_probe: Duration,
    /// Grace period between asking the helper to stop and forcing a kill.
    pub kill_grace: Duration,
}

impl Default for ProcessConfig {
    fn default() -> Self {
        Self {
            rtmpdump: "rtmpdump".to_owned(),
            spawn_probe: Duration::from_millis(500),
            kill_grace: Duration::from_secs(2),
        }
    }
}

/// Top-level engine configuration, grouping the per-concern sections.
#[derive(Debug, Clone, Default)]
pub struct EngineConfig {
    pub http: HttpConfig,
    pub playlist: PlaylistConfig,
    pub relay: RelayConfig,
    pub process: ProcessConfig,
}

impl EngineConfig {
    /// Build the shared `reqwest` client from the HTTP section.
    pub fn build_client(&self) -> Result<Client, StreamError> {
        let client = Client::builder()
            .user_agent(self.http.user_agent.clone())
            .default_headers(self.http.headers.clone())
            .connect_timeout(self.http.connect_timeout)
            .build()?;
        Ok(client)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_builds_a_client() {
        let config = EngineConfig::default();
        assert!(config.build_client().is_ok());
    }
}
