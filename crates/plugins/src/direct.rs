//! Built-in plugin for scheme-routed raw URLs: explicit `hls://` manifests,
//! `rtmp://` sources handed to the external demuxer, and plain progressive
//! HTTP. No scraping involved; this is the fallback handler for URLs no
//! site-specific plugin claims.

use async_trait::async_trait;
use reqwest::Client;
use tracing::debug;
use url::Url;

use sluice_engine::{
    EngineConfig, HttpStream, PlaylistStream, ProbedPlaylist, ProcessStream, Stream,
    probe_playlist,
};

use crate::channel::Channel;
use crate::error::ResolutionError;
use crate::plugin::SitePlugin;

const RTMP_SCHEMES: &[&str] = &["rtmp", "rtmpe", "rtmps", "rtmpt", "rtmpte"];

pub struct DirectPlugin {
    client: Client,
    config: EngineConfig,
    /// Extra `--key value` arguments for the RTMP demuxer, typically
    /// per-site credentials from the configuration surface.
    rtmp_params: Vec<(String, String)>,
}

enum Target {
    Hls(Url),
    Rtmp(String),
    Http(Url),
}

impl DirectPlugin {
    pub fn new(client: Client, config: EngineConfig) -> Self {
        Self {
            client,
            config,
            rtmp_params: Vec::new(),
        }
    }

    pub fn with_rtmp_params(mut self, params: Vec<(String, String)>) -> Self {
        self.rtmp_params = params;
        self
    }

    fn classify(url: &str) -> Result<Target, ResolutionError> {
        if let Some(rest) = url.strip_prefix("hls://") {
            let rest = if rest.contains("://") {
                rest.to_owned()
            } else {
                format!("http://{rest}")
            };
            let parsed = Url::parse(&rest)
                .map_err(|err| ResolutionError::InvalidUrl(format!("{rest}: {err}")))?;
            return Ok(Target::Hls(parsed));
        }

        let parsed =
            Url::parse(url).map_err(|err| ResolutionError::InvalidUrl(format!("{url}: {err}")))?;
        if RTMP_SCHEMES.contains(&parsed.scheme()) {
            return Ok(Target::Rtmp(url.to_owned()));
        }
        if matches!(parsed.scheme(), "http" | "https") {
            if parsed.path().ends_with(".m3u8") {
                return Ok(Target::Hls(parsed));
            }
            return Ok(Target::Http(parsed));
        }
        Err(ResolutionError::InvalidUrl(format!(
            "unsupported scheme `{}`",
            parsed.scheme()
        )))
    }
}

#[async_trait]
impl SitePlugin for DirectPlugin {
    fn name(&self) -> &str {
        "direct"
    }

    fn matches(&self, url: &str) -> bool {
        Self::classify(url).is_ok()
    }

    async fn resolve(&self, url: &str) -> Result<Channel, ResolutionError> {
        // Classification doubles as validation; the channel id stays the
        // user-supplied URL.
        Self::classify(url)?;
        Ok(Channel {
            site: self.name().to_owned(),
            id: url.to_owned(),
            title: None,
        })
    }

    async fn streams(&self, channel: &Channel) -> Result<Vec<(String, Stream)>, ResolutionError> {
        match Self::classify(&channel.id)? {
            Target::Rtmp(url) => {
                let stream =
                    ProcessStream::rtmp(&url, &self.rtmp_params, self.config.process.clone());
                Ok(vec![("live".to_owned(), Stream::Process(stream))])
            }
            Target::Http(url) => Ok(vec![(
                "live".to_owned(),
                Stream::Http(HttpStream::new(self.client.clone(), url)),
            )]),
            Target::Hls(url) => {
                let probed = probe_playlist(
                    &self.client,
                    &url,
                    self.config.playlist.manifest_fetch_timeout,
                )
                .await?;
                match probed {
                    ProbedPlaylist::Media { live } => {
                        let label = if live { "live" } else { "vod" };
                        let stream =
                            PlaylistStream::new(self.client.clone(), self.config.playlist.clone(), url);
                        Ok(vec![(label.to_owned(), Stream::Playlist(stream))])
                    }
                    ProbedPlaylist::Master { variants } => {
                        debug!(count = variants.len(), "expanding master playlist variants");
                        Ok(variants
                            .into_iter()
                            .map(|(label, variant_url)| {
                                let stream = PlaylistStream::new(
                                    self.client.clone(),
                                    self.config.playlist.clone(),
                                    variant_url,
                                );
                                (label, Stream::Playlist(stream))
                            })
                            .collect())
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plugin() -> DirectPlugin {
        DirectPlugin::new(Client::new(), EngineConfig::default())
    }

    #[test]
    fn matches_scheme_routed_urls() {
        let plugin = plugin();
        assert!(plugin.matches("hls://cdn.example/stream/index.m3u8"));
        assert!(plugin.matches("https://cdn.example/stream/index.m3u8"));
        assert!(plugin.matches("rtmp://host/app/playpath"));
        assert!(plugin.matches("http://cdn.example/stream.flv"));
        assert!(!plugin.matches("mms://old.example/stream"));
        assert!(!plugin.matches("not a url"));
    }

    #[tokio::test]
    async fn rtmp_url_yields_a_process_stream() {
        let plugin = plugin();
        let channel = plugin.resolve("rtmp://host/app/playpath").await.unwrap();
        let streams = plugin.streams(&channel).await.unwrap();
        assert_eq!(streams.len(), 1);
        assert_eq!(streams[0].0, "live");
        assert!(matches!(streams[0].1, Stream::Process(_)));
    }

    #[tokio::test]
    async fn plain_http_url_yields_an_http_stream() {
        let plugin = plugin();
        let channel = plugin.resolve("http://cdn.example/stream.flv").await.unwrap();
        let streams = plugin.streams(&channel).await.unwrap();
        assert_eq!(streams.len(), 1);
        assert!(matches!(streams[0].1, Stream::Http(_)));
    }

    #[test]
    fn hls_prefix_without_scheme_defaults_to_http() {
        match DirectPlugin::classify("hls://cdn.example/index.m3u8").unwrap() {
            Target::Hls(url) => assert_eq!(url.as_str(), "http://cdn.example/index.m3u8"),
            _ => panic!("expected hls target"),
        }
    }
}
