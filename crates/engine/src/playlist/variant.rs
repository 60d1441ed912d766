//! Master-playlist probing: expands a variant (master) playlist into
//! quality-labelled media playlist URLs.

use std::time::Duration;

use reqwest::Client;
use tracing::debug;
use url::Url;

use crate::error::StreamError;

/// Result of probing a playlist URL before constructing a stream.
#[derive(Debug, Clone, PartialEq)]
pub enum ProbedPlaylist {
    /// A master playlist: quality label to media playlist URL, in
    /// declaration order.
    Master { variants: Vec<(String, Url)> },
    /// Already a media playlist.
    Media { live: bool },
}

/// Fetch a playlist URL and classify it, expanding master playlists into
/// labelled variants. Labels prefer a resolution-style `<height>p` name and
/// fall back to a `<kbps>k` bitrate name; duplicate labels keep the first
/// declaration.
pub async fn probe_playlist(
    client: &Client,
    url: &Url,
    timeout: Duration,
) -> Result<ProbedPlaylist, StreamError> {
    let response = client.get(url.clone()).timeout(timeout).send().await?;
    if !response.status().is_success() {
        return Err(StreamError::http_status(
            response.status(),
            url.as_str(),
            "playlist probe",
        ));
    }
    let body = response.bytes().await?;
    match m3u8_rs::parse_playlist_res(&body) {
        Ok(m3u8_rs::Playlist::MediaPlaylist(playlist)) => Ok(ProbedPlaylist::Media {
            live: !playlist.end_list,
        }),
        Ok(m3u8_rs::Playlist::MasterPlaylist(master)) => {
            let mut variants = Vec::new();
            for variant in &master.variants {
                let Some(label) = variant_label(
                    variant.resolution.map(|r| r.height),
                    Some(variant.bandwidth),
                ) else {
                    continue;
                };
                if variants.iter().any(|(existing, _)| *existing == label) {
                    continue;
                }
                let variant_url = url.join(&variant.uri).map_err(|err| {
                    StreamError::playlist(format!(
                        "could not resolve variant URI `{}` against {url}: {err}",
                        variant.uri
                    ))
                })?;
                debug!(label = %label, url = %variant_url, "discovered variant");
                variants.push((label, variant_url));
            }
            Ok(ProbedPlaylist::Master { variants })
        }
        Err(err) => Err(StreamError::playlist(format!(
            "failed to parse playlist {url}: {err}"
        ))),
    }
}

/// Derive a quality label for a variant from its resolution or bandwidth.
pub(crate) fn variant_label(height: Option<u64>, bandwidth: Option<u64>) -> Option<String> {
    if let Some(height) = height
        && height > 0
    {
        return Some(format!("{height}p"));
    }
    let bandwidth = bandwidth?;
    if bandwidth == 0 {
        return None;
    }
    Some(format!("{}k", bandwidth / 1000))
}
