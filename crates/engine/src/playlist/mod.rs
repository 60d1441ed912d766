//! Playlist engine: turns a manifest URL into an ordered byte stream by
//! fetching and sequencing media segments, refreshing live manifests as new
//! segments appear.

pub mod variant;

use std::collections::VecDeque;
use std::time::Duration;

use bytes::{Buf, Bytes};
use m3u8_rs::MediaPlaylist;
use reqwest::Client;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};
use url::Url;

use crate::config::PlaylistConfig;
use crate::error::StreamError;
use crate::events::{EventSink, PlaylistEvent, emit};
use crate::retry::retry_with_backoff;

/// One fetchable unit of media referenced by a manifest. Immutable once
/// parsed.
#[derive(Debug, Clone, PartialEq)]
pub struct Segment {
    pub url: Url,
    pub duration: f64,
    pub sequence: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    HaveSegments,
    Ended,
}

/// Internal cursor over one manifest. Owned exclusively by the
/// [`crate::stream::PlaylistStream`] that created it; never shared.
pub(crate) struct PlaylistState {
    client: Client,
    config: PlaylistConfig,
    manifest_url: Url,
    token: CancellationToken,
    events: Option<EventSink>,

    pending: VecDeque<Segment>,
    last_sequence: Option<u64>,
    max_seen_sequence: Option<u64>,
    live: bool,
    target_duration_secs: f64,
    empty_refreshes: u32,
    buffer: Bytes,
    phase: Phase,
}

impl PlaylistState {
    /// Fetch and parse the manifest, producing a cursor positioned at its
    /// first segment.
    pub(crate) async fn open(
        client: Client,
        config: PlaylistConfig,
        manifest_url: Url,
        events: Option<EventSink>,
        token: CancellationToken,
    ) -> Result<Self, StreamError> {
        let playlist =
            fetch_media_playlist(&client, &manifest_url, config.manifest_fetch_timeout).await?;

        let mut state = Self {
            client,
            config,
            manifest_url,
            token,
            events,
            pending: VecDeque::new(),
            last_sequence: None,
            max_seen_sequence: None,
            live: true,
            target_duration_secs: 1.0,
            empty_refreshes: 0,
            buffer: Bytes::new(),
            phase: Phase::HaveSegments,
        };
        let new = state.ingest(&playlist);
        debug!(
            url = %state.manifest_url,
            segments = new,
            live = state.live,
            "loaded initial playlist"
        );
        Ok(state)
    }

    /// Copy up to `buf.len()` bytes out of the stream. `Ok(0)` means
    /// end-of-stream and is sticky once the engine enters `Ended`.
    pub(crate) async fn read(&mut self, buf: &mut [u8]) -> Result<usize, StreamError> {
        if buf.is_empty() {
            return Ok(0);
        }
        while self.buffer.is_empty() {
            if !self.refill().await? {
                return Ok(0);
            }
        }
        let n = self.buffer.len().min(buf.len());
        buf[..n].copy_from_slice(&self.buffer[..n]);
        self.buffer.advance(n);
        Ok(n)
    }

    pub(crate) fn cancel(&mut self) {
        self.token.cancel();
    }

    /// Merge a refreshed manifest into the pending queue. Returns the number
    /// of newly queued segments.
    ///
    /// Sequence numbers are monotonic: only sequences above the highest one
    /// already consumed or queued are accepted, and a refresh whose maximum
    /// sequence is below a previously observed maximum is stale and ignored.
    fn ingest(&mut self, playlist: &MediaPlaylist) -> usize {
        self.live = !playlist.end_list;
        if playlist.target_duration as f64 > 0.0 {
            self.target_duration_secs = playlist.target_duration as f64;
        }

        let count = playlist.segments.len() as u64;
        if count == 0 {
            return 0;
        }
        let max_sequence = playlist.media_sequence + count - 1;
        if let Some(seen) = self.max_seen_sequence
            && max_sequence < seen
        {
            warn!(
                url = %self.manifest_url,
                refreshed_max = max_sequence,
                seen_max = seen,
                "stale manifest refresh, ignoring"
            );
            return 0;
        }

        let floor = self.highest_known_sequence();
        let mut new_segments = 0usize;
        let mut first_new: Option<u64> = None;

        for (idx, segment) in playlist.segments.iter().enumerate() {
            let sequence = playlist.media_sequence + idx as u64;
            if floor.is_some_and(|f| sequence <= f) {
                continue;
            }
            let url = match self.manifest_url.join(&segment.uri) {
                Ok(url) => url,
                Err(err) => {
                    warn!(
                        msn = sequence,
                        uri = %segment.uri,
                        "skipping segment with unresolvable URI: {err}"
                    );
                    continue;
                }
            };
            if first_new.is_none() {
                first_new = Some(sequence);
            }
            trace!(msn = sequence, url = %url, "queued segment");
            self.pending.push_back(Segment {
                url,
                duration: segment.duration as f64,
                sequence,
            });
            new_segments += 1;
        }

        self.max_seen_sequence = Some(
            self.max_seen_sequence
                .map_or(max_sequence, |seen| seen.max(max_sequence)),
        );

        if let (Some(floor), Some(first)) = (floor, first_new)
            && first > floor + 1
        {
            warn!(
                url = %self.manifest_url,
                from = floor,
                to = first,
                "segment gap: fell behind the live window, resuming from earliest available"
            );
            emit(
                &self.events,
                PlaylistEvent::SegmentGap {
                    from_sequence: floor,
                    to_sequence: first,
                },
            );
        }

        new_segments
    }

    /// Produce the next segment's bytes into `self.buffer`. Returns `false`
    /// when the stream has ended.
    async fn refill(&mut self) -> Result<bool, StreamError> {
        loop {
            if self.phase == Phase::Ended {
                return Ok(false);
            }

            if let Some(segment) = self.pending.pop_front() {
                match self.fetch_segment(&segment).await {
                    Ok(bytes) => {
                        trace!(msn = segment.sequence, len = bytes.len(), "fetched segment");
                        self.last_sequence = Some(segment.sequence);
                        self.buffer = bytes;
                        return Ok(true);
                    }
                    Err(StreamError::Cancelled) => return Err(StreamError::Cancelled),
                    Err(err) => {
                        // Skipping one segment beats terminating playback.
                        warn!(
                            msn = segment.sequence,
                            url = %segment.url,
                            "segment skipped after exhausting retries: {err}"
                        );
                        emit(
                            &self.events,
                            PlaylistEvent::SegmentSkipped {
                                sequence: segment.sequence,
                                attempts: self.config.segment_retry.max_retries + 1,
                            },
                        );
                        self.last_sequence = Some(segment.sequence);
                        continue;
                    }
                }
            }

            if !self.live {
                self.end();
                return Ok(false);
            }

            match fetch_media_playlist(
                &self.client,
                &self.manifest_url,
                self.config.manifest_fetch_timeout,
            )
            .await
            {
                Ok(playlist) => {
                    let new_segments = self.ingest(&playlist);
                    if new_segments > 0 {
                        self.empty_refreshes = 0;
                        debug!(
                            url = %self.manifest_url,
                            new_segments,
                            "playlist refreshed"
                        );
                        emit(
                            &self.events,
                            PlaylistEvent::PlaylistRefreshed {
                                media_sequence_base: playlist.media_sequence,
                                new_segments,
                            },
                        );
                        continue;
                    }
                    self.empty_refreshes += 1;
                }
                Err(StreamError::Cancelled) => return Err(StreamError::Cancelled),
                Err(err) if err.is_retryable() => {
                    warn!(url = %self.manifest_url, "manifest refresh failed: {err}");
                    self.empty_refreshes += 1;
                }
                Err(err) => return Err(err),
            }

            if self.empty_refreshes >= self.config.max_empty_refreshes {
                info!(
                    url = %self.manifest_url,
                    refreshes = self.empty_refreshes,
                    "no new segments after consecutive refreshes, declaring stream ended"
                );
                self.end();
                return Ok(false);
            }

            self.wait_refresh_interval().await?;
        }
    }

    async fn fetch_segment(&self, segment: &Segment) -> Result<Bytes, StreamError> {
        let client = self.client.clone();
        let timeout = self.config.segment_fetch_timeout;
        let url = segment.url.clone();
        retry_with_backoff(&self.config.segment_retry, &self.token, |_| {
            let client = client.clone();
            let url = url.clone();
            async move {
                let response = client.get(url.clone()).timeout(timeout).send().await?;
                if !response.status().is_success() {
                    return Err(StreamError::http_status(
                        response.status(),
                        url.as_str(),
                        "segment fetch",
                    ));
                }
                Ok(response.bytes().await?)
            }
        })
        .await
    }

    /// Bounded, cancellation-aware wait between live manifest refreshes.
    async fn wait_refresh_interval(&self) -> Result<(), StreamError> {
        let interval = Duration::from_secs_f64(self.target_duration_secs * 0.5)
            .max(self.config.min_refresh_interval);
        tokio::select! {
            biased;
            _ = self.token.cancelled() => Err(StreamError::Cancelled),
            _ = tokio::time::sleep(interval) => Ok(()),
        }
    }

    fn highest_known_sequence(&self) -> Option<u64> {
        let queued = self.pending.back().map(|s| s.sequence);
        match (self.last_sequence, queued) {
            (Some(a), Some(b)) => Some(a.max(b)),
            (a, b) => a.or(b),
        }
    }

    fn end(&mut self) {
        if self.phase != Phase::Ended {
            self.phase = Phase::Ended;
            info!(url = %self.manifest_url, "stream ended");
            emit(&self.events, PlaylistEvent::StreamEnded);
        }
    }
}

/// Fetch and parse a media playlist. Master playlists are rejected at this
/// layer; variant expansion belongs to the caller (see [`variant`]).
pub(crate) async fn fetch_media_playlist(
    client: &Client,
    url: &Url,
    timeout: Duration,
) -> Result<MediaPlaylist, StreamError> {
    let response = client.get(url.clone()).timeout(timeout).send().await?;
    if !response.status().is_success() {
        return Err(StreamError::http_status(
            response.status(),
            url.as_str(),
            "manifest fetch",
        ));
    }
    let body = response.bytes().await?;
    match m3u8_rs::parse_playlist_res(&body) {
        Ok(m3u8_rs::Playlist::MediaPlaylist(playlist)) => Ok(playlist),
        Ok(m3u8_rs::Playlist::MasterPlaylist(_)) => Err(StreamError::playlist(format!(
            "expected a media playlist at {url}, got a master playlist"
        ))),
        Err(err) => Err(StreamError::playlist(format!(
            "failed to parse playlist {url}: {err}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    fn parse_media_playlist(input: &str) -> MediaPlaylist {
        match m3u8_rs::parse_playlist_res(input.as_bytes()).expect("playlist should parse") {
            m3u8_rs::Playlist::MediaPlaylist(pl) => pl,
            m3u8_rs::Playlist::MasterPlaylist(_) => panic!("expected media playlist"),
        }
    }

    fn live_playlist(media_sequence: u64, uris: &[&str]) -> MediaPlaylist {
        let mut body = format!(
            "#EXTM3U\n#EXT-X-VERSION:3\n#EXT-X-TARGETDURATION:2\n#EXT-X-MEDIA-SEQUENCE:{media_sequence}\n"
        );
        for uri in uris {
            body.push_str("#EXTINF:2.0,\n");
            body.push_str(uri);
            body.push('\n');
        }
        parse_media_playlist(&body)
    }

    fn empty_state() -> (PlaylistState, mpsc::UnboundedReceiver<PlaylistEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let state = PlaylistState {
            client: Client::new(),
            config: PlaylistConfig::default(),
            manifest_url: Url::parse("https://example.com/live/index.m3u8").unwrap(),
            token: CancellationToken::new(),
            events: Some(tx),
            pending: VecDeque::new(),
            last_sequence: None,
            max_seen_sequence: None,
            live: true,
            target_duration_secs: 2.0,
            empty_refreshes: 0,
            buffer: Bytes::new(),
            phase: Phase::HaveSegments,
        };
        (state, rx)
    }

    #[test]
    fn ingest_queues_segments_in_sequence_order() {
        let (mut state, _rx) = empty_state();
        let new = state.ingest(&live_playlist(10, &["a.ts", "b.ts", "c.ts"]));
        assert_eq!(new, 3);
        let sequences: Vec<u64> = state.pending.iter().map(|s| s.sequence).collect();
        assert_eq!(sequences, vec![10, 11, 12]);
        assert_eq!(
            state.pending[0].url.as_str(),
            "https://example.com/live/a.ts"
        );
    }

    #[test]
    fn ingest_only_appends_sequences_above_the_consumed_floor() {
        let (mut state, _rx) = empty_state();
        state.ingest(&live_playlist(10, &["a.ts", "b.ts"]));
        state.pending.clear();
        state.last_sequence = Some(11);

        // Refresh overlaps the already consumed range.
        let new = state.ingest(&live_playlist(10, &["a.ts", "b.ts", "c.ts", "d.ts"]));
        assert_eq!(new, 2);
        let sequences: Vec<u64> = state.pending.iter().map(|s| s.sequence).collect();
        assert_eq!(sequences, vec![12, 13]);
    }

    #[test]
    fn stale_refresh_is_ignored_instead_of_rewinding() {
        let (mut state, _rx) = empty_state();
        state.ingest(&live_playlist(20, &["a.ts", "b.ts"]));
        let queued_before: Vec<u64> = state.pending.iter().map(|s| s.sequence).collect();

        // A refresh whose max sequence regressed below what we've seen.
        let new = state.ingest(&live_playlist(5, &["x.ts", "y.ts"]));
        assert_eq!(new, 0);
        let queued_after: Vec<u64> = state.pending.iter().map(|s| s.sequence).collect();
        assert_eq!(queued_before, queued_after);
    }

    #[test]
    fn sequences_stay_non_decreasing_across_shuffled_refreshes() {
        let (mut state, _rx) = empty_state();
        // Refreshes arriving with arbitrary overlaps and regressions.
        let refreshes = [
            (10u64, vec!["a", "b", "c"]),
            (8, vec!["p", "q"]),
            (11, vec!["b", "c", "d"]),
            (9, vec!["z"]),
            (13, vec!["d", "e", "f"]),
        ];
        let mut consumed: Vec<u64> = Vec::new();
        for (base, uris) in refreshes {
            let uris: Vec<String> = uris.iter().map(|u| format!("{u}.ts")).collect();
            let refs: Vec<&str> = uris.iter().map(String::as_str).collect();
            state.ingest(&live_playlist(base, &refs));
            while let Some(segment) = state.pending.pop_front() {
                consumed.push(segment.sequence);
                state.last_sequence = Some(segment.sequence);
            }
        }
        assert!(consumed.windows(2).all(|w| w[0] < w[1]), "{consumed:?}");
    }

    #[test]
    fn gap_past_the_live_window_emits_event_and_resumes() {
        let (mut state, mut rx) = empty_state();
        state.ingest(&live_playlist(10, &["a.ts"]));
        state.pending.clear();
        state.last_sequence = Some(10);

        // The window moved well past the consumer.
        let new = state.ingest(&live_playlist(40, &["x.ts", "y.ts"]));
        assert_eq!(new, 2);
        assert_eq!(state.pending.front().map(|s| s.sequence), Some(40));

        let event = rx.try_recv().expect("gap event expected");
        assert_eq!(
            event,
            PlaylistEvent::SegmentGap {
                from_sequence: 10,
                to_sequence: 40,
            }
        );
    }

    #[test]
    fn endlist_flips_live_off() {
        let (mut state, _rx) = empty_state();
        let playlist = parse_media_playlist(
            "#EXTM3U\n#EXT-X-VERSION:3\n#EXT-X-TARGETDURATION:2\n#EXT-X-MEDIA-SEQUENCE:0\n#EXTINF:2.0,\na.ts\n#EXT-X-ENDLIST\n",
        );
        state.ingest(&playlist);
        assert!(!state.live);
    }

    #[tokio::test]
    async fn read_after_end_keeps_returning_zero() {
        let (mut state, mut rx) = empty_state();
        state.live = false;
        let mut buf = [0u8; 16];
        assert_eq!(state.read(&mut buf).await.unwrap(), 0);
        assert_eq!(state.read(&mut buf).await.unwrap(), 0);
        assert_eq!(rx.try_recv(), Ok(PlaylistEvent::StreamEnded));
    }

    #[tokio::test]
    async fn cancelled_token_aborts_refresh_wait() {
        let (mut state, _rx) = empty_state();
        state.token.cancel();
        let result = state.wait_refresh_interval().await;
        assert!(matches!(result, Err(StreamError::Cancelled)));
    }

    #[tokio::test]
    async fn buffered_bytes_drain_across_short_reads() {
        let (mut state, _rx) = empty_state();
        state.buffer = Bytes::from_static(b"abcdef");
        let mut buf = [0u8; 4];
        assert_eq!(state.read(&mut buf).await.unwrap(), 4);
        assert_eq!(&buf, b"abcd");
        let n = state.read(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], b"ef");
    }
}
