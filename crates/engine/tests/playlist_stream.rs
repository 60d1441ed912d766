//! End-to-end playlist engine tests against a local HTTP fixture.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use reqwest::Client;
use sluice_engine::{
    ByteSource, PlaylistConfig, PlaylistEvent, PlaylistStream, RetryPolicy, Stream,
};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use url::Url;

/// Minimal canned-response HTTP server for offline tests.
struct Fixture {
    routes: Mutex<HashMap<String, Vec<u8>>>,
    hits: Mutex<HashMap<String, usize>>,
}

impl Fixture {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            routes: Mutex::new(HashMap::new()),
            hits: Mutex::new(HashMap::new()),
        })
    }

    fn route(&self, path: &str, body: impl Into<Vec<u8>>) {
        self.routes
            .lock()
            .unwrap()
            .insert(path.to_owned(), body.into());
    }

    fn hits(&self, path: &str) -> usize {
        self.hits.lock().unwrap().get(path).copied().unwrap_or(0)
    }
}

async fn serve(fixture: Arc<Fixture>) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        loop {
            let Ok((mut socket, _)) = listener.accept().await else {
                return;
            };
            let fixture = Arc::clone(&fixture);
            tokio::spawn(async move {
                let mut buf = vec![0u8; 4096];
                let mut total = 0;
                loop {
                    let n = socket.read(&mut buf[total..]).await.unwrap_or(0);
                    if n == 0 {
                        return;
                    }
                    total += n;
                    if buf[..total].windows(4).any(|w| w == b"\r\n\r\n") {
                        break;
                    }
                    if total == buf.len() {
                        return;
                    }
                }
                let request = String::from_utf8_lossy(&buf[..total]).into_owned();
                let path = request
                    .split_whitespace()
                    .nth(1)
                    .unwrap_or("/")
                    .to_owned();
                *fixture.hits.lock().unwrap().entry(path.clone()).or_insert(0) += 1;

                let body = fixture.routes.lock().unwrap().get(&path).cloned();
                let response = match body {
                    Some(body) => {
                        let mut response = format!(
                            "HTTP/1.1 200 OK\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                            body.len()
                        )
                        .into_bytes();
                        response.extend_from_slice(&body);
                        response
                    }
                    None => b"HTTP/1.1 404 Not Found\r\nContent-Length: 0\r\nConnection: close\r\n\r\n"
                        .to_vec(),
                };
                let _ = socket.write_all(&response).await;
                let _ = socket.shutdown().await;
            });
        }
    });
    addr
}

fn fast_config() -> PlaylistConfig {
    PlaylistConfig {
        manifest_fetch_timeout: Duration::from_secs(5),
        segment_fetch_timeout: Duration::from_secs(5),
        min_refresh_interval: Duration::from_millis(10),
        max_empty_refreshes: 2,
        segment_retry: RetryPolicy {
            max_retries: 1,
            base_delay: Duration::from_millis(10),
            max_delay: Duration::from_millis(50),
            jitter: false,
        },
    }
}

async fn read_to_end(stream: &mut impl ByteSource) -> Vec<u8> {
    let mut out = Vec::new();
    let mut buf = [0u8; 64];
    loop {
        let n = stream.read(&mut buf).await.unwrap();
        if n == 0 {
            return out;
        }
        out.extend_from_slice(&buf[..n]);
    }
}

#[tokio::test]
async fn vod_yields_exactly_n_segment_fetches_then_end_of_stream() {
    let fixture = Fixture::new();
    fixture.route(
        "/vod/index.m3u8",
        "#EXTM3U\n#EXT-X-VERSION:3\n#EXT-X-TARGETDURATION:2\n#EXT-X-MEDIA-SEQUENCE:0\n\
         #EXTINF:2.0,\nseg0.ts\n#EXTINF:2.0,\nseg1.ts\n#EXTINF:2.0,\nseg2.ts\n#EXT-X-ENDLIST\n",
    );
    fixture.route("/vod/seg0.ts", b"AAAA".to_vec());
    fixture.route("/vod/seg1.ts", b"BBBB".to_vec());
    fixture.route("/vod/seg2.ts", b"CCCC".to_vec());
    let addr = serve(Arc::clone(&fixture)).await;

    let url = Url::parse(&format!("http://{addr}/vod/index.m3u8")).unwrap();
    let mut stream = Stream::Playlist(PlaylistStream::new(Client::new(), fast_config(), url));
    stream.open().await.unwrap();
    let bytes = read_to_end(&mut stream).await;
    stream.close().await;

    assert_eq!(bytes, b"AAAABBBBCCCC");
    assert_eq!(fixture.hits("/vod/seg0.ts"), 1);
    assert_eq!(fixture.hits("/vod/seg1.ts"), 1);
    assert_eq!(fixture.hits("/vod/seg2.ts"), 1);
    // Zero manifest refetches after the initial parse.
    assert_eq!(fixture.hits("/vod/index.m3u8"), 1);
}

#[tokio::test]
async fn live_gives_up_after_bounded_empty_refreshes() {
    let fixture = Fixture::new();
    // No ENDLIST: a live manifest that never grows.
    fixture.route(
        "/live/index.m3u8",
        "#EXTM3U\n#EXT-X-VERSION:3\n#EXT-X-TARGETDURATION:1\n#EXT-X-MEDIA-SEQUENCE:7\n\
         #EXTINF:1.0,\nonly.ts\n",
    );
    fixture.route("/live/only.ts", b"LIVE".to_vec());
    let addr = serve(Arc::clone(&fixture)).await;

    let url = Url::parse(&format!("http://{addr}/live/index.m3u8")).unwrap();
    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
    let mut stream =
        PlaylistStream::new(Client::new(), fast_config(), url).with_event_sink(tx);
    stream.open().await.unwrap();
    let started = std::time::Instant::now();
    let bytes = read_to_end(&mut stream).await;
    stream.close().await;

    assert_eq!(bytes, b"LIVE");
    // Initial fetch plus the bounded number of empty refreshes.
    assert_eq!(fixture.hits("/live/index.m3u8"), 3);
    // At least one refresh interval was waited between empty refreshes.
    assert!(started.elapsed() >= Duration::from_millis(10));

    let mut saw_ended = false;
    while let Ok(event) = rx.try_recv() {
        if event == PlaylistEvent::StreamEnded {
            saw_ended = true;
        }
    }
    assert!(saw_ended);
}

#[tokio::test]
async fn failed_segment_is_skipped_not_fatal() {
    let fixture = Fixture::new();
    fixture.route(
        "/vod/index.m3u8",
        "#EXTM3U\n#EXT-X-VERSION:3\n#EXT-X-TARGETDURATION:2\n#EXT-X-MEDIA-SEQUENCE:0\n\
         #EXTINF:2.0,\na.ts\n#EXTINF:2.0,\nmissing.ts\n#EXTINF:2.0,\nc.ts\n#EXT-X-ENDLIST\n",
    );
    fixture.route("/vod/a.ts", b"AA".to_vec());
    fixture.route("/vod/c.ts", b"CC".to_vec());
    let addr = serve(Arc::clone(&fixture)).await;

    let url = Url::parse(&format!("http://{addr}/vod/index.m3u8")).unwrap();
    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
    let mut stream =
        PlaylistStream::new(Client::new(), fast_config(), url).with_event_sink(tx);
    stream.open().await.unwrap();
    let bytes = read_to_end(&mut stream).await;
    stream.close().await;

    assert_eq!(bytes, b"AACC");
    let mut skipped = None;
    while let Ok(event) = rx.try_recv() {
        if let PlaylistEvent::SegmentSkipped { sequence, .. } = event {
            skipped = Some(sequence);
        }
    }
    assert_eq!(skipped, Some(1));
}

#[tokio::test]
async fn opening_an_open_stream_is_an_error() {
    let fixture = Fixture::new();
    fixture.route(
        "/vod/index.m3u8",
        "#EXTM3U\n#EXT-X-VERSION:3\n#EXT-X-TARGETDURATION:2\n#EXT-X-MEDIA-SEQUENCE:0\n\
         #EXTINF:2.0,\na.ts\n#EXT-X-ENDLIST\n",
    );
    fixture.route("/vod/a.ts", b"A".to_vec());
    let addr = serve(Arc::clone(&fixture)).await;

    let url = Url::parse(&format!("http://{addr}/vod/index.m3u8")).unwrap();
    let mut stream = PlaylistStream::new(Client::new(), fast_config(), url);
    stream.open().await.unwrap();
    assert!(matches!(
        stream.open().await,
        Err(sluice_engine::StreamError::AlreadyOpen)
    ));
    stream.close().await;
}
