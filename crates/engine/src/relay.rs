//! Relay pipeline: pumps bytes from an open stream into a consumer, acting
//! as the trust boundary between network timing and a local, possibly slow,
//! process.

use std::time::Instant;

use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::config::RelayConfig;
use crate::error::{RelayError, StreamError};
use crate::stream::ByteSource;

/// Accounting for one relay run.
#[derive(Debug, Clone)]
pub struct RelaySession {
    pub bytes_relayed: u64,
    pub last_activity: Instant,
}

/// Move bytes from `source` (already open) into `sink` until the source ends,
/// the consumer stops reading, or `token` is cancelled.
///
/// Reads and writes happen in fixed-size chunks with no intermediate
/// buffering, so a slow consumer naturally backpressures the read side. A
/// transient read failure triggers a bounded number of close/reopen attempts
/// on the source before the relay gives up with [`RelayError::RelayFailed`].
/// A consumer that stops accepting input ends the relay normally.
pub async fn relay<S, W>(
    source: &mut S,
    sink: &mut W,
    config: &RelayConfig,
    token: &CancellationToken,
) -> Result<RelaySession, RelayError>
where
    S: ByteSource,
    W: AsyncWrite + Unpin + Send,
{
    let mut session = RelaySession {
        bytes_relayed: 0,
        last_activity: Instant::now(),
    };
    let mut chunk = vec![0u8; config.chunk_size.max(1)];
    let mut reconnects_left = config.reconnect_attempts;

    loop {
        let read = tokio::select! {
            biased;
            _ = token.cancelled() => break,
            read = source.read(&mut chunk) => read,
        };

        let n = match read {
            Ok(0) => break,
            Ok(n) => n,
            Err(StreamError::Cancelled) => break,
            Err(err) if err.is_retryable() && reconnects_left > 0 => {
                reconnects_left -= 1;
                warn!("stream read failed ({err}), attempting reconnect");
                source.close().await;
                if let Err(reopen) = source.open().await {
                    source.close().await;
                    return Err(RelayError::RelayFailed { source: reopen });
                }
                continue;
            }
            Err(err) => {
                source.close().await;
                return Err(RelayError::RelayFailed { source: err });
            }
        };

        let written = tokio::select! {
            biased;
            _ = token.cancelled() => break,
            written = sink.write_all(&chunk[..n]) => written,
        };
        if let Err(err) = written {
            // The consumer went away; an early exit is normal termination.
            debug!("consumer stopped accepting input ({err}), ending relay");
            break;
        }
        session.bytes_relayed += n as u64;
        session.last_activity = Instant::now();
    }

    source.close().await;
    let _ = sink.flush().await;
    debug!(bytes = session.bytes_relayed, "relay finished");
    Ok(session)
}
