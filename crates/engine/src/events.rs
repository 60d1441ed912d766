use tokio::sync::mpsc;

/// Non-fatal notifications surfaced by the playlist engine while playback
/// continues. Every event is also traced; the sink is optional and mainly
/// consumed by tests and the CLI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlaylistEvent {
    /// A manifest refresh produced new segments.
    PlaylistRefreshed {
        media_sequence_base: u64,
        new_segments: usize,
    },
    /// A segment was dropped after exhausting its fetch retries.
    SegmentSkipped { sequence: u64, attempts: u32 },
    /// The consumer fell behind the live window; playback resumes from the
    /// earliest still-available sequence.
    SegmentGap {
        from_sequence: u64,
        to_sequence: u64,
    },
    /// The stream reached its end (VOD exhausted or live declared over).
    StreamEnded,
}

pub type EventSink = mpsc::UnboundedSender<PlaylistEvent>;

pub(crate) fn emit(sink: &Option<EventSink>, event: PlaylistEvent) {
    if let Some(sink) = sink {
        // A dropped receiver is not an error; events are best-effort.
        let _ = sink.send(event);
    }
}
