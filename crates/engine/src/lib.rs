//! Stream resolution and relay engine.
//!
//! Exposes the uniform [`Stream`] abstraction over three delivery protocols
//! (progressive HTTP, segmented playlists, externally-demuxed subprocess
//! output), the playlist engine driving segmented streams, and the relay
//! pipeline moving bytes into a player process.

pub mod config;
pub mod error;
pub mod events;
pub mod player;
pub mod playlist;
pub mod relay;
pub mod retry;
pub mod stream;

pub use config::{EngineConfig, PlaylistConfig, ProcessConfig, RelayConfig};
pub use error::{RelayError, StreamError};
pub use events::{EventSink, PlaylistEvent};
pub use player::{PlayerCommand, PlayerHandle};
pub use playlist::variant::{ProbedPlaylist, probe_playlist};
pub use relay::{RelaySession, relay};
pub use retry::RetryPolicy;
pub use stream::{ByteSource, HttpStream, PlaylistStream, ProcessStream, Stream};
