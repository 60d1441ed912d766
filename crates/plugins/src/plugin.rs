use async_trait::async_trait;

use sluice_engine::Stream;

use crate::channel::Channel;
use crate::error::ResolutionError;

/// Capability interface every site handler implements.
///
/// How a plugin discovers stream URLs (scraping, APIs, authentication) is
/// its own business; the core only requires that `matches` is cheap and
/// side-effect free, and that returned streams satisfy the open/read/close
/// contract.
#[async_trait]
pub trait SitePlugin: Send + Sync {
    /// Site identifier, used as `Channel::site`.
    fn name(&self) -> &str;

    /// Whether this plugin's URL rules accept `url`. No network I/O.
    fn matches(&self, url: &str) -> bool;

    /// Map an accepted URL to a channel.
    async fn resolve(&self, url: &str) -> Result<Channel, ResolutionError>;

    /// Discover the playable streams for a resolved channel, as quality
    /// label to stream pairs in preference order. Zero entries is a valid
    /// result (channel resolved but currently offline).
    async fn streams(&self, channel: &Channel) -> Result<Vec<(String, Stream)>, ResolutionError>;
}
