use std::sync::Arc;

use tracing::debug;

use crate::channel::ResolvedChannel;
use crate::error::ResolutionError;
use crate::plugin::SitePlugin;

/// An ordered set of site plugins. Registration order is match order; the
/// first plugin whose rules accept the URL wins, so overlapping rules are a
/// configuration error rather than something resolved by priority. The
/// registry itself performs no network I/O.
#[derive(Default)]
pub struct PluginRegistry {
    plugins: Vec<Arc<dyn SitePlugin>>,
}

impl PluginRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, plugin: Arc<dyn SitePlugin>) {
        debug!(plugin = plugin.name(), "registered plugin");
        self.plugins.push(plugin);
    }

    pub fn plugin_names(&self) -> impl Iterator<Item = &str> {
        self.plugins.iter().map(|p| p.name())
    }

    /// Dispatch `url` to the first matching plugin and resolve it into a
    /// channel.
    pub async fn resolve(&self, url: &str) -> Result<ResolvedChannel, ResolutionError> {
        for plugin in &self.plugins {
            if plugin.matches(url) {
                debug!(plugin = plugin.name(), url, "plugin matched");
                let channel = plugin.resolve(url).await?;
                return Ok(ResolvedChannel::new(Arc::clone(plugin), channel));
            }
        }
        Err(ResolutionError::NoMatchingPlugin {
            url: url.to_owned(),
        })
    }
}
