use std::sync::Arc;

use sluice_engine::Stream;
use tracing::debug;

use crate::error::ResolutionError;
use crate::plugin::SitePlugin;
use crate::quality::quality_weight;

/// A resolved handle for one stream source URL on one site.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Channel {
    /// Site identifier (the resolving plugin's name).
    pub site: String,
    /// Canonical stream id on that site.
    pub id: String,
    /// Display metadata, when the site provides any.
    pub title: Option<String>,
}

/// A channel paired with the plugin that resolved it.
pub struct ResolvedChannel {
    plugin: Arc<dyn SitePlugin>,
    channel: Channel,
}

impl std::fmt::Debug for ResolvedChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResolvedChannel")
            .field("plugin", &self.plugin.name())
            .field("channel", &self.channel)
            .finish()
    }
}

impl ResolvedChannel {
    pub(crate) fn new(plugin: Arc<dyn SitePlugin>, channel: Channel) -> Self {
        Self { plugin, channel }
    }

    pub fn channel(&self) -> &Channel {
        &self.channel
    }

    /// Invoke the plugin's stream discovery and synthesize the `best`/`worst`
    /// aliases. An empty map is a valid non-error result ("resolved but
    /// currently no playable stream").
    pub async fn streams(&self) -> Result<StreamMap, ResolutionError> {
        let entries = self.plugin.streams(&self.channel).await?;
        debug!(
            site = %self.channel.site,
            id = %self.channel.id,
            qualities = entries.len(),
            "discovered streams"
        );
        Ok(StreamMap::from_entries(entries))
    }
}

/// Quality label to stream mapping, in plugin insertion order, with derived
/// `best`/`worst` aliases.
pub struct StreamMap {
    entries: Vec<(String, Stream)>,
    best: Option<usize>,
    worst: Option<usize>,
}

impl StreamMap {
    /// Rank the labels and record the alias targets. Ties keep the earliest
    /// insertion; unparseable labels weigh least.
    pub fn from_entries(entries: Vec<(String, Stream)>) -> Self {
        let mut best: Option<(f64, usize)> = None;
        let mut worst: Option<(f64, usize)> = None;
        for (idx, (label, _)) in entries.iter().enumerate() {
            let weight = quality_weight(label);
            if best.is_none_or(|(w, _)| weight > w) {
                best = Some((weight, idx));
            }
            if worst.is_none_or(|(w, _)| weight < w) {
                worst = Some((weight, idx));
            }
        }
        Self {
            entries,
            best: best.map(|(_, idx)| idx),
            worst: worst.map(|(_, idx)| idx),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Labels in insertion order, without the synthesized aliases.
    pub fn labels(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(label, _)| label.as_str())
    }

    /// Resolve `best`/`worst` aliases to the underlying label.
    pub fn resolve_label(&self, label: &str) -> Option<&str> {
        let idx = self.index_of(label)?;
        Some(self.entries[idx].0.as_str())
    }

    /// Take the stream for `label` (or a `best`/`worst` alias) out of the
    /// map.
    pub fn select(mut self, label: &str) -> Option<Stream> {
        let idx = self.index_of(label)?;
        Some(self.entries.swap_remove(idx).1)
    }

    fn index_of(&self, label: &str) -> Option<usize> {
        match label {
            "best" => self.best,
            "worst" => self.worst,
            _ => self
                .entries
                .iter()
                .position(|(existing, _)| existing == label),
        }
    }
}
