//! TOML configuration surface. Every field is optional; command-line flags
//! override file values, which override the built-in defaults.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, bail};
use serde::Deserialize;
use tracing::debug;

use sluice_engine::{EngineConfig, PlayerCommand};
use sluice_manager::ManagerConfig;

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AppConfig {
    /// Player command template. `{port}` is substituted in manage mode.
    pub player: Option<String>,
    /// Quality used when the command line names none.
    pub default_quality: Option<String>,
    /// Path to the RTMP demuxer helper.
    pub rtmpdump: Option<String>,
    /// Inclusive local port range for manage-mode sessions.
    pub ports: Option<[u16; 2]>,
    /// Extra `--key value` arguments passed to the RTMP demuxer, typically
    /// site credentials.
    pub rtmp_params: BTreeMap<String, String>,
    pub http: HttpSection,
    pub playlist: PlaylistSection,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct HttpSection {
    pub user_agent: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PlaylistSection {
    /// Consecutive refreshes without new segments before a live playlist is
    /// declared ended.
    pub max_empty_refreshes: Option<u32>,
    /// Lower bound on the live refresh interval, in seconds.
    pub min_refresh_interval_secs: Option<f64>,
}

impl AppConfig {
    /// Load from `path` when given (missing file is an error), otherwise
    /// from the default location (missing file yields the defaults).
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let (path, explicit) = match path {
            Some(path) => (path.to_owned(), true),
            None => match default_path() {
                Some(path) => (path, false),
                None => return Ok(Self::default()),
            },
        };
        if !path.exists() {
            if explicit {
                bail!("configuration file {} does not exist", path.display());
            }
            return Ok(Self::default());
        }
        let text = fs::read_to_string(&path)
            .with_context(|| format!("reading {}", path.display()))?;
        let config: Self =
            toml::from_str(&text).with_context(|| format!("parsing {}", path.display()))?;
        debug!(path = %path.display(), "loaded configuration");
        Ok(config)
    }

    pub fn quality<'a>(&'a self, explicit: Option<&'a str>) -> &'a str {
        explicit
            .or(self.default_quality.as_deref())
            .unwrap_or("best")
    }

    /// The player template, with a command-line override taking precedence.
    pub fn player_command(&self, explicit: Option<&str>) -> Result<PlayerCommand> {
        let template = explicit.or(self.player.as_deref()).ok_or_else(|| {
            anyhow::anyhow!("no player configured; pass --player or set `player` in the config file")
        })?;
        Ok(PlayerCommand::new(template))
    }

    pub fn rtmp_params(&self) -> Vec<(String, String)> {
        self.rtmp_params
            .iter()
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect()
    }

    pub fn engine_config(&self) -> EngineConfig {
        let mut config = EngineConfig::default();
        if let Some(user_agent) = &self.http.user_agent {
            config.http.user_agent = user_agent.clone();
        }
        if let Some(rtmpdump) = &self.rtmpdump {
            config.process.rtmpdump = rtmpdump.clone();
        }
        if let Some(max) = self.playlist.max_empty_refreshes {
            config.playlist.max_empty_refreshes = max;
        }
        if let Some(secs) = self.playlist.min_refresh_interval_secs {
            config.playlist.min_refresh_interval = Duration::from_secs_f64(secs.max(0.0));
        }
        config
    }

    pub fn manager_config(&self, player_override: Option<&str>) -> Result<ManagerConfig> {
        let engine = self.engine_config();
        let mut config = ManagerConfig {
            player: self.player_command(player_override)?,
            relay: engine.relay,
            ..ManagerConfig::default()
        };
        if let Some([first, last]) = self.ports {
            if first > last {
                bail!("invalid port range {first}-{last}");
            }
            config.ports = first..=last;
        }
        if let Some(quality) = &self.default_quality {
            config.default_quality = quality.clone();
        }
        Ok(config)
    }
}

fn default_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("sluice").join("config.toml"))
}
