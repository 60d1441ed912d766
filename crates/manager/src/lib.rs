//! Concurrent relay session management.
//!
//! A [`Manager`] owns a set of relay sessions, one per local port. Each
//! session resolves a source URL through the plugin registry, spawns the
//! configured player with the session port substituted into its command
//! line, and pumps stream bytes into the player's stdin. A background
//! supervision task notices players that died out of band and marks the
//! corresponding session failed without touching its siblings.

mod error;
mod ports;

use std::collections::HashMap;
use std::ops::RangeInclusive;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use sluice_engine::{ByteSource, PlayerCommand, PlayerHandle, RelayConfig, relay};
use sluice_plugins::PluginRegistry;

pub use error::ManagerError;
pub use ports::PortPool;

#[derive(Debug, Clone)]
pub struct ManagerConfig {
    /// Local ports handed out to sessions, lowest first.
    pub ports: RangeInclusive<u16>,
    /// Player command template; `{port}` is substituted per session.
    pub player: PlayerCommand,
    /// Quality used when a `start` request names none.
    pub default_quality: String,
    /// How often the supervision task probes player liveness.
    pub supervision_interval: Duration,
    /// How long a freshly spawned player must survive before the session
    /// counts as running.
    pub startup_probe: Duration,
    /// Grace period for relay tasks and players on stop.
    pub shutdown_grace: Duration,
    pub relay: RelayConfig,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            ports: 42000..=42099,
            player: PlayerCommand::new("vlc"),
            default_quality: "best".to_owned(),
            supervision_interval: Duration::from_secs(1),
            startup_probe: Duration::from_millis(500),
            shutdown_grace: Duration::from_secs(2),
            relay: RelayConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstanceStatus {
    Starting,
    Running,
    Failed,
    Stopped,
}

impl std::fmt::Display for InstanceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            Self::Starting => "starting",
            Self::Running => "running",
            Self::Failed => "failed",
            Self::Stopped => "stopped",
        };
        f.write_str(label)
    }
}

/// Point-in-time view of one session, for listings.
#[derive(Debug, Clone)]
pub struct InstanceInfo {
    pub port: u16,
    pub url: String,
    pub quality: String,
    pub status: InstanceStatus,
    pub player_pid: Option<u32>,
}

struct ManagedInstance {
    url: String,
    quality: String,
    status: InstanceStatus,
    player: Option<PlayerHandle>,
    relay: Option<JoinHandle<()>>,
    token: CancellationToken,
}

struct State {
    instances: HashMap<u16, ManagedInstance>,
    ports: PortPool,
}

/// Multi-session relay manager.
///
/// Sessions that end or fail keep their entry (with a terminal status) so a
/// listing still shows what happened; their port is released immediately.
/// [`Manager::stop`] removes the entry. Must be created inside a Tokio
/// runtime, as construction spawns the supervision task.
pub struct Manager {
    registry: Arc<PluginRegistry>,
    config: ManagerConfig,
    state: Arc<Mutex<State>>,
    shutdown: CancellationToken,
    supervisor: Mutex<Option<JoinHandle<()>>>,
}

impl Manager {
    pub fn new(registry: Arc<PluginRegistry>, config: ManagerConfig) -> Self {
        let state = Arc::new(Mutex::new(State {
            instances: HashMap::new(),
            ports: PortPool::new(config.ports.clone()),
        }));
        let shutdown = CancellationToken::new();
        let supervisor = tokio::spawn(supervise(
            Arc::clone(&state),
            config.supervision_interval,
            shutdown.clone(),
        ));
        Self {
            registry,
            config,
            state,
            shutdown,
            supervisor: Mutex::new(Some(supervisor)),
        }
    }

    /// Start a relay session for `url` and return the port assigned to it.
    ///
    /// The session is only reported as started once the player has survived
    /// the startup probe; a player that exits immediately (bad command,
    /// unsupported arguments) fails the start instead of leaving a zombie
    /// session behind.
    pub async fn start(&self, url: &str, quality: Option<&str>) -> Result<u16, ManagerError> {
        let resolved = self.registry.resolve(url).await?;
        let streams = resolved.streams().await?;
        if streams.is_empty() {
            return Err(ManagerError::NoStreams {
                url: url.to_owned(),
            });
        }

        let wanted = quality.unwrap_or(&self.config.default_quality);
        let available = streams.labels().collect::<Vec<_>>().join(", ");
        let not_available = || ManagerError::QualityNotAvailable {
            quality: wanted.to_owned(),
            available: available.clone(),
        };
        let label = streams
            .resolve_label(wanted)
            .map(str::to_owned)
            .ok_or_else(not_available)?;
        let mut stream = streams.select(wanted).ok_or_else(not_available)?;

        let port = self
            .state
            .lock()
            .ports
            .allocate()
            .ok_or(ManagerError::PortsExhausted)?;
        info!(port, url, quality = %label, "starting relay session");

        if let Err(err) = stream.open().await {
            self.state.lock().ports.release(port);
            return Err(err.into());
        }

        let mut player = match self.config.player.for_port(port).spawn() {
            Ok(player) => player,
            Err(err) => {
                stream.close().await;
                self.state.lock().ports.release(port);
                return Err(err.into());
            }
        };
        let Some(mut stdin) = player.take_stdin() else {
            stream.close().await;
            player.shutdown(self.config.shutdown_grace).await;
            self.state.lock().ports.release(port);
            return Err(sluice_engine::RelayError::PlayerStdinUnavailable.into());
        };

        let token = CancellationToken::new();
        // A recycled port may still carry a terminal entry from an earlier
        // session; the insert replaces it.
        self.state.lock().instances.insert(
            port,
            ManagedInstance {
                url: url.to_owned(),
                quality: label,
                status: InstanceStatus::Starting,
                player: Some(player),
                relay: None,
                token: token.clone(),
            },
        );

        let relay_config = self.config.relay.clone();
        let relay_state = Arc::clone(&self.state);
        let relay_task = tokio::spawn(async move {
            let result = relay(&mut stream, &mut stdin, &relay_config, &token).await;
            let outcome = match &result {
                Ok(session) => {
                    debug!(port, bytes = session.bytes_relayed, "relay session ended");
                    InstanceStatus::Stopped
                }
                Err(err) => {
                    warn!(port, "relay session failed: {err}");
                    InstanceStatus::Failed
                }
            };
            let mut state = relay_state.lock();
            let mut release = false;
            if let Some(instance) = state.instances.get_mut(&port) {
                if matches!(
                    instance.status,
                    InstanceStatus::Starting | InstanceStatus::Running
                ) {
                    instance.status = outcome;
                    release = true;
                }
            }
            if release {
                state.ports.release(port);
            }
        });
        if let Some(instance) = self.state.lock().instances.get_mut(&port) {
            instance.relay = Some(relay_task);
        }

        tokio::time::sleep(self.config.startup_probe).await;
        self.confirm_started(port)
    }

    fn confirm_started(&self, port: u16) -> Result<u16, ManagerError> {
        let mut state = self.state.lock();
        let Some(instance) = state.instances.get_mut(&port) else {
            // Stopped out from under us before the probe finished.
            return Ok(port);
        };
        let mut release = false;
        let result = match instance.status {
            InstanceStatus::Starting => {
                let alive = instance
                    .player
                    .as_mut()
                    .is_some_and(PlayerHandle::is_alive);
                if alive {
                    instance.status = InstanceStatus::Running;
                    debug!(port, "relay session running");
                    Ok(port)
                } else {
                    warn!(port, "player exited during startup probe");
                    instance.status = InstanceStatus::Failed;
                    instance.token.cancel();
                    release = true;
                    Err(ManagerError::PlayerExited { port })
                }
            }
            // The relay finished within the probe window; a short source is
            // still a successful start.
            InstanceStatus::Running | InstanceStatus::Stopped => Ok(port),
            InstanceStatus::Failed => Err(ManagerError::PlayerExited { port }),
        };
        if release {
            state.ports.release(port);
        }
        result
    }

    /// Stop the session on `port`, terminating its relay task and player,
    /// and remove it from the listing.
    pub async fn stop(&self, port: u16) -> Result<(), ManagerError> {
        let instance = {
            let mut state = self.state.lock();
            let instance = state
                .instances
                .remove(&port)
                .ok_or(ManagerError::UnknownSession { port })?;
            state.ports.release(port);
            instance
        };
        info!(port, url = %instance.url, "stopping relay session");
        instance.token.cancel();
        if let Some(relay) = instance.relay {
            let abort = relay.abort_handle();
            if tokio::time::timeout(self.config.shutdown_grace, relay)
                .await
                .is_err()
            {
                warn!(port, "relay task ignored cancellation, aborting");
                abort.abort();
            }
        }
        if let Some(player) = instance.player {
            player.shutdown(self.config.shutdown_grace).await;
        }
        Ok(())
    }

    /// Sessions ordered by port, including ones that already ended.
    pub fn list(&self) -> Vec<InstanceInfo> {
        let state = self.state.lock();
        let mut sessions: Vec<InstanceInfo> = state
            .instances
            .iter()
            .map(|(port, instance)| InstanceInfo {
                port: *port,
                url: instance.url.clone(),
                quality: instance.quality.clone(),
                status: instance.status,
                player_pid: instance.player.as_ref().and_then(PlayerHandle::pid),
            })
            .collect();
        sessions.sort_by_key(|info| info.port);
        sessions
    }

    /// Stop every session and the supervision task.
    pub async fn shutdown(&self) {
        self.shutdown.cancel();
        let supervisor = self.supervisor.lock().take();
        if let Some(supervisor) = supervisor {
            let _ = supervisor.await;
        }
        let ports: Vec<u16> = self.state.lock().instances.keys().copied().collect();
        for port in ports {
            if let Err(err) = self.stop(port).await {
                warn!(port, "shutdown: {err}");
            }
        }
    }
}

async fn supervise(state: Arc<Mutex<State>>, interval: Duration, token: CancellationToken) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            biased;
            _ = token.cancelled() => break,
            _ = ticker.tick() => {}
        }
        sweep(&state);
    }
}

/// One supervision pass: any session whose player died out of band is
/// marked failed and has its relay cancelled and port released. Other
/// sessions are untouched.
fn sweep(state: &Mutex<State>) {
    let mut state = state.lock();
    let mut failed = Vec::new();
    for (port, instance) in state.instances.iter_mut() {
        if !matches!(
            instance.status,
            InstanceStatus::Starting | InstanceStatus::Running
        ) {
            continue;
        }
        let alive = instance
            .player
            .as_mut()
            .is_some_and(PlayerHandle::is_alive);
        if !alive {
            warn!(port, url = %instance.url, "player exited, marking session failed");
            instance.status = InstanceStatus::Failed;
            instance.token.cancel();
            failed.push(*port);
        }
    }
    for port in failed {
        state.ports.release(port);
    }
}
