//! Player process handling: spawning the consumer the relay pipeline writes
//! into, from a user-supplied command template.

use std::process::Stdio;
use std::time::Duration;

use tokio::process::{Child, ChildStdin, Command};
use tracing::{debug, warn};

use crate::error::RelayError;

#[cfg(windows)]
const CREATE_NO_WINDOW: u32 = 0x0800_0000;

/// A player command template. `{port}` is substituted by the manager for
/// re-broadcast players; `-` is appended so the player reads from stdin.
#[derive(Debug, Clone)]
pub struct PlayerCommand {
    template: String,
}

impl PlayerCommand {
    pub fn new(template: impl Into<String>) -> Self {
        Self {
            template: template.into(),
        }
    }

    /// Substitute the `{port}` placeholder for a manager session.
    pub fn for_port(&self, port: u16) -> Self {
        Self {
            template: self.template.replace("{port}", &port.to_string()),
        }
    }

    pub fn command_line(&self) -> &str {
        &self.template
    }

    /// Spawn the player with a piped stdin, through the platform shell so
    /// the template may carry its own arguments and quoting.
    pub fn spawn(&self) -> Result<PlayerHandle, RelayError> {
        if self.template.trim().is_empty() {
            return Err(RelayError::EmptyPlayerCommand);
        }
        let line = format!("{} -", self.template.trim());

        #[cfg(unix)]
        let mut command = {
            let mut command = Command::new("sh");
            command.arg("-c").arg(&line);
            command
        };
        #[cfg(windows)]
        let mut command = {
            let mut command = Command::new("cmd");
            command.arg("/C").arg(&line);
            command.creation_flags(CREATE_NO_WINDOW);
            command
        };

        command
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true);

        let mut child = command
            .spawn()
            .map_err(|source| RelayError::PlayerSpawn { source })?;
        let stdin = child
            .stdin
            .take()
            .ok_or(RelayError::PlayerStdinUnavailable)?;
        debug!(command = %line, "player started");
        Ok(PlayerHandle {
            child,
            stdin: Some(stdin),
        })
    }
}

/// A spawned player process. The stdin handle is taken once by the relay
/// pipeline; the child stays here for liveness checks and shutdown.
pub struct PlayerHandle {
    child: Child,
    stdin: Option<ChildStdin>,
}

impl PlayerHandle {
    pub fn take_stdin(&mut self) -> Option<ChildStdin> {
        self.stdin.take()
    }

    /// OS process id, if the player has not yet been reaped.
    pub fn pid(&self) -> Option<u32> {
        self.child.id()
    }

    /// Non-blocking liveness probe.
    pub fn is_alive(&mut self) -> bool {
        matches!(self.child.try_wait(), Ok(None))
    }

    /// Wait for the player to exit on its own, typically after end of
    /// input.
    pub async fn wait(mut self) {
        match self.child.wait().await {
            Ok(status) => debug!(%status, "player exited"),
            Err(err) => warn!("player wait failed: {err}"),
        }
    }

    /// Stop the player, waiting up to `grace` before forcing a kill.
    pub async fn shutdown(mut self, grace: Duration) {
        if !self.is_alive() {
            return;
        }
        let _ = self.child.start_kill();
        match tokio::time::timeout(grace, self.child.wait()).await {
            Ok(Ok(status)) => debug!(%status, "player stopped"),
            Ok(Err(err)) => warn!("player wait failed: {err}"),
            Err(_) => {
                warn!("player ignored stop request, killing");
                let _ = self.child.kill().await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn port_substitution() {
        let command = PlayerCommand::new("vlc --sout '#standard{mux=ts,dst=:{port}}'");
        assert_eq!(
            command.for_port(42000).command_line(),
            "vlc --sout '#standard{mux=ts,dst=:42000}'"
        );
    }

    #[test]
    fn empty_template_is_rejected() {
        assert!(matches!(
            PlayerCommand::new("  ").spawn(),
            Err(RelayError::EmptyPlayerCommand)
        ));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn spawned_player_is_alive_until_shutdown() {
        let mut player = PlayerCommand::new("cat > /dev/null").spawn().unwrap();
        assert!(player.take_stdin().is_some());
        assert!(player.is_alive());
        player.shutdown(Duration::from_secs(1)).await;
    }
}
