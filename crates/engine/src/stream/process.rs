use std::process::Stdio;

use async_trait::async_trait;
use tokio::io::AsyncReadExt;
use tokio::process::{Child, ChildStdout, Command};
use tracing::{debug, warn};

use crate::config::ProcessConfig;
use crate::error::StreamError;
use crate::stream::ByteSource;

#[cfg(windows)]
const CREATE_NO_WINDOW: u32 = 0x0800_0000;

/// Externally-demuxed stream: spawns a helper process (an `rtmpdump`-style
/// demuxer) and treats its standard output as the byte source.
pub struct ProcessStream {
    program: String,
    args: Vec<String>,
    config: ProcessConfig,
    state: State,
}

enum State {
    New,
    Open {
        child: Child,
        stdout: ChildStdout,
        drained: bool,
    },
    Closed,
}

impl ProcessStream {
    pub fn new(program: impl Into<String>, args: Vec<String>, config: ProcessConfig) -> Self {
        Self {
            program: program.into(),
            args,
            config,
            state: State::New,
        }
    }

    /// Build the RTMP helper invocation for `url`: the demuxed FLV stream is
    /// written to stdout, extra key/value parameters become `--key value`
    /// arguments.
    pub fn rtmp(url: &str, params: &[(String, String)], config: ProcessConfig) -> Self {
        let mut args = vec![
            "--rtmp".to_owned(),
            url.to_owned(),
            "--flv".to_owned(),
            "-".to_owned(),
        ];
        for (key, value) in params {
            args.push(format!("--{key}"));
            if !value.is_empty() {
                args.push(value.clone());
            }
        }
        let program = config.rtmpdump.clone();
        Self::new(program, args, config)
    }

    pub fn command_line(&self) -> String {
        let mut line = self.program.clone();
        for arg in &self.args {
            line.push(' ');
            line.push_str(arg);
        }
        line
    }
}

#[async_trait]
impl ByteSource for ProcessStream {
    async fn open(&mut self) -> Result<(), StreamError> {
        match self.state {
            State::Open { .. } => return Err(StreamError::AlreadyOpen),
            State::New | State::Closed => {}
        }

        let mut command = Command::new(&self.program);
        command
            .args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true);
        #[cfg(windows)]
        command.creation_flags(CREATE_NO_WINDOW);

        let mut child = command.spawn().map_err(|err| {
            StreamError::process(format!("unable to spawn `{}`: {err}", self.program))
        })?;

        // Brief probe to catch helpers that exit immediately (bad arguments,
        // unreachable server).
        tokio::time::sleep(self.config.spawn_probe).await;
        if let Ok(Some(status)) = child.try_wait() {
            return Err(StreamError::process(format!(
                "`{}` exited prematurely with {status}",
                self.program
            )));
        }

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| StreamError::process("helper stdout was not captured"))?;
        debug!(program = %self.program, "helper process started");
        self.state = State::Open {
            child,
            stdout,
            drained: false,
        };
        Ok(())
    }

    async fn read(&mut self, buf: &mut [u8]) -> Result<usize, StreamError> {
        match &mut self.state {
            State::New => Err(StreamError::NotOpen),
            State::Closed => Err(StreamError::Closed),
            State::Open {
                stdout, drained, ..
            } => {
                if *drained {
                    return Ok(0);
                }
                let n = stdout.read(buf).await?;
                if n == 0 {
                    *drained = true;
                }
                Ok(n)
            }
        }
    }

    async fn close(&mut self) {
        if let State::Open { mut child, .. } = std::mem::replace(&mut self.state, State::Closed) {
            if matches!(child.try_wait(), Ok(Some(_))) {
                return;
            }
            // Ask the helper to stop, then force it after a bounded grace
            // period.
            let _ = child.start_kill();
            match tokio::time::timeout(self.config.kill_grace, child.wait()).await {
                Ok(Ok(status)) => debug!(program = %self.program, %status, "helper stopped"),
                Ok(Err(err)) => warn!(program = %self.program, "helper wait failed: {err}"),
                Err(_) => {
                    warn!(program = %self.program, "helper ignored stop request, killing");
                    let _ = child.kill().await;
                }
            }
        }
    }
}
