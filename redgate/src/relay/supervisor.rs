use crate::error::{GatewayError, Result};
use crate::relay::config::WrittenRelayConfig;
use log::{debug, info, warn};
use nix::sys::signal::{Signal, kill};
use nix::unistd::Pid;
use std::pin::Pin;
use std::process::{ExitStatus, Stdio};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};
use tokio_stream::wrappers::SplitStream;
use tokio_stream::{Stream, StreamExt};

/// Prefix put in front of every line the relay prints
pub const OUTPUT_PREFIX: &str = "relay: ";

type OutputLines = Pin<Box<dyn Stream<Item = std::io::Result<Vec<u8>>> + Send>>;

/// Handle on the running relay daemon and its merged stdout/stderr.
pub struct RelaySupervisor {
    child: Child,
    pid: u32,
    output: OutputLines,
}

impl RelaySupervisor {
    /// Start `<binary> <config path>`. Requires a fully written config, since the relay reads it once.
    pub fn spawn(binary: &str, config: &WrittenRelayConfig) -> Result<Self> {
        info!("Starting relay: {} {}", binary, config.path().display());
        let mut command = Command::new(binary);
        command.arg(config.path());
        Self::from_command(command, binary)
    }

    pub(crate) fn from_command(mut command: Command, program: &str) -> Result<Self> {
        let mut child = command
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| GatewayError::Spawn { program: program.to_string(), source })?;

        let pid = child.id().ok_or_else(|| GatewayError::UnexpectedTermination("relay exited before it could be tracked".to_string()))?;
        let stdout = child.stdout.take().ok_or_else(|| GatewayError::Config("relay stdout was not captured".to_string()))?;
        let stderr = child.stderr.take().ok_or_else(|| GatewayError::Config("relay stderr was not captured".to_string()))?;

        let output = SplitStream::new(BufReader::new(stdout).split(b'\n'))
            .merge(SplitStream::new(BufReader::new(stderr).split(b'\n')));
        debug!("Relay running with pid {}", pid);
        Ok(Self { child, pid, output: Box::pin(output) })
    }

    pub fn pid(&self) -> u32 {
        self.pid
    }

    /// Next line from either output stream, or `None` once both are closed (the relay has exited)
    pub async fn next_line(&mut self) -> Option<String> {
        loop {
            match self.output.next().await? {
                Ok(bytes) => return Some(String::from_utf8_lossy(&bytes).trim_end_matches('\r').to_string()),
                Err(e) => warn!("Failed to read relay output: {}", e),
            }
        }
    }

    pub fn emit(&self, line: &str) {
        println!("{}{}", OUTPUT_PREFIX, line);
    }

    /// Ask the relay to exit with SIGTERM
    pub fn terminate(&self) -> Result<()> {
        info!("Sending SIGTERM to relay (pid {})", self.pid);
        let raw = i32::try_from(self.pid)
            .map_err(|_| GatewayError::SignalDelivery { pid: self.pid, reason: "pid out of range".to_string() })?;
        kill(Pid::from_raw(raw), Signal::SIGTERM)
            .map_err(|e| GatewayError::SignalDelivery { pid: self.pid, reason: e.to_string() })
    }

    pub fn is_running(&mut self) -> bool {
        matches!(self.child.try_wait(), Ok(None))
    }

    /// Reap the relay
    pub async fn wait(&mut self) -> Result<ExitStatus> {
        Ok(self.child.wait().await?)
    }

    /// Reap the relay, killing it first if it is still alive. Used once its output is gone, when
    /// nothing it does can be observed any more.
    pub async fn force_stop(&mut self) -> Result<ExitStatus> {
        if self.is_running() {
            warn!("Relay (pid {}) closed its output but is still running, killing it", self.pid);
            self.child.kill().await?;
        }
        self.wait().await
    }
}

#[cfg(test)]
pub(crate) fn shell_relay(script: &str) -> RelaySupervisor {
    let mut command = Command::new("sh");
    command.args(["-c", script]);
    match RelaySupervisor::from_command(command, "sh") {
        Ok(relay) => relay,
        Err(e) => panic!("failed to start test relay: {}", e),
    }
}
