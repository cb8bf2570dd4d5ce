use crate::config::{EndpointSet, ProxyEndpoint, RelayLogTarget};
use crate::error::Result;
use log::{debug, trace};
use std::fmt::Display;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;

/// Address every relay listener binds to
pub const LOCAL_BIND_ADDRESS: &str = "0.0.0.0";

/// Relay daemon configuration: one base section and one backend section per configured endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayConfig {
    log: RelayLogTarget,
    backends: Vec<ProxyEndpoint>,
}

/// Proof that a relay config file has been completely written, flushed and closed.
/// The supervisor only spawns the relay from one of these.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WrittenRelayConfig {
    path: PathBuf,
}

impl WrittenRelayConfig {
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl RelayConfig {
    pub fn new(log: RelayLogTarget, endpoints: &EndpointSet) -> Self {
        Self { log, backends: endpoints.configured().cloned().collect() }
    }

    pub fn backends(&self) -> &[ProxyEndpoint] {
        &self.backends
    }

    pub fn render(&self) -> String {
        self.to_string()
    }

    /// Write the rendered config and sync it to disk before returning
    pub async fn write_to(&self, path: impl AsRef<Path>) -> Result<WrittenRelayConfig> {
        let path = path.as_ref();
        debug!("Writing relay config to: {}", path.display());
        let content = self.render();
        trace!("Relay config:\n{}", content);

        let mut file = tokio::fs::File::create(path).await?;
        file.write_all(content.as_bytes()).await?;
        file.flush().await?;
        file.sync_all().await?;
        drop(file);

        Ok(WrittenRelayConfig { path: path.to_owned() })
    }
}

impl Display for RelayConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "base {{")?;
        writeln!(f, "\tlog_debug = on;")?;
        writeln!(f, "\tlog_info = on;")?;
        writeln!(f, "\tlog = \"{}\";", self.log)?;
        writeln!(f, "\tdaemon = off;")?;
        writeln!(f, "\tredirector = iptables;")?;
        writeln!(f, "}}")?;
        for backend in &self.backends {
            writeln!(f)?;
            writeln!(f, "redsocks {{")?;
            writeln!(f, "\tlocal_ip = {};", LOCAL_BIND_ADDRESS)?;
            writeln!(f, "\tlocal_port = {};", backend.class.local_port())?;
            writeln!(f, "\tip = {};", backend.host)?;
            writeln!(f, "\tport = {};", backend.port)?;
            writeln!(f, "\ttype = {};", backend.class.relay_type())?;
            writeln!(f, "}}")?;
        }
        Ok(())
    }
}
