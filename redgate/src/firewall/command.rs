use crate::error::{GatewayError, Result};
use log::trace;
use std::fmt::Display;
use std::future::Future;
use std::process::Stdio;
use tokio::process::Command;

/// NAT table operations the gateway needs, and nothing else.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verb {
    NewChain,
    AppendRule,
    DeleteRule,
    FlushChain,
    DeleteChain,
}

impl Verb {
    pub fn flag(self) -> &'static str {
        match self {
            Verb::NewChain => "-N",
            Verb::AppendRule => "-A",
            Verb::DeleteRule => "-D",
            Verb::FlushChain => "-F",
            Verb::DeleteChain => "-X",
        }
    }
}

/// A single NAT-table mutation: verb, chain and (for rule verbs) the rule specification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FirewallCommand {
    pub verb: Verb,
    pub chain: String,
    pub rule: Vec<String>,
}

impl FirewallCommand {
    pub fn new(verb: Verb, chain: impl Into<String>) -> Self {
        Self { verb, chain: chain.into(), rule: Vec::new() }
    }

    pub fn with_rule<I, S>(verb: Verb, chain: impl Into<String>, rule: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self { verb, chain: chain.into(), rule: rule.into_iter().map(Into::into).collect() }
    }

    /// Arguments passed to the firewall binary
    pub fn args(&self) -> Vec<String> {
        let mut args = vec!["-t".to_string(), "nat".to_string(), self.verb.flag().to_string(), self.chain.clone()];
        args.extend(self.rule.iter().cloned());
        args
    }
}

impl Display for FirewallCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.args().join(" "))
    }
}

/// Exit status and combined stdout/stderr of one firewall invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutcome {
    pub status: Option<i32>,
    pub output: String,
}

impl CommandOutcome {
    pub fn success(&self) -> bool {
        self.status == Some(0)
    }
}

/// The external NAT-table interface. Callers await each command before issuing the next.
pub trait Firewall {
    /// Program name used when reporting a failed command
    fn program(&self) -> &str;

    fn execute(&mut self, command: &FirewallCommand) -> impl Future<Output = Result<CommandOutcome>> + Send;
}

/// Runs commands through the `iptables` binary (or a compatible one).
#[derive(Debug, Clone)]
pub struct Iptables {
    binary: String,
}

impl Iptables {
    pub fn new(binary: impl Into<String>) -> Self {
        Self { binary: binary.into() }
    }
}

impl Firewall for Iptables {
    fn program(&self) -> &str {
        &self.binary
    }

    async fn execute(&mut self, command: &FirewallCommand) -> Result<CommandOutcome> {
        trace!("Running: {} {}", self.binary, command);
        let output = Command::new(&self.binary)
            .args(command.args())
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| GatewayError::ExternalCommand {
                command: format!("{} {}", self.binary, command),
                code: None,
                output: e.to_string(),
            })?;

        let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
        combined.push_str(&String::from_utf8_lossy(&output.stderr));
        Ok(CommandOutcome { status: output.status.code(), output: combined.trim_end().to_string() })
    }
}
