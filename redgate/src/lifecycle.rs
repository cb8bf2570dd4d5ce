//! Gateway lifecycle: setup, supervision and ordered teardown.
//!
//! ```text
//! Idle -> Configuring -> RulesInstalled -> Running -> Cleaning -> Terminated
//! ```
//!
//! Signals never run teardown themselves. The supervision loop races the relay's output against a
//! shutdown future; once that future resolves, teardown runs on the same task that did the setup.

use crate::config::types::SKIP_SPECS;
use crate::config::{EndpointSet, GatewayConfig, PortMapping, ProtocolClass, parse_port_spec};
use crate::error::{GatewayError, Result};
use crate::firewall::{DestPortRule, Firewall, RuleManager};
use crate::relay::{RelayConfig, RelaySupervisor, WrittenRelayConfig};
use log::{debug, error, info, warn};
use std::future::Future;
use tokio::signal::unix::{Signal, SignalKind, signal};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Idle,
    Configuring,
    RulesInstalled,
    Running,
    Cleaning,
    Terminated,
}

/// SIGINT/SIGTERM listener. Install it before touching the firewall so that an interrupt during
/// setup is held until the supervision loop picks it up, instead of killing the process halfway.
pub struct ShutdownSignal {
    interrupt: Signal,
    terminate: Signal,
}

impl ShutdownSignal {
    pub fn install() -> Result<Self> {
        Ok(Self { interrupt: signal(SignalKind::interrupt())?, terminate: signal(SignalKind::terminate())? })
    }

    pub async fn recv(mut self) {
        tokio::select! {
            _ = self.interrupt.recv() => info!("Interrupt received, shutting down"),
            _ = self.terminate.recv() => info!("Termination requested, shutting down"),
        }
    }
}

enum Event {
    Line(Option<String>),
    Shutdown,
}

pub struct Gateway<F: Firewall> {
    config: GatewayConfig,
    endpoints: EndpointSet,
    mappings: Vec<PortMapping>,
    rules: RuleManager<F>,
    state: LifecycleState,
}

impl<F: Firewall> Gateway<F> {
    /// Resolve endpoints and validate the whole port spec. Nothing external is touched, so an
    /// invalid entry anywhere in the port spec means no rule is ever installed.
    pub fn new(config: GatewayConfig, firewall: F) -> Result<Self> {
        let endpoints = config.endpoints();
        let mappings = parse_port_spec(config.get_port_spec())?;
        for mapping in &mappings {
            if !endpoints.is_configured(mapping.class) {
                return Err(GatewayError::MissingEndpoint { token: mapping.to_string(), class: mapping.class.to_string() });
            }
        }
        if endpoints.is_empty() {
            warn!("No usable proxy configured; the relay will start without backends");
        }
        Ok(Self { config, endpoints, mappings, rules: RuleManager::new(firewall), state: LifecycleState::Idle })
    }

    pub fn state(&self) -> LifecycleState {
        self.state
    }

    pub fn mappings(&self) -> &[PortMapping] {
        &self.mappings
    }

    pub fn endpoints(&self) -> &EndpointSet {
        &self.endpoints
    }

    pub fn firewall(&self) -> &F {
        self.rules.firewall()
    }

    fn advance(&mut self, next: LifecycleState) {
        debug!("Lifecycle: {:?} -> {:?}", self.state, next);
        self.state = next;
    }

    fn dest_port_rules(&self, mapping: &PortMapping) -> [DestPortRule; 2] {
        DestPortRule::pair_for(mapping, self.config.get_destination(), self.config.get_bridge_interface())
    }

    /// Write the relay config. The returned token is what allows the relay to be spawned.
    pub async fn configure(&mut self) -> Result<WrittenRelayConfig> {
        let relay_config = RelayConfig::new(self.config.get_relay_log().clone(), &self.endpoints);
        let written = relay_config.write_to(self.config.get_relay_config_path()).await?;
        self.advance(LifecycleState::Configuring);
        Ok(written)
    }

    /// Create a chain per configured class, then the OUTPUT/PREROUTING pair for every mapping.
    /// The first failure is returned as is; whatever was installed before it stays installed.
    pub async fn install_rules(&mut self) -> Result<()> {
        for class in ProtocolClass::ALL {
            if self.endpoints.is_configured(class) {
                self.rules.install_chain(class, class.local_port(), SKIP_SPECS).await?;
            }
        }
        for mapping in self.mappings.clone() {
            for rule in self.dest_port_rules(&mapping) {
                self.rules.install_dest_port_rule(&rule).await?;
            }
        }
        self.advance(LifecycleState::RulesInstalled);
        Ok(())
    }

    pub fn start_relay(&mut self, config: &WrittenRelayConfig) -> Result<RelaySupervisor> {
        let relay = RelaySupervisor::spawn(self.config.get_relay_binary(), config)?;
        info!("Relay started with pid {}", relay.pid());
        self.advance(LifecycleState::Running);
        Ok(relay)
    }

    /// Remove dest-port rules in mapping order (OUTPUT before PREROUTING), then the chains in
    /// [`ProtocolClass::TEARDOWN_ORDER`]. Stops at the first failure.
    pub async fn remove_rules(&mut self) -> Result<()> {
        for mapping in self.mappings.clone() {
            for rule in self.dest_port_rules(&mapping) {
                self.rules.remove_dest_port_rule(&rule).await?;
            }
        }
        for class in ProtocolClass::TEARDOWN_ORDER {
            if self.endpoints.is_configured(class) {
                self.rules.remove_chain(class).await?;
            }
        }
        Ok(())
    }

    async fn teardown(&mut self, relay: &RelaySupervisor) -> Result<()> {
        self.advance(LifecycleState::Cleaning);
        self.remove_rules().await?;
        relay.terminate()
    }

    /// Relay output until the relay's output stream ends. Always ends in an error: the relay is
    /// expected to run forever, so losing it is fatal even when it was asked to stop.
    ///
    /// Without an interrupt, the end of the stream is itself the failure: the rules are removed and
    /// the relay is reaped, killing it if it only closed its output.
    pub async fn supervise(&mut self, relay: &mut RelaySupervisor, shutdown: impl Future<Output = ()>) -> Result<()> {
        let mut shutdown = std::pin::pin!(shutdown);
        let mut cancelled = false;

        loop {
            let event = tokio::select! {
                line = relay.next_line() => Event::Line(line),
                _ = &mut shutdown, if !cancelled => Event::Shutdown,
            };
            match event {
                Event::Line(Some(line)) => relay.emit(&line),
                Event::Line(None) => break,
                Event::Shutdown => {
                    cancelled = true;
                    self.teardown(relay).await?;
                }
            }
        }

        let status = if cancelled {
            relay.wait().await?
        } else {
            error!("Relay output closed unexpectedly, removing redirection rules");
            self.advance(LifecycleState::Cleaning);
            self.remove_rules().await?;
            relay.force_stop().await?
        };
        self.advance(LifecycleState::Terminated);
        Err(GatewayError::UnexpectedTermination(format!("relay exited with {}", status)))
    }

    /// Run the whole lifecycle. Like [`Gateway::supervise`], this only returns with an error.
    pub async fn run(mut self, shutdown: impl Future<Output = ()>) -> Result<()> {
        info!("Configuring gateway: {} backend(s), {} port mapping(s)", self.endpoints.configured().count(), self.mappings.len());
        let written = self.configure().await?;
        self.install_rules().await?;
        let mut relay = self.start_relay(&written)?;
        self.supervise(&mut relay, shutdown).await
    }
}
