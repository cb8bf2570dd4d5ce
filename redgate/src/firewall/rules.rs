use crate::config::{PortMapping, ProtocolClass};
use crate::error::{GatewayError, Result};
use crate::firewall::command::{Firewall, FirewallCommand, Verb};
use log::{debug, info};

/// NAT hook a destination-port rule is attached to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Hook {
    /// Connections originated by this host
    Output,
    /// Connections forwarded through this host from a peer
    Prerouting,
}

impl Hook {
    pub fn chain(self) -> &'static str {
        match self {
            Hook::Output => "OUTPUT",
            Hook::Prerouting => "PREROUTING",
        }
    }
}

/// Sends TCP traffic for one destination port into a protocol class chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DestPortRule {
    pub destination: String,
    pub port: u16,
    pub class: ProtocolClass,
    pub hook: Hook,
    interface: Option<String>,
}

impl DestPortRule {
    /// The interface only applies to PREROUTING rules; it is dropped for OUTPUT.
    pub fn new(destination: &str, port: u16, class: ProtocolClass, hook: Hook, interface: Option<&str>) -> Self {
        let interface = match hook {
            Hook::Prerouting => interface.map(str::to_string),
            Hook::Output => None,
        };
        Self { destination: destination.to_string(), port, class, hook, interface }
    }

    /// The OUTPUT and PREROUTING rule pair installed for every mapping, in installation order
    pub fn pair_for(mapping: &PortMapping, destination: &str, bridge_interface: &str) -> [DestPortRule; 2] {
        [
            DestPortRule::new(destination, mapping.port, mapping.class, Hook::Output, None),
            DestPortRule::new(destination, mapping.port, mapping.class, Hook::Prerouting, Some(bridge_interface)),
        ]
    }

    pub fn interface(&self) -> Option<&str> {
        self.interface.as_deref()
    }

    fn rule_spec(&self) -> Vec<String> {
        let mut spec = Vec::new();
        if let Some(interface) = &self.interface {
            spec.extend(["-i".to_string(), interface.clone()]);
        }
        spec.extend([
            "-d".to_string(),
            self.destination.clone(),
            "-p".to_string(),
            "tcp".to_string(),
            "--dport".to_string(),
            self.port.to_string(),
            "-j".to_string(),
            self.class.chain_name().to_string(),
        ]);
        spec
    }
}

/// Owns every mutation of the NAT table. Commands are issued one at a time and the first
/// failure aborts the current operation; nothing already installed is rolled back.
pub struct RuleManager<F: Firewall> {
    firewall: F,
}

impl<F: Firewall> RuleManager<F> {
    pub fn new(firewall: F) -> Self {
        Self { firewall }
    }

    pub fn firewall(&self) -> &F {
        &self.firewall
    }

    async fn run(&mut self, command: FirewallCommand) -> Result<()> {
        debug!("{} {}", self.firewall.program(), command);
        let outcome = self.firewall.execute(&command).await?;
        if !outcome.success() {
            return Err(GatewayError::ExternalCommand {
                command: format!("{} {}", self.firewall.program(), command),
                code: outcome.status,
                output: outcome.output,
            });
        }
        Ok(())
    }

    /// Create the class chain: one RETURN per skip spec, then a redirect to the relay's local port
    pub async fn install_chain(&mut self, class: ProtocolClass, local_port: u16, skip_specs: &[&str]) -> Result<()> {
        let chain = class.chain_name();
        info!("Creating chain {} -> local port {}", chain, local_port);
        self.run(FirewallCommand::new(Verb::NewChain, chain)).await?;
        for spec in skip_specs {
            self.run(FirewallCommand::with_rule(Verb::AppendRule, chain, ["-d", *spec, "-j", "RETURN"])).await?;
        }
        let port = local_port.to_string();
        self.run(FirewallCommand::with_rule(
            Verb::AppendRule,
            chain,
            ["-p", "tcp", "-j", "REDIRECT", "--to-ports", port.as_str()],
        ))
        .await
    }

    /// Flush and delete the class chain. No rule may still jump to it.
    pub async fn remove_chain(&mut self, class: ProtocolClass) -> Result<()> {
        let chain = class.chain_name();
        info!("Removing chain {}", chain);
        self.run(FirewallCommand::new(Verb::FlushChain, chain)).await?;
        self.run(FirewallCommand::new(Verb::DeleteChain, chain)).await
    }

    pub async fn install_dest_port_rule(&mut self, rule: &DestPortRule) -> Result<()> {
        info!("Redirecting tcp/{} ({}) via {}", rule.port, rule.hook.chain(), rule.class.chain_name());
        self.run(FirewallCommand::with_rule(Verb::AppendRule, rule.hook.chain(), rule.rule_spec())).await
    }

    pub async fn remove_dest_port_rule(&mut self, rule: &DestPortRule) -> Result<()> {
        info!("Removing tcp/{} ({}) redirect", rule.port, rule.hook.chain());
        self.run(FirewallCommand::with_rule(Verb::DeleteRule, rule.hook.chain(), rule.rule_spec())).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::types::SKIP_SPECS;
    use crate::firewall::testing::RecordingFirewall;

    #[test]
    fn test_output_rule_never_carries_interface() {
        let rule = DestPortRule::new("0.0.0.0/0", 80, ProtocolClass::HttpRelay, Hook::Output, Some("docker0"));
        assert_eq!(rule.interface(), None);
        assert_eq!(
            rule.rule_spec().join(" "),
            "-d 0.0.0.0/0 -p tcp --dport 80 -j REDGATE_HTTP"
        );
    }

    #[test]
    fn test_prerouting_rule_is_interface_scoped() {
        let rule = DestPortRule::new("0.0.0.0/0", 443, ProtocolClass::Socks5, Hook::Prerouting, Some("docker0"));
        assert_eq!(rule.rule_spec().join(" "), "-i docker0 -d 0.0.0.0/0 -p tcp --dport 443 -j REDGATE_SOCKS5");
    }

    #[test]
    fn test_pair_for_mapping() {
        let mapping = PortMapping { port: 8080, class: ProtocolClass::HttpConnect };
        let [output, prerouting] = DestPortRule::pair_for(&mapping, "0.0.0.0/0", "br0");
        assert_eq!(output.hook, Hook::Output);
        assert_eq!(prerouting.hook, Hook::Prerouting);
        assert_eq!(prerouting.interface(), Some("br0"));
        assert_eq!(output.port, 8080);
    }

    #[tokio::test]
    async fn test_install_chain_appends_skips_then_redirect() {
        let mut manager = RuleManager::new(RecordingFirewall::new());
        manager.install_chain(ProtocolClass::HttpRelay, 12345, SKIP_SPECS).await.unwrap();

        let rules = manager.firewall().rules("REDGATE_HTTP");
        assert_eq!(rules.len(), SKIP_SPECS.len() + 1);
        for (rule, spec) in rules.iter().zip(SKIP_SPECS) {
            assert_eq!(rule.join(" "), format!("-d {} -j RETURN", spec));
        }
        assert_eq!(rules.last().unwrap().join(" "), "-p tcp -j REDIRECT --to-ports 12345");
        assert_eq!(manager.firewall().command_lines()[0], "-t nat -N REDGATE_HTTP");
    }

    #[tokio::test]
    async fn test_remove_chain_flushes_then_deletes() {
        let mut manager = RuleManager::new(RecordingFirewall::new());
        manager.install_chain(ProtocolClass::Socks4, 12347, &["10.0.0.0/8"]).await.unwrap();
        manager.remove_chain(ProtocolClass::Socks4).await.unwrap();

        let lines = manager.firewall().command_lines();
        assert_eq!(&lines[lines.len() - 2..], ["-t nat -F REDGATE_SOCKS4", "-t nat -X REDGATE_SOCKS4"]);
        assert!(manager.firewall().is_clean());
    }

    #[tokio::test]
    async fn test_chain_cannot_be_removed_while_referenced() {
        let mut manager = RuleManager::new(RecordingFirewall::new());
        manager.install_chain(ProtocolClass::HttpRelay, 12345, &[]).await.unwrap();
        let rule = DestPortRule::new("0.0.0.0/0", 80, ProtocolClass::HttpRelay, Hook::Output, None);
        manager.install_dest_port_rule(&rule).await.unwrap();

        let err = manager.remove_chain(ProtocolClass::HttpRelay).await.unwrap_err();
        assert!(matches!(err, GatewayError::ExternalCommand { code: Some(1), .. }));

        manager.remove_dest_port_rule(&rule).await.unwrap();
        manager.remove_chain(ProtocolClass::HttpRelay).await.unwrap();
        assert!(manager.firewall().is_clean());
    }

    #[tokio::test]
    async fn test_failure_stops_and_reports_command() {
        let mut manager = RuleManager::new(RecordingFirewall::failing_at(2));
        let err = manager.install_chain(ProtocolClass::HttpRelay, 12345, SKIP_SPECS).await.unwrap_err();
        match err {
            GatewayError::ExternalCommand { command, code, output } => {
                assert_eq!(command, format!("iptables -t nat -A REDGATE_HTTP -d {} -j RETURN", SKIP_SPECS[1]));
                assert_eq!(code, Some(1));
                assert_eq!(output, "simulated failure");
            }
            other => panic!("unexpected error: {:?}", other),
        }
        // Nothing after the failing command was attempted and nothing was rolled back.
        assert_eq!(manager.firewall().commands.len(), 3);
        assert!(manager.firewall().has_chain("REDGATE_HTTP"));
    }

    #[tokio::test]
    async fn test_failure_names_configured_binary() {
        let mut manager = RuleManager::new(crate::firewall::Iptables::new("false"));
        match manager.install_chain(ProtocolClass::Socks5, 12348, SKIP_SPECS).await {
            Err(GatewayError::ExternalCommand { command, code, .. }) => {
                assert_eq!(command, "false -t nat -N REDGATE_SOCKS5");
                assert_eq!(code, Some(1));
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_remove_missing_rule_fails() {
        let mut manager = RuleManager::new(RecordingFirewall::new());
        let rule = DestPortRule::new("0.0.0.0/0", 80, ProtocolClass::HttpRelay, Hook::Prerouting, Some("docker0"));
        assert!(manager.remove_dest_port_rule(&rule).await.is_err());
    }
}
