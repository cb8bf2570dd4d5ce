//! In-memory NAT table used by the tests. It records every command and rejects the same
//! mutations the kernel would (duplicate chains, deleting referenced or non-empty chains,
//! deleting rules that do not exist, jumping to missing chains).

use crate::error::Result;
use crate::firewall::command::{CommandOutcome, Firewall, FirewallCommand, Verb};
use std::collections::BTreeMap;

const BUILTIN_CHAINS: &[&str] = &["PREROUTING", "INPUT", "OUTPUT", "POSTROUTING"];
const BUILTIN_TARGETS: &[&str] = &["RETURN", "REDIRECT", "ACCEPT", "DNAT", "MASQUERADE"];

#[derive(Debug, Default)]
pub(crate) struct RecordingFirewall {
    pub(crate) commands: Vec<FirewallCommand>,
    chains: BTreeMap<String, Vec<Vec<String>>>,
    fail_at: Option<usize>,
}

impl RecordingFirewall {
    pub(crate) fn new() -> Self {
        let mut firewall = Self::default();
        for chain in BUILTIN_CHAINS {
            firewall.chains.insert(chain.to_string(), Vec::new());
        }
        firewall
    }

    /// Make the n-th command (0-based) fail with exit status 1
    pub(crate) fn failing_at(index: usize) -> Self {
        Self { fail_at: Some(index), ..Self::new() }
    }

    pub(crate) fn has_chain(&self, name: &str) -> bool {
        self.chains.contains_key(name)
    }

    pub(crate) fn rules(&self, chain: &str) -> Vec<Vec<String>> {
        self.chains.get(chain).cloned().unwrap_or_default()
    }

    /// True once every user chain and every rule in the built-in chains is gone
    pub(crate) fn is_clean(&self) -> bool {
        self.chains.iter().all(|(name, rules)| BUILTIN_CHAINS.contains(&name.as_str()) && rules.is_empty())
    }

    pub(crate) fn command_lines(&self) -> Vec<String> {
        self.commands.iter().map(|c| c.to_string()).collect()
    }

    fn apply(&mut self, command: &FirewallCommand) -> std::result::Result<(), String> {
        let chain = command.chain.as_str();
        match command.verb {
            Verb::NewChain => {
                if self.chains.contains_key(chain) {
                    return Err("Chain already exists.".to_string());
                }
                self.chains.insert(chain.to_string(), Vec::new());
            }
            Verb::AppendRule => {
                if let Some(target) = jump_target(&command.rule) {
                    if !BUILTIN_TARGETS.contains(&target) && !self.chains.contains_key(target) {
                        return Err(format!("Couldn't load target `{}'", target));
                    }
                }
                let rules = self.chains.get_mut(chain).ok_or("No chain/target/match by that name.")?;
                rules.push(command.rule.clone());
            }
            Verb::DeleteRule => {
                let rules = self.chains.get_mut(chain).ok_or("No chain/target/match by that name.")?;
                let position = rules
                    .iter()
                    .position(|rule| *rule == command.rule)
                    .ok_or("Bad rule (does a matching rule exist in that chain?).")?;
                rules.remove(position);
            }
            Verb::FlushChain => {
                let rules = self.chains.get_mut(chain).ok_or("No chain/target/match by that name.")?;
                rules.clear();
            }
            Verb::DeleteChain => {
                let referenced = self.chains.values().flatten().any(|rule| jump_target(rule) == Some(chain));
                if referenced {
                    return Err("Too many links.".to_string());
                }
                match self.chains.get(chain) {
                    None => return Err("No chain/target/match by that name.".to_string()),
                    Some(rules) if !rules.is_empty() => return Err("Directory not empty.".to_string()),
                    Some(_) => {}
                }
                self.chains.remove(chain);
            }
        }
        Ok(())
    }
}

fn jump_target(rule: &[String]) -> Option<&str> {
    rule.iter().position(|arg| arg == "-j").and_then(|i| rule.get(i + 1)).map(String::as_str)
}

impl Firewall for RecordingFirewall {
    fn program(&self) -> &str {
        "iptables"
    }

    async fn execute(&mut self, command: &FirewallCommand) -> Result<CommandOutcome> {
        let index = self.commands.len();
        self.commands.push(command.clone());
        if self.fail_at == Some(index) {
            return Ok(CommandOutcome { status: Some(1), output: "simulated failure".to_string() });
        }
        Ok(match self.apply(command) {
            Ok(()) => CommandOutcome { status: Some(0), output: String::new() },
            Err(message) => CommandOutcome { status: Some(1), output: format!("iptables: {}", message) },
        })
    }
}
