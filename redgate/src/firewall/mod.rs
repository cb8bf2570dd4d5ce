// Firewall module
//
// - command: the external NAT-table command interface and its iptables implementation
// - rules: chain and destination-port rule management on top of it

pub mod command;
pub mod rules;

#[cfg(test)]
pub(crate) mod testing;

pub use command::{CommandOutcome, Firewall, FirewallCommand, Iptables, Verb};
pub use rules::{DestPortRule, Hook, RuleManager};
