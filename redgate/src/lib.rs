// redgate
//
// Transparent TCP gateway: redirects outbound and bridged traffic for selected destination ports
// through a local relay daemon that forwards it to upstream HTTP/SOCKS proxies.
// - config: settings, port spec parsing and proxy endpoint resolution
// - firewall: NAT table commands and redirection rule management
// - relay: relay daemon configuration and process supervision
// - lifecycle: setup, supervision and teardown of the whole gateway

pub mod config;
pub mod error;
pub mod firewall;
pub mod lifecycle;
pub mod relay;
pub mod utils;

pub use config::{GatewayConfig, GatewayPatch, ProtocolClass, RelayLogTarget};
pub use error::{GatewayError, Result};
pub use firewall::Iptables;
pub use lifecycle::{Gateway, LifecycleState, ShutdownSignal};
