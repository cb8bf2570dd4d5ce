// Configuration module
//
// This module contains all configuration-related functionality split into focused submodules:
// - types: Core configuration structures and protocol classes
// - loader: Optional JSON settings file loading
// - port_spec: PORT:TYPE mapping parser
// - endpoint: Proxy URL resolution

pub mod endpoint;
pub mod loader;
pub mod port_spec;
pub mod types;

pub use endpoint::resolve_endpoint;
pub use port_spec::{PortMapping, parse_port_spec};
pub use types::{EndpointSet, GatewayConfig, GatewayPatch, ProtocolClass, ProxyEndpoint, RelayLogTarget};
