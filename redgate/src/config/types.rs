use crate::error::{GatewayError, Result};
use log::warn;
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt::Display;
use std::path::PathBuf;
use std::str::FromStr;

pub const DEFAULT_RELAY_CONFIG_PATH: &str = "/tmp/redgate-relay.conf";
pub const DEFAULT_RELAY_BINARY: &str = "redsocks";
pub const DEFAULT_FIREWALL_BINARY: &str = "iptables";
pub const DEFAULT_BRIDGE_INTERFACE: &str = "docker0";
pub const DEFAULT_DESTINATION: &str = "0.0.0.0/0";

/// Address ranges that are never redirected, so that traffic to the upstream proxies
/// (and to local or link-scoped peers) leaves the host untouched.
pub const SKIP_SPECS: &[&str] = &[
    "0.0.0.0/8",
    "10.0.0.0/8",
    "100.64.0.0/10",
    "127.0.0.0/8",
    "169.254.0.0/16",
    "172.16.0.0/12",
    "192.168.0.0/16",
    "198.18.0.0/15",
    "224.0.0.0/4",
    "240.0.0.0/4",
];

/// The upstream proxy flavours the relay can speak. Each one gets its own relay listener,
/// local port and NAT chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ProtocolClass {
    #[serde(rename = "HTTP")]
    HttpRelay,
    #[serde(rename = "CONNECT")]
    HttpConnect,
    #[serde(rename = "SOCKS4")]
    Socks4,
    #[serde(rename = "SOCKS5")]
    Socks5,
}

impl ProtocolClass {
    /// Installation and relay-section order.
    pub const ALL: [ProtocolClass; 4] =
        [ProtocolClass::HttpRelay, ProtocolClass::HttpConnect, ProtocolClass::Socks4, ProtocolClass::Socks5];

    /// Chains are always removed in this order, whatever order they were configured in.
    pub const TEARDOWN_ORDER: [ProtocolClass; 4] =
        [ProtocolClass::HttpConnect, ProtocolClass::HttpRelay, ProtocolClass::Socks4, ProtocolClass::Socks5];

    /// Tag used in port specs (e.g. `80:HTTP`)
    pub fn tag(self) -> &'static str {
        match self {
            ProtocolClass::HttpRelay => "HTTP",
            ProtocolClass::HttpConnect => "CONNECT",
            ProtocolClass::Socks4 => "SOCKS4",
            ProtocolClass::Socks5 => "SOCKS5",
        }
    }

    /// Value of the relay's `type` setting
    pub fn relay_type(self) -> &'static str {
        match self {
            ProtocolClass::HttpRelay => "http-relay",
            ProtocolClass::HttpConnect => "http-connect",
            ProtocolClass::Socks4 => "socks4",
            ProtocolClass::Socks5 => "socks5",
        }
    }

    /// Fixed local port the relay listens on for this class
    pub fn local_port(self) -> u16 {
        match self {
            ProtocolClass::HttpRelay => 12345,
            ProtocolClass::HttpConnect => 12346,
            ProtocolClass::Socks4 => 12347,
            ProtocolClass::Socks5 => 12348,
        }
    }

    pub fn chain_name(self) -> &'static str {
        match self {
            ProtocolClass::HttpRelay => "REDGATE_HTTP",
            ProtocolClass::HttpConnect => "REDGATE_CONNECT",
            ProtocolClass::Socks4 => "REDGATE_SOCKS4",
            ProtocolClass::Socks5 => "REDGATE_SOCKS5",
        }
    }

    fn index(self) -> usize {
        match self {
            ProtocolClass::HttpRelay => 0,
            ProtocolClass::HttpConnect => 1,
            ProtocolClass::Socks4 => 2,
            ProtocolClass::Socks5 => 3,
        }
    }
}

impl FromStr for ProtocolClass {
    type Err = String;

    // Exact, case-sensitive match only.
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        ProtocolClass::ALL
            .into_iter()
            .find(|class| class.tag() == s)
            .ok_or_else(|| format!("unknown proxy type '{}', expected HTTP, CONNECT, SOCKS4 or SOCKS5", s))
    }
}

impl Display for ProtocolClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.tag())
    }
}

/// A configured upstream proxy. Unconfigured classes are simply absent from an [`EndpointSet`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProxyEndpoint {
    pub class: ProtocolClass,
    pub host: String,
    pub port: u16,
}

impl ProxyEndpoint {
    /// Returns `None` unless the host is non-empty and the port is in 1..=65535
    pub fn new(class: ProtocolClass, host: impl Into<String>, port: u16) -> Option<Self> {
        let host = host.into();
        if host.is_empty() || port == 0 {
            return None;
        }
        Some(Self { class, host, port })
    }
}

/// At most one endpoint per protocol class.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EndpointSet {
    slots: [Option<ProxyEndpoint>; 4],
}

impl EndpointSet {
    pub fn insert(&mut self, endpoint: ProxyEndpoint) {
        let index = endpoint.class.index();
        self.slots[index] = Some(endpoint);
    }

    pub fn get(&self, class: ProtocolClass) -> Option<&ProxyEndpoint> {
        self.slots[class.index()].as_ref()
    }

    pub fn is_configured(&self, class: ProtocolClass) -> bool {
        self.get(class).is_some()
    }

    /// Configured endpoints in [`ProtocolClass::ALL`] order
    pub fn configured(&self) -> impl Iterator<Item = &ProxyEndpoint> {
        self.slots.iter().flatten()
    }

    pub fn is_empty(&self) -> bool {
        self.configured().next().is_none()
    }
}

/// Where the relay daemon sends its own log output.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum RelayLogTarget {
    #[default]
    Stderr,
    File(String),
    Syslog(String),
}

impl FromStr for RelayLogTarget {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        if s == "stderr" {
            return Ok(RelayLogTarget::Stderr);
        }
        if let Some(path) = s.strip_prefix("file:") {
            if !path.is_empty() {
                return Ok(RelayLogTarget::File(path.to_string()));
            }
        }
        if let Some(facility) = s.strip_prefix("syslog:") {
            if !facility.is_empty() {
                return Ok(RelayLogTarget::Syslog(facility.to_string()));
            }
        }
        Err(format!("invalid relay log target '{}', expected stderr, file:PATH or syslog:FACILITY", s))
    }
}

impl TryFrom<String> for RelayLogTarget {
    type Error = String;

    fn try_from(value: String) -> std::result::Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<RelayLogTarget> for String {
    fn from(value: RelayLogTarget) -> Self {
        value.to_string()
    }
}

impl Display for RelayLogTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RelayLogTarget::Stderr => f.write_str("stderr"),
            RelayLogTarget::File(path) => write!(f, "file:{}", path),
            RelayLogTarget::Syslog(facility) => write!(f, "syslog:{}", facility),
        }
    }
}

/// Gateway settings, assembled once at startup from the optional JSON file and the
/// command line. Nothing mutates it after the lifecycle starts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(deserialize_with = "string_or_default", default)]
    pub(crate) http_proxy: String,
    #[serde(deserialize_with = "string_or_default", default)]
    pub(crate) connect_proxy: String,
    #[serde(deserialize_with = "string_or_default", default)]
    pub(crate) socks4_proxy: String,
    #[serde(deserialize_with = "string_or_default", default)]
    pub(crate) socks5_proxy: String,
    #[serde(deserialize_with = "string_or_default", default)]
    pub(crate) port_spec: String,
    #[serde(default)]
    pub(crate) relay_log: RelayLogTarget,
    #[serde(deserialize_with = "string_or_default", default = "default_bridge_interface")]
    pub(crate) bridge_interface: String,
    #[serde(deserialize_with = "string_or_default", default = "default_destination")]
    pub(crate) destination: String,
    #[serde(default = "default_relay_config_path")]
    pub(crate) relay_config_path: PathBuf,
    #[serde(deserialize_with = "string_or_default", default = "default_relay_binary")]
    pub(crate) relay_binary: String,
    #[serde(deserialize_with = "string_or_default", default = "default_firewall_binary")]
    pub(crate) firewall_binary: String,
}

/// Partial settings; only provided values are applied.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GatewayPatch {
    pub http_proxy: Option<String>,
    pub connect_proxy: Option<String>,
    pub socks4_proxy: Option<String>,
    pub socks5_proxy: Option<String>,
    pub port_spec: Option<String>,
    pub relay_log: Option<RelayLogTarget>,
    pub bridge_interface: Option<String>,
    pub relay_config_path: Option<PathBuf>,
    pub relay_binary: Option<String>,
    pub firewall_binary: Option<String>,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            http_proxy: String::new(),
            connect_proxy: String::new(),
            socks4_proxy: String::new(),
            socks5_proxy: String::new(),
            port_spec: String::new(),
            relay_log: RelayLogTarget::Stderr,
            bridge_interface: default_bridge_interface(),
            destination: default_destination(),
            relay_config_path: default_relay_config_path(),
            relay_binary: default_relay_binary(),
            firewall_binary: default_firewall_binary(),
        }
    }
}

impl GatewayConfig {
    pub fn apply_patch(&mut self, patch: GatewayPatch) {
        if let Some(url) = patch.http_proxy {
            self.http_proxy = url;
        }
        if let Some(url) = patch.connect_proxy {
            self.connect_proxy = url;
        }
        if let Some(url) = patch.socks4_proxy {
            self.socks4_proxy = url;
        }
        if let Some(url) = patch.socks5_proxy {
            self.socks5_proxy = url;
        }
        if let Some(spec) = patch.port_spec {
            self.port_spec = spec;
        }
        if let Some(target) = patch.relay_log {
            self.relay_log = target;
        }
        if let Some(iface) = patch.bridge_interface {
            self.bridge_interface = iface;
        }
        if let Some(path) = patch.relay_config_path {
            self.relay_config_path = path;
        }
        if let Some(binary) = patch.relay_binary {
            self.relay_binary = binary;
        }
        if let Some(binary) = patch.firewall_binary {
            self.firewall_binary = binary;
        }
    }

    /// Raw proxy URL for a protocol class, as given by the user
    pub fn proxy_url(&self, class: ProtocolClass) -> &str {
        match class {
            ProtocolClass::HttpRelay => &self.http_proxy,
            ProtocolClass::HttpConnect => &self.connect_proxy,
            ProtocolClass::Socks4 => &self.socks4_proxy,
            ProtocolClass::Socks5 => &self.socks5_proxy,
        }
    }

    /// True if at least one proxy URL was supplied, well-formed or not
    pub fn has_any_proxy(&self) -> bool {
        ProtocolClass::ALL.into_iter().any(|class| !self.proxy_url(class).trim().is_empty())
    }

    pub fn get_port_spec(&self) -> &str {
        &self.port_spec
    }
    pub fn get_relay_log(&self) -> &RelayLogTarget {
        &self.relay_log
    }
    pub fn get_bridge_interface(&self) -> &str {
        &self.bridge_interface
    }
    pub fn get_destination(&self) -> &str {
        &self.destination
    }
    pub fn get_relay_config_path(&self) -> &PathBuf {
        &self.relay_config_path
    }
    pub fn get_relay_binary(&self) -> &str {
        &self.relay_binary
    }
    pub fn get_firewall_binary(&self) -> &str {
        &self.firewall_binary
    }

    /// Reject settings that would only fail later, halfway through firewall setup
    pub fn validate(&self) -> Result<()> {
        use crate::utils::validation::{is_empty_or_whitespace, validate_interface_name};

        if !validate_interface_name(&self.bridge_interface) {
            return Err(GatewayError::Config(format!("invalid bridge interface '{}'", self.bridge_interface)));
        }
        if is_empty_or_whitespace(&self.relay_binary) {
            return Err(GatewayError::Config("relay binary must not be empty".to_string()));
        }
        if is_empty_or_whitespace(&self.firewall_binary) {
            return Err(GatewayError::Config("firewall binary must not be empty".to_string()));
        }
        if self.relay_config_path.as_os_str().is_empty() {
            return Err(GatewayError::Config("relay config path must not be empty".to_string()));
        }
        Ok(())
    }
}

impl Display for GatewayConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let json = serde_json::to_string_pretty(self).map_err(|_| std::fmt::Error)?;
        writeln!(f, "{}", json)
    }
}

fn string_or_default<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match String::deserialize(deserializer) {
        Ok(s) => Ok(s),
        Err(e) => {
            warn!("Failed to deserialize string value: {}, using default", e);
            Ok(String::default())
        }
    }
}

fn default_bridge_interface() -> String {
    DEFAULT_BRIDGE_INTERFACE.to_string()
}
fn default_destination() -> String {
    DEFAULT_DESTINATION.to_string()
}
fn default_relay_config_path() -> PathBuf {
    PathBuf::from(DEFAULT_RELAY_CONFIG_PATH)
}
fn default_relay_binary() -> String {
    DEFAULT_RELAY_BINARY.to_string()
}
fn default_firewall_binary() -> String {
    DEFAULT_FIREWALL_BINARY.to_string()
}
