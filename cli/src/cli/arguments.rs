use clap::error::ErrorKind;
use clap::{CommandFactory, Parser};
use redgate::config::{GatewayConfig, GatewayPatch, RelayLogTarget};
use std::path::PathBuf;

#[derive(Parser, Debug, Clone)]
#[command(
    name = "redgate",
    about = "Transparent TCP gateway: redirects selected ports through upstream HTTP/SOCKS proxies",
    author,
    version,
    long_about = "Redirects locally originated and bridged TCP traffic for the ports listed in --port_spec \
through a supervised relay daemon, which forwards it to the configured upstream proxies. The NAT rules \
are removed again on SIGINT or SIGTERM."
)]
pub struct RedgateArguments {
    #[arg(long = "http_proxy", value_name = "URL", help = "Upstream proxy for plain HTTP relaying, e.g. http://10.0.0.5:3128")]
    pub(crate) http_proxy: Option<String>,
    #[arg(long = "connect_proxy", alias = "https_proxy", value_name = "URL", help = "Upstream proxy used through HTTP CONNECT")]
    pub(crate) connect_proxy: Option<String>,
    #[arg(long = "socks4_proxy", value_name = "URL", help = "Upstream SOCKS4 proxy")]
    pub(crate) socks4_proxy: Option<String>,
    #[arg(long = "socks5_proxy", value_name = "URL", help = "Upstream SOCKS5 proxy")]
    pub(crate) socks5_proxy: Option<String>,
    #[arg(long = "port_spec", value_name = "PORT:TYPE,...", help = "Ports to redirect and the proxy type for each (HTTP, CONNECT, SOCKS4, SOCKS5)")]
    pub(crate) port_spec: Option<String>,
    #[arg(long = "rs_log", value_name = "TARGET", help = "Relay log target: stderr, file:PATH or syslog:FACILITY")]
    pub(crate) rs_log: Option<RelayLogTarget>,
    #[arg(short = 'c', long = "config", value_name = "PATH", help = "Optional JSON settings file; flags override its values")]
    pub(crate) config_path: Option<PathBuf>,
    #[arg(long = "bridge_interface", value_name = "IFACE", help = "Interface forwarded traffic arrives on [default: docker0]")]
    pub(crate) bridge_interface: Option<String>,
    #[arg(long = "relay_config", value_name = "PATH", help = "Where to write the relay configuration [default: /tmp/redgate-relay.conf]")]
    pub(crate) relay_config: Option<PathBuf>,
    #[arg(long = "relay_binary", value_name = "PATH", help = "Relay daemon executable [default: redsocks]")]
    pub(crate) relay_binary: Option<String>,
    #[arg(long = "firewall_binary", value_name = "PATH", help = "Firewall command [default: iptables]")]
    pub(crate) firewall_binary: Option<String>,
    #[arg(short = 'v', long = "verbose", help = "Enable verbose logging")]
    pub(crate) verbose: bool,
    #[arg(long = "man", help = "Print the full manual and exit")]
    pub(crate) man: bool,
}

impl From<&RedgateArguments> for GatewayPatch {
    fn from(args: &RedgateArguments) -> Self {
        GatewayPatch {
            http_proxy: args.http_proxy.clone(),
            connect_proxy: args.connect_proxy.clone(),
            socks4_proxy: args.socks4_proxy.clone(),
            socks5_proxy: args.socks5_proxy.clone(),
            port_spec: args.port_spec.clone(),
            relay_log: args.rs_log.clone(),
            bridge_interface: args.bridge_interface.clone(),
            relay_config_path: args.relay_config.clone(),
            relay_binary: args.relay_binary.clone(),
            firewall_binary: args.firewall_binary.clone(),
        }
    }
}

impl RedgateArguments {
    /// Usage error unless the effective settings name at least one upstream proxy
    pub fn ensure_proxy_configured(config: &GatewayConfig) -> Result<(), clap::Error> {
        if config.has_any_proxy() {
            return Ok(());
        }
        Err(Self::command().error(
            ErrorKind::MissingRequiredArgument,
            "at least one of --http_proxy, --connect_proxy, --socks4_proxy or --socks5_proxy is required",
        ))
    }
}
