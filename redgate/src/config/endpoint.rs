use crate::config::types::{EndpointSet, GatewayConfig, ProtocolClass, ProxyEndpoint};
use crate::error::{GatewayError, Result};
use crate::utils::validation::{is_empty_or_whitespace, parse_port};
use log::{debug, warn};
use regex::Regex;
use std::sync::OnceLock;

static PROXY_URL: OnceLock<Regex> = OnceLock::new();

// [scheme://]host:port[/path][?query]; applied to the lower-cased input.
fn proxy_url_regex() -> &'static Regex {
    PROXY_URL.get_or_init(|| {
        Regex::new(r"^(?:[a-z][a-z0-9+.-]*://)?([a-z0-9.-]+):([0-9]+)(?:[/?#].*)?$")
            .unwrap_or_else(|e| unreachable!("proxy URL pattern is valid: {}", e))
    })
}

/// Resolve a proxy URL into a lower-cased host and a port.
///
/// Empty input means "not configured" and yields `Ok(None)`. Anything else that does not look like
/// `[scheme://]host:port` is a [`GatewayError::MalformedUrl`], which callers treat as a warning.
pub fn resolve_endpoint(url: &str) -> Result<Option<(String, u16)>> {
    if is_empty_or_whitespace(url) {
        return Ok(None);
    }
    let lowered = url.trim().to_lowercase();
    let captures = proxy_url_regex().captures(&lowered).ok_or_else(|| GatewayError::MalformedUrl(url.to_string()))?;
    let host = captures[1].to_string();
    let port = parse_port(&captures[2]).map_err(|e| GatewayError::MalformedUrl(format!("{} ({})", url, e)))?;
    Ok(Some((host, port)))
}

impl GatewayConfig {
    /// Resolve every proxy URL. Malformed URLs are logged and leave their class unconfigured.
    pub fn endpoints(&self) -> EndpointSet {
        let mut set = EndpointSet::default();
        for class in ProtocolClass::ALL {
            match resolve_endpoint(self.proxy_url(class)) {
                Ok(Some((host, port))) => {
                    debug!("{} proxy resolved to {}:{}", class, host, port);
                    if let Some(endpoint) = ProxyEndpoint::new(class, host, port) {
                        set.insert(endpoint);
                    }
                }
                Ok(None) => {}
                Err(e) => warn!("Ignoring {} proxy: {}", class, e),
            }
        }
        set
    }
}
