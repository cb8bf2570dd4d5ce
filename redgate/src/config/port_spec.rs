use crate::config::types::ProtocolClass;
use crate::error::{GatewayError, Result};
use crate::utils::validation::parse_port;
use std::fmt::Display;

/// One `port:TYPE` entry. List order is firewall rule precedence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PortMapping {
    pub port: u16,
    pub class: ProtocolClass,
}

impl Display for PortMapping {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.port, self.class)
    }
}

/// Parse a comma-separated `port:TYPE` list, stopping at the first invalid token.
///
/// An empty (or whitespace-only) spec yields no mappings. Duplicate ports are kept as given.
pub fn parse_port_spec(spec: &str) -> Result<Vec<PortMapping>> {
    if spec.trim().is_empty() {
        return Ok(Vec::new());
    }
    spec.split(',').map(parse_token).collect()
}

fn parse_token(token: &str) -> Result<PortMapping> {
    let invalid = |reason: String| GatewayError::InvalidPortSpec { token: token.to_string(), reason };

    let (port, tag) = token.split_once(':').ok_or_else(|| invalid("expected PORT:TYPE".to_string()))?;
    let port = parse_port(port).map_err(invalid)?;
    let class = tag.parse::<ProtocolClass>().map_err(invalid)?;
    Ok(PortMapping { port, class })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mapping(port: u16, class: ProtocolClass) -> PortMapping {
        PortMapping { port, class }
    }

    #[test]
    fn test_parse_single_entry() {
        assert_eq!(parse_port_spec("80:HTTP").unwrap(), vec![mapping(80, ProtocolClass::HttpRelay)]);
    }

    #[test]
    fn test_parse_preserves_order_and_duplicates() {
        let parsed = parse_port_spec("443:SOCKS5,80:HTTP,8443:CONNECT,25:SOCKS4,443:SOCKS5").unwrap();
        assert_eq!(
            parsed,
            vec![
                mapping(443, ProtocolClass::Socks5),
                mapping(80, ProtocolClass::HttpRelay),
                mapping(8443, ProtocolClass::HttpConnect),
                mapping(25, ProtocolClass::Socks4),
                mapping(443, ProtocolClass::Socks5),
            ]
        );
    }

    #[test]
    fn test_parse_empty_spec() {
        assert!(parse_port_spec("").unwrap().is_empty());
        assert!(parse_port_spec("  ").unwrap().is_empty());
    }

    #[test]
    fn test_non_numeric_port_names_token() {
        match parse_port_spec("abc:HTTP") {
            Err(GatewayError::InvalidPortSpec { token, .. }) => assert_eq!(token, "abc:HTTP"),
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_first_invalid_token_is_reported() {
        match parse_port_spec("80:HTTP,81:http,abc:SOCKS9") {
            Err(GatewayError::InvalidPortSpec { token, .. }) => assert_eq!(token, "81:http"),
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_rejects_malformed_tokens() {
        for spec in ["80", "80:", ":HTTP", "80:HTTP:1", "-80:HTTP", " 80:HTTP", "80:HTTP,", "0:HTTP", "70000:SOCKS5"] {
            assert!(parse_port_spec(spec).is_err(), "expected '{}' to be rejected", spec);
        }
    }

    #[test]
    fn test_display_round_trips_token() {
        assert_eq!(mapping(8080, ProtocolClass::Socks5).to_string(), "8080:SOCKS5");
    }
}
