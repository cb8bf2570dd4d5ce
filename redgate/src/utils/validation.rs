//! Common validation utilities shared across modules

/// Check if a string is empty or only whitespace
pub fn is_empty_or_whitespace(s: &str) -> bool {
    s.trim().is_empty()
}

/// Check that a string is non-empty and made only of ASCII decimal digits
pub fn is_all_digits(s: &str) -> bool {
    !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit())
}

/// Parse a decimal port number and check it is in valid range (1-65535)
pub fn parse_port(s: &str) -> Result<u16, String> {
    if !is_all_digits(s) {
        return Err(format!("'{}' is not a decimal port number", s));
    }
    match s.parse::<u32>() {
        Ok(port) if (1..=65535).contains(&port) => Ok(port as u16),
        _ => Err("Port must be between 1 and 65535".to_string()),
    }
}

/// Validate a Linux network interface name (1-15 bytes, no whitespace, '/' or ':')
pub fn validate_interface_name(name: &str) -> bool {
    !name.is_empty()
        && name.len() <= 15
        && name != "."
        && name != ".."
        && name.chars().all(|c| c.is_ascii_graphic() && c != '/' && c != ':')
}
