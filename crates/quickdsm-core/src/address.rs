use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

/// Strip one pair of surrounding brackets, as found in URL host syntax.
fn unbracket(address: &str) -> &str {
    address
        .strip_prefix('[')
        .and_then(|a| a.strip_suffix(']'))
        .unwrap_or(address)
}

fn parse_v4(address: &str) -> Option<Ipv4Addr> {
    address.parse().ok()
}

fn parse_v6(address: &str) -> Option<Ipv6Addr> {
    unbracket(address).parse().ok()
}

pub fn is_ipv4(address: &str) -> bool {
    parse_v4(address).is_some()
}

pub fn is_ipv6(address: &str) -> bool {
    parse_v6(address).is_some()
}

/// Loopback check covering 127.0.0.0/8 and `::1`.
pub fn is_loopback(address: &str) -> bool {
    match unbracket(address).parse::<IpAddr>() {
        Ok(ip) => ip.is_loopback(),
        Err(_) => false,
    }
}

/// Whether the address belongs to a range that is only reachable from the
/// local network: RFC 1918, IPv4 link-local, IPv6 unique-local and link-local.
pub fn is_private(address: &str) -> bool {
    if let Some(v4) = parse_v4(address) {
        return v4.is_private() || v4.is_link_local();
    }
    if let Some(v6) = parse_v6(address) {
        let first = v6.segments()[0];
        // fc00::/7 unique-local, fe80::/10 link-local
        return (first & 0xfe00) == 0xfc00 || (first & 0xffc0) == 0xfe80;
    }
    false
}

/// Format a hostname for embedding in a URL authority.
/// IPv6 literals get wrapped in brackets; everything else passes through.
pub fn format_host(address: &str) -> String {
    if address.starts_with('[') {
        return address.to_string();
    }
    if parse_v6(address).is_some() {
        format!("[{}]", address)
    } else {
        address.to_string()
    }
}
