use crate::address::{format_host, is_loopback, is_private};
use crate::quickconnect::types::{ConnectionCandidate, ConnectionType, ServerInfo, TunnelMode};

/// Sentinel the discovery service uses for "no DDNS / FQDN configured".
const NULL_HOSTNAME: &str = "NULL";
const LINK_SCOPE: &str = "link";

struct Candidates {
    list: Vec<ConnectionCandidate>,
    port: Option<u16>,
    /// External port, only when it differs from the internal one
    ext_port: Option<u16>,
}

impl Candidates {
    fn push(&mut self, kind: ConnectionType, host: &str, port: u16) {
        self.list.push(ConnectionCandidate {
            kind,
            hostname: format_host(host),
            port,
        });
    }

    fn push_service(&mut self, kind: ConnectionType, host: &str) {
        if let Some(port) = self.port {
            self.push(kind, host, port);
        }
    }

    fn push_external(&mut self, kind: ConnectionType, host: &str) {
        if let Some(ext_port) = self.ext_port {
            self.push(kind, host, ext_port);
        }
    }

    fn push_both(&mut self, kind: ConnectionType, host: &str) {
        self.push_service(kind, host);
        self.push_external(kind, host);
    }
}

/// Build the probe list for a server-info reply, most preferred route first.
///
/// Routes are grouped by [`ConnectionType`] in its declaration order; within a
/// group the order of the reply is kept. Never does I/O.
pub fn generate_candidates(info: &ServerInfo, tunnel_mode: TunnelMode) -> Vec<ConnectionCandidate> {
    let service = info.service.clone().unwrap_or_default();
    let port = service.port();
    let ext_port = service
        .ext_port()
        .filter(|ext| *ext != 0 && Some(*ext) != port);

    let mut candidates = Candidates {
        list: Vec::new(),
        port,
        ext_port,
    };

    if tunnel_mode.allows_direct() {
        if let Some(server) = &info.server {
            for interface in server.interface.iter().flatten() {
                for v6 in interface.ipv6.iter().flatten() {
                    if v6.address.is_empty() {
                        continue;
                    }
                    if v6.scope == LINK_SCOPE {
                        candidates.push_service(ConnectionType::LanIpv6, &v6.address);
                    } else {
                        candidates.push_both(ConnectionType::WanIpv6, &v6.address);
                    }
                }

                if let Some(ip) = interface.ip.as_deref().filter(|ip| !ip.is_empty()) {
                    if is_loopback(ip) {
                        continue;
                    }
                    if is_private(ip) {
                        candidates.push_service(ConnectionType::LanIpv4, ip);
                    } else {
                        candidates.push_both(ConnectionType::WanIpv4, ip);
                    }
                }
            }

            for (kind, name) in [
                (ConnectionType::Ddns, &server.ddns),
                (ConnectionType::Fqdn, &server.fqdn),
            ] {
                if let Some(name) = name.as_deref().filter(|n| !n.is_empty() && *n != NULL_HOSTNAME) {
                    candidates.push_both(kind, name);
                }
            }

            // The externally seen address is listed with the LAN routes
            if let Some(ip) = server
                .external
                .as_ref()
                .and_then(|e| e.ip.as_deref())
                .filter(|ip| !ip.is_empty())
            {
                candidates.push_both(ConnectionType::LanIpv4, ip);
            }
        }
    }

    if tunnel_mode.allows_tunnel() {
        if let (Some(relay_ip), Some(relay_port)) = (
            service.relay_ip.as_deref().filter(|ip| !ip.is_empty()),
            service.relay_port(),
        ) {
            candidates.push(ConnectionType::Tun, relay_ip, relay_port);
        }
    }

    let mut list = candidates.list;
    list.sort_by_key(|c| c.kind);
    list
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::quickconnect::types::samples::server_info_json;
    use serde_json::{json, Value};

    fn info(value: Value) -> ServerInfo {
        serde_json::from_value(value).unwrap()
    }

    fn kinds(candidates: &[ConnectionCandidate]) -> Vec<ConnectionType> {
        candidates.iter().map(|c| c.kind).collect()
    }

    fn hosts(candidates: &[ConnectionCandidate]) -> Vec<(String, u16)> {
        candidates.iter().map(|c| (c.hostname.clone(), c.port)).collect()
    }

    #[test]
    fn single_private_interface() {
        let info = info(json!({
            "server": {
                "serverID": "1",
                "interface": [{ "ip": "192.168.1.10", "ipv6": [] }]
            },
            "service": { "port": 5000, "ext_port": "5000" }
        }));

        let candidates = generate_candidates(&info, TunnelMode::Include);
        assert_eq!(
            candidates,
            vec![ConnectionCandidate {
                kind: ConnectionType::LanIpv4,
                hostname: "192.168.1.10".to_string(),
                port: 5000,
            }]
        );
    }

    #[test]
    fn external_port_only_when_distinct() {
        let same = info(json!({
            "server": { "interface": [{ "ip": "8.8.4.4" }] },
            "service": { "port": 5000, "ext_port": "5000" }
        }));
        assert_eq!(
            hosts(&generate_candidates(&same, TunnelMode::Exclude)),
            vec![("8.8.4.4".to_string(), 5000)]
        );

        let distinct = info(json!({
            "server": { "interface": [{ "ip": "8.8.4.4" }] },
            "service": { "port": 5000, "ext_port": "6000" }
        }));
        let candidates = generate_candidates(&distinct, TunnelMode::Exclude);
        assert_eq!(kinds(&candidates), vec![ConnectionType::WanIpv4, ConnectionType::WanIpv4]);
        assert_eq!(
            hosts(&candidates),
            vec![("8.8.4.4".to_string(), 5000), ("8.8.4.4".to_string(), 6000)]
        );

        let zero = info(json!({
            "server": { "interface": [{ "ip": "8.8.4.4" }] },
            "service": { "port": 5000, "ext_port": 0 }
        }));
        assert_eq!(generate_candidates(&zero, TunnelMode::Exclude).len(), 1);
    }

    #[test]
    fn lan_routes_never_get_external_port() {
        let info = info(json!({
            "server": {
                "interface": [{
                    "ip": "10.0.0.2",
                    "ipv6": [{ "address": "fe80::211:32ff:fe01:2", "scope": "link" }]
                }]
            },
            "service": { "port": 5000, "ext_port": 6000 }
        }));

        let candidates = generate_candidates(&info, TunnelMode::Exclude);
        assert_eq!(kinds(&candidates), vec![ConnectionType::LanIpv4, ConnectionType::LanIpv6]);
        assert_eq!(candidates[1].hostname, "[fe80::211:32ff:fe01:2]");
        assert!(candidates.iter().all(|c| c.port == 5000));
    }

    #[test]
    fn loopback_interfaces_are_skipped() {
        let info = info(json!({
            "server": { "interface": [{ "ip": "127.0.0.1" }, { "ip": "192.168.0.5" }] },
            "service": { "port": 5000 }
        }));
        assert_eq!(
            hosts(&generate_candidates(&info, TunnelMode::Include)),
            vec![("192.168.0.5".to_string(), 5000)]
        );
    }

    #[test]
    fn malformed_ipv6_entries_only_drop_their_own_routes() {
        let mut value = server_info_json();
        value["server"]["interface"] = json!([
            { "name": "eth0", "ip": "192.168.1.10", "ipv6": null },
            { "name": "eth1", "ip": "10.0.0.2", "ipv6": [{ "scope": "link" }] },
            { "name": "eth2", "ipv6": [{ "address": "fe80::2", "scope": "link" }] }
        ]);
        let info = info(value);
        assert!(info.is_valid());

        let candidates = generate_candidates(&info, TunnelMode::Exclude);
        assert_eq!(
            hosts(&candidates[..3]),
            vec![
                ("192.168.1.10".to_string(), 5000),
                ("10.0.0.2".to_string(), 5000),
                ("203.0.113.7".to_string(), 5000),
            ]
        );
        assert_eq!(candidates[3].hostname, "[fe80::2]");
        assert_eq!(candidates.len(), 4);
    }

    #[test]
    fn null_ddns_and_fqdn_are_skipped() {
        let mut value = server_info_json();
        value["server"]["ddns"] = json!("NULL");
        value["server"]["fqdn"] = json!("nas.example.com");
        let candidates = generate_candidates(&info(value), TunnelMode::Exclude);
        assert!(!candidates.iter().any(|c| c.kind == ConnectionType::Ddns));
        assert_eq!(
            candidates.iter().filter(|c| c.kind == ConnectionType::Fqdn).count(),
            1
        );
    }

    #[test]
    fn full_descriptor_is_ordered_by_preference() {
        let info = info(json!({
            "server": {
                "serverID": "1",
                "ddns": "mynas.synology.me",
                "fqdn": "nas.example.com",
                "external": { "ip": "203.0.113.7" },
                "interface": [
                    {
                        "ip": "198.51.100.20",
                        "ipv6": [
                            { "address": "2001:db8::20", "scope": "global" },
                            { "address": "fe80::20", "scope": "link" }
                        ]
                    },
                    { "ip": "192.168.1.10" }
                ]
            },
            "service": { "port": 5001, "ext_port": 443, "relay_ip": "198.51.100.99", "relay_port": 30001 }
        }));

        let candidates = generate_candidates(&info, TunnelMode::Include);
        assert_eq!(
            kinds(&candidates),
            vec![
                ConnectionType::LanIpv4,
                ConnectionType::LanIpv4,
                ConnectionType::LanIpv4,
                ConnectionType::LanIpv6,
                ConnectionType::Fqdn,
                ConnectionType::Fqdn,
                ConnectionType::Ddns,
                ConnectionType::Ddns,
                ConnectionType::WanIpv6,
                ConnectionType::WanIpv6,
                ConnectionType::WanIpv4,
                ConnectionType::WanIpv4,
                ConnectionType::Tun,
            ]
        );
        // Reply order is kept inside a group
        assert_eq!(
            hosts(&candidates[..3]),
            vec![
                ("192.168.1.10".to_string(), 5001),
                ("203.0.113.7".to_string(), 5001),
                ("203.0.113.7".to_string(), 443),
            ]
        );
        assert_eq!(candidates[8].hostname, "[2001:db8::20]");
        assert_eq!(hosts(&candidates[12..]), vec![("198.51.100.99".to_string(), 30001)]);
    }

    #[test]
    fn tunnel_modes_filter_routes() {
        let mut value = server_info_json();
        value["service"]["relay_ip"] = json!("198.51.100.99");
        value["service"]["relay_port"] = json!(30001);
        let info = info(value);

        let require = generate_candidates(&info, TunnelMode::Require);
        assert_eq!(kinds(&require), vec![ConnectionType::Tun]);

        let exclude = generate_candidates(&info, TunnelMode::Exclude);
        assert!(!exclude.is_empty());
        assert!(exclude.iter().all(|c| c.kind != ConnectionType::Tun));

        let include = generate_candidates(&info, TunnelMode::Include);
        assert_eq!(include.len(), exclude.len() + 1);
        assert_eq!(include.last().map(|c| c.kind), Some(ConnectionType::Tun));
    }

    #[test]
    fn tunnel_needs_relay_address_and_port() {
        let mut value = server_info_json();
        value["service"]["relay_ip"] = json!("198.51.100.99");
        let candidates = generate_candidates(&info(value), TunnelMode::Require);
        assert!(candidates.is_empty());
    }
}
