use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Protocol the device is reached with. Fixed up front for a resolution.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    Http,
    #[default]
    Https,
}

impl Protocol {
    pub fn scheme(&self) -> &'static str {
        match self {
            Protocol::Http => "http",
            Protocol::Https => "https",
        }
    }

    /// Service tag sent as `id` in server-info requests.
    pub fn portal_id(&self) -> &'static str {
        match self {
            Protocol::Http => "dsm_portal",
            Protocol::Https => "dsm_portal_https",
        }
    }
}

/// Whether the relay tunnel is tried alongside, instead of, or never with the
/// direct addresses.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TunnelMode {
    #[default]
    Include,
    Exclude,
    Require,
}

impl TunnelMode {
    pub fn allows_direct(&self) -> bool {
        matches!(self, TunnelMode::Include | TunnelMode::Exclude)
    }

    pub fn allows_tunnel(&self) -> bool {
        matches!(self, TunnelMode::Include | TunnelMode::Require)
    }
}

/// Kind of route to the device. Declaration order is probe preference order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ConnectionType {
    LanIpv4,
    LanIpv6,
    Fqdn,
    Ddns,
    WanIpv6,
    WanIpv4,
    Tun,
}

/// One address to probe. `hostname` is already URL-ready (IPv6 bracketed).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConnectionCandidate {
    pub kind: ConnectionType,
    pub hostname: String,
    pub port: u16,
}

impl ConnectionCandidate {
    pub fn base_url(&self, protocol: Protocol) -> String {
        format!("{}://{}:{}", protocol.scheme(), self.hostname, self.port)
    }
}

// ── Discovery protocol payloads ─────────────────────────────────────────────

/// `get_site_list` reply.
#[derive(Debug, Default, Deserialize)]
pub struct SiteList {
    #[serde(default)]
    pub errno: i64,
    #[serde(default)]
    pub sites: Vec<String>,
}

/// `get_server_info` / `request_tunnel` reply, or an error payload
/// (`errno` non-zero plus `errinfo`).
#[derive(Clone, Debug, Default, Deserialize)]
pub struct ServerInfo {
    #[serde(default)]
    pub errno: i64,
    #[serde(default)]
    pub errinfo: Option<String>,
    #[serde(default)]
    pub env: Option<EnvInfo>,
    #[serde(default)]
    pub server: Option<ServerDetails>,
    #[serde(default)]
    pub service: Option<ServiceInfo>,
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct EnvInfo {
    #[serde(default)]
    pub control_host: Option<String>,
    #[serde(default)]
    pub relay_region: Option<String>,
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct ServerDetails {
    #[serde(rename = "serverID", default)]
    pub server_id: Option<String>,
    #[serde(default)]
    pub ddns: Option<String>,
    #[serde(default)]
    pub fqdn: Option<String>,
    #[serde(default)]
    pub external: Option<ExternalAddress>,
    #[serde(default)]
    pub interface: Option<Vec<NetworkInterface>>,
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct ExternalAddress {
    #[serde(default)]
    pub ip: Option<String>,
    #[serde(default)]
    pub ipv6: Option<String>,
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct NetworkInterface {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub ip: Option<String>,
    #[serde(default)]
    pub mask: Option<String>,
    #[serde(default)]
    pub ipv6: Option<Vec<Ipv6Address>>,
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct Ipv6Address {
    #[serde(default)]
    pub address: String,
    /// "link" for link-local, anything else is globally routed
    #[serde(default)]
    pub scope: String,
    #[serde(default)]
    pub prefix_length: Option<u8>,
}

/// Ports are sent either as numbers or as numeric strings.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct ServiceInfo {
    #[serde(default)]
    pub port: Option<Value>,
    #[serde(default)]
    pub ext_port: Option<Value>,
    #[serde(default)]
    pub relay_ip: Option<String>,
    #[serde(default)]
    pub relay_port: Option<Value>,
}

/// Read a port sent as a number or numeric string.
pub fn port_value(value: Option<&Value>) -> Option<u16> {
    match value? {
        Value::Number(n) => n.as_u64().and_then(|n| u16::try_from(n).ok()),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn present(value: &Option<String>) -> bool {
    value.as_deref().is_some_and(|s| !s.is_empty())
}

impl ServiceInfo {
    pub fn port(&self) -> Option<u16> {
        port_value(self.port.as_ref())
    }

    pub fn ext_port(&self) -> Option<u16> {
        port_value(self.ext_port.as_ref())
    }

    pub fn relay_port(&self) -> Option<u16> {
        port_value(self.relay_port.as_ref())
    }
}

impl ServerInfo {
    pub fn server_id(&self) -> Option<&str> {
        self.server.as_ref()?.server_id.as_deref()
    }

    /// Structural check: no error code and every field the resolver relies on.
    pub fn is_valid(&self) -> bool {
        let (Some(server), Some(service), Some(env)) = (&self.server, &self.service, &self.env)
        else {
            return false;
        };
        self.errno == 0
            && server.interface.is_some()
            && server.external.as_ref().is_some_and(|e| present(&e.ip))
            && present(&server.server_id)
            && service.port().is_some()
            && service.ext_port.is_some()
            && present(&env.relay_region)
            && present(&env.control_host)
    }
}

/// `/webman/pingpong.cgi` reply.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct PingPong {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub boot_done: bool,
    #[serde(default)]
    pub disk_hibernation: bool,
    #[serde(default)]
    pub ezid: Option<String>,
}

/// The address that answered the probe.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResolvedAddress {
    pub kind: ConnectionType,
    pub hostname: String,
    pub port: u16,
}

impl ResolvedAddress {
    pub fn base_url(&self, protocol: Protocol) -> String {
        format!("{}://{}:{}", protocol.scheme(), self.hostname, self.port)
    }
}

impl From<ConnectionCandidate> for ResolvedAddress {
    fn from(candidate: ConnectionCandidate) -> Self {
        Self {
            kind: candidate.kind,
            hostname: candidate.hostname,
            port: candidate.port,
        }
    }
}

#[cfg(test)]
pub(crate) mod samples {
    use serde_json::{json, Value};

    /// A well-formed server-info reply with one LAN interface.
    pub(crate) fn server_info_json() -> Value {
        json!({
            "command": "get_server_info",
            "errno": 0,
            "version": 1,
            "env": { "control_host": "usc.quickconnect.to", "relay_region": "us" },
            "server": {
                "serverID": "0123456789",
                "ddns": "NULL",
                "fqdn": "NULL",
                "external": { "ip": "203.0.113.7", "ipv6": "::" },
                "interface": [
                    { "name": "eth0", "ip": "192.168.1.10", "mask": "255.255.255.0", "ipv6": [] }
                ]
            },
            "service": { "port": 5000, "ext_port": 0 }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn parse(value: Value) -> ServerInfo {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn sample_is_valid() {
        assert!(parse(samples::server_info_json()).is_valid());
    }

    #[test]
    fn error_payload_is_invalid() {
        let info = parse(json!({
            "command": "get_server_info",
            "errinfo": "get_server_info.go:69[Alias not found]",
            "errno": 4,
            "version": 1
        }));
        assert!(!info.is_valid());
        assert_eq!(info.errno, 4);
    }

    #[test]
    fn missing_required_fields_are_invalid() {
        let required = [
            "/server/interface",
            "/server/external",
            "/server/serverID",
            "/service/port",
            "/service/ext_port",
            "/env/relay_region",
            "/env/control_host",
        ];
        for pointer in required {
            let mut value = samples::server_info_json();
            let (parent, key) = pointer.rsplit_once('/').unwrap();
            value
                .pointer_mut(parent)
                .and_then(Value::as_object_mut)
                .unwrap()
                .remove(key);
            assert!(!parse(value).is_valid(), "{} should be required", pointer);
        }
    }

    #[test]
    fn non_zero_errno_is_invalid_even_with_fields() {
        let mut value = samples::server_info_json();
        value["errno"] = json!(1);
        assert!(!parse(value).is_valid());
    }

    #[test]
    fn ports_accept_numbers_and_strings() {
        assert_eq!(port_value(Some(&json!(5000))), Some(5000));
        assert_eq!(port_value(Some(&json!("6000"))), Some(6000));
        assert_eq!(port_value(Some(&json!("abc"))), None);
        assert_eq!(port_value(Some(&json!(70000))), None);
        assert_eq!(port_value(Some(&json!(null))), None);
        assert_eq!(port_value(None), None);
    }

    #[test]
    fn connection_type_preference_order() {
        let mut kinds = vec![
            ConnectionType::Tun,
            ConnectionType::WanIpv4,
            ConnectionType::WanIpv6,
            ConnectionType::Ddns,
            ConnectionType::Fqdn,
            ConnectionType::LanIpv6,
            ConnectionType::LanIpv4,
        ];
        kinds.sort();
        assert_eq!(
            kinds,
            vec![
                ConnectionType::LanIpv4,
                ConnectionType::LanIpv6,
                ConnectionType::Fqdn,
                ConnectionType::Ddns,
                ConnectionType::WanIpv6,
                ConnectionType::WanIpv4,
                ConnectionType::Tun,
            ]
        );
    }

    #[test]
    fn tunnel_modes() {
        assert!(TunnelMode::Include.allows_direct() && TunnelMode::Include.allows_tunnel());
        assert!(TunnelMode::Exclude.allows_direct() && !TunnelMode::Exclude.allows_tunnel());
        assert!(!TunnelMode::Require.allows_direct() && TunnelMode::Require.allows_tunnel());
    }

    #[test]
    fn candidate_base_url() {
        let candidate = ConnectionCandidate {
            kind: ConnectionType::LanIpv6,
            hostname: "[fe80::1]".to_string(),
            port: 5001,
        };
        assert_eq!(candidate.base_url(Protocol::Https), "https://[fe80::1]:5001");
        assert_eq!(Protocol::Http.portal_id(), "dsm_portal");
    }
}
