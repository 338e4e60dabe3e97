use crate::config::ClientConfig;
use crate::error::ConnectionFailure;
use crate::quickconnect::candidates::generate_candidates;
use crate::quickconnect::types::{
    ConnectionCandidate, PingPong, Protocol, ResolvedAddress, ServerInfo, SiteList, TunnelMode,
};
use crate::series::{first_success, SeriesError};

use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;

/// HTTP access needed by the resolver.
#[async_trait]
pub trait DiscoveryTransport: Send + Sync + 'static {
    /// POST a JSON body and parse the JSON reply.
    async fn post_json(&self, url: &str, body: &Value, timeout: Duration) -> Result<Value, ConnectionFailure>;
    /// GET with a `Referer` header and parse the JSON reply.
    async fn get_json(&self, url: &str, referer: &str, timeout: Duration) -> Result<Value, ConnectionFailure>;
}

#[derive(Debug, thiserror::Error)]
pub enum ResolveError {
    #[error("failed to fetch QuickConnect site list: {0}")]
    SiteList(ConnectionFailure),
    #[error("QuickConnect returned no control hosts")]
    NoControlHosts,
    #[error("no reachable address for {device_id}: {}", .failures.join("; "))]
    Unreachable {
        device_id: String,
        /// One entry per control host, in the order they were tried
        failures: Vec<String>,
    },
}

/// Turns a QuickConnect id into a verified host and port.
pub struct QuickConnect {
    transport: Arc<dyn DiscoveryTransport>,
    config: ClientConfig,
}

impl QuickConnect {
    pub fn new(transport: Arc<dyn DiscoveryTransport>, config: ClientConfig) -> Self {
        Self { transport, config }
    }

    /// Resolve `device_id` to the first candidate that answers the probe
    /// with the device's identity.
    ///
    /// Control hosts are asked one after another; for each valid reply its
    /// candidates are probed one after another.
    pub async fn resolve(
        &self,
        device_id: &str,
        protocol: Protocol,
        tunnel_mode: TunnelMode,
    ) -> Result<ResolvedAddress, ResolveError> {
        let control_hosts = self.control_hosts().await?;
        log::debug!(
            "Resolving {} via {} control hosts",
            device_id,
            control_hosts.len()
        );

        let result = first_success(control_hosts, None, |host| {
            self.try_control_host(host, device_id, protocol, tunnel_mode)
        })
        .await;

        match result {
            Ok(address) => {
                log::info!(
                    "Resolved {} to {} ({:?})",
                    device_id,
                    address.base_url(protocol),
                    address.kind
                );
                Ok(address)
            }
            Err(SeriesError::Empty) => Err(ResolveError::NoControlHosts),
            Err(SeriesError::Exhausted(failures)) => {
                log::warn!("Could not resolve {}: {}", device_id, failures.join("; "));
                Err(ResolveError::Unreachable {
                    device_id: device_id.to_string(),
                    failures,
                })
            }
        }
    }

    fn serv_url(host: &str) -> String {
        format!("https://{}/Serv.php", host)
    }

    async fn control_hosts(&self) -> Result<Vec<String>, ResolveError> {
        let url = Self::serv_url(&format!("global.{}", self.config.discovery_domain));
        let body = json!({ "version": 1, "command": "get_site_list" });
        let reply = self
            .transport
            .post_json(&url, &body, self.config.request_timeout())
            .await
            .map_err(ResolveError::SiteList)?;

        let sites: SiteList = serde_json::from_value(reply).map_err(|e| {
            ResolveError::SiteList(ConnectionFailure::Unknown(format!("malformed site list: {}", e)))
        })?;
        if sites.errno != 0 {
            return Err(ResolveError::SiteList(ConnectionFailure::Unknown(format!(
                "site list errno {}",
                sites.errno
            ))));
        }
        Ok(sites.sites)
    }

    async fn server_info(
        &self,
        host: &str,
        device_id: &str,
        protocol: Protocol,
        tunnel_mode: TunnelMode,
    ) -> Result<ServerInfo, String> {
        let command = match tunnel_mode {
            TunnelMode::Require => "request_tunnel",
            TunnelMode::Include | TunnelMode::Exclude => "get_server_info",
        };
        let body = json!({
            "version": 1,
            "command": command,
            "id": protocol.portal_id(),
            "serverID": device_id,
        });

        let reply = self
            .transport
            .post_json(&Self::serv_url(host), &body, self.config.request_timeout())
            .await
            .map_err(|e| format!("{}: {}", host, e))?;
        // Batched requests are answered with an array
        let reply = match reply {
            Value::Array(items) => items.into_iter().next().unwrap_or(Value::Null),
            other => other,
        };

        let info: ServerInfo = serde_json::from_value(reply)
            .map_err(|e| format!("{}: malformed server info: {}", host, e))?;
        if info.errno != 0 {
            return Err(format!(
                "{}: error {} ({})",
                host,
                info.errno,
                info.errinfo.as_deref().unwrap_or("no details")
            ));
        }
        if !info.is_valid() {
            return Err(format!("{}: incomplete server info", host));
        }
        Ok(info)
    }

    async fn try_control_host(
        &self,
        host: String,
        device_id: &str,
        protocol: Protocol,
        tunnel_mode: TunnelMode,
    ) -> Result<ResolvedAddress, String> {
        log::debug!("Asking control host {} about {}", host, device_id);
        let info = match self.server_info(&host, device_id, protocol, tunnel_mode).await {
            Ok(info) => info,
            Err(e) => {
                log::debug!("Control host failed: {}", e);
                return Err(e);
            }
        };

        let expected_ezid = info.server_id().map(ezid).unwrap_or_default();
        let candidates = generate_candidates(&info, tunnel_mode);
        let count = candidates.len();

        first_success(candidates, None, |candidate| {
            self.probe(candidate, device_id, protocol, &expected_ezid)
        })
        .await
        .map_err(|_| format!("{}: none of {} candidates answered", host, count))
    }

    /// Ping-pong check: the candidate must answer and prove it is the device.
    async fn probe(
        &self,
        candidate: ConnectionCandidate,
        device_id: &str,
        protocol: Protocol,
        expected_ezid: &str,
    ) -> Result<ResolvedAddress, String> {
        let base_url = candidate.base_url(protocol);
        let url = format!("{}/webman/pingpong.cgi?action=cors", base_url);
        let referer = format!(
            "{}://{}.{}",
            protocol.scheme(),
            device_id,
            self.config.discovery_domain
        );
        log::debug!("Probing {} ({:?})", base_url, candidate.kind);

        let reply = self
            .transport
            .get_json(&url, &referer, self.config.probe_timeout())
            .await
            .map_err(|e| format!("{}: {}", base_url, e))?;
        let pong: PingPong = serde_json::from_value(reply)
            .map_err(|e| format!("{}: malformed ping-pong reply: {}", base_url, e))?;

        if !pong.success {
            return Err(format!("{}: probe unsuccessful", base_url));
        }
        if pong.ezid.as_deref() != Some(expected_ezid) {
            log::warn!("{} answered with a different identity", base_url);
            return Err(format!("{}: identity mismatch", base_url));
        }
        Ok(candidate.into())
    }
}

/// Identity token a device answers ping-pong with: md5 of its server id.
pub fn ezid(server_id: &str) -> String {
    format!("{:x}", md5::compute(server_id.as_bytes()))
}

#[cfg(feature = "client")]
pub use http::HttpDiscovery;

#[cfg(feature = "client")]
mod http {
    use super::*;

    /// `reqwest`-backed discovery transport.
    pub struct HttpDiscovery {
        client: reqwest::Client,
    }

    impl HttpDiscovery {
        pub fn new() -> Self {
            Self {
                client: reqwest::Client::new(),
            }
        }

        async fn read_json(resp: reqwest::Response) -> Result<Value, ConnectionFailure> {
            let status = resp.status();
            if status == reqwest::StatusCode::BAD_REQUEST {
                return Err(ConnectionFailure::ProbableWrongProtocol);
            }
            if !status.is_success() {
                return Err(ConnectionFailure::Unknown(format!("HTTP {}", status)));
            }
            resp.json().await.map_err(|e| ConnectionFailure::from_reqwest(&e))
        }
    }

    impl Default for HttpDiscovery {
        fn default() -> Self {
            Self::new()
        }
    }

    #[async_trait]
    impl DiscoveryTransport for HttpDiscovery {
        async fn post_json(&self, url: &str, body: &Value, timeout: Duration) -> Result<Value, ConnectionFailure> {
            let resp = self
                .client
                .post(url)
                .json(body)
                .timeout(timeout)
                .send()
                .await
                .map_err(|e| ConnectionFailure::from_reqwest(&e))?;
            Self::read_json(resp).await
        }

        async fn get_json(&self, url: &str, referer: &str, timeout: Duration) -> Result<Value, ConnectionFailure> {
            let resp = self
                .client
                .get(url)
                .header(reqwest::header::REFERER, referer)
                .timeout(timeout)
                .send()
                .await
                .map_err(|e| ConnectionFailure::from_reqwest(&e))?;
            Self::read_json(resp).await
        }
    }
}
