use crate::error::{ApiError, ConnectionFailure, RemoteFailure};

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;

// ── Well-known APIs ─────────────────────────────────────────────────────────

pub const INFO_API: &str = "SYNO.API.Info";
pub const INFO_PATH: &str = "query.cgi";
pub const AUTH_API: &str = "SYNO.API.Auth";
/// Used when the info query does not advertise a path for the auth API.
pub const AUTH_DEFAULT_PATH: &str = "auth.cgi";

/// A single call against `<base_url>/webapi/<path>`.
#[derive(Clone, Debug, PartialEq)]
pub struct ApiRequest {
    pub path: String,
    pub api: String,
    pub version: u32,
    pub method: String,
    pub params: Vec<(String, String)>,
    pub sid: Option<String>,
    pub timeout: Option<Duration>,
}

impl ApiRequest {
    pub fn new(path: &str, api: &str, version: u32, method: &str) -> Self {
        Self {
            path: path.to_string(),
            api: api.to_string(),
            version,
            method: method.to_string(),
            params: Vec::new(),
            sid: None,
            timeout: None,
        }
    }

    pub fn param(mut self, key: &str, value: impl Into<String>) -> Self {
        self.params.push((key.to_string(), value.into()));
        self
    }

    pub fn sid(mut self, sid: &str) -> Self {
        self.sid = Some(sid.to_string());
        self
    }

    pub fn timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn get_param(&self, key: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// All fields as sent on the wire, standard ones first.
    pub fn fields(&self) -> Vec<(String, String)> {
        let mut fields = vec![
            ("api".to_string(), self.api.clone()),
            ("version".to_string(), self.version.to_string()),
            ("method".to_string(), self.method.clone()),
        ];
        fields.extend(self.params.iter().cloned());
        if let Some(sid) = &self.sid {
            fields.push(("_sid".to_string(), sid.clone()));
        }
        fields
    }

    pub fn url(&self, base_url: &str) -> String {
        format!("{}/webapi/{}", base_url.trim_end_matches('/'), self.path)
    }
}

/// Remote API transport. Success yields the `data` payload of the reply.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    async fn get(&self, base_url: &str, request: &ApiRequest) -> Result<Value, ApiError>;
    async fn post(&self, base_url: &str, request: &ApiRequest) -> Result<Value, ApiError>;
}

#[derive(Deserialize)]
struct Envelope {
    success: bool,
    #[serde(default)]
    data: Option<Value>,
    #[serde(default)]
    error: Option<RemoteFailure>,
}

/// Split a reply envelope into data or a remote failure.
pub fn decode_envelope(body: Value) -> Result<Value, ApiError> {
    let envelope: Envelope = serde_json::from_value(body).map_err(|e| {
        ConnectionFailure::Unknown(format!("malformed API response: {}", e))
    })?;
    if envelope.success {
        Ok(envelope.data.unwrap_or(Value::Null))
    } else {
        // A failure without an error object is still a device reply
        Err(envelope.error.unwrap_or_else(|| RemoteFailure::new(100)).into())
    }
}

#[cfg(feature = "client")]
pub use http::HttpTransport;

#[cfg(feature = "client")]
mod http {
    use super::*;

    /// `reqwest`-backed transport.
    pub struct HttpTransport {
        client: reqwest::Client,
        default_timeout: Duration,
    }

    impl HttpTransport {
        pub fn new(default_timeout: Duration) -> Self {
            Self {
                client: reqwest::Client::new(),
                default_timeout,
            }
        }

        async fn send(&self, request: reqwest::RequestBuilder, api: &ApiRequest) -> Result<Value, ApiError> {
            let resp = request
                .timeout(api.timeout.unwrap_or(self.default_timeout))
                .send()
                .await
                .map_err(|e| ConnectionFailure::from_reqwest(&e))?;

            let status = resp.status();
            if status == reqwest::StatusCode::BAD_REQUEST {
                return Err(ConnectionFailure::ProbableWrongProtocol.into());
            }
            if !status.is_success() {
                return Err(ConnectionFailure::Unknown(format!("HTTP {}", status)).into());
            }

            let body: Value = resp
                .json()
                .await
                .map_err(|e| ConnectionFailure::from_reqwest(&e))?;
            decode_envelope(body)
        }
    }

    #[async_trait]
    impl Transport for HttpTransport {
        async fn get(&self, base_url: &str, request: &ApiRequest) -> Result<Value, ApiError> {
            log::trace!("GET {} {}.{}", request.url(base_url), request.api, request.method);
            let builder = self
                .client
                .get(request.url(base_url))
                .query(&request.fields());
            self.send(builder, request).await
        }

        async fn post(&self, base_url: &str, request: &ApiRequest) -> Result<Value, ApiError> {
            log::trace!("POST {} {}.{}", request.url(base_url), request.api, request.method);
            let builder = self
                .client
                .post(request.url(base_url))
                .form(&request.fields());
            self.send(builder, request).await
        }
    }
}
