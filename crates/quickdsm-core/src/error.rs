use serde::{Deserialize, Serialize};

/// Local or transport-level failure. Never a reply from the device itself.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum ConnectionFailure {
    /// Base URL, account, password or session name not configured yet.
    #[error("connection settings are incomplete")]
    MissingConfig,
    /// The server answered HTTP 400, usually http spoken to an https port.
    #[error("server rejected the request (HTTP 400), probably the wrong protocol")]
    ProbableWrongProtocol,
    #[error("cannot reach server (wrong URL, no connection or certificate error): {0}")]
    ProbableWrongUrlOrNoConnectionOrCertError(String),
    #[error("request timed out")]
    Timeout,
    #[error("unknown connection failure: {0}")]
    Unknown(String),
}

impl ConnectionFailure {
    /// Stable tag for display layers and logs.
    pub fn kind(&self) -> &'static str {
        match self {
            ConnectionFailure::MissingConfig => "missing-config",
            ConnectionFailure::ProbableWrongProtocol => "probable-wrong-protocol",
            ConnectionFailure::ProbableWrongUrlOrNoConnectionOrCertError(_) => {
                "probable-wrong-url-or-no-connection-or-cert-error"
            }
            ConnectionFailure::Timeout => "timeout",
            ConnectionFailure::Unknown(_) => "unknown",
        }
    }

    #[cfg(feature = "client")]
    pub fn from_reqwest(error: &reqwest::Error) -> Self {
        if error.is_timeout() {
            ConnectionFailure::Timeout
        } else if error.status() == Some(reqwest::StatusCode::BAD_REQUEST) {
            ConnectionFailure::ProbableWrongProtocol
        } else if error.is_connect() || error.is_request() {
            ConnectionFailure::ProbableWrongUrlOrNoConnectionOrCertError(error.to_string())
        } else {
            ConnectionFailure::Unknown(error.to_string())
        }
    }
}

/// Session is gone or was never valid for this call.
pub const ERROR_NO_PERMISSION: u32 = 105;
pub const ERROR_SESSION_TIMEOUT: u32 = 106;

/// Well-formed failure reply from the device API.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RemoteFailure {
    pub code: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub errors: Option<serde_json::Value>,
}

impl RemoteFailure {
    pub fn new(code: u32) -> Self {
        Self { code, errors: None }
    }

    /// Codes after which a fresh login may make the same call succeed.
    pub fn is_session_error(&self) -> bool {
        matches!(self.code, ERROR_NO_PERMISSION | ERROR_SESSION_TIMEOUT)
    }

    pub fn description(&self) -> &'static str {
        match self.code {
            100 => "unknown error",
            101 => "invalid parameter",
            102 => "requested API does not exist",
            103 => "requested method does not exist",
            104 => "requested version does not support the functionality",
            105 => "session has no permission",
            106 => "session timeout",
            107 => "session interrupted by duplicate login",
            119 => "session id not found",
            400 => "no such account or incorrect password",
            401 => "account disabled",
            402 => "permission denied",
            403 => "2-step verification code required",
            404 => "failed to authenticate 2-step verification code",
            _ => "unrecognized error code",
        }
    }
}

impl std::fmt::Display for RemoteFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "remote API error {} ({})", self.code, self.description())
    }
}

impl std::error::Error for RemoteFailure {}

/// Any failure of a remote call, returned as a value to the caller.
#[derive(Clone, Debug, PartialEq, thiserror::Error)]
pub enum ApiError {
    #[error(transparent)]
    Remote(#[from] RemoteFailure),
    #[error(transparent)]
    Connection(#[from] ConnectionFailure),
}

impl ApiError {
    pub fn is_session_error(&self) -> bool {
        matches!(self, ApiError::Remote(failure) if failure.is_session_error())
    }
}
