use crate::api::{ApiRequest, Transport, AUTH_API, AUTH_DEFAULT_PATH, INFO_API, INFO_PATH};
use crate::error::{ApiError, ConnectionFailure};

use futures::future::{BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::{Arc, Weak};
use std::time::Duration;

/// Login protocol version used whenever the device advertises it.
const MODERN_LOGIN_VERSION: u32 = 4;
const LEGACY_LOGIN_VERSION: u32 = 1;

/// API groups this client holds sessions for.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SessionName {
    DownloadStation,
    FileStation,
}

impl SessionName {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionName::DownloadStation => "DownloadStation",
            SessionName::FileStation => "FileStation",
        }
    }
}

/// Connection settings snapshot. Replaced wholesale, never edited in place.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Settings {
    pub base_url: Option<String>,
    pub account: Option<String>,
    pub password: Option<String>,
    pub session_name: Option<SessionName>,
}

impl std::fmt::Debug for Settings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Settings")
            .field("base_url", &self.base_url)
            .field("account", &self.account)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("session_name", &self.session_name)
            .finish()
    }
}

impl Settings {
    pub fn is_complete(&self) -> bool {
        Credentials::from_settings(self).is_some()
    }
}

/// Fully populated settings, as needed to log in and out.
struct Credentials {
    base_url: String,
    account: String,
    password: String,
    session_name: SessionName,
}

impl Credentials {
    fn from_settings(settings: &Settings) -> Option<Self> {
        Some(Self {
            base_url: settings.base_url.clone().filter(|s| !s.is_empty())?,
            account: settings.account.clone().filter(|s| !s.is_empty())?,
            password: settings.password.clone()?,
            session_name: settings.session_name?,
        })
    }
}

/// An authenticated session.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Session {
    pub sid: String,
    /// The device only offered login v1, which also sets extra session
    /// cookies on the HTTP client.
    pub is_legacy_login: bool,
    auth_path: String,
    auth_version: u32,
}

/// Per-call options forwarded to the transport.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RequestOptions {
    pub timeout: Option<Duration>,
}

/// Result of a logout attempt.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Released {
    LoggedOut,
    /// No session was cached (or its login had failed); nothing was sent.
    NotLoggedIn,
}

type LoginFuture = Shared<BoxFuture<'static, Result<Session, ApiError>>>;

/// The single login slot. Its future may still be running.
struct PendingLogin {
    id: u64,
    credentials: Arc<Credentials>,
    future: LoginFuture,
}

type Listener = Arc<dyn Fn() + Send + Sync>;

struct SessionState {
    settings: Option<Settings>,
    generation: u64,
    login: Option<PendingLogin>,
    next_login_id: u64,
    listeners: Vec<(u64, Listener)>,
    next_listener_id: u64,
}

struct Inner {
    transport: Arc<dyn Transport>,
    state: Mutex<SessionState>,
}

/// Owns the connection settings, the settings generation and the cached login.
///
/// Cloning is cheap and every clone shares the same state.
#[derive(Clone)]
pub struct SessionManager {
    inner: Arc<Inner>,
}

impl SessionManager {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            inner: Arc::new(Inner {
                transport,
                state: Mutex::new(SessionState {
                    settings: None,
                    generation: 0,
                    login: None,
                    next_login_id: 0,
                    listeners: Vec::new(),
                    next_listener_id: 0,
                }),
            }),
        }
    }

    /// Incremented once per accepted settings change.
    pub fn generation(&self) -> u64 {
        self.inner.state.lock().generation
    }

    pub fn settings(&self) -> Option<Settings> {
        self.inner.state.lock().settings.clone()
    }

    pub fn base_url(&self) -> Option<String> {
        self.inner
            .state
            .lock()
            .settings
            .as_ref()
            .and_then(|s| s.base_url.clone())
    }

    /// Get the current session, logging in if none is cached.
    ///
    /// Concurrent callers share one login. A login that ends in an error is
    /// dropped from the cache so the next call tries again.
    pub async fn acquire_session(&self, options: &RequestOptions) -> Result<Session, ApiError> {
        let (id, future) = {
            let mut guard = self.inner.state.lock();
            let state = &mut *guard;
            let credentials = match state.settings.as_ref().and_then(Credentials::from_settings) {
                Some(credentials) => Arc::new(credentials),
                None => return Err(ConnectionFailure::MissingConfig.into()),
            };

            match &state.login {
                Some(pending) => (pending.id, pending.future.clone()),
                None => {
                    let id = state.next_login_id;
                    state.next_login_id += 1;
                    let future = login(
                        self.inner.transport.clone(),
                        credentials.clone(),
                        options.timeout,
                    )
                    .boxed()
                    .shared();
                    state.login = Some(PendingLogin {
                        id,
                        credentials,
                        future: future.clone(),
                    });
                    (id, future)
                }
            }
        };

        let result = future.await;
        if result.is_err() {
            let mut state = self.inner.state.lock();
            if state.login.as_ref().map(|p| p.id) == Some(id) {
                state.login = None;
            }
        }
        result
    }

    /// Forget `session` without logging out, if it is still the cached one.
    ///
    /// A login started since `session` was handed out is left alone, so
    /// callers recovering from the same rejected session share one re-login.
    pub fn clear_session(&self, session: &Session) -> bool {
        let mut state = self.inner.state.lock();
        let holds_session = match state.login.as_ref().and_then(|p| p.future.peek()) {
            Some(Ok(cached)) => cached.sid == session.sid,
            _ => false,
        };
        if holds_session {
            state.login = None;
        }
        holds_session
    }

    /// Log out of the cached session, if any.
    ///
    /// The slot is cleared before anything is sent; the next
    /// [`acquire_session`](Self::acquire_session) logs in again regardless of
    /// how the logout went.
    pub async fn release_session(&self, options: &RequestOptions) -> Result<Released, ApiError> {
        let pending = self.inner.state.lock().login.take();
        match pending {
            Some(pending) => logout(self.inner.transport.clone(), pending, options.timeout).await,
            None => Ok(Released::NotLoggedIn),
        }
    }

    /// Replace the settings. Returns `false` (and does nothing) when they are
    /// equal to the current ones.
    ///
    /// On change the generation is bumped, the previous session is logged out
    /// in the background and listeners are notified.
    pub fn update_settings(&self, settings: Settings) -> bool {
        let (generation, pending, listeners) = {
            let mut state = self.inner.state.lock();
            if state.settings.as_ref() == Some(&settings) {
                return false;
            }
            state.generation += 1;
            state.settings = Some(settings);
            let listeners: Vec<Listener> =
                state.listeners.iter().map(|(_, l)| l.clone()).collect();
            (state.generation, state.login.take(), listeners)
        };

        log::debug!("Connection settings changed (generation {})", generation);

        if let Some(pending) = pending {
            match tokio::runtime::Handle::try_current() {
                Ok(handle) => {
                    let transport = self.inner.transport.clone();
                    handle.spawn(async move {
                        let _ = logout(transport, pending, None).await;
                    });
                }
                Err(_) => {
                    log::warn!("No async runtime available, skipping logout of previous session");
                }
            }
        }

        for listener in listeners {
            listener();
        }
        true
    }

    /// Register a callback for settings changes. Dropping the returned
    /// subscription unregisters it.
    pub fn on_settings_change(
        &self,
        listener: impl Fn() + Send + Sync + 'static,
    ) -> SettingsSubscription {
        let mut state = self.inner.state.lock();
        let id = state.next_listener_id;
        state.next_listener_id += 1;
        state.listeners.push((id, Arc::new(listener)));
        SettingsSubscription {
            id,
            inner: Arc::downgrade(&self.inner),
        }
    }
}

/// Handle returned by [`SessionManager::on_settings_change`].
#[must_use = "dropping the subscription unregisters the listener"]
pub struct SettingsSubscription {
    id: u64,
    inner: Weak<Inner>,
}

impl SettingsSubscription {
    pub fn dispose(self) {}
}

impl Drop for SettingsSubscription {
    fn drop(&mut self) {
        if let Some(inner) = self.inner.upgrade() {
            inner.state.lock().listeners.retain(|(id, _)| *id != self.id);
        }
    }
}

async fn login(
    transport: Arc<dyn Transport>,
    credentials: Arc<Credentials>,
    timeout: Option<Duration>,
) -> Result<Session, ApiError> {
    let base_url = credentials.base_url.as_str();
    log::debug!("Logging in to {} as {}", base_url, credentials.account);

    let info = ApiRequest::new(INFO_PATH, INFO_API, 1, "query")
        .param("query", AUTH_API)
        .timeout(timeout);
    let data = transport.get(base_url, &info).await?;

    let auth = data.get(AUTH_API);
    let max_version = auth
        .and_then(|a| a.get("maxVersion"))
        .and_then(Value::as_u64)
        .unwrap_or(u64::from(LEGACY_LOGIN_VERSION));
    let auth_path = auth
        .and_then(|a| a.get("path"))
        .and_then(Value::as_str)
        .unwrap_or(AUTH_DEFAULT_PATH)
        .to_string();

    let auth_version = if max_version >= u64::from(MODERN_LOGIN_VERSION) {
        MODERN_LOGIN_VERSION
    } else {
        LEGACY_LOGIN_VERSION
    };
    let is_legacy_login = auth_version == LEGACY_LOGIN_VERSION;
    if is_legacy_login {
        log::warn!(
            "{} only supports legacy login (auth v{}); extra session cookies will be set",
            base_url,
            max_version
        );
    }

    let request = ApiRequest::new(&auth_path, AUTH_API, auth_version, "login")
        .param("account", credentials.account.as_str())
        .param("passwd", credentials.password.as_str())
        .param("session", credentials.session_name.as_str())
        .param("format", "sid")
        .timeout(timeout);

    let data = match transport.post(base_url, &request).await {
        Ok(data) => data,
        Err(e) => {
            log::warn!("Login to {} failed: {}", base_url, e);
            return Err(e);
        }
    };
    let sid = data
        .get("sid")
        .and_then(Value::as_str)
        .ok_or_else(|| ConnectionFailure::Unknown("login response has no sid".to_string()))?;

    log::info!("Logged in to {} (auth v{})", base_url, auth_version);
    Ok(Session {
        sid: sid.to_string(),
        is_legacy_login,
        auth_path,
        auth_version,
    })
}

async fn logout(
    transport: Arc<dyn Transport>,
    pending: PendingLogin,
    timeout: Option<Duration>,
) -> Result<Released, ApiError> {
    let session = match pending.future.await {
        Ok(session) => session,
        Err(e) => {
            log::debug!("Previous login had failed ({}), nothing to log out", e);
            return Ok(Released::NotLoggedIn);
        }
    };

    let base_url = pending.credentials.base_url.as_str();
    let request = ApiRequest::new(&session.auth_path, AUTH_API, session.auth_version, "logout")
        .param("session", pending.credentials.session_name.as_str())
        .sid(&session.sid)
        .timeout(timeout);

    match transport.get(base_url, &request).await {
        Ok(_) => {
            log::debug!("Logged out of {}", base_url);
            Ok(Released::LoggedOut)
        }
        Err(e) => {
            log::warn!("Logout from {} failed: {}", base_url, e);
            Err(e)
        }
    }
}
