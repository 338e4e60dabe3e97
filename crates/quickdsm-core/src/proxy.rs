use crate::error::ApiError;
use crate::session::{RequestOptions, SessionManager};

use std::future::Future;

/// Runs remote calls inside a session: logs in on demand, recovers once from
/// an expired session and drops results computed under stale settings.
#[derive(Clone)]
pub struct RequestProxy {
    sessions: SessionManager,
}

impl RequestProxy {
    pub fn new(sessions: SessionManager) -> Self {
        Self { sessions }
    }

    pub fn sessions(&self) -> &SessionManager {
        &self.sessions
    }

    /// Call `op` with a session id. See [`call_with`](Self::call_with).
    pub async fn call<T, F, Fut>(&self, op: F) -> Result<T, ApiError>
    where
        F: Fn(String) -> Fut,
        Fut: Future<Output = Result<T, ApiError>>,
    {
        self.call_with(&RequestOptions::default(), op).await
    }

    /// Call `op` with a session id.
    ///
    /// The settings generation is read before logging in and compared after
    /// every suspension point; if it moved, whatever was computed is thrown
    /// away and the whole call starts over under the new settings. A
    /// session-timeout or no-permission failure, from the login or from `op`,
    /// drops the rejected session and is retried at most once per call.
    /// Concurrent calls rejected with the same session share the re-login.
    pub async fn call_with<T, F, Fut>(&self, options: &RequestOptions, op: F) -> Result<T, ApiError>
    where
        F: Fn(String) -> Fut,
        Fut: Future<Output = Result<T, ApiError>>,
    {
        let mut may_recover = true;

        loop {
            let generation = self.sessions.generation();

            let acquired = self.sessions.acquire_session(options).await;
            if self.is_stale(generation) {
                continue;
            }

            let session = match acquired {
                Ok(session) => session,
                // The failed login has already been evicted from the cache
                Err(e) if may_recover && e.is_session_error() => {
                    log::info!("Login rejected ({}), retrying with a fresh session", e);
                    may_recover = false;
                    continue;
                }
                Err(e) => return Err(e),
            };

            let result = op(session.sid.clone()).await;
            if self.is_stale(generation) {
                continue;
            }

            match result {
                Err(e) if may_recover && e.is_session_error() => {
                    log::info!("Session rejected ({}), logging in again", e);
                    self.sessions.clear_session(&session);
                    may_recover = false;
                }
                result => return result,
            }
        }
    }

    fn is_stale(&self, generation: u64) -> bool {
        let current = self.sessions.generation();
        if current != generation {
            log::debug!(
                "Settings changed during call (generation {} -> {}), restarting",
                generation,
                current
            );
            return true;
        }
        false
    }
}
