use reqwest::{Client, Url};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::oneshot;

use super::credentials::Credentials;
use super::refresh;
use super::types::{authorization_value, mask};
use crate::error::HttpError;
use crate::notify::{Notifier, SESSION_INVALID_MESSAGE};

/// Result delivered to every request queued behind a refresh:
/// the new `Authorization` value, or the reason the refresh failed
type RefreshOutcome = Result<String, String>;

/// Refresh bookkeeping, guarded by a single lock
struct RefreshState {
    /// Default `Authorization` value for outgoing requests
    authorization: String,

    /// Single-flight flag
    refreshing: bool,

    /// Requests waiting on the in-flight refresh, in arrival order
    waiters: Vec<oneshot::Sender<RefreshOutcome>>,
}

/// What a caller that hit a 401 should do next
enum Ticket {
    /// A newer credential already exists; replay with it
    Current(String),
    /// Another caller is refreshing; wait for its outcome
    Wait(oneshot::Receiver<RefreshOutcome>),
    /// This caller owns the refresh
    Lead,
}

/// Authentication manager
/// Owns the current credential and coordinates token refresh so that at most
/// one refresh request is in flight at a time
pub struct AuthManager {
    /// Credential pair storage
    credentials: Credentials,

    /// HTTP client for refresh requests
    client: Client,

    /// Absolute refresh endpoint; `None` disables refresh
    refresh_url: Option<Url>,

    /// Told once per failed refresh, not once per waiting request
    notifier: Arc<dyn Notifier>,

    state: Mutex<RefreshState>,
}

impl AuthManager {
    /// Create a manager, reading the initial credential from storage
    pub fn new(
        credentials: Credentials,
        client: Client,
        refresh_url: Option<Url>,
        notifier: Arc<dyn Notifier>,
    ) -> Result<Self, HttpError> {
        let authorization = credentials.access_authorization()?;

        Ok(Self {
            credentials,
            client,
            refresh_url,
            notifier,
            state: Mutex::new(RefreshState {
                authorization,
                refreshing: false,
                waiters: Vec::new(),
            }),
        })
    }

    fn lock_state(&self) -> MutexGuard<'_, RefreshState> {
        // No code panics while holding this lock, but never let poisoning
        // wedge the client
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Current `Authorization` value for outgoing requests
    pub fn authorization(&self) -> String {
        self.lock_state().authorization.clone()
    }

    /// Whether a refresh endpoint is configured
    pub fn can_refresh(&self) -> bool {
        self.refresh_url.is_some()
    }

    pub fn refresh_url(&self) -> Option<&Url> {
        self.refresh_url.as_ref()
    }

    /// Whether a refresh is currently in flight
    pub fn is_refreshing(&self) -> bool {
        self.lock_state().refreshing
    }

    /// Requests queued behind the in-flight refresh
    pub fn queued_requests(&self) -> usize {
        self.lock_state().waiters.len()
    }

    /// Re-read the credential from storage and rebuild the default header
    pub fn reload(&self) -> Result<String, HttpError> {
        let authorization = self.credentials.access_authorization()?;
        self.lock_state().authorization = authorization.clone();
        tracing::debug!("Reloaded credential from storage");
        Ok(authorization)
    }

    /// Obtain a fresh `Authorization` value after a request carrying `stale`
    /// was rejected with 401.
    ///
    /// - If a refresh is in flight, waits for it and shares its outcome.
    /// - If the credential changed since `stale` was sent, returns the current one.
    /// - Otherwise performs the refresh itself.
    pub async fn refresh_or_wait(&self, stale: &str) -> Result<String, HttpError> {
        let ticket = {
            let mut state = self.lock_state();
            if state.refreshing {
                let (tx, rx) = oneshot::channel();
                state.waiters.push(tx);
                tracing::debug!(
                    waiters = state.waiters.len(),
                    "Token refresh in flight, queued request"
                );
                Ticket::Wait(rx)
            } else if state.authorization != stale {
                Ticket::Current(state.authorization.clone())
            } else {
                // Set before the first suspension point
                state.refreshing = true;
                Ticket::Lead
            }
        };

        match ticket {
            Ticket::Current(authorization) => {
                tracing::debug!("Credential already refreshed, replaying with current token");
                Ok(authorization)
            }
            Ticket::Wait(rx) => match rx.await {
                Ok(Ok(authorization)) => Ok(authorization),
                Ok(Err(reason)) => Err(HttpError::SessionInvalid(reason)),
                Err(_) => Err(HttpError::SessionInvalid(
                    "token refresh was abandoned".to_string(),
                )),
            },
            Ticket::Lead => {
                let guard = RefreshGuard {
                    manager: self,
                    done: false,
                };
                self.lead_refresh(guard).await
            }
        }
    }

    async fn lead_refresh(&self, guard: RefreshGuard<'_>) -> Result<String, HttpError> {
        match self.perform_refresh().await {
            Ok(authorization) => {
                guard.complete(Ok(authorization.clone()));
                Ok(authorization)
            }
            Err(e) => {
                tracing::warn!(error = %e, "Token refresh failed");
                let reason = e.to_string();
                guard.complete(Err(reason.clone()));
                self.notifier.notify(SESSION_INVALID_MESSAGE);
                Err(HttpError::SessionInvalid(reason))
            }
        }
    }

    /// Call the refresh endpoint and persist the new pair
    async fn perform_refresh(&self) -> Result<String, HttpError> {
        let url = self
            .refresh_url
            .clone()
            .ok_or(HttpError::SessionExpired)?;
        let refresh_authorization = self.credentials.refresh_authorization()?;

        let pair = refresh::request_new_tokens(&self.client, url, &refresh_authorization).await?;
        self.credentials.save(&pair)?;

        let token_type = self.credentials.token_type()?;
        tracing::info!(
            access_token = %mask(&pair.access_token),
            "Access token refreshed"
        );
        Ok(authorization_value(&token_type, &pair.access_token))
    }
}

/// Returns the manager to idle when the refresh finishes or is dropped
struct RefreshGuard<'a> {
    manager: &'a AuthManager,
    done: bool,
}

impl RefreshGuard<'_> {
    /// Publish the outcome: update the default header on success, then
    /// resolve every queued request in arrival order
    fn complete(mut self, outcome: RefreshOutcome) {
        let waiters = {
            let mut state = self.manager.lock_state();
            if let Ok(authorization) = &outcome {
                state.authorization = authorization.clone();
            }
            state.refreshing = false;
            std::mem::take(&mut state.waiters)
        };
        self.done = true;

        tracing::debug!(waiters = waiters.len(), "Resolving queued requests");
        for waiter in waiters {
            // Receiver gone means the caller stopped waiting
            let _ = waiter.send(outcome.clone());
        }
    }
}

impl Drop for RefreshGuard<'_> {
    fn drop(&mut self) {
        if self.done {
            return;
        }
        // Refresh future dropped mid-flight: waiters see a closed channel
        let mut state = self.manager.lock_state();
        state.refreshing = false;
        let abandoned = std::mem::take(&mut state.waiters);
        drop(state);
        tracing::warn!(waiters = abandoned.len(), "Token refresh abandoned");
    }
}
