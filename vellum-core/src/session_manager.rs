//! Session lifecycle management.
//!
//! [`SessionManager`] owns the access token, its expiry, and the user
//! profile, persists them through a [`StateStore`], and coordinates token
//! refresh so that concurrent callers share a single network attempt.
//!
//! # Refresh coordination
//!
//! `refresh()` is single-flight: an async gate serializes attempts, and a
//! generation counter lets callers that waited on the gate detect that a
//! refresh (or a clear) settled in the meantime and adopt its outcome
//! instead of issuing a second network call. Refresh failures are terminal
//! for the session; the state is cleared and every waiting caller gets
//! `None` together.
//!
//! The manager talks to the two auth endpoints (`/auth/refresh`,
//! `/auth/logout`) with its own HTTP client; everything else goes through
//! the request pipeline, which depends on this type and calls back into
//! `refresh()` when it hits an expired or rejected credential.

use chrono::{DateTime, Duration, Utc};
use parking_lot::{Mutex, RwLock};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::task::JoinHandle;

use crate::config::ClientConfig;
use crate::envelope::ApiEnvelope;
use crate::session::{AuthData, Secret, UserProfile};
use crate::store::StateStore;

const TOKEN_KEY: &str = "vellum/session/access_token";
const EXPIRY_KEY: &str = "vellum/session/expires_at";
const USER_KEY: &str = "vellum/session/user";

/// Tokens within this margin of expiry are refreshed proactively.
const DEFAULT_REFRESH_MARGIN_SECS: i64 = 5 * 60;

#[derive(Default)]
struct SessionState {
    token: Option<Secret>,
    expires_at: Option<DateTime<Utc>>,
    user: Option<UserProfile>,
}

struct SessionInner {
    http: reqwest::Client,
    api_base_url: String,
    timeout: std::time::Duration,
    store: Arc<dyn StateStore>,
    state: RwLock<SessionState>,
    refresh_gate: tokio::sync::Mutex<()>,
    refresh_generation: AtomicU64,
    refresh_timer: Mutex<Option<JoinHandle<()>>>,
    refresh_margin: Duration,
}

/// Owner of the process-wide session state.
///
/// Constructed once at startup and cloned into whoever needs it (clones
/// share the same state); never a module-level global.
#[derive(Clone)]
pub struct SessionManager {
    inner: Arc<SessionInner>,
}

impl SessionManager {
    pub fn new(config: &ClientConfig, store: Arc<dyn StateStore>) -> Self {
        Self::with_refresh_margin(config, store, Duration::seconds(DEFAULT_REFRESH_MARGIN_SECS))
    }

    /// Create a manager with a custom proactive-refresh margin (the
    /// default is five minutes).
    pub fn with_refresh_margin(
        config: &ClientConfig,
        store: Arc<dyn StateStore>,
        refresh_margin: Duration,
    ) -> Self {
        Self {
            inner: Arc::new(SessionInner {
                http: reqwest::Client::new(),
                api_base_url: config.api_base_url.trim_end_matches('/').to_string(),
                timeout: config.timeout(),
                store,
                state: RwLock::new(SessionState::default()),
                refresh_gate: tokio::sync::Mutex::new(()),
                refresh_generation: AtomicU64::new(0),
                refresh_timer: Mutex::new(None),
                refresh_margin,
            }),
        }
    }

    /// The current token, regardless of expiry.
    pub fn token(&self) -> Option<Secret> {
        self.inner.state.read().token.clone()
    }

    /// The last-known authenticated user profile.
    pub fn user(&self) -> Option<UserProfile> {
        self.inner.state.read().user.clone()
    }

    /// Whether the credential is past its expiry. An absent expiry counts
    /// as already expired.
    pub fn is_expired(&self) -> bool {
        match self.inner.state.read().expires_at {
            Some(expires_at) => Utc::now() > expires_at,
            None => true,
        }
    }

    /// A token is held and not expired.
    pub fn is_valid(&self) -> bool {
        self.inner.state.read().token.is_some() && !self.is_expired()
    }

    /// Alias for [`is_valid`](Self::is_valid); reads better at call sites
    /// asking an authentication question.
    pub fn is_logged_in(&self) -> bool {
        self.is_valid()
    }

    /// Remaining credential lifetime, floored at zero.
    pub fn remaining(&self) -> Duration {
        match self.inner.state.read().expires_at {
            Some(expires_at) => std::cmp::max(expires_at - Utc::now(), Duration::zero()),
            None => Duration::zero(),
        }
    }

    /// Store a token with its lifetime and persist both.
    pub async fn set_token(&self, token: &str, expires_in: Duration) {
        let expires_at = Utc::now() + expires_in;
        {
            let mut state = self.inner.state.write();
            state.token = Some(Secret::new(token));
            state.expires_at = Some(expires_at);
        }
        self.persist(TOKEN_KEY, token).await;
        self.persist(EXPIRY_KEY, &expires_at.timestamp().to_string())
            .await;
    }

    /// Store and persist the user profile.
    pub async fn set_user(&self, user: UserProfile) {
        let serialized = serde_json::to_string(&user).ok();
        self.inner.state.write().user = Some(user);
        if let Some(json) = serialized {
            self.persist(USER_KEY, &json).await;
        }
    }

    /// Store a token and schedule exactly one deferred refresh at
    /// `max(expires_in - margin, 0)` from now.
    ///
    /// The scheduled task is tracked and cancelled by [`clear`](Self::clear),
    /// so a logout never leaves a stray refresh behind.
    pub async fn set_token_with_auto_refresh(&self, token: &str, expires_in: Duration) {
        self.set_token(token, expires_in).await;

        let delay = std::cmp::max(expires_in - self.inner.refresh_margin, Duration::zero())
            .to_std()
            .unwrap_or_default();
        let manager = self.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if manager.refresh().await.is_none() {
                tracing::warn!("scheduled token refresh failed");
            }
        });
        if let Some(previous) = self.inner.refresh_timer.lock().replace(handle) {
            previous.abort();
        }
    }

    /// Refresh the access token, collapsing concurrent attempts.
    ///
    /// Returns the fresh token on success. On failure the session is
    /// cleared and every caller of the collapsed attempt receives `None`.
    pub async fn refresh(&self) -> Option<Secret> {
        let observed = self.inner.refresh_generation.load(Ordering::Acquire);
        let _gate = self.inner.refresh_gate.lock().await;

        // A refresh or clear settled while we waited for the gate; adopt
        // its outcome instead of issuing another network call.
        if self.inner.refresh_generation.load(Ordering::Acquire) != observed {
            return self.valid_token();
        }

        let current = self.token()?;

        match self.request_refresh(&current).await {
            Ok(data) => {
                self.inner.refresh_generation.fetch_add(1, Ordering::AcqRel);
                self.set_token(&data.access_token, Duration::seconds(data.expires_in))
                    .await;
                if let Some(user) = data.user {
                    self.set_user(user).await;
                }
                tracing::info!("access token refreshed");
                self.token()
            }
            Err(message) => {
                tracing::warn!(%message, "token refresh failed, clearing session");
                self.inner.refresh_generation.fetch_add(1, Ordering::AcqRel);
                self.clear().await;
                None
            }
        }
    }

    /// Short-circuit to the current token while its remaining lifetime
    /// exceeds the margin; otherwise refresh.
    pub async fn auto_refresh(&self) -> Option<Secret> {
        if self.remaining() > self.inner.refresh_margin {
            return self.token();
        }
        self.refresh().await
    }

    /// Wipe in-memory and persisted session state, cancel any scheduled
    /// refresh, and best-effort tell the backend to invalidate the
    /// server-side refresh credential.
    pub async fn clear(&self) {
        if let Some(timer) = self.inner.refresh_timer.lock().take() {
            timer.abort();
        }

        let token = {
            let mut state = self.inner.state.write();
            state.expires_at = None;
            state.user = None;
            state.token.take()
        };
        self.inner.refresh_generation.fetch_add(1, Ordering::AcqRel);

        for key in [TOKEN_KEY, EXPIRY_KEY, USER_KEY] {
            if let Err(e) = self.inner.store.delete(key).await {
                tracing::warn!(key, "failed to delete persisted session state: {e}");
            }
        }

        // The refresh credential lives in an HTTP-only cookie; only the
        // server can drop it. Local clearing stands even when this fails.
        let url = format!("{}/auth/logout", self.inner.api_base_url);
        let mut request = self.inner.http.post(&url).timeout(self.inner.timeout);
        if let Some(token) = &token {
            request = request.bearer_auth(token.expose());
        }
        match request.send().await {
            Ok(_) => tracing::debug!("server-side refresh credential invalidated"),
            Err(e) => tracing::debug!("logout notification failed: {e}"),
        }
    }

    /// Restore persisted session state at startup.
    ///
    /// An expired-but-present token triggers a background refresh; its
    /// failure path clears the session.
    pub async fn initialize(&self) {
        let token = self.load(TOKEN_KEY).await;
        let expires_at = self
            .load(EXPIRY_KEY)
            .await
            .and_then(|raw| raw.parse::<i64>().ok())
            .and_then(|ts| DateTime::from_timestamp(ts, 0));
        let user = self.load(USER_KEY).await.and_then(|raw| {
            serde_json::from_str::<UserProfile>(&raw)
                .map_err(|e| tracing::warn!("persisted user profile is corrupt ({e}), ignoring"))
                .ok()
        });

        {
            let mut state = self.inner.state.write();
            state.token = token.map(Secret::new);
            state.expires_at = expires_at;
            state.user = user;
        }

        if self.token().is_some() && self.is_expired() {
            tracing::info!("persisted token is expired, refreshing in the background");
            let manager = self.clone();
            tokio::spawn(async move {
                if manager.refresh().await.is_none() {
                    tracing::warn!("token refresh on startup failed, session cleared");
                }
            });
        }
    }

    fn valid_token(&self) -> Option<Secret> {
        if self.is_valid() { self.token() } else { None }
    }

    async fn request_refresh(&self, token: &Secret) -> Result<AuthData, String> {
        let url = format!("{}/auth/refresh", self.inner.api_base_url);
        let response = self
            .inner
            .http
            .post(&url)
            .timeout(self.inner.timeout)
            .bearer_auth(token.expose())
            .send()
            .await
            .map_err(|e| format!("network error: {e}"))?;

        let status = response.status();
        if !status.is_success() {
            return Err(format!("refresh rejected with status {status}"));
        }

        let envelope: ApiEnvelope<AuthData> = response
            .json()
            .await
            .map_err(|e| format!("invalid refresh response: {e}"))?;
        envelope
            .into_result()
            .map_err(|f| f.to_string())?
            .ok_or_else(|| "refresh response missing payload".to_string())
    }

    async fn persist(&self, key: &str, value: &str) {
        if let Err(e) = self.inner.store.set(key, value).await {
            tracing::warn!(key, "failed to persist session state: {e}");
        }
    }

    async fn load(&self, key: &str) -> Option<String> {
        match self.inner.store.get(key).await {
            Ok(value) => value,
            Err(e) => {
                tracing::warn!(key, "failed to load persisted session state: {e}");
                None
            }
        }
    }
}

impl std::fmt::Debug for SessionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionManager")
            .field("logged_in", &self.is_logged_in())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn manager() -> SessionManager {
        let config = ClientConfig {
            // Nothing should talk to this in unit tests.
            api_base_url: "http://127.0.0.1:9".to_string(),
            ..ClientConfig::default()
        };
        SessionManager::new(&config, Arc::new(MemoryStore::new()))
    }

    #[tokio::test]
    async fn test_no_token_means_expired_and_logged_out() {
        let manager = manager();
        assert!(manager.is_expired());
        assert!(!manager.is_logged_in());
        assert_eq!(manager.remaining(), Duration::zero());
    }

    #[tokio::test]
    async fn test_set_token_makes_session_valid() {
        let manager = manager();
        manager.set_token("tok", Duration::hours(1)).await;

        assert!(manager.is_logged_in());
        assert!(!manager.is_expired());
        assert!(manager.remaining() > Duration::minutes(59));
        assert_eq!(manager.token().unwrap().expose(), "tok");
    }

    #[tokio::test]
    async fn test_negative_lifetime_is_expired() {
        let manager = manager();
        manager.set_token("tok", Duration::seconds(-10)).await;

        assert!(manager.is_expired());
        assert!(!manager.is_valid());
        assert_eq!(manager.remaining(), Duration::zero());
    }

    #[tokio::test]
    async fn test_auto_refresh_short_circuits_outside_margin() {
        let manager = manager();
        // Over the five-minute margin: no refresh, current token back.
        manager.set_token("tok", Duration::minutes(6)).await;

        let token = manager.auto_refresh().await;
        assert_eq!(token.unwrap().expose(), "tok");
    }

    #[tokio::test]
    async fn test_refresh_without_token_returns_none() {
        let manager = manager();
        assert!(manager.refresh().await.is_none());
    }

    #[tokio::test]
    async fn test_clear_wipes_persisted_state() {
        let store = Arc::new(MemoryStore::new());
        let config = ClientConfig {
            api_base_url: "http://127.0.0.1:9".to_string(),
            ..ClientConfig::default()
        };
        let manager = SessionManager::new(&config, store.clone());

        manager.set_token("tok", Duration::hours(1)).await;
        assert!(store.get(TOKEN_KEY).await.unwrap().is_some());

        manager.clear().await;
        assert!(manager.token().is_none());
        assert!(store.get(TOKEN_KEY).await.unwrap().is_none());
        assert!(store.get(EXPIRY_KEY).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_clones_share_state() {
        let manager = manager();
        let other = manager.clone();

        manager.set_token("shared", Duration::hours(1)).await;
        assert_eq!(other.token().unwrap().expose(), "shared");
    }
}
