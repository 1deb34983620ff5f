//! The login flow.
//!
//! [`AuthStore`] fetches the login nonce, validates and submits the
//! credential form, and hands the minted token to the session manager
//! (which schedules the proactive refresh). Logout simply delegates to
//! the session manager's clear.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use vellum_core::envelope::{ApiEnvelope, Failure};
use vellum_core::pipeline::ApiClient;
use vellum_core::session::{AuthData, UserProfile};
use vellum_core::validate::{Issues, Validate, ValidationError, is_email, validate_request, validate_response};

/// Credential form submitted to `/auth/login`.
#[derive(Debug, Clone, Serialize)]
pub struct LoginForm {
    pub email: String,
    pub password: String,
    pub nonce: String,
}

impl Validate for LoginForm {
    fn validate(&self) -> Result<(), ValidationError> {
        let mut issues = Issues::new();
        issues.ensure(is_email(&self.email), "email is not a valid address");
        issues.ensure(
            !self.password.is_empty() && self.password.chars().count() <= 50,
            "password must be 1-50 characters",
        );
        issues.ensure(
            self.password.chars().all(|c| {
                c.is_ascii_alphanumeric()
                    || c == '.'
                    || c == '_'
                    || c == '-'
                    || ('\u{4e00}'..='\u{9fa5}').contains(&c)
            }),
            "password has invalid characters",
        );
        issues.ensure(!self.nonce.is_empty(), "nonce must not be empty");
        issues.finish()
    }
}

#[derive(Debug, Clone, Deserialize)]
struct NonceData {
    nonce: String,
}

impl Validate for NonceData {
    fn validate(&self) -> Result<(), ValidationError> {
        let mut issues = Issues::new();
        issues.ensure(!self.nonce.is_empty(), "nonce must not be empty");
        issues.finish()
    }
}

/// Authentication state and operations.
pub struct AuthStore {
    api: Arc<ApiClient>,
    nonce: Mutex<Option<String>>,
}

impl AuthStore {
    pub fn new(api: Arc<ApiClient>) -> Self {
        Self {
            api,
            nonce: Mutex::new(None),
        }
    }

    /// Whether a valid session is held (proxies the session manager).
    pub fn is_authenticated(&self) -> bool {
        self.api.session().is_logged_in()
    }

    /// The authenticated user, when known.
    pub fn current_user(&self) -> Option<UserProfile> {
        self.api.session().user()
    }

    /// Fetch and cache a login nonce.
    pub async fn fetch_nonce(&self) -> Result<String, Failure> {
        let envelope: ApiEnvelope<NonceData> =
            self.api.get("/auth/nonce", None).await.map_err(Failure::from)?;
        validate_response(&envelope).map_err(Failure::from)?;
        let data = envelope
            .into_result()?
            .ok_or_else(Failure::missing_data)?;

        *self.nonce.lock() = Some(data.nonce.clone());
        Ok(data.nonce)
    }

    /// Log in with email and password.
    ///
    /// A cached nonce is consumed (a fresh one is fetched when absent), so
    /// a failed attempt never reuses one. On success the session manager
    /// stores the token with its auto-refresh schedule and the profile.
    pub async fn login(&self, email: &str, password: &str) -> Result<Option<UserProfile>, Failure> {
        // fetch_nonce locks the same mutex, so the guard must be gone
        // before the await.
        let cached = self.nonce.lock().take();
        let nonce = match cached {
            Some(nonce) => nonce,
            None => self.fetch_nonce().await?,
        };
        *self.nonce.lock() = None;

        let form = LoginForm {
            email: email.to_string(),
            password: password.to_string(),
            nonce,
        };
        validate_request(&form).map_err(Failure::from)?;

        let body = serde_json::to_value(&form)
            .map_err(|_| Failure::new(400, "malformed request parameters"))?;
        let envelope: ApiEnvelope<AuthData> = self
            .api
            .post("/auth/login", Some(body))
            .await
            .map_err(Failure::from)?;
        validate_response(&envelope).map_err(Failure::from)?;

        let data = envelope
            .into_result()
            .inspect_err(|failure| {
                tracing::warn!(%failure, "login rejected");
            })?
            .ok_or_else(Failure::missing_data)?;

        let session = self.api.session();
        session
            .set_token_with_auto_refresh(&data.access_token, chrono::Duration::seconds(data.expires_in))
            .await;
        if let Some(user) = data.user.clone() {
            session.set_user(user).await;
        }

        tracing::info!("login succeeded");
        Ok(data.user)
    }

    /// End the session locally and (best-effort) server-side.
    pub async fn logout(&self) {
        self.api.session().clear().await;
        *self.nonce.lock() = None;
    }
}

impl std::fmt::Debug for AuthStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthStore")
            .field("authenticated", &self.is_authenticated())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_login_form_validation() {
        let form = LoginForm {
            email: "admin@example.com".to_string(),
            password: "pass.word_1".to_string(),
            nonce: "abc".to_string(),
        };
        assert!(form.validate().is_ok());

        let bad = LoginForm {
            email: "not-an-email".to_string(),
            password: "p@ss!".to_string(),
            nonce: String::new(),
        };
        let err = bad.validate().unwrap_err();
        assert_eq!(err.issues().len(), 3);
    }
}
