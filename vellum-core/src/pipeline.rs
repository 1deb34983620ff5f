//! The request pipeline.
//!
//! Every outbound call flows through [`ApiClient`], which:
//! - attaches the bearer credential, refreshing it first when expired;
//! - retries a 401 exactly once after a refresh, then escalates to a
//!   forced logout;
//! - redelivers transport and non-401 HTTP failures per the configured
//!   retry policy, with the attempt state in an explicit [`RetryContext`]
//!   rather than hidden flags on the request;
//! - registers each dispatch with the [`RequestTracker`] unless the path
//!   is auth-exempt;
//! - folds terminal failures into user-visible [`ClientEvent`] notices.

use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;
use thiserror::Error;

use crate::config::{ClientConfig, RetryConfig};
use crate::envelope::{ApiEnvelope, Failure};
use crate::events::ClientEvents;
use crate::session::Secret;
use crate::session_manager::SessionManager;
use crate::tracker::RequestTracker;

/// Errors produced at the request boundary.
///
/// Validation detail never appears here; it lives in the diagnostic log
/// and callers see only the generic variants.
#[derive(Debug, Error)]
pub enum ApiError {
    /// The credential is gone for good; the session was cleared.
    #[error("session expired, sign in again")]
    SessionExpired,

    /// Outbound parameters failed validation.
    #[error("malformed request parameters")]
    InvalidRequest,

    /// The response body failed decoding or validation.
    #[error("malformed server response")]
    InvalidResponse,

    /// Non-2xx HTTP status after retries were exhausted.
    #[error("request failed with status {status}: {message}")]
    Http { status: u16, message: String },

    /// Network-level failure after retries were exhausted.
    #[error("network error: {0}")]
    Transport(String),
}

impl From<ApiError> for Failure {
    fn from(err: ApiError) -> Self {
        match &err {
            ApiError::Http { status, message } => Failure::new(*status, message.clone()),
            ApiError::SessionExpired => Failure::new(401, err.to_string()),
            ApiError::InvalidRequest => Failure::new(400, err.to_string()),
            ApiError::InvalidResponse => Failure::new(502, err.to_string()),
            ApiError::Transport(_) => Failure::new(500, err.to_string()),
        }
    }
}

/// Explicit per-request retry state, threaded through the dispatch loop.
#[derive(Debug)]
struct RetryContext {
    enabled: bool,
    attempt: u32,
    max_attempts: u32,
    delay: std::time::Duration,
    /// Whether this request already got its one post-refresh redelivery.
    auth_retried: bool,
}

impl RetryContext {
    fn new(config: &RetryConfig) -> Self {
        Self {
            enabled: config.enabled,
            attempt: 0,
            max_attempts: config.count,
            delay: config.delay(),
            auth_retried: false,
        }
    }

    fn can_retry(&self) -> bool {
        self.enabled && self.attempt < self.max_attempts
    }

    fn record_attempt(&mut self) {
        self.attempt += 1;
    }
}

/// An in-memory description of a request, rebuilt into a fresh
/// `reqwest::Request` on every delivery attempt.
struct RequestSpec {
    method: Method,
    path: String,
    query: Option<serde_json::Value>,
    body: Option<serde_json::Value>,
    multipart: Option<FilePart>,
}

struct FilePart {
    field: &'static str,
    file_name: String,
    bytes: Vec<u8>,
    mime: String,
}

/// The authenticated, retrying HTTP client every store dispatches through.
pub struct ApiClient {
    http: reqwest::Client,
    config: ClientConfig,
    session: SessionManager,
    tracker: RequestTracker,
    events: ClientEvents,
}

impl ApiClient {
    pub fn new(config: ClientConfig, session: SessionManager, events: ClientEvents) -> Self {
        Self {
            http: reqwest::Client::new(),
            config,
            session,
            tracker: RequestTracker::new(),
            events,
        }
    }

    pub fn session(&self) -> &SessionManager {
        &self.session
    }

    pub fn tracker(&self) -> &RequestTracker {
        &self.tracker
    }

    pub fn events(&self) -> &ClientEvents {
        &self.events
    }

    pub async fn get<T: DeserializeOwned>(
        &self,
        path: &str,
        query: Option<serde_json::Value>,
    ) -> Result<ApiEnvelope<T>, ApiError> {
        self.dispatch(RequestSpec {
            method: Method::GET,
            path: path.to_string(),
            query,
            body: None,
            multipart: None,
        })
        .await
    }

    pub async fn post<T: DeserializeOwned>(
        &self,
        path: &str,
        body: Option<serde_json::Value>,
    ) -> Result<ApiEnvelope<T>, ApiError> {
        self.dispatch(RequestSpec {
            method: Method::POST,
            path: path.to_string(),
            query: None,
            body,
            multipart: None,
        })
        .await
    }

    pub async fn put<T: DeserializeOwned>(
        &self,
        path: &str,
        body: Option<serde_json::Value>,
    ) -> Result<ApiEnvelope<T>, ApiError> {
        self.dispatch(RequestSpec {
            method: Method::PUT,
            path: path.to_string(),
            query: None,
            body,
            multipart: None,
        })
        .await
    }

    pub async fn patch<T: DeserializeOwned>(
        &self,
        path: &str,
        body: Option<serde_json::Value>,
    ) -> Result<ApiEnvelope<T>, ApiError> {
        self.dispatch(RequestSpec {
            method: Method::PATCH,
            path: path.to_string(),
            query: None,
            body,
            multipart: None,
        })
        .await
    }

    pub async fn delete<T: DeserializeOwned>(
        &self,
        path: &str,
        query: Option<serde_json::Value>,
    ) -> Result<ApiEnvelope<T>, ApiError> {
        self.dispatch(RequestSpec {
            method: Method::DELETE,
            path: path.to_string(),
            query,
            body: None,
            multipart: None,
        })
        .await
    }

    /// POST a single file as a multipart form.
    pub async fn post_multipart<T: DeserializeOwned>(
        &self,
        path: &str,
        field: &'static str,
        file_name: &str,
        mime: &str,
        bytes: Vec<u8>,
    ) -> Result<ApiEnvelope<T>, ApiError> {
        self.dispatch(RequestSpec {
            method: Method::POST,
            path: path.to_string(),
            query: None,
            body: None,
            multipart: Some(FilePart {
                field,
                file_name: file_name.to_string(),
                bytes,
                mime: mime.to_string(),
            }),
        })
        .await
    }

    async fn dispatch<T: DeserializeOwned>(
        &self,
        spec: RequestSpec,
    ) -> Result<ApiEnvelope<T>, ApiError> {
        let _guard = self.tracker.track(&spec.path);
        let mut bearer = self.prepare_credential().await?;
        let mut ctx = RetryContext::new(&self.config.retry);

        loop {
            let request = self.build_request(&spec, bearer.as_ref())?;
            let response = match request.send().await {
                Ok(response) => response,
                Err(e) => {
                    if ctx.can_retry() {
                        ctx.record_attempt();
                        tracing::warn!(
                            attempt = ctx.attempt,
                            max = ctx.max_attempts,
                            path = %spec.path,
                            "transport error ({e}), redelivering"
                        );
                        tokio::time::sleep(ctx.delay).await;
                        continue;
                    }
                    let err = ApiError::Transport(e.to_string());
                    self.events.error(err.to_string());
                    return Err(err);
                }
            };

            let status = response.status();
            if status == StatusCode::UNAUTHORIZED {
                if ctx.auth_retried {
                    // The refreshed credential was rejected too; a further
                    // refresh could loop forever.
                    tracing::warn!(path = %spec.path, "rejected again after refresh, forcing logout");
                    self.session.clear().await;
                    self.escalate_session_expired();
                    return Err(ApiError::SessionExpired);
                }
                ctx.auth_retried = true;
                match self.session.refresh().await {
                    Some(fresh) => {
                        tracing::debug!(path = %spec.path, "credential refreshed after 401, redelivering");
                        bearer = Some(fresh);
                        continue;
                    }
                    None => {
                        // refresh() already cleared the session.
                        self.escalate_session_expired();
                        return Err(ApiError::SessionExpired);
                    }
                }
            }

            if !status.is_success() {
                let message = Self::extract_message(response).await;
                if ctx.can_retry() {
                    ctx.record_attempt();
                    tracing::warn!(
                        attempt = ctx.attempt,
                        max = ctx.max_attempts,
                        path = %spec.path,
                        status = status.as_u16(),
                        "request failed, redelivering"
                    );
                    tokio::time::sleep(ctx.delay).await;
                    continue;
                }
                let err = ApiError::Http {
                    status: status.as_u16(),
                    message: message.clone(),
                };
                self.events.error(message);
                return Err(err);
            }

            return response.json::<ApiEnvelope<T>>().await.map_err(|e| {
                tracing::warn!(path = %spec.path, "failed to decode response body: {e}");
                ApiError::InvalidResponse
            });
        }
    }

    /// Resolve the credential to attach before dispatch.
    ///
    /// No token: proceed unauthenticated. Valid token: attach it. Expired
    /// token: refresh first; a failed refresh aborts the request and ends
    /// the session.
    async fn prepare_credential(&self) -> Result<Option<Secret>, ApiError> {
        let Some(token) = self.session.token() else {
            return Ok(None);
        };
        if !self.session.is_expired() {
            return Ok(Some(token));
        }

        match self.session.refresh().await {
            Some(fresh) => Ok(Some(fresh)),
            None => {
                self.escalate_session_expired();
                Err(ApiError::SessionExpired)
            }
        }
    }

    fn escalate_session_expired(&self) {
        self.events.error("session expired, sign in again");
        self.events.session_expired();
    }

    fn build_request(
        &self,
        spec: &RequestSpec,
        bearer: Option<&Secret>,
    ) -> Result<reqwest::RequestBuilder, ApiError> {
        let url = format!(
            "{}{}",
            self.config.api_base_url.trim_end_matches('/'),
            spec.path
        );
        let mut request = self
            .http
            .request(spec.method.clone(), &url)
            .timeout(self.config.timeout());

        if let Some(token) = bearer {
            request = request.bearer_auth(token.expose());
        }
        if let Some(query) = &spec.query {
            request = request.query(query);
        }
        if let Some(body) = &spec.body {
            request = request.json(body);
        }
        if let Some(part) = &spec.multipart {
            let file = reqwest::multipart::Part::bytes(part.bytes.clone())
                .file_name(part.file_name.clone())
                .mime_str(&part.mime)
                .map_err(|e| {
                    tracing::warn!("invalid mime type {:?}: {e}", part.mime);
                    ApiError::InvalidRequest
                })?;
            request = request.multipart(reqwest::multipart::Form::new().part(part.field, file));
        }

        Ok(request)
    }

    /// Pull the server-supplied message out of an error body, falling back
    /// to a generic phrase when the body is not a parseable envelope.
    async fn extract_message(response: reqwest::Response) -> String {
        match response.json::<ApiEnvelope<serde_json::Value>>().await {
            Ok(envelope) if !envelope.message().is_empty() => envelope.message().to_string(),
            _ => "request failed".to_string(),
        }
    }
}

impl std::fmt::Debug for ApiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiClient")
            .field("api_base_url", &self.config.api_base_url)
            .finish()
    }
}
