//! Wire contract shared by every Vellum backend endpoint.
//!
//! This module defines:
//! - [`ApiEnvelope`] - The `{code, success, message, data}` body every
//!   endpoint exchanges
//! - [`Pagination`] - Server-side paging metadata
//! - [`ListData`] - A page of entities plus its pagination
//! - [`Failure`] - The uniform tagged failure value store methods resolve to

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Envelope wrapping every backend JSON body.
///
/// Successful responses carry `code: 200, success: true` and a payload in
/// `data`; business failures carry `success: false`, an error `code` in the
/// 400-599 range, and `data: null`. Endpoints that return nothing on success
/// (deletes) also leave `data` null.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiEnvelope<T> {
    /// Business status code (mirrors HTTP conventions).
    pub code: u16,

    /// Whether the operation succeeded at the business level.
    pub success: bool,

    /// Optional human-readable message from the server.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,

    /// The payload; `None` on failure and for payload-free successes.
    #[serde(default = "Option::default")]
    pub data: Option<T>,
}

impl<T> ApiEnvelope<T> {
    /// Split the envelope into its business outcome.
    ///
    /// `Ok(Some(data))` for successes with a payload, `Ok(None)` for
    /// payload-free successes, and `Err(Failure)` carrying the server's
    /// code/message for `success: false` bodies.
    pub fn into_result(self) -> Result<Option<T>, Failure> {
        if self.success {
            Ok(self.data)
        } else {
            Err(Failure::new(
                self.code,
                self.message
                    .unwrap_or_else(|| "request rejected by server".to_string()),
            ))
        }
    }

    /// The server message, or an empty string when absent.
    pub fn message(&self) -> &str {
        self.message.as_deref().unwrap_or("")
    }
}

/// Paging metadata attached to list responses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pagination {
    pub page: u32,
    pub page_size: u32,
    pub total: u64,
    #[serde(default)]
    pub total_pages: u32,
    #[serde(default)]
    pub has_next: bool,
    #[serde(default)]
    pub has_prev: bool,
}

impl Default for Pagination {
    fn default() -> Self {
        Self {
            page: 1,
            page_size: 10,
            total: 0,
            total_pages: 0,
            has_next: false,
            has_prev: false,
        }
    }
}

/// One page of entities as returned by list/search endpoints.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListData<T> {
    pub list: Vec<T>,
    pub pagination: Pagination,
}

/// Uniform failure value.
///
/// Every store method folds its failure paths (transport errors, validation
/// errors, business `success: false` bodies) into this one shape, so callers
/// match on `Result<T, Failure>` instead of distinguishing error channels.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("[{code}] {message}")]
pub struct Failure {
    pub code: u16,
    pub message: String,
}

impl Failure {
    pub fn new(code: u16, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    /// Failure for a success body that should have carried a payload.
    pub fn missing_data() -> Self {
        Self::new(502, "malformed server response")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_envelope_success_into_result() {
        let envelope = ApiEnvelope {
            code: 200,
            success: true,
            message: Some("success".to_string()),
            data: Some(42u32),
        };
        assert_eq!(envelope.into_result().unwrap(), Some(42));
    }

    #[test]
    fn test_envelope_failure_into_result() {
        let envelope: ApiEnvelope<u32> = ApiEnvelope {
            code: 403,
            success: false,
            message: Some("forbidden".to_string()),
            data: None,
        };
        let failure = envelope.into_result().unwrap_err();
        assert_eq!(failure, Failure::new(403, "forbidden"));
    }

    #[test]
    fn test_envelope_failure_without_message() {
        let envelope: ApiEnvelope<u32> = ApiEnvelope {
            code: 500,
            success: false,
            message: None,
            data: None,
        };
        let failure = envelope.into_result().unwrap_err();
        assert_eq!(failure.code, 500);
        assert!(!failure.message.is_empty());
    }

    #[test]
    fn test_envelope_deserializes_missing_fields() {
        let envelope: ApiEnvelope<u32> =
            serde_json::from_str(r#"{"code":200,"success":true}"#).unwrap();
        assert!(envelope.message.is_none());
        assert!(envelope.data.is_none());
    }

    #[test]
    fn test_pagination_defaults() {
        let pagination: Pagination =
            serde_json::from_str(r#"{"page":2,"pageSize":20,"total":55}"#).unwrap();
        assert_eq!(pagination.page, 2);
        assert_eq!(pagination.page_size, 20);
        assert_eq!(pagination.total, 55);
        assert_eq!(pagination.total_pages, 0);
        assert!(!pagination.has_next);
    }
}
