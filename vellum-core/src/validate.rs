//! Validation at the network boundary.
//!
//! Outbound parameters and inbound payloads are checked against their
//! declared rules before they cross the wire. Callers only ever see the
//! generic "malformed request parameters" / "malformed server response"
//! errors; the field-level detail goes to the diagnostic log.

use std::fmt;

use crate::envelope::{ApiEnvelope, ListData, Pagination};
use crate::pipeline::ApiError;

/// A collected set of field-level validation issues.
#[derive(Debug)]
pub struct ValidationError {
    issues: Vec<String>,
}

impl ValidationError {
    pub fn issues(&self) -> &[String] {
        &self.issues
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.issues.join("; "))
    }
}

impl std::error::Error for ValidationError {}

/// Accumulator for validation issues.
///
/// ```
/// use vellum_core::validate::Issues;
///
/// let mut issues = Issues::new();
/// issues.ensure(2 + 2 == 4, "arithmetic is broken");
/// assert!(issues.finish().is_ok());
/// ```
#[derive(Debug, Default)]
pub struct Issues(Vec<String>);

impl Issues {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    pub fn add(&mut self, message: impl Into<String>) {
        self.0.push(message.into());
    }

    pub fn ensure(&mut self, ok: bool, message: &str) {
        if !ok {
            self.add(message);
        }
    }

    pub fn finish(self) -> Result<(), ValidationError> {
        if self.0.is_empty() {
            Ok(())
        } else {
            Err(ValidationError { issues: self.0 })
        }
    }
}

/// A value that can check itself against its declared rules.
///
/// Implementations are pure: no coercion beyond what the type already
/// declares (trimmed strings, defaults), no side effects.
pub trait Validate {
    fn validate(&self) -> Result<(), ValidationError>;
}

impl Validate for () {
    fn validate(&self) -> Result<(), ValidationError> {
        Ok(())
    }
}

impl Validate for Pagination {
    fn validate(&self) -> Result<(), ValidationError> {
        let mut issues = Issues::new();
        issues.ensure(self.page >= 1, "page must be at least 1");
        issues.ensure(self.page_size >= 1, "pageSize must be at least 1");
        issues.finish()
    }
}

impl<T: Validate> Validate for ListData<T> {
    fn validate(&self) -> Result<(), ValidationError> {
        self.pagination.validate()?;
        for item in &self.list {
            item.validate()?;
        }
        Ok(())
    }
}

/// Character set allowed in display names: letters, digits, underscore,
/// hyphen, space, and CJK ideographs.
pub fn is_display_name(value: &str) -> bool {
    !value.is_empty()
        && value.chars().all(|c| {
            c.is_ascii_alphanumeric()
                || c == '_'
                || c == '-'
                || c == ' '
                || ('\u{4e00}'..='\u{9fa5}').contains(&c)
        })
}

/// Slug character set: lowercase letters, digits, hyphen.
pub fn is_slug(value: &str) -> bool {
    !value.is_empty()
        && value
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
}

/// Minimal email shape check: one `@`, non-empty local part, dotted domain.
pub fn is_email(value: &str) -> bool {
    let mut parts = value.splitn(2, '@');
    match (parts.next(), parts.next()) {
        (Some(local), Some(domain)) => {
            !local.is_empty()
                && !domain.is_empty()
                && domain.contains('.')
                && !domain.starts_with('.')
                && !domain.ends_with('.')
        }
        _ => false,
    }
}

/// Validate outbound request parameters.
///
/// On failure the detail is logged and the caller gets the generic
/// [`ApiError::InvalidRequest`].
pub fn validate_request<T: Validate>(value: &T) -> Result<(), ApiError> {
    if let Err(err) = value.validate() {
        tracing::warn!(detail = %err, "outbound request parameters failed validation");
        return Err(ApiError::InvalidRequest);
    }
    Ok(())
}

/// Validate an inbound response envelope and its payload.
///
/// Checks the envelope invariants (success bodies carry code 200; failure
/// bodies carry a 4xx/5xx code and no data) and runs the payload's own
/// rules. Failures are logged in detail and surfaced as the generic
/// [`ApiError::InvalidResponse`].
pub fn validate_response<T: Validate>(envelope: &ApiEnvelope<T>) -> Result<(), ApiError> {
    let mut issues = Issues::new();
    if envelope.success {
        issues.ensure(envelope.code == 200, "success body must carry code 200");
    } else {
        issues.ensure(
            (400..600).contains(&envelope.code),
            "failure body must carry a 4xx or 5xx code",
        );
        issues.ensure(envelope.data.is_none(), "failure body must not carry data");
    }
    if let Err(err) = issues.finish() {
        tracing::warn!(detail = %err, code = envelope.code, "inbound response failed envelope validation");
        return Err(ApiError::InvalidResponse);
    }

    if let Some(data) = &envelope.data {
        if let Err(err) = data.validate() {
            tracing::warn!(detail = %err, "inbound response payload failed validation");
            return Err(ApiError::InvalidResponse);
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Named(String);

    impl Validate for Named {
        fn validate(&self) -> Result<(), ValidationError> {
            let mut issues = Issues::new();
            issues.ensure(is_display_name(&self.0), "name has invalid characters");
            issues.finish()
        }
    }

    #[test]
    fn test_display_name_charset() {
        assert!(is_display_name("Rust Notes"));
        assert!(is_display_name("rust_notes-2024"));
        assert!(is_display_name("技术分享"));
        assert!(!is_display_name(""));
        assert!(!is_display_name("notes/2024"));
    }

    #[test]
    fn test_slug_charset() {
        assert!(is_slug("rust-notes-2024"));
        assert!(!is_slug("Rust-Notes"));
        assert!(!is_slug("rust notes"));
        assert!(!is_slug(""));
    }

    #[test]
    fn test_email_shape() {
        assert!(is_email("admin@example.com"));
        assert!(!is_email("admin"));
        assert!(!is_email("@example.com"));
        assert!(!is_email("admin@com"));
        assert!(!is_email("admin@.com"));
    }

    #[test]
    fn test_validate_request_generic_error() {
        let bad = Named("no/slashes".to_string());
        let err = validate_request(&bad).unwrap_err();
        assert!(matches!(err, ApiError::InvalidRequest));
    }

    #[test]
    fn test_validate_response_rejects_failure_with_data() {
        let envelope = ApiEnvelope {
            code: 403,
            success: false,
            message: None,
            data: Some(Named("x".to_string())),
        };
        assert!(matches!(
            validate_response(&envelope),
            Err(ApiError::InvalidResponse)
        ));
    }

    #[test]
    fn test_validate_response_rejects_success_with_error_code() {
        let envelope: ApiEnvelope<Named> = ApiEnvelope {
            code: 500,
            success: true,
            message: None,
            data: None,
        };
        assert!(matches!(
            validate_response(&envelope),
            Err(ApiError::InvalidResponse)
        ));
    }

    #[test]
    fn test_validate_response_accepts_payload_free_success() {
        let envelope: ApiEnvelope<()> = ApiEnvelope {
            code: 200,
            success: true,
            message: Some("deleted".to_string()),
            data: None,
        };
        assert!(validate_response(&envelope).is_ok());
    }
}
