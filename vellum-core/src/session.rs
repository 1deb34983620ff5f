//! Session domain types.
//!
//! This module defines:
//! - [`Secret`] - A wrapper for the bearer credential that prevents
//!   accidental logging and zeroes its memory on drop
//! - [`UserProfile`] - The last-known authenticated user profile
//! - [`AuthData`] - The payload returned by login and refresh endpoints

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::validate::{Issues, Validate, ValidationError};

/// A secret value that prevents accidental exposure in logs.
///
/// The inner value is only accessible via [`expose()`](Secret::expose).
/// Debug and Display implementations show `[REDACTED]`, and the backing
/// memory is zeroed when the value is dropped.
#[derive(Clone, Serialize, Deserialize, Zeroize, ZeroizeOnDrop)]
pub struct Secret(String);

impl Secret {
    /// Create a new secret from a string value.
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Expose the secret value.
    ///
    /// Use sparingly and never log the result.
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for Secret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Secret([REDACTED])")
    }
}

impl std::fmt::Display for Secret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[REDACTED]")
    }
}

impl PartialEq for Secret {
    fn eq(&self, other: &Self) -> bool {
        self.0 == other.0
    }
}

impl Eq for Secret {}

/// Profile of the authenticated user, persisted alongside the credential.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub id: u64,
    pub short_id: String,
    pub nickname: String,
    pub email: String,
    #[serde(default)]
    pub bio: String,
    #[serde(default)]
    pub avatar: String,
    #[serde(default)]
    pub gender: String,
    pub created_at: DateTime<Utc>,
}

/// Payload of a successful login or refresh.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthData {
    /// Updated profile, when the server includes one.
    #[serde(default)]
    pub user: Option<UserProfile>,

    /// The freshly minted bearer credential.
    pub access_token: String,

    /// Lifetime of the credential, in seconds.
    pub expires_in: i64,
}

impl Validate for AuthData {
    fn validate(&self) -> Result<(), ValidationError> {
        let mut issues = Issues::new();
        issues.ensure(!self.access_token.is_empty(), "accessToken must not be empty");
        issues.ensure(self.expires_in > 0, "expiresIn must be positive");
        issues.finish()
    }
}
