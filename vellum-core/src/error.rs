//! Top-level error type for Vellum core.

use thiserror::Error;

use crate::config::ConfigError;
use crate::pipeline::ApiError;
use crate::store::StateStoreError;
use crate::validate::ValidationError;

/// Top-level error type encompassing all core errors.
#[derive(Debug, Error)]
pub enum VellumError {
    /// Error at the request boundary.
    #[error("api error: {0}")]
    Api(#[from] ApiError),

    /// Error from persisted-state storage.
    #[error("store error: {0}")]
    Store(#[from] StateStoreError),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Validation error.
    #[error("validation error: {0}")]
    Validation(#[from] ValidationError),
}
