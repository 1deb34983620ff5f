//! # Vellum Core
//!
//! Client-side core for the Vellum blog admin console.
//!
//! This crate provides:
//! - Session/token lifecycle with single-flight refresh coordination
//! - A validated request pipeline with auth attachment and bounded retry
//! - In-flight request tracking for a global "settled" signal
//! - Persisted client-state backends (memory, file, optionally keyring)
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use vellum_core::{ApiClient, ClientConfig, ClientEvents, SessionManager, store};
//!
//! let config = ClientConfig::load()?;
//! let state = Arc::from(store::create_store(None, false));
//! let session = SessionManager::new(&config, state);
//! session.initialize().await;
//! let api = Arc::new(ApiClient::new(config, session.clone(), ClientEvents::new()));
//! ```

pub mod config;
pub mod envelope;
pub mod error;
pub mod events;
pub mod pipeline;
pub mod session;
pub mod session_manager;
pub mod store;
pub mod tracker;
pub mod validate;

// Re-export commonly used types at crate root
pub use config::{ClientConfig, ConfigError, RetryConfig};

pub use envelope::{ApiEnvelope, Failure, ListData, Pagination};

pub use events::{ClientEvent, ClientEvents, NoticeLevel};

pub use pipeline::{ApiClient, ApiError};

pub use session::{AuthData, Secret, UserProfile};

pub use session_manager::SessionManager;

pub use store::{FileStore, MemoryStore, StateStore, StateStoreError, create_store};

#[cfg(feature = "keyring-store")]
pub use store::KeyringStore;

pub use tracker::{RequestTracker, TrackGuard};

pub use validate::{Validate, ValidationError, validate_request, validate_response};

pub use error::VellumError;
