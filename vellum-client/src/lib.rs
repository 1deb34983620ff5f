//! # Vellum Client
//!
//! Domain stores for the Vellum blog admin console.
//!
//! This crate provides:
//! - The generic cached resource-store pattern and its category, tag, and
//!   album instantiations
//! - The login flow ([`AuthStore`])
//! - Article-image uploads ([`UploadApi`])
//! - Local draft-session bookkeeping ([`DraftSessions`])
//!
//! Everything dispatches through [`vellum_core`]'s request pipeline; every
//! store method resolves to `Result<T, Failure>` so callers never have to
//! distinguish transport, validation, and business failures.

pub mod album;
pub mod auth;
pub mod category;
pub mod draft;
pub mod resource;
pub mod tag;
pub mod upload;

// Re-export commonly used types at crate root
pub use resource::{
    Entity,
    EntityRef,
    EntityStatus,
    ListParams,
    ResourceDomain,
    ResourceStore,
    SortOrder,
};

pub use category::{
    Category,
    CategoryDomain,
    CategoryForm,
    CategorySearchForm,
    CategoryStore,
    CategoryUpdateForm,
};

pub use tag::{Tag, TagDomain, TagForm, TagSearchForm, TagStore, TagUpdateForm};

pub use album::{Album, AlbumDomain, AlbumForm, AlbumSearchForm, AlbumStore, AlbumUpdateForm};

pub use auth::{AuthStore, LoginForm};

pub use upload::{ArticleImage, UploadApi};

pub use draft::{DraftData, DraftError, DraftSessionMeta, DraftSessions};
