//! Album domain: entity, forms, and store wiring.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use vellum_core::validate::{Issues, Validate, ValidationError};

use crate::resource::{Entity, EntityStatus, ResourceDomain, ResourceStore, SortOrder};

/// A photo album as the server returns it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Album {
    pub id: u64,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub creator: Option<String>,
    #[serde(default)]
    pub cover_id: Option<String>,
    #[serde(default)]
    pub cover_url: Option<String>,
    #[serde(default)]
    pub thumbnail_url: Option<String>,
    #[serde(default)]
    pub photo_count: u32,
    pub status: EntityStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Entity for Album {
    fn id(&self) -> u64 {
        self.id
    }

    fn name(&self) -> &str {
        &self.name
    }
}

impl Validate for Album {
    fn validate(&self) -> Result<(), ValidationError> {
        let mut issues = Issues::new();
        issues.ensure(self.id >= 1, "id must be positive");
        issues.ensure(
            !self.name.is_empty() && self.name.chars().count() <= 50,
            "name must be 1-50 characters",
        );
        if let Some(description) = &self.description {
            issues.ensure(
                description.chars().count() <= 200,
                "description must be at most 200 characters",
            );
        }
        issues.finish()
    }
}

/// Form for creating an album.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlbumForm {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub status: EntityStatus,
}

impl Validate for AlbumForm {
    fn validate(&self) -> Result<(), ValidationError> {
        let mut issues = Issues::new();
        let name = self.name.trim();
        issues.ensure(!name.is_empty(), "name must not be empty");
        issues.ensure(name.chars().count() <= 50, "name must be at most 50 characters");
        if let Some(description) = &self.description {
            issues.ensure(
                description.trim().chars().count() <= 200,
                "description must be at most 200 characters",
            );
        }
        issues.finish()
    }
}

/// Form for updating an album.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlbumUpdateForm {
    #[serde(skip_serializing)]
    pub id: u64,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<EntityStatus>,
}

impl Validate for AlbumUpdateForm {
    fn validate(&self) -> Result<(), ValidationError> {
        let mut issues = Issues::new();
        issues.ensure(self.id >= 1, "id must be positive");
        let name = self.name.trim();
        issues.ensure(!name.is_empty(), "name must not be empty");
        issues.ensure(name.chars().count() <= 50, "name must be at most 50 characters");
        issues.finish()
    }
}

/// Search form for the album listing.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlbumSearchForm {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub keyword: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<EntityStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sort: Option<SortOrder>,
}

impl Validate for AlbumSearchForm {
    fn validate(&self) -> Result<(), ValidationError> {
        let mut issues = Issues::new();
        if let Some(keyword) = &self.keyword {
            issues.ensure(
                keyword.chars().count() <= 50,
                "keyword must be at most 50 characters",
            );
        }
        issues.finish()
    }
}

/// Marker for the album endpoint set.
pub struct AlbumDomain;

impl ResourceDomain for AlbumDomain {
    type Entity = Album;
    type CreateForm = AlbumForm;
    type UpdateForm = AlbumUpdateForm;
    type SearchForm = AlbumSearchForm;

    const BASE_PATH: &'static str = "/album";
    const LABEL: &'static str = "album";

    fn update_id(form: &Self::UpdateForm) -> u64 {
        form.id
    }

    fn apply_update(entity: &mut Self::Entity, form: &Self::UpdateForm) {
        entity.name = form.name.clone();
        entity.description = form.description.clone();
        if let Some(status) = form.status {
            entity.status = status;
        }
    }
}

/// Cached album store.
pub type AlbumStore = ResourceStore<AlbumDomain>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_album_defaults_on_sparse_body() {
        let album: Album = serde_json::from_value(serde_json::json!({
            "id": 1,
            "name": "travel",
            "status": "active",
            "createdAt": "2024-05-01T08:00:00Z",
            "updatedAt": "2024-05-01T08:00:00Z"
        }))
        .unwrap();

        assert_eq!(album.photo_count, 0);
        assert!(album.cover_url.is_none());
        assert!(album.validate().is_ok());
    }
}
