//! Tag domain: entity, forms, and store wiring.
//!
//! Tags share the category shape on the wire but live under their own
//! endpoint set and carry their own (slightly looser) search rules.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use vellum_core::validate::{Issues, Validate, ValidationError, is_display_name, is_slug};

use crate::resource::{Entity, EntityStatus, ResourceDomain, ResourceStore, SortOrder};

/// A post tag as the server returns it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Tag {
    pub id: u64,
    pub name: String,
    pub slug: String,
    #[serde(default)]
    pub description: Option<String>,
    pub post_count: u32,
    pub order: u32,
    pub status: EntityStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Entity for Tag {
    fn id(&self) -> u64 {
        self.id
    }

    fn name(&self) -> &str {
        &self.name
    }
}

impl Validate for Tag {
    fn validate(&self) -> Result<(), ValidationError> {
        let mut issues = Issues::new();
        issues.ensure(self.id >= 1, "id must be positive");
        issues.ensure(
            is_display_name(&self.name) && self.name.chars().count() <= 50,
            "name must be 1-50 name characters",
        );
        issues.ensure(
            is_slug(&self.slug) && self.slug.chars().count() <= 50,
            "slug must be 1-50 slug characters",
        );
        if let Some(description) = &self.description {
            issues.ensure(
                description.chars().count() <= 500,
                "description must be at most 500 characters",
            );
        }
        issues.finish()
    }
}

/// Form for creating a tag.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TagForm {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub order: Option<u32>,
    pub status: EntityStatus,
}

impl Validate for TagForm {
    fn validate(&self) -> Result<(), ValidationError> {
        let mut issues = Issues::new();
        let name = self.name.trim();
        issues.ensure(!name.is_empty(), "name must not be empty");
        issues.ensure(name.chars().count() <= 50, "name must be at most 50 characters");
        issues.ensure(is_display_name(name), "name has invalid characters");
        if let Some(description) = &self.description {
            issues.ensure(
                description.trim().chars().count() <= 50,
                "description must be at most 50 characters",
            );
        }
        if let Some(order) = self.order {
            issues.ensure(order <= 999, "order must be at most 999");
        }
        issues.finish()
    }
}

/// Form for updating a tag.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TagUpdateForm {
    #[serde(skip_serializing)]
    pub id: u64,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub order: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<EntityStatus>,
}

impl Validate for TagUpdateForm {
    fn validate(&self) -> Result<(), ValidationError> {
        let mut issues = Issues::new();
        issues.ensure(self.id >= 1, "id must be positive");
        let name = self.name.trim();
        issues.ensure(!name.is_empty(), "name must not be empty");
        issues.ensure(name.chars().count() <= 50, "name must be at most 50 characters");
        issues.ensure(is_display_name(name), "name has invalid characters");
        if let Some(order) = self.order {
            issues.ensure(order <= 999, "order must be at most 999");
        }
        issues.finish()
    }
}

/// Search form for the tag listing.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TagSearchForm {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub keyword: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<EntityStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sort: Option<SortOrder>,
}

impl Validate for TagSearchForm {
    fn validate(&self) -> Result<(), ValidationError> {
        let mut issues = Issues::new();
        if let Some(keyword) = &self.keyword {
            issues.ensure(
                keyword.chars().count() <= 20,
                "keyword must be at most 20 characters",
            );
        }
        issues.finish()
    }
}

/// Marker for the tag endpoint set.
pub struct TagDomain;

impl ResourceDomain for TagDomain {
    type Entity = Tag;
    type CreateForm = TagForm;
    type UpdateForm = TagUpdateForm;
    type SearchForm = TagSearchForm;

    const BASE_PATH: &'static str = "/tag";
    const LABEL: &'static str = "tag";

    fn update_id(form: &Self::UpdateForm) -> u64 {
        form.id
    }

    fn apply_update(entity: &mut Self::Entity, form: &Self::UpdateForm) {
        entity.name = form.name.clone();
        entity.description = form.description.clone();
        if let Some(order) = form.order {
            entity.order = order;
        }
        if let Some(status) = form.status {
            entity.status = status;
        }
    }
}

/// Cached tag store.
pub type TagStore = ResourceStore<TagDomain>;
