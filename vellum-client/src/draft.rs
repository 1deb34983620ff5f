//! Draft-session bookkeeping for the article editor.
//!
//! Each edit session gets a generated id tied to a user and (for edits of
//! existing posts) an article. The draft blob itself - form fields plus
//! editor content - is stored under the session id. Sessions expire after
//! seven days; corrupt records are surfaced as [`DraftError::Corrupt`] for
//! the caller to turn into a "corrupt draft" notice, never a crash.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

use vellum_core::store::{StateStore, StateStoreError};

const SESSION_KEY_PREFIX: &str = "vellum/draft/session/";
const DRAFT_KEY_PREFIX: &str = "vellum/draft/data/";

const SESSION_EXPIRE_DAYS: i64 = 7;

/// Errors from draft-session operations.
#[derive(Debug, Error)]
pub enum DraftError {
    /// A persisted draft blob failed to parse.
    #[error("draft data is corrupt")]
    Corrupt {
        #[source]
        source: serde_json::Error,
    },

    /// The underlying state store failed.
    #[error("storage error: {0}")]
    Store(#[from] StateStoreError),
}

/// Bookkeeping record for one edit session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DraftSessionMeta {
    pub session_id: Uuid,
    pub article_id: Option<String>,
    pub user_id: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl DraftSessionMeta {
    fn expired(&self, ttl: Duration) -> bool {
        Utc::now() - self.created_at > ttl
    }
}

/// A saved draft: the form snapshot plus the editor content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DraftData {
    pub form: serde_json::Value,
    pub content: String,
    pub updated_at: DateTime<Utc>,
}

/// Draft-session storage on top of a [`StateStore`].
pub struct DraftSessions {
    store: Arc<dyn StateStore>,
    ttl: Duration,
}

impl DraftSessions {
    pub fn new(store: Arc<dyn StateStore>) -> Self {
        Self {
            store,
            ttl: Duration::days(SESSION_EXPIRE_DAYS),
        }
    }

    /// Override the session TTL (default seven days).
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    /// Get the current session id for a user/article pair, creating a new
    /// session when none exists, the stored one expired, or its record is
    /// unreadable.
    pub async fn get_or_create_session(
        &self,
        article_id: Option<&str>,
        user_id: &str,
    ) -> Result<Uuid, DraftError> {
        let key = meta_key(article_id, user_id);

        if let Some(raw) = self.store.get(&key).await? {
            match serde_json::from_str::<DraftSessionMeta>(&raw) {
                Ok(meta) if !meta.expired(self.ttl) => return Ok(meta.session_id),
                Ok(meta) => {
                    tracing::debug!(session_id = %meta.session_id, "edit session expired, rotating");
                }
                Err(e) => {
                    tracing::warn!(%key, "edit session record is corrupt ({e}), rotating");
                }
            }
        }

        self.create_session(article_id, user_id, &key).await
    }

    /// Refresh a session's `updated_at`, or register the given id.
    pub async fn touch_session(
        &self,
        article_id: Option<&str>,
        user_id: &str,
        session_id: Option<Uuid>,
    ) -> Result<Uuid, DraftError> {
        let key = meta_key(article_id, user_id);
        let session_id = session_id.unwrap_or_else(Uuid::new_v4);

        let created_at = match self.store.get(&key).await? {
            Some(raw) => serde_json::from_str::<DraftSessionMeta>(&raw)
                .map(|meta| meta.created_at)
                .unwrap_or_else(|_| Utc::now()),
            None => Utc::now(),
        };

        let meta = DraftSessionMeta {
            session_id,
            article_id: article_id.map(str::to_string),
            user_id: user_id.to_string(),
            created_at,
            updated_at: Utc::now(),
        };
        self.write_meta(&key, &meta).await?;
        Ok(session_id)
    }

    /// Drop the session record for a user/article pair.
    pub async fn clear_session(
        &self,
        article_id: Option<&str>,
        user_id: &str,
    ) -> Result<(), DraftError> {
        self.store.delete(&meta_key(article_id, user_id)).await?;
        Ok(())
    }

    /// All readable session records belonging to one user.
    pub async fn sessions_for_user(&self, user_id: &str) -> Result<Vec<DraftSessionMeta>, DraftError> {
        let prefix = format!("{SESSION_KEY_PREFIX}{user_id}_");
        let mut sessions = Vec::new();
        for key in self.store.list_keys(&prefix).await? {
            if let Some(raw) = self.store.get(&key).await? {
                // Unreadable records are skipped here; cleanup removes them.
                if let Ok(meta) = serde_json::from_str::<DraftSessionMeta>(&raw) {
                    sessions.push(meta);
                }
            }
        }
        Ok(sessions)
    }

    /// Delete expired and unreadable session records (and their draft
    /// blobs where the session id is known). Returns the count removed.
    pub async fn cleanup_expired(&self) -> Result<usize, DraftError> {
        let mut cleaned = 0;
        for key in self.store.list_keys(SESSION_KEY_PREFIX).await? {
            let Some(raw) = self.store.get(&key).await? else {
                continue;
            };
            match serde_json::from_str::<DraftSessionMeta>(&raw) {
                Ok(meta) if meta.expired(self.ttl) => {
                    self.store.delete(&key).await?;
                    self.store.delete(&draft_key(meta.session_id)).await?;
                    cleaned += 1;
                }
                Ok(_) => {}
                Err(e) => {
                    tracing::warn!(%key, "removing corrupt edit session record ({e})");
                    self.store.delete(&key).await?;
                    cleaned += 1;
                }
            }
        }
        if cleaned > 0 {
            tracing::info!(cleaned, "removed stale edit sessions");
        }
        Ok(cleaned)
    }

    /// Save a draft blob under its session id.
    pub async fn save_draft(
        &self,
        session_id: Uuid,
        form: serde_json::Value,
        content: &str,
    ) -> Result<DateTime<Utc>, DraftError> {
        let saved_at = Utc::now();
        let draft = DraftData {
            form,
            content: content.to_string(),
            updated_at: saved_at,
        };
        let raw = serde_json::to_string(&draft).map_err(|source| DraftError::Corrupt { source })?;
        self.store.set(&draft_key(session_id), &raw).await?;
        Ok(saved_at)
    }

    /// Load the draft blob for a session, if any.
    ///
    /// A present-but-unparseable blob is a [`DraftError::Corrupt`], which
    /// callers surface as a user-visible notice.
    pub async fn load_draft(&self, session_id: Uuid) -> Result<Option<DraftData>, DraftError> {
        match self.store.get(&draft_key(session_id)).await? {
            Some(raw) => serde_json::from_str(&raw)
                .map(Some)
                .map_err(|source| DraftError::Corrupt { source }),
            None => Ok(None),
        }
    }

    /// Whether a draft blob exists for the session.
    pub async fn has_draft(&self, session_id: Uuid) -> Result<bool, DraftError> {
        Ok(self.store.exists(&draft_key(session_id)).await?)
    }

    /// Remove the draft blob for a session.
    pub async fn clear_draft(&self, session_id: Uuid) -> Result<(), DraftError> {
        self.store.delete(&draft_key(session_id)).await?;
        Ok(())
    }

    async fn create_session(
        &self,
        article_id: Option<&str>,
        user_id: &str,
        key: &str,
    ) -> Result<Uuid, DraftError> {
        let now = Utc::now();
        let meta = DraftSessionMeta {
            session_id: Uuid::new_v4(),
            article_id: article_id.map(str::to_string),
            user_id: user_id.to_string(),
            created_at: now,
            updated_at: now,
        };
        self.write_meta(key, &meta).await?;
        Ok(meta.session_id)
    }

    async fn write_meta(&self, key: &str, meta: &DraftSessionMeta) -> Result<(), DraftError> {
        let raw = serde_json::to_string(meta).map_err(|source| DraftError::Corrupt { source })?;
        self.store.set(key, &raw).await?;
        Ok(())
    }
}

impl std::fmt::Debug for DraftSessions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DraftSessions").field("ttl", &self.ttl).finish()
    }
}

fn meta_key(article_id: Option<&str>, user_id: &str) -> String {
    match article_id {
        Some(article_id) => format!("{SESSION_KEY_PREFIX}{user_id}_{article_id}"),
        None => format!("{SESSION_KEY_PREFIX}{user_id}_new"),
    }
}

fn draft_key(session_id: Uuid) -> String {
    format!("{DRAFT_KEY_PREFIX}{session_id}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use vellum_core::store::MemoryStore;

    fn sessions() -> DraftSessions {
        DraftSessions::new(Arc::new(MemoryStore::new()))
    }

    #[tokio::test]
    async fn test_session_id_is_stable() {
        let sessions = sessions();

        let first = sessions.get_or_create_session(Some("42"), "u1").await.unwrap();
        let second = sessions.get_or_create_session(Some("42"), "u1").await.unwrap();
        assert_eq!(first, second);

        // A different article gets its own session.
        let other = sessions.get_or_create_session(None, "u1").await.unwrap();
        assert_ne!(first, other);
    }

    #[tokio::test]
    async fn test_expired_session_rotates() {
        let store = Arc::new(MemoryStore::new());
        let sessions = DraftSessions::new(store.clone());

        let old = DraftSessionMeta {
            session_id: Uuid::new_v4(),
            article_id: Some("7".to_string()),
            user_id: "u1".to_string(),
            created_at: Utc::now() - Duration::days(8),
            updated_at: Utc::now() - Duration::days(8),
        };
        store
            .set(
                &meta_key(Some("7"), "u1"),
                &serde_json::to_string(&old).unwrap(),
            )
            .await
            .unwrap();

        let rotated = sessions.get_or_create_session(Some("7"), "u1").await.unwrap();
        assert_ne!(rotated, old.session_id);
    }

    #[tokio::test]
    async fn test_corrupt_meta_rotates() {
        let store = Arc::new(MemoryStore::new());
        let sessions = DraftSessions::new(store.clone());

        store
            .set(&meta_key(Some("9"), "u1"), "{ definitely not json")
            .await
            .unwrap();

        // No crash, just a fresh session.
        sessions.get_or_create_session(Some("9"), "u1").await.unwrap();
    }

    #[tokio::test]
    async fn test_draft_roundtrip() {
        let sessions = sessions();
        let sid = sessions.get_or_create_session(None, "u1").await.unwrap();

        assert!(!sessions.has_draft(sid).await.unwrap());

        let form = serde_json::json!({ "title": "WIP" });
        sessions.save_draft(sid, form.clone(), "# heading").await.unwrap();

        let draft = sessions.load_draft(sid).await.unwrap().unwrap();
        assert_eq!(draft.form, form);
        assert_eq!(draft.content, "# heading");

        sessions.clear_draft(sid).await.unwrap();
        assert!(sessions.load_draft(sid).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_corrupt_draft_is_an_error_not_a_crash() {
        let store = Arc::new(MemoryStore::new());
        let sessions = DraftSessions::new(store.clone());
        let sid = Uuid::new_v4();

        store.set(&draft_key(sid), "][").await.unwrap();

        assert!(matches!(
            sessions.load_draft(sid).await,
            Err(DraftError::Corrupt { .. })
        ));
    }

    #[tokio::test]
    async fn test_cleanup_removes_expired_and_corrupt() {
        let store = Arc::new(MemoryStore::new());
        let sessions = DraftSessions::new(store.clone());

        // Live session.
        let live = sessions.get_or_create_session(Some("1"), "u1").await.unwrap();

        // Expired session with a draft blob.
        let stale = DraftSessionMeta {
            session_id: Uuid::new_v4(),
            article_id: Some("2".to_string()),
            user_id: "u1".to_string(),
            created_at: Utc::now() - Duration::days(30),
            updated_at: Utc::now() - Duration::days(30),
        };
        store
            .set(
                &meta_key(Some("2"), "u1"),
                &serde_json::to_string(&stale).unwrap(),
            )
            .await
            .unwrap();
        store
            .set(&draft_key(stale.session_id), "{\"form\":{},\"content\":\"\",\"updatedAt\":\"2024-01-01T00:00:00Z\"}")
            .await
            .unwrap();

        // Corrupt record.
        store
            .set(&meta_key(Some("3"), "u1"), "garbage")
            .await
            .unwrap();

        let cleaned = sessions.cleanup_expired().await.unwrap();
        assert_eq!(cleaned, 2);

        // The live session survives, the stale draft blob is gone.
        let remaining = sessions.sessions_for_user("u1").await.unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].session_id, live);
        assert!(!store.exists(&draft_key(stale.session_id)).await.unwrap());
    }
}
