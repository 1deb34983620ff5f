//! Article-image upload operations.

use serde::{Deserialize, Serialize};
use std::sync::Arc;

use vellum_core::envelope::{ApiEnvelope, Failure};
use vellum_core::pipeline::ApiClient;
use vellum_core::validate::{Issues, Validate, ValidationError, validate_response};

/// Metadata of an uploaded article image.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArticleImage {
    pub url: String,
}

impl Validate for ArticleImage {
    fn validate(&self) -> Result<(), ValidationError> {
        let mut issues = Issues::new();
        issues.ensure(!self.url.is_empty(), "url must not be empty");
        issues.finish()
    }
}

/// Client for the upload endpoint set.
pub struct UploadApi {
    api: Arc<ApiClient>,
}

impl UploadApi {
    pub fn new(api: Arc<ApiClient>) -> Self {
        Self { api }
    }

    /// Upload an in-article image as a multipart form.
    pub async fn upload_article_image(
        &self,
        file_name: &str,
        mime: &str,
        bytes: Vec<u8>,
    ) -> Result<ArticleImage, Failure> {
        check_file_name(file_name)?;
        if bytes.is_empty() {
            tracing::warn!("refusing to upload an empty file");
            return Err(Failure::new(400, "malformed request parameters"));
        }

        let envelope: ApiEnvelope<ArticleImage> = self
            .api
            .post_multipart("/upload/article/image", "image", file_name, mime, bytes)
            .await
            .map_err(Failure::from)?;
        validate_response(&envelope).map_err(Failure::from)?;
        envelope.into_result()?.ok_or_else(Failure::missing_data)
    }

    /// Delete a previously uploaded article image by file name.
    pub async fn delete_article_image(&self, file_name: &str) -> Result<(), Failure> {
        check_file_name(file_name)?;

        let envelope: ApiEnvelope<()> = self
            .api
            .delete(&format!("/upload/article/image/{file_name}"), None)
            .await
            .map_err(Failure::from)?;
        validate_response(&envelope).map_err(Failure::from)?;
        envelope.into_result()?;
        Ok(())
    }
}

fn check_file_name(file_name: &str) -> Result<(), Failure> {
    // File names come back from the server; still refuse anything that
    // could escape the upload path.
    let ok = !file_name.is_empty() && !file_name.contains('/') && !file_name.contains("..");
    if !ok {
        tracing::warn!(file_name, "rejecting suspicious upload file name");
        return Err(Failure::new(400, "malformed request parameters"));
    }
    Ok(())
}

impl std::fmt::Debug for UploadApi {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UploadApi").finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_name_check() {
        assert!(check_file_name("photo.png").is_ok());
        assert!(check_file_name("").is_err());
        assert!(check_file_name("a/b.png").is_err());
        assert!(check_file_name("..hidden").is_err());
    }
}
