//! Integration tests for article-image uploads.

use std::sync::Arc;
use vellum_client::UploadApi;
use vellum_core::{ApiClient, ClientConfig, ClientEvents, MemoryStore, SessionManager};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn upload_api(server: &MockServer) -> UploadApi {
    let config = ClientConfig {
        api_base_url: server.uri(),
        ..ClientConfig::default()
    };
    let session = SessionManager::new(&config, Arc::new(MemoryStore::new()));
    let api = Arc::new(ApiClient::new(config, session, ClientEvents::new()));
    UploadApi::new(api)
}

#[tokio::test]
async fn test_upload_sends_multipart_and_returns_url() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/upload/article/image"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "code": 200,
            "success": true,
            "data": { "url": "/static/uploads/photo.png" }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let uploads = upload_api(&server);
    let image = uploads
        .upload_article_image("photo.png", "image/png", vec![0x89, 0x50, 0x4e, 0x47])
        .await
        .unwrap();

    assert_eq!(image.url, "/static/uploads/photo.png");

    let requests = server.received_requests().await.unwrap();
    let content_type = requests[0]
        .headers
        .get("content-type")
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    assert!(content_type.starts_with("multipart/form-data"));
    assert!(requests[0].body.windows(9).any(|w| w == b"photo.png"));
}

#[tokio::test]
async fn test_empty_file_is_rejected_locally() {
    let server = MockServer::start().await;
    let uploads = upload_api(&server);

    let failure = uploads
        .upload_article_image("photo.png", "image/png", Vec::new())
        .await
        .unwrap_err();
    assert_eq!(failure.code, 400);

    assert!(server.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_delete_article_image() {
    let server = MockServer::start().await;
    Mock::given(method("DELETE"))
        .and(path("/upload/article/image/photo.png"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "code": 200, "success": true, "data": null
        })))
        .expect(1)
        .mount(&server)
        .await;

    let uploads = upload_api(&server);
    uploads.delete_article_image("photo.png").await.unwrap();
}

#[tokio::test]
async fn test_traversal_file_name_never_dispatches() {
    let server = MockServer::start().await;
    let uploads = upload_api(&server);

    let failure = uploads.delete_article_image("../secrets").await.unwrap_err();
    assert_eq!(failure.code, 400);
    assert!(server.received_requests().await.unwrap().is_empty());
}
