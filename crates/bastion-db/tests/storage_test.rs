//! Object storage backends against a mock Supabase and a temp directory.

use bastion_db::{FilesystemBackend, StorageBackend, SupabaseConfig, SupabaseStorageBackend};
use bastion_core::Error;
use wiremock::matchers::{body_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn backend(server: &MockServer) -> SupabaseStorageBackend {
    let config = SupabaseConfig::new(server.uri(), "anon-key", "service-key");
    SupabaseStorageBackend::new(config, "bastion-files").unwrap()
}

#[tokio::test]
async fn test_supabase_write_posts_bytes_with_service_key() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/storage/v1/object/bastion-files/sources/org/client/deck.pdf"))
        .and(header("authorization", "Bearer service-key"))
        .and(header("apikey", "service-key"))
        .and(header("content-type", "application/pdf"))
        .and(header("x-upsert", "true"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "Key": "bastion-files/sources/org/client/deck.pdf"
        })))
        .expect(1)
        .mount(&server)
        .await;

    backend(&server)
        .write("sources/org/client/deck.pdf", b"%PDF-1.7", "application/pdf")
        .await
        .unwrap();
}

#[tokio::test]
async fn test_supabase_read_returns_body() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/storage/v1/object/bastion-files/briefs/o/b/notes.txt"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"launch in May".to_vec()))
        .mount(&server)
        .await;

    let data = backend(&server).read("briefs/o/b/notes.txt").await.unwrap();
    assert_eq!(data, b"launch in May");
}

#[tokio::test]
async fn test_supabase_delete_sends_prefixes() {
    let server = MockServer::start().await;
    Mock::given(method("DELETE"))
        .and(path("/storage/v1/object/bastion-files"))
        .and(body_json(serde_json::json!({ "prefixes": ["sources/o/c/a.pdf"] })))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([])))
        .expect(1)
        .mount(&server)
        .await;

    backend(&server).delete("sources/o/c/a.pdf").await.unwrap();
}

#[tokio::test]
async fn test_supabase_signed_url_is_absolute() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/storage/v1/object/sign/bastion-files/sources/o/c/a.pdf"))
        .and(body_json(serde_json::json!({ "expiresIn": 300 })))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "signedURL": "/object/sign/bastion-files/sources/o/c/a.pdf?token=abc"
        })))
        .mount(&server)
        .await;

    let url = backend(&server)
        .signed_url("sources/o/c/a.pdf", 300)
        .await
        .unwrap();
    assert_eq!(
        url,
        format!(
            "{}/storage/v1/object/sign/bastion-files/sources/o/c/a.pdf?token=abc",
            server.uri()
        )
    );
}

#[tokio::test]
async fn test_supabase_error_message_passes_through() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(404).set_body_json(serde_json::json!({
            "statusCode": "404",
            "error": "not_found",
            "message": "Object not found"
        })))
        .mount(&server)
        .await;

    let err = backend(&server).read("missing.pdf").await.unwrap_err();
    match err {
        Error::Provider {
            status, message, ..
        } => {
            assert_eq!(status, 404);
            assert_eq!(message, "Object not found");
        }
        other => panic!("expected provider error, got {other:?}"),
    }
}

#[tokio::test]
async fn test_filesystem_backend_lifecycle() {
    let dir = tempfile::tempdir().unwrap();
    let backend = FilesystemBackend::new(dir.path());

    backend.validate().await.unwrap();

    backend
        .write("sources/o/c/guide.md", b"# Tone of voice", "text/markdown")
        .await
        .unwrap();
    assert_eq!(
        backend.read("sources/o/c/guide.md").await.unwrap(),
        b"# Tone of voice"
    );

    backend.delete("sources/o/c/guide.md").await.unwrap();
    assert!(matches!(
        backend.read("sources/o/c/guide.md").await,
        Err(Error::NotFound(_))
    ));

    // Deleting a missing object is not an error
    backend.delete("sources/o/c/guide.md").await.unwrap();
}

#[tokio::test]
async fn test_filesystem_signed_url_points_at_file() {
    let dir = tempfile::tempdir().unwrap();
    let backend = FilesystemBackend::new(dir.path());
    let url = backend.signed_url("briefs/o/b/x.txt", 60).await.unwrap();
    assert!(url.starts_with("file://"));
    assert!(url.ends_with("briefs/o/b/x.txt"));
}
