//! Gemini client against a mock Google API server.

use bastion_core::{
    ChatTurn, Error, GenerationBackend, GenerationRequest, PreparedFile, RemoteFileService,
    RemoteFileState,
};
use bastion_inference::{GeminiClient, GeminiConfig};
use serde_json::json;
use uuid::Uuid;
use wiremock::matchers::{body_partial_json, header, header_exists, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn client(server: &MockServer) -> GeminiClient {
    GeminiClient::new(GeminiConfig {
        base_url: server.uri(),
        api_key: "test-key".to_string(),
        model: "gemini-test".to_string(),
        timeout_seconds: 5,
    })
    .unwrap()
}

fn text_response(text: &str) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({
        "candidates": [{
            "content": { "role": "model", "parts": [{ "text": text }] },
            "finishReason": "STOP"
        }]
    }))
}

#[tokio::test]
async fn test_generate_sends_system_turns_and_key() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1beta/models/gemini-test:generateContent"))
        .and(header("x-goog-api-key", "test-key"))
        .and(body_partial_json(json!({
            "systemInstruction": { "parts": [{ "text": "Be brief." }] },
            "contents": [
                { "role": "user", "parts": [{ "text": "Hi" }] },
                { "role": "model", "parts": [{ "text": "Hello" }] },
                { "role": "user", "parts": [{ "text": "Who is the client?" }] }
            ]
        })))
        .respond_with(text_response("Northwind Coffee."))
        .expect(1)
        .mount(&server)
        .await;

    let text = client(&server)
        .generate(GenerationRequest {
            system: Some("Be brief.".to_string()),
            turns: vec![
                ChatTurn::user("Hi"),
                ChatTurn::assistant("Hello"),
                ChatTurn::user("Who is the client?"),
            ],
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(text, "Northwind Coffee.");
}

#[tokio::test]
async fn test_generate_encodes_file_parts_and_json_mode() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1beta/models/gemini-test:generateContent"))
        .and(body_partial_json(json!({
            "contents": [{
                "role": "user",
                "parts": [
                    { "fileData": { "mimeType": "application/pdf", "fileUri": "https://g/files/deck" } },
                    { "text": "Expand the brief" }
                ]
            }],
            "generationConfig": { "responseMimeType": "application/json" }
        })))
        .respond_with(text_response("{\"sections\": []}"))
        .expect(1)
        .mount(&server)
        .await;

    let text = client(&server)
        .generate(GenerationRequest {
            turns: vec![ChatTurn::user("Expand the brief")],
            files: vec![PreparedFile {
                id: Uuid::new_v4(),
                file_name: "deck.pdf".to_string(),
                mime_type: "application/pdf".to_string(),
                uri: "https://g/files/deck".to_string(),
            }],
            json_output: true,
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(text, "{\"sections\": []}");
}

#[tokio::test]
async fn test_generate_error_passes_message_through() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "error": {
                "code": 400,
                "message": "Unsupported MIME type: application/zip",
                "status": "INVALID_ARGUMENT"
            }
        })))
        .mount(&server)
        .await;

    let err = client(&server)
        .generate(GenerationRequest {
            turns: vec![ChatTurn::user("Hi")],
            ..Default::default()
        })
        .await
        .unwrap_err();

    match err {
        Error::Provider {
            service,
            status,
            message,
        } => {
            assert_eq!(service, "Gemini");
            assert_eq!(status, 400);
            assert_eq!(message, "Unsupported MIME type: application/zip");
        }
        other => panic!("expected provider error, got {:?}", other),
    }
}

#[tokio::test]
async fn test_generate_blocked_prompt_is_inference_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "candidates": [],
            "promptFeedback": { "blockReason": "SAFETY" }
        })))
        .mount(&server)
        .await;

    let err = client(&server)
        .generate(GenerationRequest {
            turns: vec![ChatTurn::user("Hi")],
            ..Default::default()
        })
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Inference(ref m) if m.contains("SAFETY")));
}

#[tokio::test]
async fn test_resumable_upload_starts_session_then_finalizes() {
    let server = MockServer::start().await;
    let session_url = format!("{}/upload-session/abc", server.uri());

    Mock::given(method("POST"))
        .and(path("/upload/v1beta/files"))
        .and(header("x-goog-api-key", "test-key"))
        .and(header("x-goog-upload-protocol", "resumable"))
        .and(header("x-goog-upload-command", "start"))
        .and(header("x-goog-upload-header-content-length", "8"))
        .and(header("x-goog-upload-header-content-type", "application/pdf"))
        .and(body_partial_json(json!({ "file": { "display_name": "deck.pdf" } })))
        .respond_with(ResponseTemplate::new(200).insert_header("x-goog-upload-url", session_url.as_str()))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/upload-session/abc"))
        .and(header("x-goog-upload-offset", "0"))
        .and(header_exists("x-goog-upload-command"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "file": {
                "name": "files/abc",
                "displayName": "deck.pdf",
                "mimeType": "application/pdf",
                "uri": "https://g/v1beta/files/abc",
                "state": "ACTIVE"
            }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let file = client(&server)
        .upload_file("deck.pdf", "application/pdf", b"%PDF-1.7".to_vec())
        .await
        .unwrap();

    assert_eq!(file.name, "files/abc");
    assert_eq!(file.uri, "https://g/v1beta/files/abc");
    assert_eq!(file.state, RemoteFileState::Active);
}

#[tokio::test]
async fn test_upload_without_session_url_fails() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/upload/v1beta/files"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let err = client(&server)
        .upload_file("deck.pdf", "application/pdf", vec![1, 2, 3])
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Inference(_)));
}

#[tokio::test]
async fn test_get_file_reports_state() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1beta/files/abc"))
        .and(header("x-goog-api-key", "test-key"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "name": "files/abc",
            "uri": "https://g/v1beta/files/abc",
            "mimeType": "video/mp4",
            "state": "PROCESSING"
        })))
        .mount(&server)
        .await;

    let file = client(&server).get_file("files/abc").await.unwrap();
    assert_eq!(file.state, RemoteFileState::Processing);
    assert_eq!(file.mime_type, "video/mp4");
}

#[tokio::test]
async fn test_get_file_not_found_is_provider_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({
            "error": { "code": 404, "message": "File files/gone not found.", "status": "NOT_FOUND" }
        })))
        .mount(&server)
        .await;

    let err = client(&server).get_file("files/gone").await.unwrap_err();
    assert!(err.is_provider_client_error());
}
