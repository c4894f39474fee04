//! Router-level tests: authentication, role gating, validation, and the
//! middleware stack.
//!
//! Every request here is answered before any query runs, so the pool is
//! connected lazily and never used.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{header, Method, Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tower::ServiceExt;
use uuid::Uuid;

use bastion_api::config::RateLimitConfig;
use bastion_api::middleware::build_rate_limiter;
use bastion_api::{build_router, AppSettings, AppState};
use bastion_core::{Error, IdentityProvider, Principal, Result, Role};
use bastion_db::{Database, SupabaseAuthClient, SupabaseConfig};
use bastion_inference::mock::{MockGeneration, MockRemoteFiles, MockStorage};

const ORIGIN: &str = "http://localhost:5173";

/// Resolves fixed tokens named after the role they carry.
struct StaticIdentity {
    organisation_id: Uuid,
    user_id: Uuid,
}

#[async_trait]
impl IdentityProvider for StaticIdentity {
    async fn authenticate(&self, token: &str) -> Result<Principal> {
        let role = match token {
            "super-token" => Role::SuperAdmin,
            "admin-token" => Role::Admin,
            "manager-token" => Role::Manager,
            "member-token" => Role::Member,
            "orphan-token" => {
                return Err(Error::Forbidden("No profile for this user".to_string()))
            }
            _ => return Err(Error::Unauthorized("Invalid token".to_string())),
        };
        Ok(Principal {
            user_id: self.user_id,
            email: "staff@agency.test".to_string(),
            full_name: "Staff".to_string(),
            organisation_id: self.organisation_id,
            role,
            practice_id: None,
        })
    }
}

fn state_with(rate_limit: RateLimitConfig) -> (AppState, Uuid) {
    let user_id = Uuid::new_v4();
    let db = Database::connect_lazy("postgres://localhost/bastion_router_test")
        .expect("lazy pool");
    let auth_admin = SupabaseAuthClient::new(SupabaseConfig::new(
        "http://127.0.0.1:9",
        "anon-key",
        "service-key",
    ))
    .expect("auth client");

    let state = AppState {
        db,
        identity: Arc::new(StaticIdentity {
            organisation_id: Uuid::new_v4(),
            user_id,
        }),
        auth_admin,
        storage: Arc::new(MockStorage::new()),
        generator: Arc::new(MockGeneration::new()),
        remote_files: Arc::new(MockRemoteFiles::new()),
        settings: Arc::new(AppSettings::default()),
        rate_limiter: build_rate_limiter(&rate_limit),
    };
    (state, user_id)
}

fn router() -> (Router, Uuid) {
    let (state, user_id) = state_with(RateLimitConfig {
        enabled: false,
        ..Default::default()
    });
    (build_router(state, &[ORIGIN.to_string()]), user_id)
}

fn request(method: Method, uri: &str, token: Option<&str>, body: Option<Value>) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
    }
    match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

async fn send(app: &Router, req: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(req).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, body)
}

#[tokio::test]
async fn test_health_needs_no_auth() {
    let (app, _) = router();
    let (status, body) = send(&app, request(Method::GET, "/health", None, None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));
}

#[tokio::test]
async fn test_missing_token_is_unauthorized() {
    let (app, _) = router();
    let (status, body) = send(&app, request(Method::GET, "/api/me", None, None)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "Authentication required");
}

#[tokio::test]
async fn test_unknown_token_is_unauthorized() {
    let (app, _) = router();
    let (status, _) = send(
        &app,
        request(Method::GET, "/api/kb/clients", Some("stolen"), None),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_user_without_profile_is_forbidden() {
    let (app, _) = router();
    let (status, _) = send(
        &app,
        request(Method::GET, "/api/kb/clients", Some("orphan-token"), None),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_roles_outside_allow_list_are_forbidden() {
    let (app, _) = router();
    let id = Uuid::new_v4();
    let cases = [
        (Method::GET, "/api/admin/organisations".to_string(), "admin-token"),
        (Method::GET, "/api/admin/users".to_string(), "manager-token"),
        (Method::GET, "/api/admin/practices".to_string(), "member-token"),
        (Method::GET, "/api/admin/prompts".to_string(), "manager-token"),
        (Method::GET, format!("/api/admin/templates/{}", id), "member-token"),
        (Method::DELETE, format!("/api/admin/clients/{}", id), "member-token"),
        (Method::DELETE, format!("/api/kb/sources/{}", id), "member-token"),
        (Method::POST, format!("/api/kb/clients/{}/digest", id), "member-token"),
        (Method::DELETE, format!("/api/briefs/{}", id), "member-token"),
    ];

    for (method, uri, token) in cases {
        let (status, body) = send(&app, request(method.clone(), &uri, Some(token), None)).await;
        assert_eq!(status, StatusCode::FORBIDDEN, "{} {} as {}", method, uri, token);
        assert!(body["error"].as_str().unwrap().contains("not permitted"));
    }
}

#[tokio::test]
async fn test_member_cannot_upload_sources() {
    let (app, _) = router();
    let req = Request::builder()
        .method(Method::POST)
        .uri(format!("/api/kb/clients/{}/sources", Uuid::new_v4()))
        .header(header::AUTHORIZATION, "Bearer member-token")
        .header(header::CONTENT_TYPE, "multipart/form-data; boundary=XBOUNDARY")
        .body(Body::from("--XBOUNDARY--\r\n"))
        .unwrap();
    let (status, _) = send(&app, req).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_invalid_slug_is_bad_request() {
    let (app, _) = router();
    let (status, body) = send(
        &app,
        request(
            Method::POST,
            "/api/admin/organisations",
            Some("super-token"),
            Some(json!({ "name": "Northwind", "slug": "North Wind!" })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("slug"));
}

#[tokio::test]
async fn test_empty_section_list_is_bad_request() {
    let (app, _) = router();
    let (status, _) = send(
        &app,
        request(
            Method::PUT,
            &format!("/api/admin/templates/{}/sections", Uuid::new_v4()),
            Some("admin-token"),
            Some(json!({ "sections": [] })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_admin_cannot_invite_super_admin() {
    let (app, _) = router();
    let (status, _) = send(
        &app,
        request(
            Method::POST,
            "/api/admin/users",
            Some("admin-token"),
            Some(json!({
                "email": "new@agency.test",
                "full_name": "New Hire",
                "role": "super_admin"
            })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_invite_rejects_bad_email() {
    let (app, _) = router();
    let (status, _) = send(
        &app,
        request(
            Method::POST,
            "/api/admin/users",
            Some("admin-token"),
            Some(json!({ "email": "nobody", "full_name": "Nobody", "role": "member" })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_users_cannot_delete_or_demote_themselves() {
    let (app, user_id) = router();
    let uri = format!("/api/admin/users/{}", user_id);

    let (status, body) = send(&app, request(Method::DELETE, &uri, Some("admin-token"), None)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("your own account"));

    let (status, _) = send(
        &app,
        request(
            Method::PATCH,
            &uri,
            Some("admin-token"),
            Some(json!({ "role": "member" })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_blank_chat_message_is_bad_request() {
    let (app, _) = router();
    let (status, _) = send(
        &app,
        request(
            Method::POST,
            &format!("/api/kb/conversations/{}/messages", Uuid::new_v4()),
            Some("member-token"),
            Some(json!({ "content": "   " })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_section_edit_requires_a_field() {
    let (app, _) = router();
    let (status, _) = send(
        &app,
        request(
            Method::PATCH,
            &format!("/api/briefs/{}/sections/{}", Uuid::new_v4(), Uuid::new_v4()),
            Some("member-token"),
            Some(json!({})),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_malformed_optional_bodies_are_bad_request() {
    let (app, _) = router();
    let (status, body) = send(
        &app,
        request(
            Method::POST,
            &format!("/api/kb/clients/{}/conversations", Uuid::new_v4()),
            Some("member-token"),
            Some(json!({ "title": 5 })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].is_string());

    let (status, _) = send(
        &app,
        request(
            Method::POST,
            &format!(
                "/api/briefs/{}/sections/{}/regenerate",
                Uuid::new_v4(),
                Uuid::new_v4()
            ),
            Some("member-token"),
            Some(json!({ "instructions": ["shorter"] })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_responses_carry_request_id() {
    let (app, _) = router();
    let response = app
        .oneshot(request(Method::GET, "/health", None, None))
        .await
        .unwrap();
    let id = response
        .headers()
        .get("x-request-id")
        .expect("request id header")
        .to_str()
        .unwrap();
    assert!(Uuid::parse_str(id).is_ok());
}

#[tokio::test]
async fn test_supplied_request_id_is_propagated() {
    let (app, _) = router();
    let req = Request::builder()
        .uri("/health")
        .header("x-request-id", "trace-abc")
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(req).await.unwrap();
    assert_eq!(response.headers()["x-request-id"], "trace-abc");
}

#[tokio::test]
async fn test_cors_preflight_allows_configured_origin() {
    let (app, _) = router();
    let req = Request::builder()
        .method(Method::OPTIONS)
        .uri("/api/me")
        .header(header::ORIGIN, ORIGIN)
        .header(header::ACCESS_CONTROL_REQUEST_METHOD, "GET")
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(req).await.unwrap();
    assert_eq!(
        response.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN],
        ORIGIN
    );
}

#[tokio::test]
async fn test_cors_ignores_unknown_origin() {
    let (app, _) = router();
    let req = Request::builder()
        .method(Method::OPTIONS)
        .uri("/api/me")
        .header(header::ORIGIN, "https://evil.example")
        .header(header::ACCESS_CONTROL_REQUEST_METHOD, "GET")
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(req).await.unwrap();
    assert!(response
        .headers()
        .get(header::ACCESS_CONTROL_ALLOW_ORIGIN)
        .is_none());
}

#[tokio::test]
async fn test_rate_limit_rejects_after_burst() {
    let (state, _) = state_with(RateLimitConfig {
        enabled: true,
        requests: 2,
        period: Duration::from_secs(60),
    });
    let app = build_router(state, &[ORIGIN.to_string()]);

    for _ in 0..2 {
        let (status, _) = send(&app, request(Method::GET, "/health", None, None)).await;
        assert_eq!(status, StatusCode::OK);
    }
    let (status, body) = send(&app, request(Method::GET, "/health", None, None)).await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    assert!(body["error"].is_string());
}
