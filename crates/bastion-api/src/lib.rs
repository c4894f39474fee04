//! # bastion-api
//!
//! HTTP API for Bastion OS: admin management, the client knowledge base,
//! and AI-assisted briefs.
//!
//! [`build_router`] assembles every route and the middleware stack over an
//! [`AppState`]; `main` only loads configuration, connects services, and
//! serves.

pub mod config;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod services;

use std::sync::Arc;
use std::time::Duration;

use axum::extract::DefaultBodyLimit;
use axum::http::{header, HeaderValue, Method};
use axum::routing::{get, patch, post, put};
use axum::Router;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::request_id::{PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::TraceLayer;
use tracing::warn;

use bastion_core::{GenerationBackend, IdentityProvider, RemoteFileService, StorageBackend};
use bastion_db::{Database, SupabaseAuthClient};

pub use config::{AppSettings, ServerConfig};
pub use error::ApiError;

use handlers::{admin, briefs, health, kb, me};
use middleware::{rate_limit_middleware, GlobalRateLimiter, MakeRequestUuidV7};

/// Headroom above the upload limit for multipart framing and text fields.
const BODY_LIMIT_SLACK: usize = 1024 * 1024;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub db: Database,
    /// Resolves bearer tokens to principals.
    pub identity: Arc<dyn IdentityProvider>,
    /// Supabase admin calls (invites, user deletion).
    pub auth_admin: SupabaseAuthClient,
    pub storage: Arc<dyn StorageBackend>,
    pub generator: Arc<dyn GenerationBackend>,
    /// Gemini Files API.
    pub remote_files: Arc<dyn RemoteFileService>,
    pub settings: Arc<AppSettings>,
    /// Global rate limiter (None if rate limiting is disabled).
    pub rate_limiter: Option<Arc<GlobalRateLimiter>>,
}

fn cors_layer(allowed_origins: &[String]) -> CorsLayer {
    let origins: Vec<HeaderValue> = allowed_origins
        .iter()
        .filter_map(|origin| match origin.parse::<HeaderValue>() {
            Ok(v) => Some(v),
            Err(e) => {
                warn!("Invalid CORS origin '{}': {}", origin, e);
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE, header::ACCEPT])
        .allow_credentials(true)
        .max_age(Duration::from_secs(3600))
}

/// Build the application router with its middleware stack.
pub fn build_router(state: AppState, allowed_origins: &[String]) -> Router {
    let body_limit = usize::try_from(state.settings.max_upload_bytes)
        .unwrap_or(usize::MAX)
        .saturating_add(BODY_LIMIT_SLACK);

    let admin_routes = Router::new()
        .route(
            "/organisations",
            get(admin::organisations::list_organisations)
                .post(admin::organisations::create_organisation),
        )
        .route(
            "/organisations/:id",
            get(admin::organisations::get_organisation)
                .patch(admin::organisations::update_organisation)
                .delete(admin::organisations::delete_organisation),
        )
        .route(
            "/users",
            get(admin::users::list_users).post(admin::users::invite_user),
        )
        .route(
            "/users/:id",
            patch(admin::users::update_user).delete(admin::users::delete_user),
        )
        .route(
            "/practices",
            get(admin::practices::list_practices).post(admin::practices::create_practice),
        )
        .route(
            "/practices/:id",
            patch(admin::practices::update_practice).delete(admin::practices::delete_practice),
        )
        .route(
            "/practices/:id/templates",
            get(admin::templates::list_templates).post(admin::templates::create_template),
        )
        .route(
            "/templates/:id",
            get(admin::templates::get_template)
                .patch(admin::templates::update_template)
                .delete(admin::templates::delete_template),
        )
        .route(
            "/templates/:id/sections",
            put(admin::templates::replace_sections),
        )
        .route(
            "/clients",
            get(admin::clients::list_clients).post(admin::clients::create_client),
        )
        .route(
            "/clients/:id",
            get(admin::clients::get_client)
                .patch(admin::clients::update_client)
                .delete(admin::clients::delete_client),
        )
        .route("/prompts", get(admin::prompts::list_prompts))
        .route(
            "/prompts/:key",
            put(admin::prompts::set_prompt).delete(admin::prompts::reset_prompt),
        );

    let kb_routes = Router::new()
        .route("/clients", get(kb::list_kb_clients))
        .route(
            "/clients/:client_id/sources",
            get(kb::list_sources).post(kb::upload_source),
        )
        .route("/sources/:id", axum::routing::delete(kb::delete_source))
        .route("/sources/:id/url", get(kb::source_url))
        .route("/clients/:client_id/prepare", get(kb::prepare_sources))
        .route(
            "/clients/:client_id/digest",
            get(kb::get_digest).post(kb::regenerate_digest),
        )
        .route(
            "/clients/:client_id/conversations",
            get(kb::list_conversations).post(kb::create_conversation),
        )
        .route(
            "/conversations/:id",
            get(kb::get_conversation)
                .patch(kb::rename_conversation)
                .delete(kb::delete_conversation),
        )
        .route("/conversations/:id/messages", post(kb::send_message));

    let brief_routes = Router::new()
        .route("/", get(briefs::list_briefs).post(briefs::create_brief))
        .route(
            "/:id",
            get(briefs::get_brief)
                .patch(briefs::update_brief)
                .delete(briefs::delete_brief),
        )
        .route("/:id/files", post(briefs::upload_brief_file))
        .route(
            "/:id/files/:file_id",
            axum::routing::delete(briefs::delete_brief_file),
        )
        .route("/:id/expand", post(briefs::expand_brief))
        .route(
            "/:id/sections/:section_id",
            patch(briefs::update_section),
        )
        .route(
            "/:id/sections/:section_id/regenerate",
            post(briefs::regenerate_section),
        );

    Router::new()
        .route("/health", get(health::health_check))
        .route("/api/me", get(me::get_me))
        .nest("/api/admin", admin_routes)
        .nest("/api/kb", kb_routes)
        .nest("/api/briefs", brief_routes)
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            rate_limit_middleware,
        ))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(RequestBodyLimitLayer::new(body_limit))
        .layer(TraceLayer::new_for_http())
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuidV7))
        .layer(cors_layer(allowed_origins))
        .layer(CatchPanicLayer::new())
        .with_state(state)
}
