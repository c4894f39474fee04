//! bastion-api server binary.

use std::net::SocketAddr;
use std::sync::Arc;

use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use bastion_api::config::StorageKind;
use bastion_api::middleware::build_rate_limiter;
use bastion_api::{build_router, AppState, ServerConfig};
use bastion_core::StorageBackend;
use bastion_db::pool::{log_pool_metrics, PoolConfig};
use bastion_db::{
    Database, FilesystemBackend, SupabaseAuthClient, SupabaseIdentityProvider,
    SupabaseStorageBackend,
};
use bastion_inference::GeminiClient;

/// Initialize tracing with configurable output.
///
/// Environment variables:
///   LOG_FORMAT  - "json" or "text" (default: "text")
///   LOG_FILE    - path to log file (optional, enables daily-rotated file logging)
///   LOG_ANSI    - "true"/"false" override ANSI colors (auto-detected by default)
///   RUST_LOG    - standard env filter (default: "bastion_api=debug,tower_http=debug")
///
/// The returned guard must live as long as the process when logging to a file.
fn init_logging() -> Option<WorkerGuard> {
    let log_format = std::env::var("LOG_FORMAT").unwrap_or_else(|_| "text".to_string());
    let log_file = std::env::var("LOG_FILE").ok();
    let log_ansi = std::env::var("LOG_ANSI")
        .ok()
        .map(|v| v == "true" || v == "1");

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "bastion_api=debug,tower_http=debug".into());
    let registry = tracing_subscriber::registry().with(env_filter);

    let guard = if let Some(ref path) = log_file {
        let path = std::path::Path::new(path);
        let file_dir = path.parent().unwrap_or(std::path::Path::new("."));
        let file_name = path
            .file_name()
            .and_then(|f| f.to_str())
            .unwrap_or("bastion-api.log");
        let file_appender = tracing_appender::rolling::daily(file_dir, file_name);
        let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

        if log_format == "json" {
            registry
                .with(
                    tracing_subscriber::fmt::layer()
                        .json()
                        .with_writer(non_blocking),
                )
                .init();
        } else {
            // no ANSI in files unless asked for
            let layer = tracing_subscriber::fmt::layer()
                .with_writer(non_blocking)
                .with_ansi(log_ansi.unwrap_or(false));
            registry.with(layer).init();
        }
        Some(guard)
    } else {
        if log_format == "json" {
            registry
                .with(tracing_subscriber::fmt::layer().json())
                .init();
        } else {
            let mut layer = tracing_subscriber::fmt::layer();
            if let Some(ansi) = log_ansi {
                layer = layer.with_ansi(ansi);
            }
            registry.with(layer).init();
        }
        None
    };

    info!(
        log_format = %log_format,
        log_file = log_file.as_deref().unwrap_or("(stdout)"),
        "Logging initialized"
    );
    guard
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let _log_guard = init_logging();

    let config = ServerConfig::from_env()?;

    let db = Database::connect_with_config(
        &config.database_url,
        PoolConfig::new().max_connections(config.db_max_connections),
    )
    .await?;
    log_pool_metrics(db.pool());
    if config.run_migrations {
        db.migrate().await?;
        info!("Database migrations applied");
    }

    let storage: Arc<dyn StorageBackend> = match &config.storage {
        StorageKind::Supabase { bucket } => {
            info!(bucket = %bucket, "Using Supabase Storage");
            Arc::new(SupabaseStorageBackend::new(
                config.supabase.clone(),
                bucket.clone(),
            )?)
        }
        StorageKind::Filesystem { path } => {
            info!(path = %path.display(), "Using filesystem storage");
            let backend = FilesystemBackend::new(path.clone());
            backend.validate().await?;
            Arc::new(backend)
        }
    };

    let gemini = Arc::new(GeminiClient::new(config.gemini.clone())?);
    info!(model = %gemini.config().model, "Gemini client ready");

    let auth_admin = SupabaseAuthClient::new(config.supabase.clone())?;
    let identity = Arc::new(SupabaseIdentityProvider::new(
        auth_admin.clone(),
        db.profiles.clone(),
    ));

    let rate_limiter = build_rate_limiter(&config.rate_limit);
    if rate_limiter.is_some() {
        info!(
            requests = config.rate_limit.requests,
            period_secs = config.rate_limit.period.as_secs(),
            "Rate limiting enabled"
        );
    }

    let state = AppState {
        db,
        identity,
        auth_admin,
        storage,
        generator: gemini.clone(),
        remote_files: gemini,
        settings: Arc::new(config.settings.clone()),
        rate_limiter,
    };
    let app = build_router(state, &config.allowed_origins);

    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    info!("Starting server on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
