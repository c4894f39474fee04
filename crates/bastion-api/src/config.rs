//! Server configuration loaded from the environment.

use std::path::PathBuf;
use std::time::Duration;

use bastion_core::defaults::{MAX_UPLOAD_BYTES, SIGNED_URL_TTL_SECS};
use bastion_core::{Error, Result};
use bastion_db::SupabaseConfig;
use bastion_inference::{GeminiConfig, PrepareOptions};

pub const DEFAULT_DATABASE_URL: &str = "postgres://localhost/bastion";
pub const DEFAULT_STORAGE_BUCKET: &str = "bastion-files";
pub const DEFAULT_FILE_STORAGE_PATH: &str = "/var/lib/bastion/files";
pub const DEFAULT_ALLOWED_ORIGINS: &str = "http://localhost:5173";

/// Where uploaded documents are kept.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageKind {
    Supabase { bucket: String },
    Filesystem { path: PathBuf },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitConfig {
    pub enabled: bool,
    pub requests: u32,
    pub period: Duration,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            requests: 300,
            period: Duration::from_secs(60),
        }
    }
}

/// Settings handlers read at request time.
#[derive(Debug, Clone)]
pub struct AppSettings {
    pub max_upload_bytes: u64,
    pub signed_url_ttl_secs: u64,
    pub file_prep: PrepareOptions,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            max_upload_bytes: MAX_UPLOAD_BYTES,
            signed_url_ttl_secs: SIGNED_URL_TTL_SECS,
            file_prep: PrepareOptions::default(),
        }
    }
}

/// Everything `main` needs to assemble the server.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub database_url: String,
    pub db_max_connections: u32,
    pub run_migrations: bool,
    pub supabase: SupabaseConfig,
    pub storage: StorageKind,
    pub gemini: GeminiConfig,
    pub allowed_origins: Vec<String>,
    pub rate_limit: RateLimitConfig,
    pub settings: AppSettings,
}

fn var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn required(name: &str) -> Result<String> {
    var(name).ok_or_else(|| Error::Config(format!("{} is not set", name)))
}

fn parsed<T: std::str::FromStr>(name: &str, default: T) -> T {
    var(name).and_then(|v| v.trim().parse().ok()).unwrap_or(default)
}

fn flag(name: &str, default: bool) -> bool {
    var(name)
        .map(|v| v == "true" || v == "1")
        .unwrap_or(default)
}

/// Split a comma-separated origin list, dropping blanks.
pub fn parse_origins(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

impl ServerConfig {
    /// Read configuration from the process environment.
    ///
    /// Fails when a required Supabase or Gemini credential is missing or the
    /// storage backend is unknown.
    pub fn from_env() -> Result<Self> {
        let mut supabase = SupabaseConfig::new(
            required("SUPABASE_URL")?,
            required("SUPABASE_ANON_KEY")?,
            required("SUPABASE_SERVICE_ROLE_KEY")?,
        );
        supabase.timeout_secs = parsed("SUPABASE_TIMEOUT", supabase.timeout_secs);

        let storage = match var("STORAGE_BACKEND").as_deref().unwrap_or("supabase") {
            "supabase" => StorageKind::Supabase {
                bucket: var("STORAGE_BUCKET").unwrap_or_else(|| DEFAULT_STORAGE_BUCKET.to_string()),
            },
            "filesystem" => StorageKind::Filesystem {
                path: PathBuf::from(
                    var("FILE_STORAGE_PATH")
                        .unwrap_or_else(|| DEFAULT_FILE_STORAGE_PATH.to_string()),
                ),
            },
            other => {
                return Err(Error::Config(format!(
                    "STORAGE_BACKEND must be 'supabase' or 'filesystem', got '{}'",
                    other
                )))
            }
        };

        let rate_defaults = RateLimitConfig::default();
        let rate_limit = RateLimitConfig {
            enabled: flag("RATE_LIMIT_ENABLED", rate_defaults.enabled),
            requests: parsed("RATE_LIMIT_REQUESTS", rate_defaults.requests).max(1),
            period: Duration::from_secs(
                parsed("RATE_LIMIT_PERIOD_SECS", rate_defaults.period.as_secs()).max(1),
            ),
        };

        let settings = AppSettings {
            max_upload_bytes: parsed("MAX_UPLOAD_BYTES", MAX_UPLOAD_BYTES),
            signed_url_ttl_secs: parsed("SIGNED_URL_TTL_SECS", SIGNED_URL_TTL_SECS),
            file_prep: PrepareOptions::default()
                .with_max_concurrency(var("FILE_PREP_CONCURRENCY").and_then(|v| v.parse().ok())),
        };

        Ok(Self {
            host: var("HOST").unwrap_or_else(|| "0.0.0.0".to_string()),
            port: parsed("PORT", 3000),
            database_url: var("DATABASE_URL").unwrap_or_else(|| DEFAULT_DATABASE_URL.to_string()),
            db_max_connections: parsed("DB_MAX_CONNECTIONS", bastion_db::pool::DEFAULT_MAX_CONNECTIONS),
            run_migrations: flag("RUN_MIGRATIONS", true),
            supabase,
            storage,
            gemini: GeminiConfig::from_env()?,
            allowed_origins: parse_origins(
                &var("ALLOWED_ORIGINS").unwrap_or_else(|| DEFAULT_ALLOWED_ORIGINS.to_string()),
            ),
            rate_limit,
            settings,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_origins_trims_and_skips_blanks() {
        assert_eq!(
            parse_origins(" https://app.bastion.test , ,http://localhost:5173"),
            vec!["https://app.bastion.test", "http://localhost:5173"]
        );
        assert!(parse_origins("").is_empty());
    }

    #[test]
    fn test_rate_limit_defaults() {
        let rl = RateLimitConfig::default();
        assert!(rl.enabled);
        assert_eq!(rl.requests, 300);
        assert_eq!(rl.period, Duration::from_secs(60));
    }

    #[test]
    fn test_app_settings_defaults() {
        let settings = AppSettings::default();
        assert_eq!(settings.max_upload_bytes, 26_214_400);
        assert_eq!(settings.signed_url_ttl_secs, 300);
        assert!(settings.file_prep.max_concurrency.is_none());
    }
}
