//! # bastion-db
//!
//! PostgreSQL database layer and Supabase service clients for Bastion OS.
//!
//! This crate provides:
//! - Connection pool management and migrations
//! - One repository per table group, every query scoped by `organisation_id`
//! - Supabase Storage and filesystem object storage backends
//! - Supabase Auth client and the bearer-token identity provider
//!
//! ## Example
//!
//! ```rust,ignore
//! use bastion_db::Database;
//!
//! let db = Database::connect("postgres://localhost/bastion").await?;
//! let clients = db.clients.list(principal.organisation_id).await?;
//! ```

pub mod auth;
pub mod briefs;
pub mod clients;
pub mod file_storage;
pub mod kb;
pub mod organisations;
pub mod pool;
pub mod practices;
pub mod profiles;
pub mod prompts;
pub mod sources;
pub mod supabase;
pub mod templates;

// Always compiled so integration tests (in tests/) can use DEFAULT_TEST_DATABASE_URL
pub mod test_fixtures;

// Re-export core types
pub use bastion_core::*;

pub use auth::{AuthUser, SupabaseAuthClient, SupabaseIdentityProvider};
pub use briefs::PgBriefRepository;
pub use clients::PgClientRepository;
pub use file_storage::{
    brief_file_storage_path, compute_content_hash, source_storage_path, FilesystemBackend,
    SupabaseStorageBackend,
};
pub use kb::PgKbRepository;
pub use organisations::PgOrganisationRepository;
pub use pool::{create_lazy_pool, create_pool, create_pool_with_config, log_pool_metrics, PoolConfig};
pub use practices::PgPracticeRepository;
pub use profiles::PgProfileRepository;
pub use prompts::{effective_prompt, PgPromptRepository};
pub use sources::PgSourceRepository;
pub use supabase::SupabaseConfig;
pub use templates::PgTemplateRepository;

/// Map a unique-constraint violation to `Error::Conflict`; pass anything
/// else through as a database error.
pub(crate) fn conflict_or_database(err: sqlx::Error, message: impl FnOnce() -> String) -> Error {
    let err = Error::Database(err);
    if err.is_unique_violation() {
        Error::Conflict(message())
    } else {
        err
    }
}

/// Combined database context with all repositories.
#[derive(Clone)]
pub struct Database {
    /// The underlying connection pool.
    pub pool: sqlx::Pool<sqlx::Postgres>,
    pub organisations: PgOrganisationRepository,
    pub profiles: PgProfileRepository,
    pub practices: PgPracticeRepository,
    pub clients: PgClientRepository,
    pub templates: PgTemplateRepository,
    pub briefs: PgBriefRepository,
    /// Knowledge-base sources.
    pub sources: PgSourceRepository,
    /// Knowledge-base conversations and messages.
    pub kb: PgKbRepository,
    /// Organisation prompt overrides.
    pub prompts: PgPromptRepository,
}

impl Database {
    /// Create a new Database instance from a connection pool.
    pub fn new(pool: sqlx::Pool<sqlx::Postgres>) -> Self {
        Self {
            organisations: PgOrganisationRepository::new(pool.clone()),
            profiles: PgProfileRepository::new(pool.clone()),
            practices: PgPracticeRepository::new(pool.clone()),
            clients: PgClientRepository::new(pool.clone()),
            templates: PgTemplateRepository::new(pool.clone()),
            briefs: PgBriefRepository::new(pool.clone()),
            sources: PgSourceRepository::new(pool.clone()),
            kb: PgKbRepository::new(pool.clone()),
            prompts: PgPromptRepository::new(pool.clone()),
            pool,
        }
    }

    /// Create a new Database instance by connecting to the given URL.
    pub async fn connect(url: &str) -> Result<Self> {
        let pool = create_pool(url).await?;
        Ok(Self::new(pool))
    }

    /// Create with custom pool configuration.
    pub async fn connect_with_config(url: &str, config: PoolConfig) -> Result<Self> {
        let pool = create_pool_with_config(url, config).await?;
        Ok(Self::new(pool))
    }

    /// Create without opening any connection until first use.
    pub fn connect_lazy(url: &str) -> Result<Self> {
        let pool = create_lazy_pool(url, PoolConfig::default())?;
        Ok(Self::new(pool))
    }

    /// Run pending migrations.
    #[cfg(feature = "migrations")]
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("../../migrations")
            .run(&self.pool)
            .await
            .map_err(|e| Error::Database(sqlx::Error::Migrate(Box::new(e))))?;
        Ok(())
    }

    /// Get the underlying connection pool.
    pub fn pool(&self) -> &sqlx::Pool<sqlx::Postgres> {
        &self.pool
    }
}
