use async_trait::async_trait;
use sqlx::{postgres::PgPoolOptions, PgPool};
use std::time::Duration;
use uuid::Uuid;

use crate::models::enrichment::{EnrichmentWrite, WriteOutcome};
use crate::models::poetry::{
    AuthorCount, NewPoetry, Page, PoetryPatch, PoetryQuery, PoetryRecord, PoetryStats,
};
use crate::models::user::{NewUser, User, UserQuery, UserRole, UserStatus};

pub mod memory;
pub mod queries;
pub mod user_queries;

pub use memory::MemoryStore;

/// Initialize PostgreSQL connection pool
pub async fn init_pool(database_url: &str) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(20)
        .min_connections(2)
        .acquire_timeout(Duration::from_secs(10))
        .idle_timeout(Duration::from_secs(600))
        .max_lifetime(Duration::from_secs(1800))
        .connect(database_url)
        .await
}

/// Run database migrations
pub async fn run_migrations(pool: &PgPool) -> Result<(), sqlx::Error> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .map_err(|e| sqlx::Error::Migrate(Box::new(e)))
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("{0}")]
    Conflict(String),

    #[error("corrupt row: {0}")]
    Corrupt(String),
}

/// Durable poem storage.
///
/// Every method touches only the columns it names; nothing rewrites a whole
/// document, so enrichment writes never clobber concurrent user edits.
#[async_trait]
pub trait PoetryStore: Send + Sync {
    async fn ping(&self) -> Result<(), StoreError>;

    async fn insert_poetry(&self, new: NewPoetry) -> Result<PoetryRecord, StoreError>;

    async fn find_poetry(&self, id: Uuid) -> Result<Option<PoetryRecord>, StoreError>;

    async fn list_poetry(&self, query: &PoetryQuery) -> Result<Page<PoetryRecord>, StoreError>;

    async fn update_poetry(
        &self,
        id: Uuid,
        patch: PoetryPatch,
    ) -> Result<Option<PoetryRecord>, StoreError>;

    /// Returns whether a row was removed.
    async fn delete_poetry(&self, id: Uuid) -> Result<bool, StoreError>;

    /// Atomically bump `view_count` and return the updated record.
    async fn record_view(&self, id: Uuid) -> Result<Option<PoetryRecord>, StoreError>;

    /// Atomically bump `like_count` and return the new value.
    async fn record_like(&self, id: Uuid) -> Result<Option<i64>, StoreError>;

    async fn list_dynasties(&self) -> Result<Vec<String>, StoreError>;

    async fn list_authors(
        &self,
        dynasty: Option<&str>,
        limit: u32,
    ) -> Result<Vec<AuthorCount>, StoreError>;

    async fn poetry_stats(&self) -> Result<PoetryStats, StoreError>;

    /// Targeted write of one workflow's fields, guarded by its preconditions.
    async fn apply_enrichment(
        &self,
        id: Uuid,
        write: EnrichmentWrite,
    ) -> Result<WriteOutcome, StoreError>;
}

/// Account storage.
#[async_trait]
pub trait UserStore: Send + Sync {
    /// Fails with [`StoreError::Conflict`] when the username is taken.
    async fn insert_user(&self, new: NewUser) -> Result<User, StoreError>;

    async fn find_user(&self, id: Uuid) -> Result<Option<User>, StoreError>;

    async fn find_user_by_username(&self, username: &str) -> Result<Option<User>, StoreError>;

    async fn list_users(&self, query: &UserQuery) -> Result<Page<User>, StoreError>;

    async fn update_profile(
        &self,
        id: Uuid,
        nickname: Option<String>,
        avatar: Option<String>,
    ) -> Result<Option<User>, StoreError>;

    async fn update_password(&self, id: Uuid, password_hash: &str) -> Result<bool, StoreError>;

    async fn set_user_status(
        &self,
        id: Uuid,
        status: UserStatus,
        role: Option<UserRole>,
    ) -> Result<Option<User>, StoreError>;

    async fn delete_user(&self, id: Uuid) -> Result<bool, StoreError>;
}

/// PostgreSQL-backed implementation of both stores.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

/// Escape `%`, `_` and `\` so user input matches literally inside ILIKE.
pub(crate) fn like_pattern(raw: &str) -> String {
    let mut escaped = String::with_capacity(raw.len() + 2);
    escaped.push('%');
    for c in raw.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped.push('%');
    escaped
}
