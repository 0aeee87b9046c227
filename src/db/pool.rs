use crate::db::transaction::{ConnectionSource, TransactionalConnection};
use crate::error::DbError;
use async_trait::async_trait;
use once_cell::sync::OnceCell;
use sqlx::{
    PgPool, Pool, Postgres,
    pool::PoolConnection,
    postgres::{PgConnectOptions, PgPoolOptions},
};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Environment variable holding the PostgreSQL connection string.
pub const DATABASE_URL_VAR: &str = "DATABASE_URL";

/// Sizing and timeout policy for the connection pool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolSettings {
    pub max_connections: u32,
    pub min_connections: u32,
    /// How long an acquisition may wait for a free connection.
    pub acquire_timeout: Duration,
    pub idle_timeout: Duration,
}

impl Default for PoolSettings {
    fn default() -> Self {
        PoolSettings {
            max_connections: 5,
            min_connections: 0,
            acquire_timeout: Duration::from_secs(30),
            idle_timeout: Duration::from_secs(600),
        }
    }
}

impl PoolSettings {
    /// Rejects settings that would build a pool unable to hand out
    /// connections.
    pub fn validate(&self) -> Result<(), DbError> {
        if self.max_connections == 0 {
            return Err(DbError::Configuration(
                "max_connections must be at least 1".to_string(),
            ));
        }
        if self.min_connections > self.max_connections {
            return Err(DbError::Configuration(format!(
                "min_connections ({}) exceeds max_connections ({})",
                self.min_connections, self.max_connections
            )));
        }
        if self.acquire_timeout.is_zero() {
            return Err(DbError::Configuration(
                "acquire_timeout must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    fn pool_options(&self) -> PgPoolOptions {
        PgPoolOptions::new()
            .max_connections(self.max_connections)
            .min_connections(self.min_connections)
            .acquire_timeout(self.acquire_timeout)
            .idle_timeout(self.idle_timeout)
    }
}

type UrlSource = Box<dyn Fn() -> Option<String> + Send + Sync>;

/// Owns the connection pool for the lifetime of the hosting application.
///
/// The pool is created on the first call to [`PoolManager::get_pool`] and
/// reused afterwards. A failed creation leaves the manager empty, so the
/// next call tries again.
pub struct PoolManager {
    settings: PoolSettings,
    database_url: UrlSource,
    pool: OnceCell<PgPool>,
}

impl fmt::Debug for PoolManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PoolManager")
            .field("settings", &self.settings)
            .field("initialized", &self.is_initialized())
            .finish()
    }
}

impl PoolManager {
    /// Manager that reads `DATABASE_URL` from the process environment at
    /// pool creation time.
    pub fn from_env(settings: PoolSettings) -> Self {
        Self::with_url_source(settings, || std::env::var(DATABASE_URL_VAR).ok())
    }

    /// Manager with a custom connection string source, consulted on every
    /// creation attempt until one succeeds.
    pub fn with_url_source<F>(settings: PoolSettings, source: F) -> Self
    where
        F: Fn() -> Option<String> + Send + Sync + 'static,
    {
        PoolManager {
            settings,
            database_url: Box::new(source),
            pool: OnceCell::new(),
        }
    }

    /// Returns the pool, creating it on first use.
    ///
    /// Creation validates the connection string but does not connect;
    /// connections are opened lazily on acquisition. Must be called from
    /// within a Tokio runtime, since the pool spawns its reaper task there.
    ///
    /// # Errors
    /// Returns [`DbError::Configuration`] if the pool settings are invalid, or
    /// the connection string is unset, blank, or not a valid PostgreSQL URL.
    pub fn get_pool(&self) -> Result<&PgPool, DbError> {
        self.pool.get_or_try_init(|| self.create_pool())
    }

    pub fn is_initialized(&self) -> bool {
        self.pool.get().is_some()
    }

    /// Closes the pool if it was ever created, waiting for checked-out
    /// connections to be returned.
    pub async fn close(&self) {
        if let Some(pool) = self.pool.get() {
            tracing::info!("Closing database connection pool");
            pool.close().await;
        }
    }

    fn create_pool(&self) -> Result<PgPool, DbError> {
        self.settings.validate()?;

        let url = (self.database_url)().unwrap_or_default();
        let url = url.trim();
        if url.is_empty() {
            return Err(DbError::Configuration(format!("{} is not set", DATABASE_URL_VAR)));
        }

        if !(url.starts_with("postgres://") || url.starts_with("postgresql://")) {
            return Err(DbError::Configuration(format!(
                "{} must use the postgres:// or postgresql:// scheme",
                DATABASE_URL_VAR
            )));
        }

        let options = PgConnectOptions::from_str(url).map_err(|e| {
            DbError::Configuration(format!("{} is not a valid connection string: {}", DATABASE_URL_VAR, e))
        })?;

        tracing::info!(
            max_connections = self.settings.max_connections,
            min_connections = self.settings.min_connections,
            acquire_timeout_secs = self.settings.acquire_timeout.as_secs(),
            "Initializing database connection pool"
        );

        Ok(self.settings.pool_options().connect_lazy_with(options))
    }
}

#[async_trait]
impl ConnectionSource for PgPool {
    type Connection = PoolConnection<Postgres>;

    async fn acquire(&self) -> Result<Self::Connection, DbError> {
        Pool::acquire(self)
            .await
            .map_err(DbError::ConnectionAcquisition)
    }
}

#[async_trait]
impl ConnectionSource for PoolManager {
    type Connection = PoolConnection<Postgres>;

    async fn acquire(&self) -> Result<Self::Connection, DbError> {
        let pool = self.get_pool()?;
        ConnectionSource::acquire(pool).await
    }
}

#[async_trait]
impl TransactionalConnection for PoolConnection<Postgres> {
    async fn begin(&mut self) -> Result<(), sqlx::Error> {
        sqlx::query("BEGIN").execute(&mut **self).await?;
        Ok(())
    }

    async fn commit(&mut self) -> Result<(), sqlx::Error> {
        sqlx::query("COMMIT").execute(&mut **self).await?;
        Ok(())
    }

    async fn rollback(&mut self) -> Result<(), sqlx::Error> {
        sqlx::query("ROLLBACK").execute(&mut **self).await?;
        Ok(())
    }

    fn discard(&mut self) {
        // Closing the session makes the server abort whatever is still open.
        self.close_on_drop();
    }
}
