//! Connection pool for the Afta store

use std::time::Duration;

use sqlx::pool::PoolConnection;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Sqlite, SqlitePool};
use tracing::{debug, info};

use crate::schema;
use crate::{Result, StoreError};

/// Pool configuration
#[derive(Debug, Clone)]
pub struct PoolConfig {
    pub url: String,
    pub max_size: u32,
    pub busy_timeout: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            url: "sqlite:afta.db".to_string(),
            max_size: 8,
            busy_timeout: Duration::from_secs(5),
        }
    }
}

impl PoolConfig {
    pub fn from_env() -> Self {
        Self {
            url: std::env::var("DATABASE_URL").unwrap_or_else(|_| "sqlite:afta.db".to_string()),
            max_size: std::env::var("DATABASE_POOL_SIZE")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(8),
            busy_timeout: Duration::from_secs(5),
        }
    }

    /// In-memory store on a single connection, used by tests and local runs.
    pub fn in_memory() -> Self {
        Self {
            url: "sqlite::memory:".to_string(),
            max_size: 1,
            busy_timeout: Duration::from_secs(5),
        }
    }
}

/// Afta store connection pool
#[derive(Clone)]
pub struct Store {
    pool: SqlitePool,
}

impl Store {
    /// Open the store and create the schema if it does not exist yet.
    pub async fn connect(config: &PoolConfig) -> Result<Self> {
        info!(url = %config.url, max_size = config.max_size, "Opening store");

        let options: SqliteConnectOptions = config
            .url
            .parse::<SqliteConnectOptions>()
            .map_err(|e| StoreError::Configuration(format!("Invalid URL: {}", e)))?
            .create_if_missing(true)
            .foreign_keys(true)
            .busy_timeout(config.busy_timeout);

        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_size)
            .connect_with(options)
            .await?;

        let store = Self { pool };
        store.init_schema().await?;

        debug!("Store opened");
        Ok(store)
    }

    /// Create all tables.
    async fn init_schema(&self) -> Result<()> {
        for ddl in schema::ALL_TABLES {
            sqlx::query(ddl).execute(&self.pool).await?;
        }
        Ok(())
    }

    /// Get a connection from the pool.
    pub async fn acquire(&self) -> Result<PoolConnection<Sqlite>> {
        Ok(self.pool.acquire().await?)
    }

    /// Check store health.
    pub async fn is_healthy(&self) -> bool {
        sqlx::query("SELECT 1").execute(&self.pool).await.is_ok()
    }

    /// Direct pool access for read-only queries outside a transaction.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}
