//! Database connection and management module
//!
//! Connection pooling and configuration for the Postgres-backed report
//! store. Queries live in `pg_store`.

use sqlx::Row;
use sqlx::{postgres::PgPoolOptions, PgPool};
use std::time::Duration;
use tracing::{info, warn};

use crate::config::parse_or;
use crate::error::{ConfigError, StoreError};

pub mod pg_store;

pub use pg_store::PgDataStore;

/// Tables the report store expects in the `ops` schema
const REQUIRED_TABLES: [&str; 5] = [
    "categories",
    "report_states",
    "users",
    "reports",
    "assistant_interactions",
];

/// Database configuration
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub database_url: String,
    pub max_connections: u32,
    pub connection_timeout: Duration,
    pub idle_timeout: Option<Duration>,
    pub max_lifetime: Option<Duration>,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            database_url: "postgresql://localhost:5432/ops_dashboard".to_string(),
            max_connections: 10,
            connection_timeout: Duration::from_secs(30),
            idle_timeout: Some(Duration::from_secs(600)),
            max_lifetime: Some(Duration::from_secs(1800)),
        }
    }
}

impl DatabaseConfig {
    /// `DATABASE_URL` and `DATABASE_POOL_SIZE` over the defaults
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let max_connections: u32 = parse_or("DATABASE_POOL_SIZE", &lookup, defaults.max_connections)?;
        if max_connections == 0 {
            return Err(ConfigError::InvalidValue {
                key: "DATABASE_POOL_SIZE".into(),
                value: "0".into(),
                reason: "must be at least 1".into(),
            });
        }

        Ok(Self {
            database_url: lookup("DATABASE_URL")
                .filter(|s| !s.trim().is_empty())
                .unwrap_or(defaults.database_url),
            max_connections,
            ..defaults
        })
    }
}

/// Database connection manager
pub struct DatabaseManager {
    pool: PgPool,
}

impl DatabaseManager {
    pub async fn new(config: DatabaseConfig) -> Result<Self, sqlx::Error> {
        info!(
            "Connecting to database: {}",
            mask_database_url(&config.database_url)
        );

        let mut pool_options = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(config.connection_timeout);

        if let Some(idle_timeout) = config.idle_timeout {
            pool_options = pool_options.idle_timeout(idle_timeout);
        }

        if let Some(max_lifetime) = config.max_lifetime {
            pool_options = pool_options.max_lifetime(max_lifetime);
        }

        let pool = pool_options
            .connect(&config.database_url)
            .await
            .map_err(|e| {
                warn!("Failed to connect to database: {}", e);
                e
            })?;

        info!("Database connection pool created successfully");

        Ok(Self { pool })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Report store sharing this manager's pool
    pub fn data_store(&self) -> PgDataStore {
        PgDataStore::new(self.pool.clone())
    }

    pub async fn test_connection(&self) -> Result<(), sqlx::Error> {
        sqlx::query("SELECT 1")
            .fetch_one(&self.pool)
            .await
            .map(|_| ())
    }

    /// Check that `sql/schema.sql` has been applied
    pub async fn verify_schema(&self) -> Result<(), StoreError> {
        let row = sqlx::query(
            r#"
            SELECT COUNT(*) AS count
            FROM information_schema.tables
            WHERE table_schema = 'ops'
            AND table_name = ANY($1)
            "#,
        )
        .bind(&REQUIRED_TABLES[..])
        .fetch_one(&self.pool)
        .await?;

        let count: i64 = row.get("count");
        if count < REQUIRED_TABLES.len() as i64 {
            warn!(
                found = count,
                expected = REQUIRED_TABLES.len(),
                "Expected tables not found in schema 'ops'. Apply sql/schema.sql"
            );
            return Err(StoreError::Transport(format!(
                "schema 'ops' has {} of {} required tables",
                count,
                REQUIRED_TABLES.len()
            )));
        }

        info!("Database schema verification complete");
        Ok(())
    }

    pub async fn close(self) {
        info!("Closing database connection pool");
        self.pool.close().await;
    }
}

/// Mask the password in a database URL for logging
fn mask_database_url(url: &str) -> String {
    if let Ok(parsed) = url::Url::parse(url) {
        let mut masked = parsed.clone();
        if parsed.password().is_some() {
            let _ = masked.set_password(Some("***"));
        }
        masked.to_string()
    } else {
        "***".to_string()
    }
}
