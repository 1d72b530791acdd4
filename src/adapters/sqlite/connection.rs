//! SQLite connection pool setup.

use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConnectionError {
    #[error("failed to create database directory {path}: {source}")]
    DirectoryCreation {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to connect to database at {path}: {source}")]
    Connect {
        path: String,
        #[source]
        source: sqlx::Error,
    },

    #[error("connection verification failed: {0}")]
    Verification(#[source] sqlx::Error),
}

/// Pool sizing and timeout knobs, split out so tests can shrink them.
#[derive(Debug, Clone)]
pub struct PoolConfig {
    pub max_connections: u32,
    pub min_connections: u32,
    pub acquire_timeout: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_connections: 5,
            min_connections: 1,
            acquire_timeout: Duration::from_secs(3),
        }
    }
}

/// Creates the on-disk database directory if it does not yet exist.
pub fn ensure_database_directory(path: &str) -> Result<(), ConnectionError> {
    if let Some(parent) = Path::new(path).parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            std::fs::create_dir_all(parent).map_err(|source| ConnectionError::DirectoryCreation {
                path: parent.display().to_string(),
                source,
            })?;
        }
    }
    Ok(())
}

/// Creates a WAL-mode connection pool at `path`, creating the file and its
/// parent directory if needed.
pub async fn create_pool(path: &str, config: &PoolConfig) -> Result<SqlitePool, ConnectionError> {
    ensure_database_directory(path)?;

    let options = SqliteConnectOptions::from_str(&format!("sqlite://{path}"))
        .map_err(|source| ConnectionError::Connect { path: path.to_string(), source })?
        .create_if_missing(true)
        .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
        .foreign_keys(true)
        .busy_timeout(config.acquire_timeout);

    let pool = SqlitePoolOptions::new()
        .max_connections(config.max_connections)
        .min_connections(config.min_connections)
        .acquire_timeout(config.acquire_timeout)
        .connect_with(options)
        .await
        .map_err(|source| ConnectionError::Connect { path: path.to_string(), source })?;

    Ok(pool)
}

/// In-memory pool for tests. Each call gets an isolated database.
pub async fn create_test_pool() -> Result<SqlitePool, ConnectionError> {
    let options = SqliteConnectOptions::from_str("sqlite::memory:")
        .expect("in-memory sqlite URL is always valid")
        .foreign_keys(true);

    SqlitePoolOptions::new()
        .max_connections(1)
        .connect_with(options)
        .await
        .map_err(|source| ConnectionError::Connect { path: ":memory:".to_string(), source })
}

/// Cheap round-trip query used by health checks.
pub async fn verify_connection(pool: &SqlitePool) -> Result<(), ConnectionError> {
    sqlx::query("SELECT 1")
        .execute(pool)
        .await
        .map_err(ConnectionError::Verification)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_pool_connects_and_verifies() {
        let pool = create_test_pool().await.expect("pool should connect");
        verify_connection(&pool).await.expect("verification should pass");
    }
}
