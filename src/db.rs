use std::str::FromStr;
use std::time::Duration;

use anyhow::Context;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use tracing::info;

use crate::config::AppConfig;

/// Open the store, creating the database file on first use. Acquiring a
/// connection waits at most the configured timeout.
pub async fn connect(cfg: &AppConfig) -> anyhow::Result<SqlitePool> {
    let options = SqliteConnectOptions::from_str(&cfg.database_url)
        .with_context(|| format!("invalid DATABASE_URL {}", cfg.database_url))?
        .create_if_missing(true)
        .foreign_keys(true);
    let db = SqlitePoolOptions::new()
        .max_connections(10)
        .acquire_timeout(Duration::from_secs(cfg.db_acquire_timeout_secs))
        .connect_with(options)
        .await
        .context("connect to database")?;
    info!(url = %cfg.database_url, "database connected");
    Ok(db)
}

pub async fn migrate(db: &SqlitePool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations")
        .run(db)
        .await
        .context("apply migrations")?;
    Ok(())
}

/// Single-connection in-memory store with the schema applied.
#[cfg(test)]
pub async fn memory_pool() -> SqlitePool {
    let options = SqliteConnectOptions::from_str("sqlite::memory:")
        .unwrap()
        .foreign_keys(true);
    let db = SqlitePoolOptions::new()
        .max_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect_with(options)
        .await
        .unwrap();
    migrate(&db).await.unwrap();
    db
}

#[cfg(test)]
mod db_tests {
    use super::*;

    #[tokio::test]
    async fn migrations_are_idempotent() {
        let db = memory_pool().await;
        migrate(&db).await.expect("second run is a no-op");

        let tables: Vec<(String,)> = sqlx::query_as(
            "SELECT name FROM sqlite_master WHERE type = 'table' AND name IN ('users', 'conversions') ORDER BY name",
        )
        .fetch_all(&db)
        .await
        .unwrap();
        assert_eq!(tables, vec![("conversions".to_string(),), ("users".to_string(),)]);
    }
}
