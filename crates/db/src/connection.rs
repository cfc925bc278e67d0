use std::time::Duration;

use sqlx::sqlite::SqlitePoolOptions;

use expenso_core::config::{AppConfig, DatabaseConfig};

pub type DbPool = sqlx::SqlitePool;

/// Opens a pool using the `[database]` section of the loaded config.
pub async fn connect_with_config(config: &DatabaseConfig) -> Result<DbPool, sqlx::Error> {
    connect_with_settings(&config.url, config.max_connections, config.timeout_secs).await
}

/// Opens a pool with the default pool sizing for the given URL.
pub async fn connect(database_url: &str) -> Result<DbPool, sqlx::Error> {
    let defaults = AppConfig::default().database;
    connect_with_settings(database_url, defaults.max_connections, defaults.timeout_secs).await
}

pub async fn connect_with_settings(
    database_url: &str,
    max_connections: u32,
    timeout_secs: u64,
) -> Result<DbPool, sqlx::Error> {
    SqlitePoolOptions::new()
        .max_connections(max_connections.max(1))
        .acquire_timeout(Duration::from_secs(timeout_secs.max(1)))
        .after_connect(|conn, _meta| {
            Box::pin(async move {
                // Referential integrity is off by default in sqlite;
                // the vote and rule-member tables rely on it.
                sqlx::query("PRAGMA foreign_keys = ON").execute(&mut *conn).await?;
                sqlx::query("PRAGMA journal_mode = WAL").execute(&mut *conn).await?;
                sqlx::query("PRAGMA busy_timeout = 5000").execute(&mut *conn).await?;
                Ok(())
            })
        })
        .connect(database_url)
        .await
}

#[cfg(test)]
mod tests {
    use sqlx::Row;

    use expenso_core::config::DatabaseConfig;

    use super::connect_with_config;

    #[tokio::test]
    async fn config_driven_connect_applies_session_pragmas() {
        let config = DatabaseConfig {
            url: "sqlite::memory:".to_string(),
            max_connections: 1,
            timeout_secs: 5,
        };
        let pool = connect_with_config(&config).await.expect("connect");

        let foreign_keys = sqlx::query("PRAGMA foreign_keys")
            .fetch_one(&pool)
            .await
            .expect("read pragma")
            .get::<i64, _>(0);
        assert_eq!(foreign_keys, 1);
    }
}
