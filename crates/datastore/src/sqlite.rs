use async_trait::async_trait;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::{Row, SqlitePool};
use tracing::info;

use botkeeper_core::{BotkeeperError, BotkeeperResult};

use crate::store::StateStore;

/// Durable key-value store over a single SQLite table.
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Connects to `database_url` and creates the backing table when it
    /// does not exist yet.
    pub async fn connect(database_url: &str) -> BotkeeperResult<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await
            .map_err(|e| {
                BotkeeperError::storage_error(format!(
                    "failed to open sqlite database {database_url}: {e}"
                ))
            })?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS kv_store (
                namespace  TEXT NOT NULL,
                key        TEXT NOT NULL,
                value      TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                PRIMARY KEY (namespace, key)
            )
            "#,
        )
        .execute(&pool)
        .await
        .map_err(|e| BotkeeperError::storage_error(format!("failed to create kv_store: {e}")))?;

        info!("Durable state store ready at {database_url}");
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

#[async_trait]
impl StateStore for SqliteStore {
    async fn get(
        &self,
        namespace: &str,
        key: &str,
    ) -> BotkeeperResult<Option<serde_json::Value>> {
        let row = sqlx::query("SELECT value FROM kv_store WHERE namespace = ?1 AND key = ?2")
            .bind(namespace)
            .bind(key)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| BotkeeperError::storage_error(e.to_string()))?;

        match row {
            Some(row) => {
                let raw: String = row
                    .try_get("value")
                    .map_err(|e| BotkeeperError::storage_error(e.to_string()))?;
                Ok(Some(serde_json::from_str(&raw)?))
            }
            None => Ok(None),
        }
    }

    async fn set(
        &self,
        namespace: &str,
        key: &str,
        value: serde_json::Value,
    ) -> BotkeeperResult<()> {
        sqlx::query(
            r#"
            INSERT INTO kv_store (namespace, key, value, updated_at)
            VALUES (?1, ?2, ?3, ?4)
            ON CONFLICT (namespace, key)
            DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at
            "#,
        )
        .bind(namespace)
        .bind(key)
        .bind(value.to_string())
        .bind(chrono::Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(|e| BotkeeperError::storage_error(e.to_string()))?;

        Ok(())
    }

    async fn delete(&self, namespace: &str, key: &str) -> BotkeeperResult<()> {
        sqlx::query("DELETE FROM kv_store WHERE namespace = ?1 AND key = ?2")
            .bind(namespace)
            .bind(key)
            .execute(&self.pool)
            .await
            .map_err(|e| BotkeeperError::storage_error(e.to_string()))?;

        Ok(())
    }
}
