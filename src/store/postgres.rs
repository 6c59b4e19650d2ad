//! Postgres key-value backend
//!
//! Values live in `memory_kv`, lists in `memory_lists` as a JSON array. Every
//! operation is a single statement scoped to one key; expiry is enforced by
//! filtering on `expires_at` at read time.

use crate::error::TwinError;
use crate::store::{expiry_from, KeyEntry, KvBackend};
use crate::Result;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::OnceCell;

pub struct PostgresBackend {
    pool: PgPool,
    schema_ready: Arc<OnceCell<()>>,
}

impl PostgresBackend {
    /// Create a lazily-connecting pool; no connection is made until first use.
    pub fn connect_lazy(url: &str) -> Result<Self> {
        let pool = sqlx::postgres::PgPoolOptions::new()
            .max_connections(5)
            .connect_lazy(url)
            .map_err(|e| {
                TwinError::DatabaseError(format!("Failed to create postgres pool: {}", e))
            })?;

        Ok(Self::from_pool(pool))
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self {
            pool,
            schema_ready: Arc::new(OnceCell::new()),
        }
    }

    async fn ensure_schema(&self) -> Result<()> {
        self.schema_ready
            .get_or_try_init(|| async {
                sqlx::query(
                    r#"
                    CREATE TABLE IF NOT EXISTS memory_kv (
                      key TEXT PRIMARY KEY,
                      value TEXT NOT NULL,
                      expires_at TIMESTAMPTZ
                    );
                    "#,
                )
                .execute(&self.pool)
                .await?;

                sqlx::query(
                    r#"
                    CREATE TABLE IF NOT EXISTS memory_lists (
                      key TEXT PRIMARY KEY,
                      items JSONB NOT NULL DEFAULT '[]'::jsonb,
                      expires_at TIMESTAMPTZ
                    );
                    "#,
                )
                .execute(&self.pool)
                .await?;

                sqlx::query(
                    r#"
                    CREATE INDEX IF NOT EXISTS idx_memory_kv_expires_at
                    ON memory_kv (expires_at);
                    "#,
                )
                .execute(&self.pool)
                .await?;

                Ok::<(), sqlx::Error>(())
            })
            .await
            .map_err(|e| {
                TwinError::DatabaseError(format!("Failed to initialize memory schema: {}", e))
            })?;

        Ok(())
    }
}

fn db_error(action: &str, error: sqlx::Error) -> TwinError {
    TwinError::DatabaseError(format!("Failed to {}: {}", action, error))
}

#[async_trait::async_trait]
impl KvBackend for PostgresBackend {
    fn name(&self) -> &'static str {
        "postgres"
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        self.ensure_schema().await?;

        let row = sqlx::query(
            r#"
            SELECT value FROM memory_kv
            WHERE key = $1 AND (expires_at IS NULL OR expires_at > NOW())
            "#,
        )
        .bind(key)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| db_error("read key", e))?;

        match row {
            Some(row) => Ok(Some(row.try_get("value").map_err(|e| db_error("decode value", e))?)),
            None => Ok(None),
        }
    }

    async fn set_with_ttl(&self, key: &str, value: String, ttl: Duration) -> Result<()> {
        self.ensure_schema().await?;

        sqlx::query(
            r#"
            INSERT INTO memory_kv (key, value, expires_at)
            VALUES ($1, $2, $3)
            ON CONFLICT (key) DO UPDATE
              SET value = EXCLUDED.value, expires_at = EXCLUDED.expires_at
            "#,
        )
        .bind(key)
        .bind(value)
        .bind(expiry_from(Utc::now(), ttl))
        .execute(&self.pool)
        .await
        .map_err(|e| db_error("write key", e))?;

        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        self.ensure_schema().await?;

        let value_live: Option<bool> = sqlx::query(
            r#"
            DELETE FROM memory_kv WHERE key = $1
            RETURNING (expires_at IS NULL OR expires_at > NOW()) AS live
            "#,
        )
        .bind(key)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| db_error("delete key", e))?
        .map(|row| row.try_get("live").unwrap_or(false));

        let list_live: Option<bool> = sqlx::query(
            r#"
            DELETE FROM memory_lists WHERE key = $1
            RETURNING (expires_at IS NULL OR expires_at > NOW()) AS live
            "#,
        )
        .bind(key)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| db_error("delete list", e))?
        .map(|row| row.try_get("live").unwrap_or(false));

        Ok(value_live.unwrap_or(false) || list_live.unwrap_or(false))
    }

    async fn scan_prefix(&self, prefix: &str) -> Result<Vec<KeyEntry>> {
        self.ensure_schema().await?;

        let rows = sqlx::query(
            r#"
            SELECT key, expires_at FROM memory_kv
            WHERE starts_with(key, $1)
            ORDER BY key ASC
            "#,
        )
        .bind(prefix)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| db_error("scan keys", e))?;

        let mut entries = Vec::with_capacity(rows.len());
        for row in rows {
            let key: String = row.try_get("key").map_err(|e| db_error("decode key", e))?;
            let expires_at: Option<DateTime<Utc>> = row.try_get("expires_at").unwrap_or(None);
            entries.push(KeyEntry { key, expires_at });
        }

        Ok(entries)
    }

    async fn list_push_front(&self, key: &str, value: String) -> Result<()> {
        self.ensure_schema().await?;

        // An expired list starts over instead of growing stale entries
        sqlx::query(
            r#"
            INSERT INTO memory_lists (key, items, expires_at)
            VALUES ($1, jsonb_build_array($2::text), NULL)
            ON CONFLICT (key) DO UPDATE
              SET items = CASE
                    WHEN memory_lists.expires_at IS NOT NULL AND memory_lists.expires_at <= NOW()
                      THEN jsonb_build_array($2::text)
                    ELSE jsonb_build_array($2::text) || memory_lists.items
                  END,
                  expires_at = CASE
                    WHEN memory_lists.expires_at IS NOT NULL AND memory_lists.expires_at <= NOW()
                      THEN NULL
                    ELSE memory_lists.expires_at
                  END
            "#,
        )
        .bind(key)
        .bind(value)
        .execute(&self.pool)
        .await
        .map_err(|e| db_error("push list item", e))?;

        Ok(())
    }

    async fn list_trim(&self, key: &str, keep: usize) -> Result<()> {
        self.ensure_schema().await?;

        sqlx::query(
            r#"
            UPDATE memory_lists
            SET items = COALESCE(
              (SELECT jsonb_agg(item ORDER BY position)
               FROM jsonb_array_elements(items) WITH ORDINALITY AS t(item, position)
               WHERE position <= $2),
              '[]'::jsonb)
            WHERE key = $1
            "#,
        )
        .bind(key)
        .bind(keep as i64)
        .execute(&self.pool)
        .await
        .map_err(|e| db_error("trim list", e))?;

        Ok(())
    }

    async fn list_range(&self, key: &str, count: usize) -> Result<Vec<String>> {
        self.ensure_schema().await?;

        let rows = sqlx::query(
            r#"
            SELECT t.item AS item
            FROM memory_lists,
                 jsonb_array_elements_text(memory_lists.items) WITH ORDINALITY AS t(item, position)
            WHERE memory_lists.key = $1
              AND (memory_lists.expires_at IS NULL OR memory_lists.expires_at > NOW())
              AND t.position <= $2
            ORDER BY t.position ASC
            "#,
        )
        .bind(key)
        .bind(count as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| db_error("read list", e))?;

        let mut items = Vec::with_capacity(rows.len());
        for row in rows {
            items.push(row.try_get("item").map_err(|e| db_error("decode list item", e))?);
        }
        Ok(items)
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<()> {
        self.ensure_schema().await?;
        let expires_at = expiry_from(Utc::now(), ttl);

        sqlx::query("UPDATE memory_lists SET expires_at = $2 WHERE key = $1")
            .bind(key)
            .bind(expires_at)
            .execute(&self.pool)
            .await
            .map_err(|e| db_error("set list expiry", e))?;

        sqlx::query("UPDATE memory_kv SET expires_at = $2 WHERE key = $1")
            .bind(key)
            .bind(expires_at)
            .execute(&self.pool)
            .await
            .map_err(|e| db_error("set key expiry", e))?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_driver_errors_map_to_database_error() {
        let error = db_error("load value", sqlx::Error::RowNotFound);
        assert!(matches!(&error, TwinError::DatabaseError(msg) if msg.starts_with("Failed to load value: ")));
    }

    #[tokio::test]
    async fn test_bad_url_is_reported_not_panicked() {
        let result = PostgresBackend::connect_lazy("not a database url");
        assert!(matches!(result, Err(TwinError::DatabaseError(_))));
    }
}
