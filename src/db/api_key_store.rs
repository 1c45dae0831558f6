use chrono::{DateTime, Utc};

use crate::{
    db::DbPool,
    error::{AppError, Result},
    models::ApiKey,
};

/// API key store for database operations
#[derive(Clone)]
pub struct ApiKeyStore {
    pool: DbPool,
}

impl ApiKeyStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub async fn get_all_keys(&self) -> Result<Vec<ApiKey>> {
        let keys = sqlx::query_as::<_, ApiKey>("SELECT * FROM api_keys ORDER BY created_at DESC")
            .fetch_all(&self.pool)
            .await
            .map_err(AppError::Database)?;

        Ok(keys)
    }

    /// Every key that may currently authenticate. Returns the raw sqlx error so
    /// the authenticator can fail closed on it.
    pub async fn get_active_keys(&self) -> std::result::Result<Vec<ApiKey>, sqlx::Error> {
        sqlx::query_as::<_, ApiKey>("SELECT * FROM api_keys WHERE is_active = 1")
            .fetch_all(&self.pool)
            .await
    }

    pub async fn insert_key(&self, key: &ApiKey) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO api_keys (id, key_hash, description, is_active, last_used_at, created_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&key.id)
        .bind(&key.key_hash)
        .bind(&key.description)
        .bind(key.is_active)
        .bind(key.last_used_at)
        .bind(key.created_at)
        .execute(&self.pool)
        .await
        .map_err(AppError::from_write)?;

        Ok(())
    }

    /// Soft revoke: the row stays, it just stops authenticating.
    pub async fn deactivate_key(&self, id: &str) -> Result<()> {
        let result = sqlx::query("UPDATE api_keys SET is_active = 0 WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(AppError::Database)?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound("API key".into()));
        }

        Ok(())
    }

    pub async fn touch_last_used(
        &self,
        id: &str,
        at: DateTime<Utc>,
    ) -> std::result::Result<(), sqlx::Error> {
        sqlx::query("UPDATE api_keys SET last_used_at = ? WHERE id = ?")
            .bind(at)
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }
}
