use chrono::Utc;
use sqlx::types::Json;
use uuid::Uuid;

use crate::{
    db::DbPool,
    error::{AppError, Result},
    models::Location,
};

/// Location store for database operations
#[derive(Clone)]
pub struct LocationStore {
    pool: DbPool,
}

impl LocationStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub async fn get_all_locations(&self) -> Result<Vec<Location>> {
        let locations = sqlx::query_as::<_, Location>("SELECT * FROM locations ORDER BY name")
            .fetch_all(&self.pool)
            .await
            .map_err(AppError::Database)?;

        Ok(locations)
    }

    pub async fn get_location_by_id(&self, id: &str) -> Result<Location> {
        sqlx::query_as::<_, Location>("SELECT * FROM locations WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(AppError::Database)?
            .ok_or_else(|| AppError::NotFound("Location".into()))
    }

    /// Resolve a destination identifier: internal id first, then name
    /// (case-insensitive).
    pub async fn resolve(&self, identifier: &str) -> Result<Location> {
        let by_id = sqlx::query_as::<_, Location>("SELECT * FROM locations WHERE id = ?")
            .bind(identifier)
            .fetch_optional(&self.pool)
            .await
            .map_err(AppError::Database)?;
        if let Some(location) = by_id {
            return Ok(location);
        }

        sqlx::query_as::<_, Location>(
            "SELECT * FROM locations WHERE name = ? COLLATE NOCASE ORDER BY created_at LIMIT 1",
        )
        .bind(identifier)
        .fetch_optional(&self.pool)
        .await
        .map_err(AppError::Database)?
        .ok_or_else(|| AppError::NotFound("Location".into()))
    }

    pub async fn create_location(&self, name: &str, recipient_emails: Vec<String>) -> Result<Location> {
        let location = Location {
            id: Uuid::new_v4().to_string(),
            name: name.to_string(),
            recipient_emails: Json(recipient_emails),
            created_at: Utc::now(),
        };

        sqlx::query(
            r#"
            INSERT INTO locations (id, name, recipient_emails, created_at)
            VALUES (?, ?, ?, ?)
            "#,
        )
        .bind(&location.id)
        .bind(&location.name)
        .bind(&location.recipient_emails)
        .bind(location.created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| match AppError::from_write(e) {
            AppError::Conflict(_) => {
                AppError::Conflict(format!("a location named '{}' already exists", name))
            }
            other => other,
        })?;

        Ok(location)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_pool;

    #[tokio::test]
    async fn test_resolve_by_id_then_name() {
        let store = LocationStore::new(test_pool().await);
        let created = store
            .create_location("Warehouse A", vec!["dock@example.com".into()])
            .await
            .unwrap();

        let by_id = store.resolve(&created.id).await.unwrap();
        assert_eq!(by_id.name, "Warehouse A");

        let by_name = store.resolve("warehouse a").await.unwrap();
        assert_eq!(by_name.id, created.id);
        assert_eq!(by_name.recipient_emails.0, vec!["dock@example.com".to_string()]);

        assert!(matches!(
            store.resolve("Warehouse B").await,
            Err(AppError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_duplicate_name_is_conflict() {
        let store = LocationStore::new(test_pool().await);
        store.create_location("Depot", vec![]).await.unwrap();
        assert!(matches!(
            store.create_location("Depot", vec![]).await,
            Err(AppError::Conflict(_))
        ));
    }
}
