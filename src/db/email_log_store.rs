use chrono::Utc;
use uuid::Uuid;

use crate::{
    db::DbPool,
    error::{AppError, Result},
    models::EmailLog,
};

/// Append-only log of notification attempts
#[derive(Clone)]
pub struct EmailLogStore {
    pool: DbPool,
}

impl EmailLogStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub async fn append(
        &self,
        shipment_id: Option<&str>,
        recipient: &str,
        subject: &str,
        kind: &str,
        status: &str,
        error: Option<&str>,
    ) -> std::result::Result<EmailLog, sqlx::Error> {
        let entry = EmailLog {
            id: Uuid::new_v4().to_string(),
            shipment_id: shipment_id.map(str::to_string),
            recipient: recipient.to_string(),
            subject: subject.to_string(),
            kind: kind.to_string(),
            status: status.to_string(),
            error: error.map(str::to_string),
            created_at: Utc::now(),
        };

        sqlx::query(
            r#"
            INSERT INTO email_logs (id, shipment_id, recipient, subject, kind, status, error, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&entry.id)
        .bind(&entry.shipment_id)
        .bind(&entry.recipient)
        .bind(&entry.subject)
        .bind(&entry.kind)
        .bind(&entry.status)
        .bind(&entry.error)
        .bind(entry.created_at)
        .execute(&self.pool)
        .await?;

        Ok(entry)
    }

    pub async fn get_logs_for_shipment(&self, shipment_id: &str) -> Result<Vec<EmailLog>> {
        let logs = sqlx::query_as::<_, EmailLog>(
            "SELECT * FROM email_logs WHERE shipment_id = ? ORDER BY created_at, recipient",
        )
        .bind(shipment_id)
        .fetch_all(&self.pool)
        .await
        .map_err(AppError::Database)?;

        Ok(logs)
    }
}
