use chrono::{DateTime, Utc};
use sqlx::{QueryBuilder, Sqlite, SqliteConnection, types::Json};
use uuid::Uuid;

use crate::{
    db::DbPool,
    error::{AppError, Result},
    models::{Device, NewDevice, NewShipment, Shipment, ShipmentStatus},
};

/// Shipment store for database operations
#[derive(Clone)]
pub struct ShipmentStore {
    pool: DbPool,
}

/// Recipient details written alongside a completing or receiving transition.
#[derive(Debug, Clone, Default)]
pub struct RecipientUpdate {
    pub name: Option<String>,
    pub email: Option<String>,
    pub signature: Option<String>,
    pub received_at: Option<DateTime<Utc>>,
}

impl ShipmentStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &DbPool {
        &self.pool
    }

    /// Insert a shipment and its manifest in one transaction. The raw sqlx
    /// error is returned so callers can tell a short id collision apart.
    pub async fn insert_with_devices(
        &self,
        short_id: &str,
        new: &NewShipment,
    ) -> std::result::Result<Shipment, sqlx::Error> {
        let now = Utc::now();
        let shipment = Shipment {
            id: Uuid::new_v4().to_string(),
            short_id: short_id.to_string(),
            status: ShipmentStatus::Pending,
            sender_name: new.sender_name.clone(),
            sender_email: new.sender_email.clone(),
            carrier: new.carrier.clone(),
            tracking_number: new.tracking_number.clone(),
            notes: new.notes.clone(),
            recipient_name: None,
            recipient_email: None,
            signature: None,
            received_at: None,
            notify_emails: Json(new.notify_emails.clone()),
            location_id: new.location_id.clone(),
            created_at: now,
            updated_at: now,
        };

        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO shipments (
                id, short_id, status, sender_name, sender_email, carrier, tracking_number,
                notes, notify_emails, location_id, created_at, updated_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&shipment.id)
        .bind(&shipment.short_id)
        .bind(shipment.status)
        .bind(&shipment.sender_name)
        .bind(&shipment.sender_email)
        .bind(&shipment.carrier)
        .bind(&shipment.tracking_number)
        .bind(&shipment.notes)
        .bind(&shipment.notify_emails)
        .bind(&shipment.location_id)
        .bind(shipment.created_at)
        .bind(shipment.updated_at)
        .execute(&mut *tx)
        .await?;

        for device in &new.devices {
            insert_device(&mut tx, &shipment.id, device, false, None).await?;
        }

        tx.commit().await?;

        Ok(shipment)
    }

    pub async fn get_shipment_by_id(&self, id: &str) -> Result<Shipment> {
        sqlx::query_as::<_, Shipment>("SELECT * FROM shipments WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(AppError::Database)?
            .ok_or_else(|| AppError::NotFound("Shipment".into()))
    }

    /// Short ids are matched case-insensitively by uppercasing the input.
    pub async fn get_shipment_by_short_id(&self, short_id: &str) -> Result<Shipment> {
        sqlx::query_as::<_, Shipment>("SELECT * FROM shipments WHERE short_id = ?")
            .bind(short_id.trim().to_ascii_uppercase())
            .fetch_optional(&self.pool)
            .await
            .map_err(AppError::Database)?
            .ok_or_else(|| AppError::NotFound("Shipment".into()))
    }

    pub async fn get_shipments(&self, status: Option<ShipmentStatus>) -> Result<Vec<Shipment>> {
        let shipments = match status {
            Some(status) => {
                sqlx::query_as::<_, Shipment>(
                    "SELECT * FROM shipments WHERE status = ? ORDER BY created_at DESC",
                )
                .bind(status)
                .fetch_all(&self.pool)
                .await
            }
            None => {
                sqlx::query_as::<_, Shipment>("SELECT * FROM shipments ORDER BY created_at DESC")
                    .fetch_all(&self.pool)
                    .await
            }
        }
        .map_err(AppError::Database)?;

        Ok(shipments)
    }

    pub async fn get_devices(&self, shipment_id: &str) -> Result<Vec<Device>> {
        let devices = sqlx::query_as::<_, Device>(
            "SELECT * FROM devices WHERE shipment_id = ? ORDER BY is_extra, created_at, serial_number",
        )
        .bind(shipment_id)
        .fetch_all(&self.pool)
        .await
        .map_err(AppError::Database)?;

        Ok(devices)
    }
}

pub async fn insert_device(
    conn: &mut SqliteConnection,
    shipment_id: &str,
    device: &NewDevice,
    is_extra: bool,
    checked_in_at: Option<DateTime<Utc>>,
) -> std::result::Result<String, sqlx::Error> {
    let id = Uuid::new_v4().to_string();

    sqlx::query(
        r#"
        INSERT INTO devices (
            id, shipment_id, serial_number, asset_tag, model,
            is_checked_in, checked_in_at, is_extra, created_at
        )
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&id)
    .bind(shipment_id)
    .bind(&device.serial_number)
    .bind(&device.asset_tag)
    .bind(&device.model)
    .bind(checked_in_at.is_some())
    .bind(checked_in_at)
    .bind(is_extra)
    .bind(Utc::now())
    .execute(&mut *conn)
    .await?;

    Ok(id)
}

pub async fn current_status(
    conn: &mut SqliteConnection,
    shipment_id: &str,
) -> std::result::Result<Option<ShipmentStatus>, sqlx::Error> {
    let row: Option<(ShipmentStatus,)> =
        sqlx::query_as("SELECT status FROM shipments WHERE id = ?")
            .bind(shipment_id)
            .fetch_optional(&mut *conn)
            .await?;

    Ok(row.map(|(status,)| status))
}

/// `UPDATE ... SET status = target WHERE id = ? AND status IN (sources)`.
/// Returns the number of rows changed: 1 when the precondition held, 0 otherwise.
pub async fn conditional_status_update(
    conn: &mut SqliteConnection,
    shipment_id: &str,
    sources: &[ShipmentStatus],
    target: ShipmentStatus,
    recipient: &RecipientUpdate,
    at: DateTime<Utc>,
) -> std::result::Result<u64, sqlx::Error> {
    let mut query: QueryBuilder<Sqlite> = QueryBuilder::new("UPDATE shipments SET status = ");
    query.push_bind(target);
    query.push(", updated_at = ");
    query.push_bind(at);
    query.push(", recipient_name = COALESCE(");
    query.push_bind(recipient.name.clone());
    query.push(", recipient_name), recipient_email = COALESCE(");
    query.push_bind(recipient.email.clone());
    query.push(", recipient_email), signature = COALESCE(");
    query.push_bind(recipient.signature.clone());
    query.push(", signature), received_at = COALESCE(received_at, ");
    query.push_bind(recipient.received_at);
    query.push(") WHERE id = ");
    query.push_bind(shipment_id.to_string());
    query.push(" AND status IN (");
    let mut separated = query.separated(", ");
    for status in sources {
        separated.push_bind(*status);
    }
    separated.push_unseparated(")");

    let result = query.build().execute(&mut *conn).await?;
    Ok(result.rows_affected())
}

/// Marks every device of the shipment whose serial is listed as checked in.
pub async fn check_in_by_serials(
    conn: &mut SqliteConnection,
    shipment_id: &str,
    serials: &[String],
    at: DateTime<Utc>,
) -> std::result::Result<u64, sqlx::Error> {
    if serials.is_empty() {
        return Ok(0);
    }

    let mut query: QueryBuilder<Sqlite> =
        QueryBuilder::new("UPDATE devices SET is_checked_in = 1, checked_in_at = ");
    query.push_bind(at);
    query.push(" WHERE shipment_id = ");
    query.push_bind(shipment_id.to_string());
    query.push(" AND serial_number IN (");
    let mut separated = query.separated(", ");
    for serial in serials {
        separated.push_bind(serial.clone());
    }
    separated.push_unseparated(")");

    let result = query.build().execute(&mut *conn).await?;
    Ok(result.rows_affected())
}

/// Marks the listed device ids of the shipment as checked in.
pub async fn check_in_by_ids(
    conn: &mut SqliteConnection,
    shipment_id: &str,
    device_ids: &[String],
    at: DateTime<Utc>,
) -> std::result::Result<u64, sqlx::Error> {
    if device_ids.is_empty() {
        return Ok(0);
    }

    let mut query: QueryBuilder<Sqlite> =
        QueryBuilder::new("UPDATE devices SET is_checked_in = 1, checked_in_at = ");
    query.push_bind(at);
    query.push(" WHERE shipment_id = ");
    query.push_bind(shipment_id.to_string());
    query.push(" AND id IN (");
    let mut separated = query.separated(", ");
    for id in device_ids {
        separated.push_bind(id.clone());
    }
    separated.push_unseparated(")");

    let result = query.build().execute(&mut *conn).await?;
    Ok(result.rows_affected())
}

pub async fn device_ids_for_shipment(
    conn: &mut SqliteConnection,
    shipment_id: &str,
) -> std::result::Result<Vec<String>, sqlx::Error> {
    let rows: Vec<(String,)> = sqlx::query_as("SELECT id FROM devices WHERE shipment_id = ?")
        .bind(shipment_id)
        .fetch_all(&mut *conn)
        .await?;

    Ok(rows.into_iter().map(|(id,)| id).collect())
}

pub async fn serials_for_shipment(
    conn: &mut SqliteConnection,
    shipment_id: &str,
) -> std::result::Result<Vec<String>, sqlx::Error> {
    let rows: Vec<(String,)> =
        sqlx::query_as("SELECT serial_number FROM devices WHERE shipment_id = ?")
            .bind(shipment_id)
            .fetch_all(&mut *conn)
            .await?;

    Ok(rows.into_iter().map(|(serial,)| serial).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{location_store::LocationStore, test_pool};

    async fn seeded() -> (ShipmentStore, NewShipment) {
        let pool = test_pool().await;
        let location = LocationStore::new(pool.clone())
            .create_location("Warehouse A", vec![])
            .await
            .unwrap();
        let new = NewShipment {
            sender_name: "Ada".into(),
            sender_email: "ada@example.com".into(),
            carrier: None,
            tracking_number: None,
            notes: None,
            notify_emails: vec![],
            location_id: location.id,
            devices: vec![
                NewDevice {
                    serial_number: "SN-1".into(),
                    asset_tag: None,
                    model: None,
                },
                NewDevice {
                    serial_number: "SN-2".into(),
                    asset_tag: Some("AT-2".into()),
                    model: Some("Laptop".into()),
                },
            ],
        };
        (ShipmentStore::new(pool), new)
    }

    #[tokio::test]
    async fn test_insert_with_devices_and_lookup_by_short_id() {
        let (store, new) = seeded().await;
        let shipment = store.insert_with_devices("QWERTY", &new).await.unwrap();

        let found = store.get_shipment_by_short_id("qwerty").await.unwrap();
        assert_eq!(found.id, shipment.id);
        assert_eq!(found.status, ShipmentStatus::Pending);

        let devices = store.get_devices(&shipment.id).await.unwrap();
        assert_eq!(devices.len(), 2);
        assert!(devices.iter().all(|d| !d.is_checked_in && d.checked_in_at.is_none()));
    }

    #[tokio::test]
    async fn test_duplicate_short_id_rolls_back_devices() {
        let (store, new) = seeded().await;
        store.insert_with_devices("AAAAAA", &new).await.unwrap();

        let err = store.insert_with_devices("AAAAAA", &new).await.unwrap_err();
        assert!(crate::error::is_unique_violation_on(&err, "short_id"));

        let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM devices")
            .fetch_one(store.pool())
            .await
            .unwrap();
        assert_eq!(count.0, 2);
    }

    #[tokio::test]
    async fn test_conditional_update_only_from_sources() {
        let (store, new) = seeded().await;
        let shipment = store.insert_with_devices("BBBBBB", &new).await.unwrap();
        let mut conn = store.pool().acquire().await.unwrap();

        let changed = conditional_status_update(
            &mut conn,
            &shipment.id,
            &[ShipmentStatus::Received],
            ShipmentStatus::Completed,
            &RecipientUpdate::default(),
            Utc::now(),
        )
        .await
        .unwrap();
        assert_eq!(changed, 0);
        assert_eq!(
            current_status(&mut conn, &shipment.id).await.unwrap(),
            Some(ShipmentStatus::Pending)
        );

        let changed = conditional_status_update(
            &mut conn,
            &shipment.id,
            &[ShipmentStatus::Pending],
            ShipmentStatus::Received,
            &RecipientUpdate {
                name: Some("Bob".into()),
                ..Default::default()
            },
            Utc::now(),
        )
        .await
        .unwrap();
        assert_eq!(changed, 1);
        assert_eq!(
            current_status(&mut conn, &shipment.id).await.unwrap(),
            Some(ShipmentStatus::Received)
        );
    }
}
