//! Device check-in tracking.
//!
//! All functions run on the caller's transaction so check-in flags commit
//! together with the status change that triggered them.

use std::collections::{BTreeSet, HashSet};

use chrono::{DateTime, Utc};
use sqlx::{Connection, SqliteConnection};

use crate::{
    db::shipment_store,
    error::{AppError, FieldError, Result},
    models::NewDevice,
};

/// Normalizes reported serials into a set: trimmed, blanks dropped.
pub fn serial_set<I, S>(serials: I) -> BTreeSet<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    serials
        .into_iter()
        .map(|serial| serial.as_ref().trim().to_string())
        .filter(|serial| !serial.is_empty())
        .collect()
}

/// Checks in every device of the shipment whose serial is in `serials`.
/// Devices not listed keep their current flags.
pub async fn mark_received(
    conn: &mut SqliteConnection,
    shipment_id: &str,
    serials: &BTreeSet<String>,
    at: DateTime<Utc>,
) -> Result<u64> {
    let serials: Vec<String> = serials.iter().cloned().collect();
    let updated = shipment_store::check_in_by_serials(conn, shipment_id, &serials, at)
        .await
        .map_err(AppError::Database)?;

    if (updated as usize) < serials.len() {
        tracing::debug!(
            shipment_id,
            reported = serials.len(),
            matched = updated,
            "Some received serials are not on the manifest"
        );
    }

    Ok(updated)
}

/// Checks in the given device ids after confirming each belongs to the
/// shipment. Any foreign id rejects the whole call before anything is written.
pub async fn mark_verified(
    conn: &mut SqliteConnection,
    shipment_id: &str,
    device_ids: &BTreeSet<String>,
    at: DateTime<Utc>,
) -> Result<u64> {
    let owned: HashSet<String> = shipment_store::device_ids_for_shipment(conn, shipment_id)
        .await
        .map_err(AppError::Database)?
        .into_iter()
        .collect();

    let foreign: Vec<FieldError> = device_ids
        .iter()
        .filter(|id| !owned.contains(*id))
        .map(|id| {
            FieldError::new(
                "verifiedDeviceIds",
                format!("device {} does not belong to this shipment", id),
            )
        })
        .collect();
    if !foreign.is_empty() {
        return Err(AppError::Validation(foreign));
    }

    let ids: Vec<String> = device_ids.iter().cloned().collect();
    shipment_store::check_in_by_ids(conn, shipment_id, &ids, at)
        .await
        .map_err(AppError::Database)
}

/// Appends unmanifested devices as checked-in extras. Runs in a savepoint and
/// never fails the caller: on error the extras are dropped and 0 is returned.
pub async fn add_extra_devices(
    conn: &mut SqliteConnection,
    shipment_id: &str,
    extras: &[NewDevice],
    at: DateTime<Utc>,
) -> u64 {
    if extras.is_empty() {
        return 0;
    }

    match try_add_extra_devices(conn, shipment_id, extras, at).await {
        Ok(added) => added,
        Err(e) => {
            tracing::warn!(shipment_id, error = %e, "Failed to record extra devices");
            0
        }
    }
}

async fn try_add_extra_devices(
    conn: &mut SqliteConnection,
    shipment_id: &str,
    extras: &[NewDevice],
    at: DateTime<Utc>,
) -> std::result::Result<u64, sqlx::Error> {
    let mut savepoint = conn.begin().await?;

    let mut known: HashSet<String> = shipment_store::serials_for_shipment(&mut savepoint, shipment_id)
        .await?
        .into_iter()
        .collect();

    let mut added = 0;
    for device in extras {
        if !known.insert(device.serial_number.clone()) {
            continue;
        }
        shipment_store::insert_device(&mut savepoint, shipment_id, device, true, Some(at)).await?;
        added += 1;
    }

    savepoint.commit().await?;
    Ok(added)
}
