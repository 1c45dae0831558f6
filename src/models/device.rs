use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Database device model. `checked_in_at` is set exactly when `is_checked_in` is.
#[derive(Debug, Clone, FromRow)]
pub struct Device {
    pub id: String,
    pub shipment_id: String,
    pub serial_number: String,
    pub asset_tag: Option<String>,
    pub model: Option<String>,
    pub is_checked_in: bool,
    pub checked_in_at: Option<DateTime<Utc>>,
    pub is_extra: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceDto {
    pub id: String,
    pub serial_number: String,
    pub asset_tag: Option<String>,
    pub model: Option<String>,
    pub is_checked_in: bool,
    pub checked_in_at: Option<DateTime<Utc>>,
    pub is_extra: bool,
}

impl From<Device> for DeviceDto {
    fn from(device: Device) -> Self {
        Self {
            id: device.id,
            serial_number: device.serial_number,
            asset_tag: device.asset_tag,
            model: device.model,
            is_checked_in: device.is_checked_in,
            checked_in_at: device.checked_in_at,
            is_extra: device.is_extra,
        }
    }
}
