use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, types::Json};

use crate::models::device::{Device, DeviceDto};

/// Shipment status as stored in the `shipments.status` column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[sqlx(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ShipmentStatus {
    Pending,
    InTransit,
    Delivered,
    Receiving,
    Received,
    Completed,
    Cancelled,
}

impl ShipmentStatus {
    pub const ALL: [ShipmentStatus; 7] = [
        ShipmentStatus::Pending,
        ShipmentStatus::InTransit,
        ShipmentStatus::Delivered,
        ShipmentStatus::Receiving,
        ShipmentStatus::Received,
        ShipmentStatus::Completed,
        ShipmentStatus::Cancelled,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ShipmentStatus::Pending => "PENDING",
            ShipmentStatus::InTransit => "IN_TRANSIT",
            ShipmentStatus::Delivered => "DELIVERED",
            ShipmentStatus::Receiving => "RECEIVING",
            ShipmentStatus::Received => "RECEIVED",
            ShipmentStatus::Completed => "COMPLETED",
            ShipmentStatus::Cancelled => "CANCELLED",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, ShipmentStatus::Completed | ShipmentStatus::Cancelled)
    }

    pub fn parse(value: &str) -> Option<Self> {
        let value = value.trim();
        Self::ALL
            .into_iter()
            .find(|status| status.as_str().eq_ignore_ascii_case(value))
    }
}

impl Default for ShipmentStatus {
    fn default() -> Self {
        Self::Pending
    }
}

impl fmt::Display for ShipmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Database shipment model
#[derive(Debug, Clone, FromRow)]
pub struct Shipment {
    pub id: String,
    pub short_id: String,
    pub status: ShipmentStatus,
    pub sender_name: String,
    pub sender_email: String,
    pub carrier: Option<String>,
    pub tracking_number: Option<String>,
    pub notes: Option<String>,
    pub recipient_name: Option<String>,
    pub recipient_email: Option<String>,
    pub signature: Option<String>,
    pub received_at: Option<DateTime<Utc>>,
    pub notify_emails: Json<Vec<String>>,
    pub location_id: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Fields needed to insert a new shipment row; id, short id, status and
/// timestamps are assigned by the store.
#[derive(Debug, Clone)]
pub struct NewShipment {
    pub sender_name: String,
    pub sender_email: String,
    pub carrier: Option<String>,
    pub tracking_number: Option<String>,
    pub notes: Option<String>,
    pub notify_emails: Vec<String>,
    pub location_id: String,
    pub devices: Vec<NewDevice>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewDevice {
    pub serial_number: String,
    pub asset_tag: Option<String>,
    pub model: Option<String>,
}

/// Notification addresses arrive either as a comma separated string or as an array.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum EmailList {
    Csv(String),
    List(Vec<String>),
}

impl EmailList {
    pub fn into_entries(self) -> Vec<String> {
        match self {
            EmailList::Csv(raw) => raw.split(',').map(str::to_string).collect(),
            EmailList::List(list) => list,
        }
        .into_iter()
        .map(|email| email.trim().to_string())
        .filter(|email| !email.is_empty())
        .collect()
    }
}

/// Device entry of a creation request or an extra device reported on receipt.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceInput {
    #[serde(default)]
    pub serial_number: Option<String>,
    #[serde(default)]
    pub asset_tag: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
}

/// Shipment creation payload
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateShipmentRequest {
    #[serde(default)]
    pub sender_name: Option<String>,
    #[serde(default)]
    pub sender_email: Option<String>,
    /// Location id or location name.
    #[serde(default, alias = "locationId", alias = "location")]
    pub destination: Option<String>,
    #[serde(default)]
    pub carrier: Option<String>,
    #[serde(default)]
    pub tracking_number: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub devices: Option<Vec<DeviceInput>>,
    #[serde(default)]
    pub notify_emails: Option<EmailList>,
}

/// Public receipt submission
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReceiveShipmentRequest {
    #[serde(default)]
    pub recipient_name: Option<String>,
    #[serde(default)]
    pub recipient_email: Option<String>,
    #[serde(default)]
    pub signature: Option<String>,
    #[serde(default)]
    pub received_serials: Vec<String>,
    #[serde(default)]
    pub extra_devices: Vec<DeviceInput>,
}

/// Admin verification of a received shipment
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyShipmentRequest {
    #[serde(default)]
    pub verified_device_ids: Option<Vec<String>>,
}

/// Admin direct sign-off
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignOffShipmentRequest {
    #[serde(default)]
    pub recipient_name: Option<String>,
    #[serde(default)]
    pub recipient_email: Option<String>,
    #[serde(default)]
    pub signature: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReceiveOutcome {
    pub status: ShipmentStatus,
    pub checked_in_count: u64,
    pub extra_devices_added: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyOutcome {
    pub status: ShipmentStatus,
    pub verified_devices_count: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignOffOutcome {
    pub status: ShipmentStatus,
}

/// JSON representation of a shipment for authenticated API responses
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShipmentDto {
    pub id: String,
    pub short_id: String,
    pub status: ShipmentStatus,
    pub sender_name: String,
    pub sender_email: String,
    pub carrier: Option<String>,
    pub tracking_number: Option<String>,
    pub notes: Option<String>,
    pub recipient_name: Option<String>,
    pub recipient_email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
    pub received_at: Option<DateTime<Utc>>,
    pub notify_emails: Vec<String>,
    pub location_id: String,
    pub devices: Vec<DeviceDto>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ShipmentDto {
    pub fn new(shipment: Shipment, devices: Vec<Device>) -> Self {
        Self {
            id: shipment.id,
            short_id: shipment.short_id,
            status: shipment.status,
            sender_name: shipment.sender_name,
            sender_email: shipment.sender_email,
            carrier: shipment.carrier,
            tracking_number: shipment.tracking_number,
            notes: shipment.notes,
            recipient_name: shipment.recipient_name,
            recipient_email: shipment.recipient_email,
            signature: shipment.signature,
            received_at: shipment.received_at,
            notify_emails: shipment.notify_emails.0,
            location_id: shipment.location_id,
            devices: devices.into_iter().map(DeviceDto::from).collect(),
            created_at: shipment.created_at,
            updated_at: shipment.updated_at,
        }
    }
}

/// What the unauthenticated receive page is allowed to see.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicShipmentView {
    pub short_id: String,
    pub status: ShipmentStatus,
    pub sender_name: String,
    pub carrier: Option<String>,
    pub tracking_number: Option<String>,
    pub location_name: String,
    pub devices: Vec<PublicDeviceView>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicDeviceView {
    pub serial_number: String,
    pub asset_tag: Option<String>,
    pub model: Option<String>,
    pub is_checked_in: bool,
}

impl PublicShipmentView {
    pub fn new(shipment: Shipment, location_name: String, devices: Vec<Device>) -> Self {
        Self {
            short_id: shipment.short_id,
            status: shipment.status,
            sender_name: shipment.sender_name,
            carrier: shipment.carrier,
            tracking_number: shipment.tracking_number,
            location_name,
            devices: devices
                .into_iter()
                .map(|device| PublicDeviceView {
                    serial_number: device.serial_number,
                    asset_tag: device.asset_tag,
                    model: device.model,
                    is_checked_in: device.is_checked_in,
                })
                .collect(),
        }
    }
}
