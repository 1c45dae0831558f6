use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// One notification attempt. Append-only; the shipment reference is nulled
/// if the shipment is ever deleted.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmailLog {
    pub id: String,
    pub shipment_id: Option<String>,
    pub recipient: String,
    pub subject: String,
    pub kind: String,
    pub status: String,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
}

pub const EMAIL_STATUS_SENT: &str = "sent";
pub const EMAIL_STATUS_FAILED: &str = "failed";
