use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, types::Json};

/// Destination of shipments, with the addresses notified about them.
#[derive(Debug, Clone, FromRow)]
pub struct Location {
    pub id: String,
    pub name: String,
    pub recipient_emails: Json<Vec<String>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocationDto {
    pub id: String,
    pub name: String,
    pub recipient_emails: Vec<String>,
    pub created_at: DateTime<Utc>,
}

impl From<Location> for LocationDto {
    fn from(location: Location) -> Self {
        Self {
            id: location.id,
            name: location.name,
            recipient_emails: location.recipient_emails.0,
            created_at: location.created_at,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateLocationRequest {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub recipient_emails: Vec<String>,
}
