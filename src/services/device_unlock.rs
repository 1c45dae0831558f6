//! Unlocking received devices through the device-management API.
//!
//! One detached task per serial. Failures are logged and never retried here.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use tokio::task::JoinHandle;

#[derive(Debug, thiserror::Error)]
pub enum UnlockError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("device API responded with {0}")]
    Status(reqwest::StatusCode),
}

#[async_trait]
pub trait DeviceUnlocker: Send + Sync {
    async fn unlock(&self, serial_number: &str) -> Result<(), UnlockError>;
}

/// Used when no device-management API is configured.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogDeviceUnlocker;

#[async_trait]
impl DeviceUnlocker for LogDeviceUnlocker {
    async fn unlock(&self, serial_number: &str) -> Result<(), UnlockError> {
        tracing::info!(serial_number, "Device unlock requested (no device API configured)");
        Ok(())
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct UnlockRequest<'a> {
    serial_number: &'a str,
}

pub struct HttpDeviceUnlocker {
    client: reqwest::Client,
    endpoint: String,
    token: Option<String>,
}

impl HttpDeviceUnlocker {
    pub fn new(base_url: &str, token: Option<String>) -> Result<Self, UnlockError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()?;

        Ok(Self {
            client,
            endpoint: format!("{}/devices/unlock", base_url.trim_end_matches('/')),
            token,
        })
    }
}

#[async_trait]
impl DeviceUnlocker for HttpDeviceUnlocker {
    async fn unlock(&self, serial_number: &str) -> Result<(), UnlockError> {
        let mut request = self
            .client
            .post(&self.endpoint)
            .json(&UnlockRequest { serial_number });
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await?;
        if !response.status().is_success() {
            return Err(UnlockError::Status(response.status()));
        }

        Ok(())
    }
}

/// Fires one independent unlock per serial.
pub fn dispatch_unlocks(
    unlocker: &Arc<dyn DeviceUnlocker>,
    shipment_id: &str,
    serials: impl IntoIterator<Item = String>,
) -> Vec<JoinHandle<()>> {
    serials
        .into_iter()
        .map(|serial| {
            let unlocker = unlocker.clone();
            let shipment_id = shipment_id.to_string();
            tokio::spawn(async move {
                match unlocker.unlock(&serial).await {
                    Ok(()) => tracing::info!(%shipment_id, serial_number = %serial, "Device unlocked"),
                    Err(e) => tracing::warn!(
                        %shipment_id,
                        serial_number = %serial,
                        error = %e,
                        "Device unlock failed"
                    ),
                }
            })
        })
        .collect()
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use tokio::sync::mpsc;

    pub struct RecordingUnlocker {
        sender: mpsc::UnboundedSender<String>,
        fail_serials: Vec<String>,
    }

    impl RecordingUnlocker {
        pub fn new() -> (Self, mpsc::UnboundedReceiver<String>) {
            Self::failing_on(Vec::new())
        }

        /// Records every call but reports failure for the given serials.
        pub fn failing_on(fail_serials: Vec<String>) -> (Self, mpsc::UnboundedReceiver<String>) {
            let (sender, receiver) = mpsc::unbounded_channel();
            (
                Self {
                    sender,
                    fail_serials,
                },
                receiver,
            )
        }
    }

    #[async_trait]
    impl DeviceUnlocker for RecordingUnlocker {
        async fn unlock(&self, serial_number: &str) -> Result<(), UnlockError> {
            let _ = self.sender.send(serial_number.to_string());
            if self.fail_serials.iter().any(|s| s == serial_number) {
                return Err(UnlockError::Status(reqwest::StatusCode::BAD_GATEWAY));
            }
            Ok(())
        }
    }
}
