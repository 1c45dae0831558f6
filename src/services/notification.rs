//! Shipment notification emails.
//!
//! Delivery itself is an external concern behind [`Mailer`]. Dispatch happens
//! on a detached task after the triggering transaction has committed; every
//! attempt is appended to `email_logs` and failures are only logged.

use std::sync::Arc;

use async_trait::async_trait;
use futures::future::join_all;
use tokio::task::JoinHandle;

use crate::{
    db::email_log_store::EmailLogStore,
    models::{
        Location, Shipment,
        email_log::{EMAIL_STATUS_FAILED, EMAIL_STATUS_SENT},
    },
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingEmail {
    pub from: String,
    pub to: String,
    pub subject: String,
    pub body: String,
}

#[derive(Debug, thiserror::Error)]
#[error("mail delivery failed: {0}")]
pub struct MailError(pub String);

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, email: &OutgoingEmail) -> Result<(), MailError>;
}

/// Writes messages to the log instead of delivering them.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, email: &OutgoingEmail) -> Result<(), MailError> {
        tracing::info!(to = %email.to, subject = %email.subject, "Email queued for delivery");
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationKind {
    ShipmentCreated,
    ShipmentReceived,
    ShipmentCompleted,
}

impl NotificationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationKind::ShipmentCreated => "shipment_created",
            NotificationKind::ShipmentReceived => "shipment_received",
            NotificationKind::ShipmentCompleted => "shipment_completed",
        }
    }
}

#[derive(Clone)]
pub struct NotificationDispatcher {
    mailer: Arc<dyn Mailer>,
    logs: EmailLogStore,
    from: String,
}

impl NotificationDispatcher {
    pub fn new(mailer: Arc<dyn Mailer>, logs: EmailLogStore, from: String) -> Self {
        Self { mailer, logs, from }
    }

    /// Sends `kind` for `shipment` to its notify list plus the location's
    /// recipients. Returns the handle of the detached task.
    pub fn dispatch(
        &self,
        kind: NotificationKind,
        shipment: &Shipment,
        location: &Location,
        receive_link: Option<String>,
    ) -> JoinHandle<()> {
        let recipients = recipients_for(shipment, location);
        let subject = subject_for(kind, shipment);
        let body = body_for(kind, shipment, location, receive_link.as_deref());
        let shipment_id = shipment.id.clone();
        let this = self.clone();

        tokio::spawn(async move {
            if recipients.is_empty() {
                tracing::debug!(%shipment_id, kind = kind.as_str(), "No notification recipients");
                return;
            }

            let sends = recipients.iter().map(|to| {
                let email = OutgoingEmail {
                    from: this.from.clone(),
                    to: to.clone(),
                    subject: subject.clone(),
                    body: body.clone(),
                };
                let mailer = this.mailer.clone();
                async move {
                    let outcome = mailer.send(&email).await;
                    (email, outcome)
                }
            });

            for (email, outcome) in join_all(sends).await {
                let (status, error) = match &outcome {
                    Ok(()) => (EMAIL_STATUS_SENT, None),
                    Err(e) => {
                        tracing::warn!(
                            %shipment_id,
                            to = %email.to,
                            error = %e,
                            "Notification email failed"
                        );
                        (EMAIL_STATUS_FAILED, Some(e.to_string()))
                    }
                };

                if let Err(e) = this
                    .logs
                    .append(
                        Some(&shipment_id),
                        &email.to,
                        &email.subject,
                        kind.as_str(),
                        status,
                        error.as_deref(),
                    )
                    .await
                {
                    tracing::error!(%shipment_id, error = %e, "Failed to write email log");
                }
            }
        })
    }
}

/// Shipment notify list followed by location recipients, de-duplicated
/// case-insensitively.
pub fn recipients_for(shipment: &Shipment, location: &Location) -> Vec<String> {
    let mut recipients: Vec<String> = Vec::new();
    for email in shipment
        .notify_emails
        .0
        .iter()
        .chain(location.recipient_emails.0.iter())
    {
        let email = email.trim().to_lowercase();
        if !email.is_empty() && !recipients.contains(&email) {
            recipients.push(email);
        }
    }
    recipients
}

fn subject_for(kind: NotificationKind, shipment: &Shipment) -> String {
    match kind {
        NotificationKind::ShipmentCreated => format!("Shipment {} is on its way", shipment.short_id),
        NotificationKind::ShipmentReceived => format!("Shipment {} was received", shipment.short_id),
        NotificationKind::ShipmentCompleted => format!("Shipment {} is complete", shipment.short_id),
    }
}

fn body_for(
    kind: NotificationKind,
    shipment: &Shipment,
    location: &Location,
    receive_link: Option<&str>,
) -> String {
    let mut body = match kind {
        NotificationKind::ShipmentCreated => format!(
            "{} is sending shipment {} to {}.",
            shipment.sender_name, shipment.short_id, location.name
        ),
        NotificationKind::ShipmentReceived => format!(
            "Shipment {} was signed for at {} by {}.",
            shipment.short_id,
            location.name,
            shipment.recipient_name.as_deref().unwrap_or("the recipient")
        ),
        NotificationKind::ShipmentCompleted => format!(
            "Shipment {} to {} has been verified and completed.",
            shipment.short_id, location.name
        ),
    };

    if let Some(carrier) = &shipment.carrier {
        body.push_str(&format!("\nCarrier: {}", carrier));
    }
    if let Some(tracking) = &shipment.tracking_number {
        body.push_str(&format!("\nTracking number: {}", tracking));
    }
    if let Some(link) = receive_link {
        body.push_str(&format!("\nConfirm receipt: {}", link));
    }
    body
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use tokio::sync::mpsc;

    /// Forwards every message to a channel the test can await.
    pub struct RecordingMailer {
        sender: mpsc::UnboundedSender<OutgoingEmail>,
    }

    impl RecordingMailer {
        pub fn new() -> (Self, mpsc::UnboundedReceiver<OutgoingEmail>) {
            let (sender, receiver) = mpsc::unbounded_channel();
            (Self { sender }, receiver)
        }
    }

    #[async_trait]
    impl Mailer for RecordingMailer {
        async fn send(&self, email: &OutgoingEmail) -> Result<(), MailError> {
            let _ = self.sender.send(email.clone());
            Ok(())
        }
    }

    pub struct FailingMailer;

    #[async_trait]
    impl Mailer for FailingMailer {
        async fn send(&self, _email: &OutgoingEmail) -> Result<(), MailError> {
            Err(MailError("smtp unreachable".into()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::*;
    use super::*;
    use crate::db::{location_store::LocationStore, shipment_store::ShipmentStore, test_pool};
    use crate::models::{NewDevice, NewShipment};

    async fn fixture() -> (crate::db::DbPool, Shipment, Location) {
        let pool = test_pool().await;
        let location = LocationStore::new(pool.clone())
            .create_location("Warehouse A", vec!["Dock@Example.com".into()])
            .await
            .unwrap();
        let shipment = ShipmentStore::new(pool.clone())
            .insert_with_devices(
                "NOTIFY",
                &NewShipment {
                    sender_name: "Ada".into(),
                    sender_email: "ada@example.com".into(),
                    carrier: Some("UPS".into()),
                    tracking_number: Some("1Z999".into()),
                    notes: None,
                    notify_emails: vec!["dock@example.com".into(), "it@example.com".into()],
                    location_id: location.id.clone(),
                    devices: vec![NewDevice {
                        serial_number: "SN-1".into(),
                        asset_tag: None,
                        model: None,
                    }],
                },
            )
            .await
            .unwrap();
        (pool, shipment, location)
    }

    #[tokio::test]
    async fn test_recipients_are_merged_and_deduplicated() {
        let (_pool, shipment, location) = fixture().await;
        assert_eq!(
            recipients_for(&shipment, &location),
            vec!["dock@example.com".to_string(), "it@example.com".to_string()]
        );
    }

    #[tokio::test]
    async fn test_dispatch_sends_and_logs_each_recipient() {
        let (pool, shipment, location) = fixture().await;
        let (mailer, mut outbox) = RecordingMailer::new();
        let dispatcher = NotificationDispatcher::new(
            Arc::new(mailer),
            EmailLogStore::new(pool.clone()),
            "shipments@example.test".into(),
        );

        dispatcher
            .dispatch(
                NotificationKind::ShipmentCreated,
                &shipment,
                &location,
                Some("https://ship.example.test/receive/NOTIFY".into()),
            )
            .await
            .unwrap();

        let first = outbox.recv().await.unwrap();
        assert_eq!(first.subject, "Shipment NOTIFY is on its way");
        assert!(first.body.contains("Confirm receipt: https://ship.example.test/receive/NOTIFY"));
        assert!(first.body.contains("Tracking number: 1Z999"));
        assert!(outbox.recv().await.is_some());

        let logs = EmailLogStore::new(pool)
            .get_logs_for_shipment(&shipment.id)
            .await
            .unwrap();
        assert_eq!(logs.len(), 2);
        assert!(logs.iter().all(|log| log.status == EMAIL_STATUS_SENT));
        assert!(logs.iter().all(|log| log.kind == "shipment_created"));
    }

    #[tokio::test]
    async fn test_failed_sends_are_logged_not_raised() {
        let (pool, shipment, location) = fixture().await;
        let dispatcher = NotificationDispatcher::new(
            Arc::new(FailingMailer),
            EmailLogStore::new(pool.clone()),
            "shipments@example.test".into(),
        );

        dispatcher
            .dispatch(NotificationKind::ShipmentReceived, &shipment, &location, None)
            .await
            .unwrap();

        let logs = EmailLogStore::new(pool)
            .get_logs_for_shipment(&shipment.id)
            .await
            .unwrap();
        assert_eq!(logs.len(), 2);
        assert!(logs.iter().all(|log| log.status == EMAIL_STATUS_FAILED));
        assert!(logs[0].error.as_deref().unwrap().contains("smtp unreachable"));
    }
}
