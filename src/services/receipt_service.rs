use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::Utc;

use crate::{
    db::{
        location_store::LocationStore,
        shipment_store::{RecipientUpdate, ShipmentStore},
    },
    error::{AppError, Result},
    models::{
        NewDevice,
        shipment::{
            ReceiveOutcome, ReceiveShipmentRequest, SignOffOutcome, SignOffShipmentRequest,
            VerifyOutcome, VerifyShipmentRequest,
        },
    },
    services::{
        check_in,
        device_unlock::{self, DeviceUnlocker},
        lifecycle::{self, Transition},
        notification::{NotificationDispatcher, NotificationKind},
        short_id::ShortId,
        validation::{Validator, normalize_email, optional_text},
    },
};

/// Receipt by the recipient, admin verification and admin sign-off.
#[derive(Clone)]
pub struct ReceiptService {
    store: ShipmentStore,
    locations: LocationStore,
    notifier: NotificationDispatcher,
    unlocker: Arc<dyn DeviceUnlocker>,
}

impl ReceiptService {
    pub fn new(
        store: ShipmentStore,
        locations: LocationStore,
        notifier: NotificationDispatcher,
        unlocker: Arc<dyn DeviceUnlocker>,
    ) -> Self {
        Self {
            store,
            locations,
            notifier,
            unlocker,
        }
    }

    /// Public receipt: `{PENDING, IN_TRANSIT, DELIVERED} -> RECEIVED`, checking
    /// in the reported serials. Unlocks and the notification go out after
    /// commit; their failures are only logged.
    pub async fn receive_shipment(
        &self,
        raw_short_id: &str,
        request: ReceiveShipmentRequest,
    ) -> Result<ReceiveOutcome> {
        let receipt = validate_receipt(request)?;

        let short_id =
            ShortId::parse(raw_short_id).ok_or_else(|| AppError::NotFound("Shipment".into()))?;
        let shipment = self.store.get_shipment_by_short_id(short_id.as_str()).await?;
        let now = Utc::now();

        let mut tx = self.store.pool().begin().await?;
        let status = lifecycle::apply(
            &mut tx,
            &shipment.id,
            Transition::Receive,
            &RecipientUpdate {
                name: Some(receipt.recipient_name),
                email: receipt.recipient_email,
                signature: Some(receipt.signature),
                received_at: Some(now),
            },
            now,
        )
        .await?;
        let checked_in_count =
            check_in::mark_received(&mut tx, &shipment.id, &receipt.serials, now).await?;
        let extra_devices_added =
            check_in::add_extra_devices(&mut tx, &shipment.id, &receipt.extras, now).await;
        tx.commit().await?;

        tracing::info!(
            shipment_id = %shipment.id,
            short_id = %shipment.short_id,
            %status,
            checked_in_count,
            extra_devices_added,
            "Shipment received"
        );

        device_unlock::dispatch_unlocks(&self.unlocker, &shipment.id, receipt.serials);
        self.notify_committed(NotificationKind::ShipmentReceived, &shipment.id)
            .await;

        Ok(ReceiveOutcome {
            status,
            checked_in_count,
            extra_devices_added,
        })
    }

    /// Admin verification: `RECEIVED -> COMPLETED`, checking in the given
    /// devices. A foreign device id rolls the whole transaction back.
    pub async fn verify_shipment(
        &self,
        shipment_id: &str,
        request: VerifyShipmentRequest,
    ) -> Result<VerifyOutcome> {
        let device_ids: BTreeSet<String> = match request.verified_device_ids {
            Some(ids) => check_in::serial_set(ids),
            None => return Err(AppError::validation("verifiedDeviceIds", "is required")),
        };

        let now = Utc::now();
        let mut tx = self.store.pool().begin().await?;
        let status = lifecycle::apply(
            &mut tx,
            shipment_id,
            Transition::Verify,
            &RecipientUpdate::default(),
            now,
        )
        .await?;
        let verified_devices_count =
            check_in::mark_verified(&mut tx, shipment_id, &device_ids, now).await?;
        tx.commit().await?;

        tracing::info!(shipment_id, %status, verified_devices_count, "Shipment verified");

        self.notify_committed(NotificationKind::ShipmentCompleted, shipment_id)
            .await;

        Ok(VerifyOutcome {
            status,
            verified_devices_count,
        })
    }

    /// Admin sign-off straight to `COMPLETED` from any non-terminal status.
    /// Device check-in flags are left as they are.
    pub async fn sign_off_shipment(
        &self,
        shipment_id: &str,
        request: SignOffShipmentRequest,
    ) -> Result<SignOffOutcome> {
        let mut validator = Validator::new();
        let recipient_name = validator.required("recipientName", request.recipient_name.as_deref());
        let signature = validator.signature("signature", request.signature.as_deref());
        let recipient_email = optional_email(&mut validator, request.recipient_email);
        validator.finish().map_err(AppError::Validation)?;

        let now = Utc::now();
        let mut tx = self.store.pool().begin().await?;
        let status = lifecycle::apply(
            &mut tx,
            shipment_id,
            Transition::SignOff,
            &RecipientUpdate {
                name: Some(recipient_name),
                email: recipient_email,
                signature: Some(signature),
                received_at: Some(now),
            },
            now,
        )
        .await?;
        tx.commit().await?;

        tracing::info!(shipment_id, %status, "Shipment signed off");

        self.notify_committed(NotificationKind::ShipmentCompleted, shipment_id)
            .await;

        Ok(SignOffOutcome { status })
    }

    /// Reads the committed shipment and hands it to the dispatcher. Never fails
    /// the caller.
    async fn notify_committed(&self, kind: NotificationKind, shipment_id: &str) {
        let shipment = match self.store.get_shipment_by_id(shipment_id).await {
            Ok(shipment) => shipment,
            Err(e) => {
                tracing::warn!(shipment_id, error = %e, "Skipping notification");
                return;
            }
        };
        match self.locations.get_location_by_id(&shipment.location_id).await {
            Ok(location) => {
                self.notifier.dispatch(kind, &shipment, &location, None);
            }
            Err(e) => tracing::warn!(shipment_id, error = %e, "Skipping notification"),
        }
    }
}

struct Receipt {
    recipient_name: String,
    recipient_email: Option<String>,
    signature: String,
    serials: BTreeSet<String>,
    extras: Vec<NewDevice>,
}

fn validate_receipt(request: ReceiveShipmentRequest) -> Result<Receipt> {
    let mut validator = Validator::new();
    let recipient_name = validator.required("recipientName", request.recipient_name.as_deref());
    let signature = validator.signature("signature", request.signature.as_deref());
    let recipient_email = optional_email(&mut validator, request.recipient_email);

    let serials = check_in::serial_set(&request.received_serials);
    let mut extras = Vec::new();
    for (index, input) in request.extra_devices.into_iter().enumerate() {
        let field = format!("extraDevices[{}].serialNumber", index);
        let serial_number = validator.required(&field, input.serial_number.as_deref());
        if !serial_number.is_empty() {
            extras.push(NewDevice {
                serial_number,
                asset_tag: optional_text(input.asset_tag),
                model: optional_text(input.model),
            });
        }
    }

    validator.finish().map_err(AppError::Validation)?;

    Ok(Receipt {
        recipient_name,
        recipient_email,
        signature,
        serials,
        extras,
    })
}

fn optional_email(validator: &mut Validator, value: Option<String>) -> Option<String> {
    let value = optional_text(value)?;
    match normalize_email(&value) {
        Some(email) => Some(email),
        None => {
            validator.reject("recipientEmail", "must be a valid email address");
            None
        }
    }
}
