use std::collections::HashSet;
use std::sync::Arc;

use crate::{
    config::Config,
    db::{location_store::LocationStore, shipment_store::ShipmentStore},
    error::{AppError, Result},
    models::{
        ApiKeyIdentity, NewDevice, NewShipment, ShipmentDto, ShipmentStatus,
        shipment::{CreateShipmentRequest, PublicShipmentView},
    },
    services::{
        notification::{NotificationDispatcher, NotificationKind},
        short_id::{self, ShortId, ShortIdGenerator},
        validation::{Validator, optional_text},
    },
};

/// Shipment creation and read access.
#[derive(Clone)]
pub struct ShipmentService {
    store: ShipmentStore,
    locations: LocationStore,
    notifier: NotificationDispatcher,
    short_ids: Arc<dyn ShortIdGenerator>,
    config: Arc<Config>,
}

impl ShipmentService {
    pub fn new(
        store: ShipmentStore,
        locations: LocationStore,
        notifier: NotificationDispatcher,
        short_ids: Arc<dyn ShortIdGenerator>,
        config: Arc<Config>,
    ) -> Self {
        Self {
            store,
            locations,
            notifier,
            short_ids,
            config,
        }
    }

    /// Creates a `PENDING` shipment with its manifest for an authenticated caller.
    ///
    /// Validation and location lookup happen before anything is written. The
    /// short id is allocated by inserting and retrying on collision. The
    /// creation notification is sent after commit and cannot undo it.
    pub async fn create_shipment(
        &self,
        caller: &ApiKeyIdentity,
        request: CreateShipmentRequest,
    ) -> Result<ShipmentDto> {
        let (draft, destination) = validate_create(request)?;

        let location = self.locations.resolve(&destination).await?;
        let new = NewShipment {
            location_id: location.id.clone(),
            ..draft
        };

        let store = self.store.clone();
        let shipment = short_id::allocate(self.short_ids.as_ref(), |candidate| {
            let store = store.clone();
            let new = new.clone();
            async move { store.insert_with_devices(candidate.as_str(), &new).await }
        })
        .await?;

        tracing::info!(
            shipment_id = %shipment.id,
            short_id = %shipment.short_id,
            location = %location.name,
            api_key_id = %caller.id,
            devices = new.devices.len(),
            "Shipment created"
        );

        self.notifier.dispatch(
            NotificationKind::ShipmentCreated,
            &shipment,
            &location,
            Some(self.config.receive_link(&shipment.short_id)),
        );

        let devices = self.store.get_devices(&shipment.id).await?;
        Ok(ShipmentDto::new(shipment, devices))
    }

    pub async fn get_shipment(&self, id: &str) -> Result<ShipmentDto> {
        let shipment = self.store.get_shipment_by_id(id).await?;
        let devices = self.store.get_devices(&shipment.id).await?;
        Ok(ShipmentDto::new(shipment, devices))
    }

    pub async fn list_shipments(&self, status: Option<ShipmentStatus>) -> Result<Vec<ShipmentDto>> {
        let shipments = self.store.get_shipments(status).await?;
        let mut dtos = Vec::with_capacity(shipments.len());
        for shipment in shipments {
            let devices = self.store.get_devices(&shipment.id).await?;
            dtos.push(ShipmentDto::new(shipment, devices));
        }
        Ok(dtos)
    }

    /// What the public receive page shows for a short id.
    pub async fn public_view(&self, raw_short_id: &str) -> Result<PublicShipmentView> {
        let short_id =
            ShortId::parse(raw_short_id).ok_or_else(|| AppError::NotFound("Shipment".into()))?;
        let shipment = self.store.get_shipment_by_short_id(short_id.as_str()).await?;
        let location = self.locations.get_location_by_id(&shipment.location_id).await?;
        let devices = self.store.get_devices(&shipment.id).await?;
        Ok(PublicShipmentView::new(shipment, location.name, devices))
    }
}

/// Returns the shipment draft (without location) and the raw destination.
fn validate_create(request: CreateShipmentRequest) -> Result<(NewShipment, String)> {
    let mut validator = Validator::new();

    let sender_name = validator.required("senderName", request.sender_name.as_deref());
    let sender_email = validator.required_email("senderEmail", request.sender_email.as_deref());
    let destination = validator.required("destination", request.destination.as_deref());

    let mut devices = Vec::new();
    match request.devices {
        Some(inputs) if !inputs.is_empty() => {
            let mut seen = HashSet::new();
            for (index, input) in inputs.into_iter().enumerate() {
                let field = format!("devices[{}].serialNumber", index);
                let serial_number = validator.required(&field, input.serial_number.as_deref());
                if serial_number.is_empty() {
                    continue;
                }
                if !seen.insert(serial_number.clone()) {
                    validator.reject(field, format!("duplicate serial number {}", serial_number));
                    continue;
                }
                devices.push(NewDevice {
                    serial_number,
                    asset_tag: optional_text(input.asset_tag),
                    model: optional_text(input.model),
                });
            }
        }
        _ => validator.reject("devices", "at least one device is required"),
    }

    let notify_emails = validator.email_list(
        "notifyEmails",
        request
            .notify_emails
            .map(|list| list.into_entries())
            .unwrap_or_default(),
    );

    validator.finish().map_err(AppError::Validation)?;

    Ok((
        NewShipment {
            sender_name,
            sender_email,
            carrier: optional_text(request.carrier),
            tracking_number: optional_text(request.tracking_number),
            notes: optional_text(request.notes),
            notify_emails,
            location_id: String::new(),
            devices,
        },
        destination,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::shipment::{DeviceInput, EmailList};

    fn valid_request() -> CreateShipmentRequest {
        CreateShipmentRequest {
            sender_name: Some(" Ada ".into()),
            sender_email: Some("Ada@Example.com".into()),
            destination: Some("Warehouse A".into()),
            carrier: Some("  ".into()),
            tracking_number: Some("1Z999".into()),
            notes: None,
            devices: Some(vec![
                DeviceInput {
                    serial_number: Some("SN-1".into()),
                    ..Default::default()
                },
                DeviceInput {
                    serial_number: Some("SN-2".into()),
                    model: Some("Laptop".into()),
                    ..Default::default()
                },
            ]),
            notify_emails: Some(EmailList::Csv("it@example.com, ops@example.com".into())),
        }
    }

    #[test]
    fn test_validate_create_normalizes_input() {
        let (draft, destination) = validate_create(valid_request()).unwrap();
        assert_eq!(destination, "Warehouse A");
        assert_eq!(draft.sender_name, "Ada");
        assert_eq!(draft.sender_email, "ada@example.com");
        assert_eq!(draft.carrier, None);
        assert_eq!(draft.tracking_number.as_deref(), Some("1Z999"));
        assert_eq!(draft.devices.len(), 2);
        assert_eq!(draft.devices[1].model.as_deref(), Some("Laptop"));
        assert_eq!(draft.notify_emails, vec!["it@example.com", "ops@example.com"]);
    }

    #[test]
    fn test_validate_create_requires_devices() {
        let mut request = valid_request();
        request.devices = Some(vec![]);
        let Err(AppError::Validation(errors)) = validate_create(request) else {
            panic!("expected validation error");
        };
        assert_eq!(errors[0].field, "devices");
    }

    #[test]
    fn test_validate_create_reports_blank_and_duplicate_serials() {
        let mut request = valid_request();
        request.devices = Some(vec![
            DeviceInput {
                serial_number: Some("SN-1".into()),
                ..Default::default()
            },
            DeviceInput {
                serial_number: Some(" ".into()),
                ..Default::default()
            },
            DeviceInput {
                serial_number: Some("SN-1".into()),
                ..Default::default()
            },
        ]);
        request.sender_email = None;

        let Err(AppError::Validation(errors)) = validate_create(request) else {
            panic!("expected validation error");
        };
        let fields: Vec<_> = errors.iter().map(|e| e.field.as_str()).collect();
        assert_eq!(
            fields,
            vec!["senderEmail", "devices[1].serialNumber", "devices[2].serialNumber"]
        );
    }
}
