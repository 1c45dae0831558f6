use std::sync::Arc;

use crate::{
    config::Config,
    db::{
        DbPool, api_key_store::ApiKeyStore, email_log_store::EmailLogStore,
        location_store::LocationStore, shipment_store::ShipmentStore,
    },
    services::{
        ApiKeyService, ReceiptService, ShipmentService,
        device_unlock::DeviceUnlocker,
        notification::{Mailer, NotificationDispatcher},
        short_id::ShortIdGenerator,
    },
};

/// Shared state handed to every handler. Cloning is cheap.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub pool: DbPool,
    pub shipments: ShipmentService,
    pub receipts: ReceiptService,
    pub api_keys: ApiKeyService,
    pub locations: LocationStore,
    pub email_logs: EmailLogStore,
}

impl AppState {
    pub fn new(
        config: Config,
        pool: DbPool,
        mailer: Arc<dyn Mailer>,
        unlocker: Arc<dyn DeviceUnlocker>,
        short_ids: Arc<dyn ShortIdGenerator>,
    ) -> Self {
        let config = Arc::new(config);
        let shipment_store = ShipmentStore::new(pool.clone());
        let locations = LocationStore::new(pool.clone());
        let email_logs = EmailLogStore::new(pool.clone());
        let notifier =
            NotificationDispatcher::new(mailer, email_logs.clone(), config.mail_from.clone());

        Self {
            shipments: ShipmentService::new(
                shipment_store.clone(),
                locations.clone(),
                notifier.clone(),
                short_ids,
                config.clone(),
            ),
            receipts: ReceiptService::new(shipment_store, locations.clone(), notifier, unlocker),
            api_keys: ApiKeyService::new(ApiKeyStore::new(pool.clone())),
            locations,
            email_logs,
            config,
            pool,
        }
    }
}
