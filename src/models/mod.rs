pub mod api_key;
pub mod device;
pub mod email_log;
pub mod location;
pub mod shipment;

pub use api_key::{ApiKey, ApiKeyDto, ApiKeyIdentity, CreatedApiKey};
pub use device::{Device, DeviceDto};
pub use email_log::EmailLog;
pub use location::{Location, LocationDto};
pub use shipment::{NewDevice, NewShipment, Shipment, ShipmentDto, ShipmentStatus};
