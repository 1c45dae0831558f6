pub mod admin_auth;
pub mod api_key_service;
pub mod check_in;
pub mod device_unlock;
pub mod lifecycle;
pub mod notification;
pub mod receipt_service;
pub mod shipment_service;
pub mod short_id;
pub mod validation;

pub use api_key_service::ApiKeyService;
pub use receipt_service::ReceiptService;
pub use shipment_service::ShipmentService;
