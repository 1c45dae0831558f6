pub mod api_keys;
pub mod auth;
pub mod locations;
pub mod receive;
pub mod shipments;

use axum::{
    Router,
    routing::{delete, get, post},
};
use tower_http::trace::TraceLayer;

use crate::state::AppState;

pub fn router(state: AppState) -> Router {
    let api = Router::new()
        .route(
            "/shipments",
            post(shipments::create_shipment).get(shipments::get_all_shipments),
        )
        .route("/shipments/{id}", get(shipments::get_shipment_by_id))
        .route("/shipments/{id}/verify", post(shipments::verify_shipment))
        .route("/shipments/{id}/signoff", post(shipments::sign_off_shipment))
        .route("/shipments/{id}/emails", get(shipments::get_shipment_emails))
        .route(
            "/receive/{short_id}",
            get(receive::get_receive_view).post(receive::receive_shipment),
        )
        .route(
            "/api-keys",
            post(api_keys::create_api_key).get(api_keys::get_all_api_keys),
        )
        .route("/api-keys/{id}", delete(api_keys::deactivate_api_key))
        .route(
            "/locations",
            post(locations::create_location).get(locations::get_all_locations),
        );

    Router::new()
        .route("/health", get(health))
        .nest("/api", api)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health() -> &'static str {
    "Shipment server is running."
}
