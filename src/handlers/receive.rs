use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};

use crate::{
    error::Result,
    handlers::auth::AppJson,
    models::shipment::ReceiveShipmentRequest,
    state::AppState,
};

/// Public receive page data, addressed by short id
pub async fn get_receive_view(
    State(state): State<AppState>,
    Path(short_id): Path<String>,
) -> Result<impl IntoResponse> {
    let view = state.shipments.public_view(&short_id).await?;
    Ok((StatusCode::OK, Json(view)))
}

/// Public receipt submission. Unauthenticated: the short id link is the capability.
pub async fn receive_shipment(
    State(state): State<AppState>,
    Path(short_id): Path<String>,
    AppJson(request): AppJson<ReceiveShipmentRequest>,
) -> Result<impl IntoResponse> {
    let outcome = state.receipts.receive_shipment(&short_id, request).await?;
    Ok((StatusCode::OK, Json(outcome)))
}
