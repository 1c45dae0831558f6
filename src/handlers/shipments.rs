use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde::Deserialize;

use crate::{
    error::{AppError, Result},
    handlers::auth::{AdminSession, ApiKeyAuth, AppJson},
    models::{
        ShipmentStatus,
        shipment::{CreateShipmentRequest, SignOffShipmentRequest, VerifyShipmentRequest},
    },
    state::AppState,
};

/// Create shipment handler (API key)
pub async fn create_shipment(
    State(state): State<AppState>,
    ApiKeyAuth(caller): ApiKeyAuth,
    AppJson(request): AppJson<CreateShipmentRequest>,
) -> Result<impl IntoResponse> {
    let shipment = state.shipments.create_shipment(&caller, request).await?;
    Ok((StatusCode::CREATED, Json(shipment)))
}

#[derive(Debug, Deserialize)]
pub struct ListShipmentsQuery {
    pub status: Option<String>,
}

/// List shipments handler, newest first
pub async fn get_all_shipments(
    State(state): State<AppState>,
    _admin: AdminSession,
    Query(query): Query<ListShipmentsQuery>,
) -> Result<impl IntoResponse> {
    let status = match query.status.as_deref() {
        None | Some("") => None,
        Some(raw) => Some(
            ShipmentStatus::parse(raw)
                .ok_or_else(|| AppError::validation("status", format!("unknown status {}", raw)))?,
        ),
    };
    let shipments = state.shipments.list_shipments(status).await?;
    Ok((StatusCode::OK, Json(shipments)))
}

/// Get shipment by ID handler
pub async fn get_shipment_by_id(
    State(state): State<AppState>,
    _admin: AdminSession,
    Path(id): Path<String>,
) -> Result<impl IntoResponse> {
    let shipment = state.shipments.get_shipment(&id).await?;
    Ok((StatusCode::OK, Json(shipment)))
}

/// Email log of a shipment
pub async fn get_shipment_emails(
    State(state): State<AppState>,
    _admin: AdminSession,
    Path(id): Path<String>,
) -> Result<impl IntoResponse> {
    // 404 for unknown shipments rather than an empty list
    state.shipments.get_shipment(&id).await?;
    let logs = state.email_logs.get_logs_for_shipment(&id).await?;
    Ok((StatusCode::OK, Json(logs)))
}

/// Admin verification of a received shipment
pub async fn verify_shipment(
    State(state): State<AppState>,
    AdminSession(admin): AdminSession,
    Path(id): Path<String>,
    AppJson(request): AppJson<VerifyShipmentRequest>,
) -> Result<impl IntoResponse> {
    tracing::debug!(admin = %admin.sub, shipment_id = %id, "Verify requested");
    let outcome = state.receipts.verify_shipment(&id, request).await?;
    Ok((StatusCode::OK, Json(outcome)))
}

/// Admin direct sign-off
pub async fn sign_off_shipment(
    State(state): State<AppState>,
    AdminSession(admin): AdminSession,
    Path(id): Path<String>,
    AppJson(request): AppJson<SignOffShipmentRequest>,
) -> Result<impl IntoResponse> {
    tracing::debug!(admin = %admin.sub, shipment_id = %id, "Sign-off requested");
    let outcome = state.receipts.sign_off_shipment(&id, request).await?;
    Ok((StatusCode::OK, Json(outcome)))
}
