use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};

use crate::{
    error::{AppError, Result},
    handlers::auth::{AdminSession, AppJson},
    models::api_key::CreateApiKeyRequest,
    state::AppState,
};

/// Handler for creating a new API key. The secret is in this response only.
pub async fn create_api_key(
    State(state): State<AppState>,
    _admin: AdminSession,
    AppJson(request): AppJson<CreateApiKeyRequest>,
) -> Result<impl IntoResponse> {
    let description = request
        .description
        .map(|d| d.trim().to_string())
        .filter(|d| !d.is_empty())
        .ok_or_else(|| AppError::validation("description", "is required"))?;

    let created = state.api_keys.create_key(&description).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

pub async fn get_all_api_keys(
    State(state): State<AppState>,
    _admin: AdminSession,
) -> Result<impl IntoResponse> {
    let keys = state.api_keys.list_keys().await?;
    Ok((StatusCode::OK, Json(keys)))
}

/// Soft revoke
pub async fn deactivate_api_key(
    State(state): State<AppState>,
    _admin: AdminSession,
    Path(id): Path<String>,
) -> Result<impl IntoResponse> {
    state.api_keys.deactivate_key(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}
