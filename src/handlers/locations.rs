use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};

use crate::{
    error::{AppError, Result},
    handlers::auth::{AdminSession, AppJson},
    models::{LocationDto, location::CreateLocationRequest},
    services::validation::Validator,
    state::AppState,
};

pub async fn create_location(
    State(state): State<AppState>,
    _admin: AdminSession,
    AppJson(request): AppJson<CreateLocationRequest>,
) -> Result<impl IntoResponse> {
    let mut validator = Validator::new();
    let name = validator.required("name", request.name.as_deref());
    let recipient_emails = validator.email_list("recipientEmails", request.recipient_emails);
    validator.finish().map_err(AppError::Validation)?;

    let location = state.locations.create_location(&name, recipient_emails).await?;
    Ok((StatusCode::CREATED, Json(LocationDto::from(location))))
}

pub async fn get_all_locations(
    State(state): State<AppState>,
    _admin: AdminSession,
) -> Result<impl IntoResponse> {
    let locations: Vec<LocationDto> = state
        .locations
        .get_all_locations()
        .await?
        .into_iter()
        .map(LocationDto::from)
        .collect();
    Ok((StatusCode::OK, Json(locations)))
}
