use axum::{
    extract::{FromRequest, FromRequestParts},
    http::{HeaderMap, header, request::Parts},
};

use crate::{
    error::{AppError, AuthError},
    models::ApiKeyIdentity,
    services::admin_auth::{AdminClaims, verify_admin_token},
    state::AppState,
};

pub const API_KEY_HEADER: &str = "x-api-key";

/// JSON body whose rejections are reported as validation errors.
#[derive(FromRequest)]
#[from_request(via(axum::Json), rejection(AppError))]
pub struct AppJson<T>(pub T);

/// Caller authenticated by API key (`Authorization: Bearer` or `X-API-Key`).
pub struct ApiKeyAuth(pub ApiKeyIdentity);

impl FromRequestParts<AppState> for ApiKeyAuth {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let secret = bearer_token(&parts.headers).or_else(|| {
            parts
                .headers
                .get(API_KEY_HEADER)
                .and_then(|value| value.to_str().ok())
                .map(str::to_string)
        });

        let identity = state.api_keys.authenticate(secret.as_deref()).await?;
        Ok(Self(identity))
    }
}

/// Admin session carried as a bearer JWT.
pub struct AdminSession(pub AdminClaims);

impl FromRequestParts<AppState> for AdminSession {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let token = bearer_token(&parts.headers).ok_or(AuthError::MissingToken)?;
        let claims = verify_admin_token(&token, &state.config.jwt_secret)?;
        Ok(Self(claims))
    }
}

fn bearer_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| {
            value
                .strip_prefix("Bearer ")
                .or_else(|| value.strip_prefix("bearer "))
        })
        .map(|token| token.trim().to_string())
        .filter(|token| !token.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_bearer_token_parsing() {
        let mut headers = HeaderMap::new();
        assert_eq!(bearer_token(&headers), None);

        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer shp_abc"));
        assert_eq!(bearer_token(&headers).as_deref(), Some("shp_abc"));

        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Basic Zm9vOmJhcg=="));
        assert_eq!(bearer_token(&headers), None);

        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer   "));
        assert_eq!(bearer_token(&headers), None);
    }
}
