use chrono::{Duration, Utc};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};

use crate::{
    config::Config,
    error::{AppError, AuthError, Result},
};

/// Claims of an admin session token. Every valid session is an admin.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdminClaims {
    pub sub: String,
    pub iat: i64,
    pub exp: i64,
}

/// Issues an HS256 admin token for `subject`, valid for the configured hours.
pub fn issue_admin_token(subject: &str, config: &Config) -> Result<String> {
    let now = Utc::now();
    let claims = AdminClaims {
        sub: subject.to_string(),
        iat: now.timestamp(),
        exp: (now + Duration::hours(config.jwt_expiration_hours)).timestamp(),
    };

    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(config.jwt_secret.as_bytes()),
    )
    .map_err(|e| AppError::Internal(format!("failed to sign admin token: {}", e)))
}

pub fn verify_admin_token(token: &str, secret: &str) -> std::result::Result<AdminClaims, AuthError> {
    decode::<AdminClaims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .map(|data| data.claims)
    .map_err(|e| {
        tracing::debug!(error = %e, "Rejected admin token");
        AuthError::InvalidToken
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_issued_token_verifies() {
        let config = Config::for_tests();
        let token = issue_admin_token("admin@example.com", &config).unwrap();
        let claims = verify_admin_token(&token, &config.jwt_secret).unwrap();
        assert_eq!(claims.sub, "admin@example.com");
        assert!(claims.exp > claims.iat);
    }

    #[test]
    fn test_wrong_secret_and_expired_tokens_are_rejected() {
        let config = Config::for_tests();
        let token = issue_admin_token("admin", &config).unwrap();
        assert_eq!(
            verify_admin_token(&token, "other-secret").unwrap_err(),
            AuthError::InvalidToken
        );

        let expired = Config {
            jwt_expiration_hours: -2,
            ..Config::for_tests()
        };
        let token = issue_admin_token("admin", &expired).unwrap();
        assert_eq!(
            verify_admin_token(&token, &config.jwt_secret).unwrap_err(),
            AuthError::InvalidToken
        );
        assert!(verify_admin_token("garbage", &config.jwt_secret).is_err());
    }
}
