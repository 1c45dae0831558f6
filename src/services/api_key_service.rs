use argon2::{Argon2, PasswordHash, PasswordHasher, PasswordVerifier, password_hash::SaltString};
use chrono::Utc;
use rand::{Rng, distr::Alphanumeric};
use uuid::Uuid;

use crate::{
    db::api_key_store::ApiKeyStore,
    error::{AppError, AuthError, Result},
    models::{ApiKey, ApiKeyDto, ApiKeyIdentity, CreatedApiKey},
};

const SECRET_PREFIX: &str = "shp_";
const SECRET_LEN: usize = 40;
const SALT_LEN: usize = 16;

/// Issues, lists, revokes and verifies API keys.
#[derive(Clone)]
pub struct ApiKeyService {
    store: ApiKeyStore,
}

impl ApiKeyService {
    pub fn new(store: ApiKeyStore) -> Self {
        Self { store }
    }

    /// Creates a key and returns its plaintext secret. This is the only time
    /// the secret exists outside the caller.
    pub async fn create_key(&self, description: &str) -> Result<CreatedApiKey> {
        let secret = generate_secret();
        let key_hash = hash_secret(&secret)?;
        let key = ApiKey {
            id: Uuid::new_v4().to_string(),
            key_hash,
            description: description.to_string(),
            is_active: true,
            last_used_at: None,
            created_at: Utc::now(),
        };
        self.store.insert_key(&key).await?;

        tracing::info!(api_key_id = %key.id, "Created API key");
        Ok(CreatedApiKey {
            id: key.id,
            description: key.description,
            secret,
            created_at: key.created_at,
        })
    }

    pub async fn list_keys(&self) -> Result<Vec<ApiKeyDto>> {
        let keys = self.store.get_all_keys().await?;
        Ok(keys.into_iter().map(ApiKeyDto::from).collect())
    }

    pub async fn deactivate_key(&self, id: &str) -> Result<()> {
        self.store.deactivate_key(id).await?;
        tracing::info!(api_key_id = %id, "Deactivated API key");
        Ok(())
    }

    /// Checks `secret` against every active key. Fails closed: a store error
    /// is reported as `ServerError`, never as success.
    pub async fn authenticate(
        &self,
        secret: Option<&str>,
    ) -> std::result::Result<ApiKeyIdentity, AuthError> {
        let secret = match secret.map(str::trim) {
            Some(secret) if !secret.is_empty() => secret.to_string(),
            _ => return Err(AuthError::MissingKey),
        };

        let keys = self.store.get_active_keys().await.map_err(|e| {
            tracing::error!(error = %e, "Failed to load active API keys");
            AuthError::ServerError
        })?;

        if keys.is_empty() {
            return Err(AuthError::InvalidKey);
        }

        // Argon2 verification is CPU bound; keep it off the async workers.
        let matched = tokio::task::spawn_blocking(move || {
            keys.into_iter()
                .find(|key| verify_secret(&secret, &key.key_hash))
        })
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "API key verification task failed");
            AuthError::ServerError
        })?;

        let key = matched.ok_or(AuthError::InvalidKey)?;

        let store = self.store.clone();
        let key_id = key.id.clone();
        tokio::spawn(async move {
            if let Err(e) = store.touch_last_used(&key_id, Utc::now()).await {
                tracing::warn!(api_key_id = %key_id, error = %e, "Failed to record API key use");
            }
        });

        Ok(ApiKeyIdentity {
            id: key.id,
            description: key.description,
        })
    }
}

pub fn generate_secret() -> String {
    let body: String = rand::rng()
        .sample_iter(&Alphanumeric)
        .take(SECRET_LEN)
        .map(char::from)
        .collect();
    format!("{}{}", SECRET_PREFIX, body)
}

pub fn hash_secret(secret: &str) -> Result<String> {
    let mut salt_bytes = [0u8; SALT_LEN];
    rand::rng().fill(&mut salt_bytes);
    let salt = SaltString::encode_b64(&salt_bytes)
        .map_err(|e| AppError::Internal(format!("failed to encode salt: {}", e)))?;
    Argon2::default()
        .hash_password(secret.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| AppError::Internal(format!("failed to hash API key: {}", e)))
}

/// A malformed stored hash simply never matches.
pub fn verify_secret(secret: &str, stored_hash: &str) -> bool {
    match PasswordHash::new(stored_hash) {
        Ok(parsed) => Argon2::default()
            .verify_password(secret.as_bytes(), &parsed)
            .is_ok(),
        Err(e) => {
            tracing::warn!(error = %e, "Stored API key hash is malformed");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_pool;
    use std::time::Duration;

    fn service(pool: crate::db::DbPool) -> ApiKeyService {
        ApiKeyService::new(ApiKeyStore::new(pool))
    }

    #[test]
    fn test_hash_is_salted_and_verifiable() {
        let secret = generate_secret();
        assert!(secret.starts_with(SECRET_PREFIX));
        assert_eq!(secret.len(), SECRET_PREFIX.len() + SECRET_LEN);

        let first = hash_secret(&secret).unwrap();
        let second = hash_secret(&secret).unwrap();
        assert_ne!(first, second);
        assert!(!first.contains(&secret));
        assert!(verify_secret(&secret, &first));
        assert!(verify_secret(&secret, &second));
        assert!(!verify_secret("shp_wrong", &first));
        assert!(!verify_secret(&secret, "not-a-phc-string"));
    }

    #[tokio::test]
    async fn test_zero_active_keys_is_invalid_not_server_error() {
        let service = service(test_pool().await);
        assert_eq!(
            service.authenticate(Some("shp_anything")).await,
            Err(AuthError::InvalidKey)
        );
    }

    #[tokio::test]
    async fn test_missing_secret() {
        let service = service(test_pool().await);
        assert_eq!(service.authenticate(None).await, Err(AuthError::MissingKey));
        assert_eq!(service.authenticate(Some("  ")).await, Err(AuthError::MissingKey));
    }

    #[tokio::test]
    async fn test_authenticate_matches_among_several_keys_and_stamps_use() {
        let pool = test_pool().await;
        let service = service(pool.clone());
        service.create_key("first").await.unwrap();
        let wanted = service.create_key("second").await.unwrap();

        let identity = service.authenticate(Some(&wanted.secret)).await.unwrap();
        assert_eq!(identity.id, wanted.id);
        assert_eq!(identity.description, "second");

        let mut stamped = false;
        for _ in 0..50 {
            let keys = service.list_keys().await.unwrap();
            if keys.iter().any(|k| k.id == wanted.id && k.last_used_at.is_some()) {
                stamped = true;
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert!(stamped);

        assert_eq!(
            service.authenticate(Some("shp_not-a-real-key")).await,
            Err(AuthError::InvalidKey)
        );
    }

    #[tokio::test]
    async fn test_deactivated_key_stops_authenticating() {
        let service = service(test_pool().await);
        let created = service.create_key("ci").await.unwrap();
        service.deactivate_key(&created.id).await.unwrap();

        assert_eq!(
            service.authenticate(Some(&created.secret)).await,
            Err(AuthError::InvalidKey)
        );

        let listed = service.list_keys().await.unwrap();
        assert_eq!(listed.len(), 1);
        assert!(!listed[0].is_active);

        assert!(matches!(
            service.deactivate_key("nope").await,
            Err(AppError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_store_failure_fails_closed() {
        let pool = test_pool().await;
        let service = service(pool.clone());
        service.create_key("ci").await.unwrap();
        sqlx::query("DROP TABLE api_keys").execute(&pool).await.unwrap();

        assert_eq!(
            service.authenticate(Some("shp_whatever")).await,
            Err(AuthError::ServerError)
        );
    }
}
