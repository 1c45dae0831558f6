use std::env;

/// Runtime configuration, read once at start-up and injected into the app state.
#[derive(Debug, Clone)]
pub struct Config {
    pub server_host: String,
    pub server_port: u16,
    pub database_url: String,
    pub max_pool_size: u32,
    pub jwt_secret: String,
    pub jwt_expiration_hours: i64,
    pub public_base_url: String,
    pub device_unlock_url: Option<String>,
    pub device_unlock_token: Option<String>,
    pub mail_from: String,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if it exists
        let _ = dotenvy::dotenv();

        Ok(Self {
            server_host: env::var("SERVER_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            server_port: env::var("SERVER_PORT")
                .unwrap_or_else(|_| "8080".to_string())
                .parse()
                .map_err(|_| ConfigError::InvalidPort)?,
            database_url: env::var("DATABASE_URL")
                .unwrap_or_else(|_| "sqlite://shipments.db".to_string()),
            max_pool_size: env::var("MAX_POOL_SIZE")
                .unwrap_or_else(|_| "5".to_string())
                .parse()
                .unwrap_or(5),
            jwt_secret: env::var("JWT_SECRET").map_err(|_| ConfigError::Missing("JWT_SECRET"))?,
            jwt_expiration_hours: env::var("JWT_EXPIRATION_HOURS")
                .unwrap_or_else(|_| "24".to_string())
                .parse()
                .map_err(|_| ConfigError::InvalidNumber("JWT_EXPIRATION_HOURS"))?,
            public_base_url: env::var("PUBLIC_BASE_URL")
                .unwrap_or_else(|_| "http://localhost:8080".to_string())
                .trim_end_matches('/')
                .to_string(),
            device_unlock_url: optional_var("DEVICE_UNLOCK_URL"),
            device_unlock_token: optional_var("DEVICE_UNLOCK_TOKEN"),
            mail_from: env::var("MAIL_FROM").unwrap_or_else(|_| "shipments@localhost".to_string()),
        })
    }

    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.server_host, self.server_port)
    }

    /// Link handed to recipients so they can sign for a shipment.
    pub fn receive_link(&self, short_id: &str) -> String {
        format!("{}/receive/{}", self.public_base_url, short_id)
    }
}

fn optional_var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|value| !value.trim().is_empty())
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid port number")]
    InvalidPort,

    #[error("{0} must be set")]
    Missing(&'static str),

    #[error("{0} must be a number")]
    InvalidNumber(&'static str),
}

#[cfg(test)]
impl Config {
    pub fn for_tests() -> Self {
        Self {
            server_host: "127.0.0.1".to_string(),
            server_port: 0,
            database_url: "sqlite::memory:".to_string(),
            max_pool_size: 1,
            jwt_secret: "test-secret".to_string(),
            jwt_expiration_hours: 1,
            public_base_url: "https://ship.example.test".to_string(),
            device_unlock_url: None,
            device_unlock_token: None,
            mail_from: "shipments@example.test".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_receive_link_uses_base_url() {
        let config = Config::for_tests();
        assert_eq!(
            config.receive_link("ABCDEF"),
            "https://ship.example.test/receive/ABCDEF"
        );
        assert_eq!(config.server_addr(), "127.0.0.1:0");
    }
}
