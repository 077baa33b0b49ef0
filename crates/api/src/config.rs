//! Server configuration loaded from the environment

use acerto_shared::{db::DEFAULT_MAX_CONNECTIONS, BusinessTimezone, InvalidTimezone};

const DEFAULT_BIND_ADDRESS: &str = "0.0.0.0:8080";
const DEFAULT_ALLOWED_ORIGINS: &str = "http://localhost:3000,http://127.0.0.1:3000";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    Missing(&'static str),

    #[error(transparent)]
    InvalidTimezone(#[from] InvalidTimezone),

    #[error("Invalid value for {name}: '{value}'")]
    Invalid { name: &'static str, value: String },
}

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub bind_address: String,
    /// Zone every "today" and scheduled time is evaluated in
    pub business_timezone: BusinessTimezone,
    /// HS256 secret the identity provider signs access tokens with
    pub supabase_jwt_secret: String,
    pub allowed_origins: Vec<String>,
    pub database_max_connections: u32,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        let database_url = required("DATABASE_URL")?;
        let supabase_jwt_secret = required("SUPABASE_JWT_SECRET")?;

        let bind_address =
            std::env::var("BIND_ADDRESS").unwrap_or_else(|_| DEFAULT_BIND_ADDRESS.to_string());

        let business_timezone = match std::env::var("BUSINESS_TIMEZONE") {
            Ok(name) if !name.trim().is_empty() => BusinessTimezone::from_name(name.trim())?,
            _ => BusinessTimezone::default(),
        };

        let allowed_origins = std::env::var("ALLOWED_ORIGINS")
            .unwrap_or_else(|_| DEFAULT_ALLOWED_ORIGINS.to_string())
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        let database_max_connections = match std::env::var("DATABASE_MAX_CONNECTIONS") {
            Ok(raw) => raw.trim().parse().map_err(|_| ConfigError::Invalid {
                name: "DATABASE_MAX_CONNECTIONS",
                value: raw,
            })?,
            Err(_) => DEFAULT_MAX_CONNECTIONS,
        };

        Ok(Self {
            database_url,
            bind_address,
            business_timezone,
            supabase_jwt_secret,
            allowed_origins,
            database_max_connections,
        })
    }
}

fn required(name: &'static str) -> Result<String, ConfigError> {
    match std::env::var(name) {
        Ok(value) if !value.trim().is_empty() => Ok(value),
        _ => Err(ConfigError::Missing(name)),
    }
}
