//! Configuration module
//!
//! Loads configuration from environment variables.

use std::env;
use std::str::FromStr;

use crate::aggregator::PlaidEnvironment;

/// Signing secret used outside production when `JWT_SECRET` is unset
const DEV_JWT_SECRET: &str = "cashai-development-secret-change-me";

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Database connection URL (SQLite)
    pub database_url: String,

    /// Maximum database connections in pool
    pub database_max_connections: u32,

    /// Server host
    pub host: String,

    /// Server port
    pub port: u16,

    /// Environment (development, production)
    pub environment: String,

    /// CORS origins; `*` allows any
    pub allowed_origins: Vec<String>,

    /// HMAC secret for session tokens
    pub jwt_secret: String,

    /// Key sealing aggregator access credentials at rest
    pub credential_key: Option<String>,

    pub plaid_client_id: String,
    pub plaid_secret: String,
    pub plaid_env: PlaidEnvironment,

    /// Overrides the environment's base URL
    pub plaid_base_url: Option<String>,

    /// OAuth redirect URI registered with Plaid
    pub plaid_redirect_uri: Option<String>,

    /// Name shown inside Plaid Link
    pub plaid_client_name: String,

    /// Deep link handing control back to the mobile app after OAuth
    pub mobile_redirect_uri: String,

    /// Return the raw access credential from the public token exchange
    pub echo_access_token: bool,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        let environment = env::var("ENVIRONMENT").unwrap_or_else(|_| "development".to_string());
        let production = environment == "production";

        let database_url =
            env::var("DATABASE_URL").unwrap_or_else(|_| "sqlite://cashai.db".to_string());

        let database_max_connections = parse_or("DATABASE_MAX_CONNECTIONS", 5)?;

        let host = env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string());

        let port = parse_or("PORT", 8080)?;

        let allowed_origins = env::var("ALLOWED_ORIGINS")
            .unwrap_or_else(|_| "*".to_string())
            .split(',')
            .map(|origin| origin.trim().to_string())
            .filter(|origin| !origin.is_empty())
            .collect();

        let jwt_secret = match env::var("JWT_SECRET") {
            Ok(secret) if !secret.trim().is_empty() => secret,
            _ if production => return Err(ConfigError::MissingEnv("JWT_SECRET")),
            _ => DEV_JWT_SECRET.to_string(),
        };

        let credential_key = non_empty("CREDENTIAL_ENCRYPTION_KEY");
        if production && credential_key.is_none() {
            return Err(ConfigError::MissingEnv("CREDENTIAL_ENCRYPTION_KEY"));
        }

        let plaid_client_id =
            non_empty("PLAID_CLIENT_ID").ok_or(ConfigError::MissingEnv("PLAID_CLIENT_ID"))?;
        let plaid_secret =
            non_empty("PLAID_SECRET").ok_or(ConfigError::MissingEnv("PLAID_SECRET"))?;

        let plaid_env = match non_empty("PLAID_ENV") {
            Some(value) => value
                .parse()
                .map_err(|_| ConfigError::InvalidValue("PLAID_ENV"))?,
            None => PlaidEnvironment::Sandbox,
        };

        let plaid_client_name =
            env::var("PLAID_CLIENT_NAME").unwrap_or_else(|_| "CashAI".to_string());

        let mobile_redirect_uri =
            env::var("MOBILE_REDIRECT_URI").unwrap_or_else(|_| "cashai://plaid-oauth".to_string());

        let echo_access_token = parse_or("ECHO_ACCESS_TOKEN", false)?;

        Ok(Self {
            database_url,
            database_max_connections,
            host,
            port,
            environment,
            allowed_origins,
            jwt_secret,
            credential_key,
            plaid_client_id,
            plaid_secret,
            plaid_env,
            plaid_base_url: non_empty("PLAID_BASE_URL"),
            plaid_redirect_uri: non_empty("PLAID_REDIRECT_URI"),
            plaid_client_name,
            mobile_redirect_uri,
            echo_access_token,
        })
    }

    /// Address the HTTP listener binds to
    pub fn server_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Aggregator base URL, honouring `PLAID_BASE_URL`
    pub fn plaid_base_url(&self) -> String {
        self.plaid_base_url
            .clone()
            .unwrap_or_else(|| self.plaid_env.base_url().to_string())
    }
}

fn non_empty(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_or<T: FromStr>(key: &'static str, default: T) -> Result<T, ConfigError> {
    match non_empty(key) {
        Some(raw) => raw.trim().parse().map_err(|_| ConfigError::InvalidValue(key)),
        None => Ok(default),
    }
}

/// Configuration error types
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnv(&'static str),

    #[error("Invalid value for environment variable: {0}")]
    InvalidValue(&'static str),
}
