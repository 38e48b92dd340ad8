//! Cart configuration loaded from environment variables.
//!
//! # Environment Variables
//!
//! ## Required
//! - `CLAYFORGE_CART_SERVICE_URL` - Base URL of the remote cart service
//! - `CLAYFORGE_CART_CSRF_TOKEN` - Anti-forgery token sent with mutations
//!
//! ## Optional
//! - `CLAYFORGE_CART_STORAGE_DIR` - Guest cart store directory
//!   (default: `.clayforge`)
//! - `CLAYFORGE_CART_TIMEOUT_SECS` - Remote request timeout (default: 10).
//!   The upstream service never times out on its own; without this, a hung
//!   request would hold an item's in-flight guard forever.
//! - `CLAYFORGE_CART_COOLDOWN_MS` - Guard cooldown after a request settles
//!   (default: 500)

use std::path::PathBuf;
use std::time::Duration;

use secrecy::SecretString;
use thiserror::Error;
use url::Url;

const DEFAULT_STORAGE_DIR: &str = ".clayforge";
const DEFAULT_TIMEOUT_SECS: u64 = 10;
const DEFAULT_COOLDOWN_MS: u64 = 500;

/// Configuration errors that can occur during loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),
    #[error("Invalid environment variable {0}: {1}")]
    InvalidEnvVar(String, String),
}

/// Cart subsystem configuration.
///
/// Implements `Debug` manually to redact the CSRF token.
#[derive(Clone)]
pub struct CartConfig {
    /// Base URL of the remote cart service (authenticated sessions)
    pub service_url: Url,
    /// Anti-forgery token carried on every mutation request
    pub csrf_token: SecretString,
    /// Directory holding the guest cart store (guest sessions)
    pub storage_dir: PathBuf,
    /// Timeout applied to every remote request
    pub request_timeout: Duration,
    /// How long an item's in-flight guard stays held after a request settles
    pub update_cooldown: Duration,
}

impl std::fmt::Debug for CartConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CartConfig")
            .field("service_url", &self.service_url.as_str())
            .field("csrf_token", &"[REDACTED]")
            .field("storage_dir", &self.storage_dir)
            .field("request_timeout", &self.request_timeout)
            .field("update_cooldown", &self.update_cooldown)
            .finish()
    }
}

impl CartConfig {
    /// Load configuration from environment variables.
    ///
    /// Calls `dotenvy::dotenv()` to load from `.env` file if present.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if required variables are missing or invalid.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        let service_url = required("CLAYFORGE_CART_SERVICE_URL")?;
        let service_url = Url::parse(&service_url).map_err(|e| {
            ConfigError::InvalidEnvVar("CLAYFORGE_CART_SERVICE_URL".to_string(), e.to_string())
        })?;

        let csrf_token = SecretString::from(required("CLAYFORGE_CART_CSRF_TOKEN")?);

        let storage_dir = optional("CLAYFORGE_CART_STORAGE_DIR")
            .map_or_else(|| PathBuf::from(DEFAULT_STORAGE_DIR), PathBuf::from);

        let request_timeout = Duration::from_secs(parse_or(
            "CLAYFORGE_CART_TIMEOUT_SECS",
            DEFAULT_TIMEOUT_SECS,
        )?);
        let update_cooldown =
            Duration::from_millis(parse_or("CLAYFORGE_CART_COOLDOWN_MS", DEFAULT_COOLDOWN_MS)?);

        Ok(Self {
            service_url,
            csrf_token,
            storage_dir,
            request_timeout,
            update_cooldown,
        })
    }
}

fn required(name: &str) -> Result<String, ConfigError> {
    std::env::var(name).map_err(|_| ConfigError::MissingEnvVar(name.to_string()))
}

fn optional(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

fn parse_or(name: &str, default: u64) -> Result<u64, ConfigError> {
    optional(name).map_or(Ok(default), |raw| {
        raw.parse()
            .map_err(|_| ConfigError::InvalidEnvVar(name.to_string(), raw))
    })
}
