//! Configuration types.
//!
//! Built once at process start from environment variables and passed by
//! value into each component. Nothing reads the environment after startup.

use std::time::Duration;

use secrecy::SecretString;

use crate::credentials::CredentialCipher;
use crate::error::ConfigError;
use crate::mail::SenderAllowlist;

/// IMAP connection settings.
#[derive(Debug, Clone)]
pub struct ImapConfig {
    pub host: String,
    pub port: u16,
    /// Socket read timeout for a single IMAP response line.
    pub read_timeout: Duration,
}

impl Default for ImapConfig {
    fn default() -> Self {
        Self {
            host: "imap.gmail.com".to_string(),
            port: 993,
            read_timeout: Duration::from_secs(30),
        }
    }
}

/// Catalog/ledger REST settings.
#[derive(Debug, Clone)]
pub struct CatalogConfig {
    /// Ledger endpoint receiving expense records.
    pub records_url: String,
    /// App catalog endpoint (GET `?email=`, POST).
    pub apps_url: String,
    /// Payment-method catalog endpoint (GET `?descricao=`, POST).
    pub payment_methods_url: String,
    /// Credential endpoint, `{id_usuario}` is replaced with the user id.
    pub credentials_url_template: String,
    /// Shared secret sent as `x-api-key`.
    pub api_key: SecretString,
    /// Per-request timeout.
    pub timeout: Duration,
}

/// Full runtime configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub imap: ImapConfig,
    pub catalog: CatalogConfig,
    /// Account holder the records are filed under.
    pub user_id: String,
    /// Hex-encoded 32-byte AES key for the stored IMAP password.
    pub encryption_key: SecretString,
    pub poll_interval: Duration,
    pub allowed_senders: SenderAllowlist,
}

const DEFAULT_POLL_INTERVAL_SECS: u64 = 300;
const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 10;

impl Config {
    /// Build config from process environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build config from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |key: &str| -> Result<String, ConfigError> {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
                .ok_or_else(|| ConfigError::MissingEnvVar(key.to_string()))
        };

        let parsed_or = |key: &str, default: u64| -> Result<u64, ConfigError> {
            match lookup(key) {
                None => Ok(default),
                Some(raw) => raw.trim().parse().map_err(|_| ConfigError::InvalidValue {
                    key: key.to_string(),
                    message: format!("expected a positive integer, got '{raw}'"),
                }),
            }
        };

        let encryption_key = required("IMAP_ENCRYPTION_KEY")?;
        CredentialCipher::from_hex(&encryption_key).map_err(|e| ConfigError::InvalidValue {
            key: "IMAP_ENCRYPTION_KEY".to_string(),
            message: e.to_string(),
        })?;

        let defaults = ImapConfig::default();
        let imap_port = parsed_or("IMAP_PORT", u64::from(defaults.port))?;
        let imap = ImapConfig {
            host: lookup("IMAP_HOST")
                .filter(|h| !h.trim().is_empty())
                .unwrap_or(defaults.host),
            port: u16::try_from(imap_port).map_err(|_| ConfigError::InvalidValue {
                key: "IMAP_PORT".to_string(),
                message: format!("{imap_port} is not a valid port"),
            })?,
            read_timeout: defaults.read_timeout,
        };

        let poll_secs = parsed_or("POLL_INTERVAL_SECS", DEFAULT_POLL_INTERVAL_SECS)?;
        let timeout_secs = parsed_or("HTTP_TIMEOUT_SECS", DEFAULT_HTTP_TIMEOUT_SECS)?;
        if poll_secs == 0 || timeout_secs == 0 {
            return Err(ConfigError::InvalidValue {
                key: if poll_secs == 0 {
                    "POLL_INTERVAL_SECS"
                } else {
                    "HTTP_TIMEOUT_SECS"
                }
                .to_string(),
                message: "must be greater than zero".to_string(),
            });
        }

        let catalog = CatalogConfig {
            records_url: required("LEDGER_RECORDS_URL")?,
            apps_url: required("CATALOG_APPS_URL")?,
            payment_methods_url: required("CATALOG_PAYMENT_METHODS_URL")?,
            credentials_url_template: required("CREDENTIALS_URL_TEMPLATE")?,
            api_key: SecretString::from(required("CATALOG_API_KEY")?),
            timeout: Duration::from_secs(timeout_secs),
        };

        let allowed_senders = lookup("ALLOWED_SENDERS")
            .map(|raw| SenderAllowlist::from_csv(&raw))
            .unwrap_or_else(SenderAllowlist::allow_all);

        Ok(Self {
            imap,
            catalog,
            user_id: required("TARGET_USER_ID")?,
            encryption_key: SecretString::from(encryption_key),
            poll_interval: Duration::from_secs(poll_secs),
            allowed_senders,
        })
    }
}
