//! Error types for receipt-sync.

/// Top-level error type.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Credential error: {0}")]
    Credential(#[from] CredentialError),

    #[error("Mailbox error: {0}")]
    Mailbox(#[from] MailboxError),

    #[error("Catalog error: {0}")]
    Catalog(#[from] CatalogError),

    #[error("Message error: {0}")]
    Message(#[from] MessageError),
}

/// Configuration-related errors. Fatal at startup.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Credential fetch and decryption errors. Abort the current cycle only.
#[derive(Debug, thiserror::Error)]
pub enum CredentialError {
    #[error("Encryption key must be 32 bytes (64 hex characters), got {len} characters")]
    InvalidKey { len: usize },

    #[error("Expected 'iv:ciphertext', got {parts} part(s)")]
    MalformedInput { parts: usize },

    #[error("Invalid hex in {field}: {reason}")]
    InvalidHex { field: &'static str, reason: String },

    #[error("IV must be 16 bytes, got {len}")]
    InvalidIv { len: usize },

    #[error("Decryption failed: {0}")]
    Decrypt(String),

    #[error("Decrypted password is not valid UTF-8")]
    InvalidUtf8,

    #[error("Credential fetch from {url} failed: {reason}")]
    Fetch { url: String, reason: String },

    #[error("Credential response missing field: {0}")]
    MissingField(&'static str),
}

/// Mailbox connection/protocol errors. Abort the current cycle only.
#[derive(Debug, thiserror::Error)]
pub enum MailboxError {
    #[error("Failed to connect to {host}: {reason}")]
    Connect { host: String, reason: String },

    #[error("TLS error: {0}")]
    Tls(String),

    #[error("Authentication failed for {login}")]
    Auth { login: String },

    #[error("IMAP {command} failed: {reason}")]
    Protocol { command: String, reason: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Catalog and ledger REST errors. Skip the current message only.
#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("{method} {url} failed: {reason}")]
    Transport {
        method: &'static str,
        url: String,
        reason: String,
    },

    #[error("{method} {url} returned {status}: {body}")]
    Status {
        method: &'static str,
        url: String,
        status: u16,
        body: String,
    },

    #[error("{entity} response from {url} has no '{field}'")]
    MissingId {
        entity: &'static str,
        url: String,
        field: &'static str,
    },

    #[error("{entity} not found at {url} and no creation payload given")]
    NotFound { entity: &'static str, url: String },

    #[error("Invalid response from {url}: {reason}")]
    InvalidResponse { url: String, reason: String },

    #[error("HTTP client setup failed: {0}")]
    Client(String),
}

/// Failure processing a single message. The cycle continues.
#[derive(Debug, thiserror::Error)]
pub enum MessageError {
    #[error("Could not resolve {entity} '{key}': {source}")]
    Resolution {
        entity: &'static str,
        key: String,
        #[source]
        source: CatalogError,
    },

    #[error("Submission failed: {0}")]
    Submission(#[source] CatalogError),
}

/// Result type alias.
pub type Result<T> = std::result::Result<T, Error>;
