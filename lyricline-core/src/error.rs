use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    // Configuration errors
    #[error("Config file not found at {path}. A template has been created - edit it and restart.")]
    ConfigNotFound { path: PathBuf },

    #[error("Invalid config: {message}")]
    ConfigInvalid { message: String },

    #[error("Missing required config field: {field}")]
    ConfigMissingField { field: String },

    #[error("Failed to parse config file: {0}")]
    ConfigParseError(#[from] toml::de::Error),

    // Acquisition errors
    #[error("No credential configured for the token-gated lyrics provider")]
    CredentialMissing,

    #[error("Network request failed: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Unexpected response from {provider}: {reason}")]
    InvalidResponse { provider: String, reason: String },

    #[error("Internal integrity check failed: {reason}")]
    Integrity { reason: String },

    // Cache errors
    #[error("Corrupt cache file {path}: {reason}")]
    CacheDecode { path: PathBuf, reason: String },

    // Player bridge errors
    #[error("Player bridge failed: {reason}")]
    Player { reason: String },

    // IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl CoreError {
    /// Whether a lyrics source attempt that failed with this error is worth repeating.
    ///
    /// Missing credentials and integrity failures will not fix themselves between
    /// attempts, so only transport and payload problems are retried.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Network(_) | Self::InvalidResponse { .. })
    }
}

pub type Result<T> = std::result::Result<T, CoreError>;
