//! Error types for permission searches

use thiserror::Error;

/// Permission search result type
pub type Result<T> = std::result::Result<T, ScanError>;

/// Errors raised while resolving principals and their policies
#[derive(Error, Debug)]
pub enum ScanError {
    /// Transient network or service failure talking to the IAM backend
    #[error("Backend unavailable during {operation}: {message}")]
    BackendUnavailable { operation: String, message: String },

    /// A principal or policy disappeared between enumeration and fetch
    #[error("Not found: {0}")]
    NotFound(String),

    /// A policy document whose actions or structure cannot be matched reliably
    #[error("Malformed policy: {0}")]
    MalformedPolicy(String),

    /// A caller-supplied target action is not of the form `namespace:verb`
    #[error("Invalid target action: {0}")]
    InvalidTargetAction(String),

    /// Invalid scan configuration
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// JSON (de)serialization error outside of policy parsing
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// TOML configuration parse error
    #[error("Config parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A worker task panicked or was torn down
    #[error("Worker failed: {0}")]
    Worker(String),
}

impl ScanError {
    /// Shorthand for a [`ScanError::BackendUnavailable`]
    pub fn unavailable(operation: impl Into<String>, message: impl ToString) -> Self {
        ScanError::BackendUnavailable {
            operation: operation.into(),
            message: message.to_string(),
        }
    }

    /// True for the race where something vanished mid-scan
    pub fn is_not_found(&self) -> bool {
        matches!(self, ScanError::NotFound(_))
    }

    /// Errors that stop a run even when failures are isolated per principal.
    ///
    /// A malformed policy means the matcher cannot give a trustworthy answer,
    /// so reporting it as one failed principal would understate access.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            ScanError::MalformedPolicy(_)
                | ScanError::InvalidTargetAction(_)
                | ScanError::Config(_)
                | ScanError::Worker(_)
        )
    }
}
