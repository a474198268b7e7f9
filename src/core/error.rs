//! Error type shared by every fallible edge of the pipeline.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum NozzleError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Envelope decode error: {0}")]
    Decode(String),

    #[error("Export error: {0}")]
    Export(String),

    #[error("Unknown envelope type: {0}")]
    UnknownEnvelopeType(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Network error: {0}")]
    Network(String),
}

/// Result type alias for nozzle operations
pub type Result<T> = std::result::Result<T, NozzleError>;

impl NozzleError {
    /// Creates a new configuration error
    pub fn config<S: Into<String>>(msg: S) -> Self {
        Self::Config(msg.into())
    }

    /// Creates a new decode error
    pub fn decode<S: Into<String>>(msg: S) -> Self {
        Self::Decode(msg.into())
    }

    /// Creates a new export error
    pub fn export<S: Into<String>>(msg: S) -> Self {
        Self::Export(msg.into())
    }

    /// Creates a new network error
    pub fn network<S: Into<String>>(msg: S) -> Self {
        Self::Network(msg.into())
    }

    /// Returns true if this error is recoverable
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::Network(_) | Self::Io(_) | Self::Export(_))
    }

    /// Returns the error category for logging
    pub fn category(&self) -> &'static str {
        match self {
            Self::Config(_) | Self::UnknownEnvelopeType(_) => "config",
            Self::Decode(_) | Self::Serialization(_) => "serialization",
            Self::Export(_) => "export",
            Self::Io(_) => "io",
            Self::Network(_) => "network",
        }
    }
}
