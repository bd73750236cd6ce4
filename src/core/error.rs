//! Error types for planet generation

use thiserror::Error;

/// Main error type for the crate
#[derive(Debug, Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Resource exhausted: could not allocate {bytes} bytes for {what}")]
    ResourceExhausted { what: &'static str, bytes: usize },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Streaming error: {0}")]
    Streaming(String),
}

impl Error {
    /// Shorthand for a configuration rejection
    pub fn config(msg: impl Into<String>) -> Self {
        Error::Configuration(msg.into())
    }
}
