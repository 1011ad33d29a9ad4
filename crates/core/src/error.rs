//! Error types for the reporting engine

use thiserror::Error;

/// Result type alias using the engine error
pub type Result<T> = std::result::Result<T, Error>;

/// Engine and collaborator error types
#[derive(Error, Debug)]
pub enum Error {
    #[error("Browser session failed to start: {0}")]
    SessionStartup(String),

    #[error("Browser error: {0}")]
    Browser(String),

    #[error("Interaction failed on '{selector}': {reason}")]
    Interaction { selector: String, reason: String },

    #[error("Screenshot failed: {0}")]
    Screenshot(String),

    #[error("HTTP error: {0}")]
    Http(String),

    #[error("No HTTP client configured for this orchestrator")]
    NoHttpClient,

    #[error("HTTP requests can only be sent from inside an API step")]
    NotInApiStep,

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML write error: {0}")]
    TomlWrite(#[from] toml::ser::Error),
}
