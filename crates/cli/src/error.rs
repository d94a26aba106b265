//! Error types for CLI operations.

use contracts::ContractError;
use ingestion::IngestionError;
use thiserror::Error;

/// CLI-specific error types
#[derive(Error, Debug)]
pub enum CliError {
    /// Session file not found
    #[error("Session file not found: {path}")]
    ConfigNotFound { path: String },

    /// Session file could not be loaded
    #[error("Failed to load session: {0}")]
    Config(#[from] ContractError),

    /// Mock sources could not be built or started
    #[error("Frame source error: {0}")]
    Source(#[from] IngestionError),

    /// Producer or consumer task died
    #[error("Task failed: {0}")]
    Task(#[from] tokio::task::JoinError),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl CliError {
    pub fn config_not_found(path: impl Into<String>) -> Self {
        Self::ConfigNotFound { path: path.into() }
    }
}

/// Result type alias for CLI operations
pub type Result<T> = std::result::Result<T, CliError>;
