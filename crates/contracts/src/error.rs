//! Layered error definitions
//!
//! Categorized by source: config / sync / io

use thiserror::Error;

/// Unified error type
#[derive(Debug, Error)]
pub enum ContractError {
    // ===== Configuration Errors =====
    /// Configuration parse error
    #[error("config parse error: {message}")]
    ConfigParse {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Configuration validation error
    #[error("config validation error at '{field}': {message}")]
    ConfigValidation { field: String, message: String },

    // ===== Sync Errors =====
    #[error(transparent)]
    Sync(#[from] SyncError),

    // ===== General Errors =====
    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl ContractError {
    /// Create configuration parse error
    pub fn config_parse(message: impl Into<String>) -> Self {
        Self::ConfigParse {
            message: message.into(),
            source: None,
        }
    }

    /// Create configuration validation error
    pub fn config_validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ConfigValidation {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// Synchronizer errors.
///
/// Only `Timeout` is ever returned to a caller. The other variants describe
/// failures the synchronizer absorbs; they are logged and counted.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SyncError {
    /// No synchronized frame arrived in time
    #[error("frame didn't arrive within {waited_ms}ms")]
    Timeout { waited_ms: u64 },

    /// Composite allocator returned nothing
    #[error("composite allocation failed for {members} frames")]
    AllocationFailed { members: usize },

    /// No matcher owns the stream
    #[error("no matcher found for stream {stream}")]
    UnknownMatcher { stream: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages() {
        let err = ContractError::config_validation("sync.staleness_ms", "must be > 0");
        assert_eq!(
            err.to_string(),
            "config validation error at 'sync.staleness_ms': must be > 0"
        );
        let err: ContractError = SyncError::Timeout { waited_ms: 5000 }.into();
        assert_eq!(err.to_string(), "frame didn't arrive within 5000ms");
    }
}
