//! 数据接入错误类型

use contracts::StreamId;
use thiserror::Error;

/// Ingestion error
#[derive(Debug, Error)]
pub enum IngestionError {
    /// Stream configured with a zero frame rate
    #[error("stream {stream} has no frame rate")]
    InvalidRate { stream: StreamId },

    /// Producer thread could not be started
    #[error("failed to spawn producer for {stream}")]
    Spawn {
        stream: StreamId,
        #[source]
        source: std::io::Error,
    },

    /// Source is already producing
    #[error("stream {stream} is already listening")]
    AlreadyListening { stream: StreamId },
}

/// Ingestion Result type alias
pub type Result<T> = std::result::Result<T, IngestionError>;
