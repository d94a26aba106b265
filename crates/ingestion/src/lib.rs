//! # Ingestion
//!
//! Mock frame sources.
//!
//! Responsibilities:
//! - Generate frames of one stream at a nominal rate on a dedicated thread
//! - Simulate frame drops and silence gaps
//! - Turn a `SessionConfig` into a set of running sources
//!
//! ## Usage Example
//!
//! ```ignore
//! use ingestion::MockSession;
//! use sync_engine::SyncProcessingBlock;
//!
//! let mock = MockSession::from_session(&session, 1.0)?;
//! let block = Arc::new(SyncProcessingBlock::new(session.sync.clone(), resolver, callback));
//! let sink = block.clone();
//! mock.start(Arc::new(move |frame| sink.consume(frame)))?;
//! mock.join();
//! ```

mod error;
mod mock;
mod session;

pub use contracts::FrameSource;
pub use error::{IngestionError, Result};
pub use mock::{interleave, MockStreamConfig, MockStreamSource};
pub use session::MockSession;
