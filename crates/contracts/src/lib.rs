//! # Contracts
//!
//! Frozen interface contracts shared by every crate of the frame
//! synchronizer: stream identity, frame handles, configuration and the
//! traits implemented by external collaborators (device layer, allocator).
//! Business crates depend on this crate, never the other way around.
//!
//! ## Time Model
//! - Frame timestamps are milliseconds (f64), monotonic per stream within
//!   their `TimestampDomain`
//! - `frame_number` is the device frame counter; streams of one device that
//!   are hardware synchronized share it

mod device;
mod device_id;
mod error;
mod frame;
mod matcher_spec;
mod session;
mod stream;
mod sync_config;

pub use device::*;
pub use device_id::DeviceId;
pub use error::*;
pub use frame::*;
pub use matcher_spec::*;
pub use session::*;
pub use stream::*;
pub use sync_config::*;
