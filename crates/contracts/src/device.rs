//! Traits for the synchronizer's external collaborators
//!
//! Device layer (matcher factories), frame allocator, enable options and
//! frame sources are owned outside the sync engine. The engine only talks to
//! them through these traits.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::{DeviceId, FrameCallback, FrameHandle, MatcherSpec, StreamId};

/// Per-device-family matcher factory.
///
/// Encodes the static synchronization policy of a device: which streams are
/// frame-number matched, which are timestamp matched, which bypass matching.
/// Streams of the device that are absent from the returned sub-tree are
/// delivered unsynchronized.
pub trait MatcherFactory: Send + Sync {
    /// Build the matcher sub-tree for the device that produced `frame`.
    ///
    /// `None` means the device synchronizes nothing.
    fn create_matcher(&self, frame: &FrameHandle) -> Option<MatcherSpec>;
}

/// Resolves the owning device of a frame to its matcher factory
pub trait DeviceResolver: Send + Sync {
    fn matcher_factory(&self, device: &DeviceId) -> Option<Arc<dyn MatcherFactory>>;
}

/// Resolver that knows no device; every stream is passed through
#[derive(Debug, Clone, Copy, Default)]
pub struct NoDevices;

impl DeviceResolver for NoDevices {
    fn matcher_factory(&self, _device: &DeviceId) -> Option<Arc<dyn MatcherFactory>> {
        None
    }
}

/// Composite frame allocator.
///
/// Called from the synchronizer while the matching lock is held. `None`
/// is an allocation failure; the round's member frames are then released.
pub trait FrameAllocator: Send + Sync {
    fn allocate_composite_frame(&self, frames: Vec<FrameHandle>) -> Option<FrameHandle>;
}

/// Heap allocator backed by [`FrameHandle::composite`]
#[derive(Debug, Clone, Copy, Default)]
pub struct HeapAllocator;

impl FrameAllocator for HeapAllocator {
    fn allocate_composite_frame(&self, frames: Vec<FrameHandle>) -> Option<FrameHandle> {
        FrameHandle::composite(frames)
    }
}

/// Boolean option gating the synchronizer
pub trait EnableOption: Send + Sync {
    fn is_enabled(&self) -> bool;
}

impl EnableOption for AtomicBool {
    fn is_enabled(&self) -> bool {
        self.load(Ordering::Acquire)
    }
}

/// Frame source trait
///
/// Abstracts a sensor stream producing frames on its own thread.
pub trait FrameSource: Send + Sync {
    /// Produced stream
    fn stream_id(&self) -> &StreamId;

    /// Register the frame callback and start producing.
    ///
    /// Repeated calls while listening are ignored.
    fn listen(&self, callback: FrameCallback);

    /// Stop producing frames
    fn stop(&self);

    /// Check if currently listening
    fn is_listening(&self) -> bool;
}
