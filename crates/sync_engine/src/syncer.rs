//! Pull-style consumer over a [`SyncProcessingBlock`].
//!
//! Delivered frames land in a bounded ring queue. When the consumer falls
//! behind, the oldest frame is dropped to make room.

use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::time::{Duration, Instant};

use contracts::{DeviceResolver, FrameCallback, FrameHandle, SyncConfig, SyncError};
use ringbuf::{traits::*, HeapRb};
use tracing::trace;

use crate::block::SyncProcessingBlock;

struct FrameQueue {
    frames: Mutex<HeapRb<FrameHandle>>,
    ready: Condvar,
}

impl FrameQueue {
    fn new(capacity: usize) -> Self {
        Self {
            frames: Mutex::new(HeapRb::new(capacity.max(1))),
            ready: Condvar::new(),
        }
    }

    fn push(&self, frame: FrameHandle) {
        let mut frames = self.frames.lock().unwrap_or_else(PoisonError::into_inner);
        if frames.is_full() {
            if let Some(old) = frames.try_pop() {
                trace!(frame = %old, "syncer queue full, dropping oldest");
            }
        }
        let _ = frames.try_push(frame);
        drop(frames);
        self.ready.notify_one();
    }

    fn pop(&self) -> Option<FrameHandle> {
        self.frames
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .try_pop()
    }

    fn pop_timeout(&self, timeout: Duration) -> Option<FrameHandle> {
        let deadline = Instant::now() + timeout;
        let mut frames = self.frames.lock().unwrap_or_else(PoisonError::into_inner);
        loop {
            if let Some(frame) = frames.try_pop() {
                return Some(frame);
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return None;
            }
            frames = self
                .ready
                .wait_timeout(frames, remaining)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
    }

    fn len(&self) -> usize {
        self.frames
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .occupied_len()
    }
}

/// Synchronizer with a blocking / polling output queue
pub struct FrameSyncer {
    block: SyncProcessingBlock,
    queue: Arc<FrameQueue>,
}

impl FrameSyncer {
    /// Queue capacity comes from `config.queue_capacity`
    pub fn new(config: SyncConfig, resolver: Arc<dyn DeviceResolver>) -> Self {
        let queue = Arc::new(FrameQueue::new(config.queue_capacity));
        let sink = queue.clone();
        let callback: FrameCallback = Arc::new(move |frame: FrameHandle| sink.push(frame));
        Self {
            block: SyncProcessingBlock::new(config, resolver, callback),
            queue,
        }
    }

    /// Feed a frame; callable from any producer thread
    pub fn consume(&self, frame: FrameHandle) {
        self.block.consume(frame);
    }

    pub fn block(&self) -> &SyncProcessingBlock {
        &self.block
    }

    /// Block until a frame is delivered or `timeout` elapses
    pub fn wait_for_frames(&self, timeout: Duration) -> Result<FrameHandle, SyncError> {
        self.queue
            .pop_timeout(timeout)
            .ok_or(SyncError::Timeout {
                waited_ms: timeout.as_millis() as u64,
            })
    }

    pub fn try_wait_for_frames(&self, timeout: Duration) -> Option<FrameHandle> {
        self.queue.pop_timeout(timeout)
    }

    /// Next delivered frame, without waiting
    pub fn poll_for_frames(&self) -> Option<FrameHandle> {
        self.queue.pop()
    }

    /// Frames waiting to be picked up
    pub fn pending(&self) -> usize {
        self.queue.len()
    }
}

impl std::fmt::Debug for FrameSyncer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameSyncer")
            .field("block", &self.block)
            .field("pending", &self.pending())
            .finish()
    }
}
