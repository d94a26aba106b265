//! Synchronizer counters.

use std::sync::atomic::{AtomicU64, Ordering};

/// Snapshot of a block's counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncStats {
    /// Frames handed to `consume`
    pub frames_in: u64,
    /// Composite frames delivered
    pub composites_out: u64,
    /// Frames delivered without matching (gate closed, unknown device, excluded stream)
    pub passthrough_out: u64,
    /// Rounds that waited for a due stream
    pub deferred_rounds: u64,
    pub streams_pruned: u64,
    /// Queued frames dropped with an evicted or pruned matcher
    pub frames_evicted: u64,
    pub allocation_failures: u64,
}

impl SyncStats {
    /// Frames delivered to the consumer, composites counted once
    pub fn frames_out(&self) -> u64 {
        self.composites_out + self.passthrough_out
    }
}

#[derive(Debug, Default)]
pub(crate) struct SyncCounters {
    frames_in: AtomicU64,
    composites_out: AtomicU64,
    passthrough_out: AtomicU64,
    deferred_rounds: AtomicU64,
    streams_pruned: AtomicU64,
    frames_evicted: AtomicU64,
    allocation_failures: AtomicU64,
}

impl SyncCounters {
    pub fn frame_in(&self) {
        self.frames_in.fetch_add(1, Ordering::Relaxed);
    }

    pub fn composite_out(&self) {
        self.composites_out.fetch_add(1, Ordering::Relaxed);
    }

    pub fn passthrough_out(&self) {
        self.passthrough_out.fetch_add(1, Ordering::Relaxed);
    }

    pub fn round_deferred(&self) {
        self.deferred_rounds.fetch_add(1, Ordering::Relaxed);
    }

    pub fn stream_pruned(&self) {
        self.streams_pruned.fetch_add(1, Ordering::Relaxed);
    }

    pub fn frames_evicted(&self, count: usize) {
        self.frames_evicted.fetch_add(count as u64, Ordering::Relaxed);
    }

    pub fn allocation_failure(&self) {
        self.allocation_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> SyncStats {
        SyncStats {
            frames_in: self.frames_in.load(Ordering::Relaxed),
            composites_out: self.composites_out.load(Ordering::Relaxed),
            passthrough_out: self.passthrough_out.load(Ordering::Relaxed),
            deferred_rounds: self.deferred_rounds.load(Ordering::Relaxed),
            streams_pruned: self.streams_pruned.load(Ordering::Relaxed),
            frames_evicted: self.frames_evicted.load(Ordering::Relaxed),
            allocation_failures: self.allocation_failures.load(Ordering::Relaxed),
        }
    }
}
