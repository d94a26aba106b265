//! Synchronizer configuration contracts shared across crates.

use serde::{Deserialize, Serialize};

/// Synchronizer configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Silence (in frame time) after which a missing stream is pruned
    #[serde(default = "default_staleness_ms")]
    pub staleness_ms: f64,

    /// Rate assumed for frames that report fps 0
    #[serde(default = "default_fallback_fps")]
    pub fallback_fps: u32,

    /// Output queue depth of `FrameSyncer`
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,

    /// Debug-log every dispatched and synced frame
    #[serde(default)]
    pub log_frames: bool,
}

fn default_staleness_ms() -> f64 {
    1000.0
}

fn default_fallback_fps() -> u32 {
    30
}

fn default_queue_capacity() -> usize {
    1
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            staleness_ms: default_staleness_ms(),
            fallback_fps: default_fallback_fps(),
            queue_capacity: default_queue_capacity(),
            log_frames: false,
        }
    }
}

impl SyncConfig {
    /// Effective rate of a frame header
    #[inline]
    pub fn fps_or_fallback(&self, fps: u32) -> f64 {
        if fps > 0 {
            fps as f64
        } else {
            self.fallback_fps.max(1) as f64
        }
    }
}
