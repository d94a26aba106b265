//! SessionConfig - Config Loader output
//!
//! Describes a simulated capture session: devices, their streams and
//! the synchronization policy applied to them.

use serde::{Deserialize, Serialize};

use crate::{DeviceId, MatcherPreset, StreamType, SyncConfig};

/// Config version
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ConfigVersion {
    #[default]
    V1,
}

/// Complete session description
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    #[serde(default)]
    pub version: ConfigVersion,

    /// Synchronizer settings
    #[serde(default)]
    pub sync: SyncConfig,

    /// Matcher preset applied to every device
    #[serde(default)]
    pub preset: MatcherPreset,

    /// Simulated session length (frame time, ms)
    #[serde(default = "default_duration_ms")]
    pub duration_ms: f64,

    /// Devices
    pub devices: Vec<DeviceConfig>,
}

fn default_duration_ms() -> f64 {
    5000.0
}

/// One device
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceConfig {
    /// Device id (serial number)
    pub id: DeviceId,

    /// Streams enabled on the device
    pub streams: Vec<StreamConfig>,
}

/// One stream of a device
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamConfig {
    pub stream_type: StreamType,

    #[serde(default)]
    pub index: u32,

    /// Nominal frame rate
    pub fps: u32,

    /// Timestamp of the first frame (ms)
    #[serde(default)]
    pub start_ms: f64,

    /// Drop every n-th frame (0 = never)
    #[serde(default)]
    pub drop_every: u32,

    /// Periods during which the stream produces nothing
    #[serde(default)]
    pub silence: Vec<SilenceWindow>,
}

/// Half-open silence window `[from_ms, to_ms)`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SilenceWindow {
    pub from_ms: f64,
    pub to_ms: f64,
}

impl SilenceWindow {
    #[inline]
    pub fn contains(&self, timestamp: f64) -> bool {
        timestamp >= self.from_ms && timestamp < self.to_ms
    }
}

impl SessionConfig {
    /// Total number of configured streams
    pub fn stream_count(&self) -> usize {
        self.devices.iter().map(|d| d.streams.len()).sum()
    }
}
