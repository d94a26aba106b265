//! Stream identity
//!
//! A stream is one sensor output of one device (depth, left IR, color, gyro...).
//! The synchronizer never looks past the stream identity and the frame header.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::DeviceId;

/// Stream type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamType {
    Any,
    Depth,
    Infrared,
    Color,
    Confidence,
    Fisheye,
    Gyro,
    Accel,
    Pose,
}

impl StreamType {
    /// Motion streams are excluded from image synchronization by default
    pub fn is_motion(self) -> bool {
        matches!(self, Self::Gyro | Self::Accel | Self::Pose)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Any => "any",
            Self::Depth => "depth",
            Self::Infrared => "infrared",
            Self::Color => "color",
            Self::Confidence => "confidence",
            Self::Fisheye => "fisheye",
            Self::Gyro => "gyro",
            Self::Accel => "accel",
            Self::Pose => "pose",
        }
    }
}

impl fmt::Display for StreamType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Clock domain a timestamp was taken in.
///
/// Timestamps from different domains are not comparable.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimestampDomain {
    #[default]
    HardwareClock,
    SystemTime,
    GlobalTime,
}

/// Unique key of an active stream: `(device, type, index)`.
///
/// `device` is `None` for frames whose producer cannot be identified.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StreamId {
    pub device: Option<DeviceId>,
    pub stream_type: StreamType,
    pub index: u32,
}

impl StreamId {
    pub fn new(device: impl Into<DeviceId>, stream_type: StreamType, index: u32) -> Self {
        Self {
            device: Some(device.into()),
            stream_type,
            index,
        }
    }

    /// Stream of an unknown producer
    pub fn anonymous(stream_type: StreamType, index: u32) -> Self {
        Self {
            device: None,
            stream_type,
            index,
        }
    }
}

impl fmt::Display for StreamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.device {
            Some(device) => write!(f, "{}/{}#{}", device, self.stream_type, self.index),
            None => write!(f, "?/{}#{}", self.stream_type, self.index),
        }
    }
}

/// Registry key used by composite matchers.
///
/// Streams of resolvable devices are registered by full id; frames of unknown
/// devices fall back to a registration by stream type alone.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum StreamKey {
    Id(StreamId),
    Type(StreamType),
}

impl fmt::Display for StreamKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Id(id) => write!(f, "{id}"),
            Self::Type(stream_type) => write!(f, "*/{stream_type}"),
        }
    }
}

impl From<StreamId> for StreamKey {
    fn from(id: StreamId) -> Self {
        Self::Id(id)
    }
}
