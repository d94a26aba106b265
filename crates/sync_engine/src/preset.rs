//! Device synchronization presets.
//!
//! A preset turns the stream list of one device into the matcher sub-tree
//! the device wants: hardware-locked streams (depth and infrared, sometimes
//! confidence) are frame-number matched, free-running color is timestamp
//! matched against that group, and motion streams stay out of it.

use std::collections::HashMap;
use std::sync::Arc;

use contracts::{
    DeviceId, DeviceResolver, FrameHandle, MatcherFactory, MatcherPreset, MatcherSpec,
    SessionConfig, StreamId, StreamType,
};

/// [`MatcherFactory`] building its sub-tree from a [`MatcherPreset`]
#[derive(Debug, Clone)]
pub struct PresetMatcherFactory {
    preset: MatcherPreset,
    streams: Vec<StreamId>,
}

impl PresetMatcherFactory {
    /// `streams` are the streams the device exposes
    pub fn new(preset: MatcherPreset, streams: impl IntoIterator<Item = StreamId>) -> Self {
        Self {
            preset,
            streams: streams.into_iter().collect(),
        }
    }

    pub fn preset(&self) -> MatcherPreset {
        self.preset
    }

    /// Sub-tree for the device; `None` when no stream takes part
    pub fn build(&self) -> Option<MatcherSpec> {
        let groups = Groups::collect(&self.streams);
        let first_ir = groups.infrared.first().copied();

        let (locked, with_color): (Vec<&StreamId>, bool) = match self.preset {
            MatcherPreset::Di | MatcherPreset::DiC => (
                groups.depth.into_iter().chain(first_ir).collect(),
                self.preset == MatcherPreset::DiC,
            ),
            MatcherPreset::Dlr | MatcherPreset::DlrC => (
                groups
                    .depth
                    .into_iter()
                    .chain(groups.infrared.iter().take(2).copied())
                    .collect(),
                self.preset == MatcherPreset::DlrC,
            ),
            MatcherPreset::Dic | MatcherPreset::DicC => (
                groups
                    .depth
                    .into_iter()
                    .chain(first_ir)
                    .chain(groups.confidence)
                    .collect(),
                self.preset == MatcherPreset::DicC,
            ),
            MatcherPreset::Default => (
                groups
                    .depth
                    .into_iter()
                    .chain(groups.infrared.iter().copied())
                    .collect(),
                true,
            ),
        };

        let mut timed: Vec<MatcherSpec> =
            MatcherSpec::frame_number(locked.into_iter().map(leaf).collect())
                .into_iter()
                .collect();
        if with_color {
            timed.extend(groups.color.map(leaf));
        }
        if self.preset == MatcherPreset::Default {
            timed.extend(groups.confidence.map(leaf));
            timed.extend(groups.fisheye.into_iter().map(leaf));
        }
        MatcherSpec::timestamp(timed)
    }
}

impl MatcherFactory for PresetMatcherFactory {
    fn create_matcher(&self, frame: &FrameHandle) -> Option<MatcherSpec> {
        tracing::debug!(
            preset = self.preset.as_str(),
            trigger = %frame.stream_id(),
            "building device matcher"
        );
        self.build()
    }
}

fn leaf(id: &StreamId) -> MatcherSpec {
    MatcherSpec::Identity(id.clone())
}

/// Streams of one device grouped by role
#[derive(Default)]
struct Groups<'a> {
    depth: Option<&'a StreamId>,
    /// Sorted by index
    infrared: Vec<&'a StreamId>,
    color: Option<&'a StreamId>,
    confidence: Option<&'a StreamId>,
    fisheye: Vec<&'a StreamId>,
}

impl<'a> Groups<'a> {
    fn collect(streams: &'a [StreamId]) -> Self {
        let mut groups = Self::default();
        for stream in streams {
            match stream.stream_type {
                StreamType::Depth => {
                    groups.depth.get_or_insert(stream);
                }
                StreamType::Infrared => groups.infrared.push(stream),
                StreamType::Color => {
                    groups.color.get_or_insert(stream);
                }
                StreamType::Confidence => {
                    groups.confidence.get_or_insert(stream);
                }
                StreamType::Fisheye => groups.fisheye.push(stream),
                StreamType::Gyro | StreamType::Accel | StreamType::Pose | StreamType::Any => {}
            }
        }
        groups.infrared.sort_by_key(|s| s.index);
        groups.fisheye.sort_by_key(|s| s.index);
        groups
    }
}

/// Resolver over a fixed set of devices
#[derive(Clone, Default)]
pub struct StaticDeviceResolver {
    factories: HashMap<DeviceId, Arc<dyn MatcherFactory>>,
}

impl StaticDeviceResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_device(mut self, device: impl Into<DeviceId>, factory: Arc<dyn MatcherFactory>) -> Self {
        self.insert(device, factory);
        self
    }

    pub fn insert(&mut self, device: impl Into<DeviceId>, factory: Arc<dyn MatcherFactory>) {
        self.factories.insert(device.into(), factory);
    }

    /// One preset factory per configured device
    pub fn from_session(session: &SessionConfig) -> Self {
        let mut resolver = Self::new();
        for device in &session.devices {
            let streams = device
                .streams
                .iter()
                .map(|s| StreamId::new(device.id.clone(), s.stream_type, s.index));
            resolver.insert(
                device.id.clone(),
                Arc::new(PresetMatcherFactory::new(session.preset, streams)),
            );
        }
        resolver
    }

    pub fn len(&self) -> usize {
        self.factories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.factories.is_empty()
    }
}

impl DeviceResolver for StaticDeviceResolver {
    fn matcher_factory(&self, device: &DeviceId) -> Option<Arc<dyn MatcherFactory>> {
        self.factories.get(device).cloned()
    }
}

impl std::fmt::Debug for StaticDeviceResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut devices: Vec<&str> = self.factories.keys().map(|d| &**d).collect();
        devices.sort_unstable();
        f.debug_struct("StaticDeviceResolver")
            .field("devices", &devices)
            .finish()
    }
}
