//! Frame - sensor driver output, synchronizer input and output
//!
//! The synchronizer only reads the header. Payloads are opaque `Bytes`;
//! composite frames carry their member handles instead of a payload.

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

use crate::{DeviceId, StreamId, StreamType, TimestampDomain};

/// Frame header
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrameHeader {
    /// Producing stream
    pub stream_id: StreamId,

    /// Capture time in milliseconds, monotonic per stream within its domain
    pub timestamp: f64,

    /// Hardware frame counter (may be synthesized by the driver)
    pub frame_number: u64,

    /// Nominal stream rate; 0 when unknown
    pub framerate: u32,

    /// Clock domain of `timestamp`
    #[serde(default)]
    pub domain: TimestampDomain,
}

impl FrameHeader {
    pub fn new(stream_id: StreamId, timestamp: f64, frame_number: u64, framerate: u32) -> Self {
        Self {
            stream_id,
            timestamp,
            frame_number,
            framerate,
            domain: TimestampDomain::default(),
        }
    }

    pub fn with_domain(mut self, domain: TimestampDomain) -> Self {
        self.domain = domain;
        self
    }
}

/// Frame body
#[derive(Debug)]
pub enum FrameBody {
    /// Pixel / sample payload of a single stream
    Data(Bytes),

    /// Members of one synchronization round, in discovery order
    Composite(Vec<FrameHandle>),
}

/// Frame
#[derive(Debug)]
pub struct Frame {
    pub header: FrameHeader,
    pub body: FrameBody,
}

/// Reference-counted frame handle.
///
/// Cloning acquires a reference and dropping releases it; the last release
/// frees the frame.
#[derive(Clone)]
pub struct FrameHandle(Arc<Frame>);

impl FrameHandle {
    /// Wrap a single-stream frame
    pub fn new(header: FrameHeader, data: Bytes) -> Self {
        Self(Arc::new(Frame {
            header,
            body: FrameBody::Data(data),
        }))
    }

    /// Frame with an empty payload (tests, header-only producers)
    pub fn header_only(header: FrameHeader) -> Self {
        Self::new(header, Bytes::new())
    }

    /// Build a composite frame.
    ///
    /// Nested composites are flattened so the result only ever holds
    /// single-stream members. The composite header is a copy of the first
    /// member's header. Returns `None` for an empty member list.
    pub fn composite(members: Vec<FrameHandle>) -> Option<Self> {
        let mut flat = Vec::with_capacity(members.len());
        for member in members {
            match &member.0.body {
                FrameBody::Data(_) => flat.push(member),
                FrameBody::Composite(inner) => flat.extend(inner.iter().cloned()),
            }
        }
        let header = flat.first()?.header().clone();
        Some(Self(Arc::new(Frame {
            header,
            body: FrameBody::Composite(flat),
        })))
    }

    #[inline]
    pub fn header(&self) -> &FrameHeader {
        &self.0.header
    }

    #[inline]
    pub fn stream_id(&self) -> &StreamId {
        &self.0.header.stream_id
    }

    #[inline]
    pub fn stream_type(&self) -> StreamType {
        self.0.header.stream_id.stream_type
    }

    #[inline]
    pub fn timestamp(&self) -> f64 {
        self.0.header.timestamp
    }

    #[inline]
    pub fn frame_number(&self) -> u64 {
        self.0.header.frame_number
    }

    #[inline]
    pub fn framerate(&self) -> u32 {
        self.0.header.framerate
    }

    #[inline]
    pub fn owning_device(&self) -> Option<&DeviceId> {
        self.0.header.stream_id.device.as_ref()
    }

    pub fn is_composite(&self) -> bool {
        matches!(self.0.body, FrameBody::Composite(_))
    }

    /// Composite members; empty for a single-stream frame
    pub fn members(&self) -> &[FrameHandle] {
        match &self.0.body {
            FrameBody::Composite(members) => members,
            FrameBody::Data(_) => &[],
        }
    }

    /// Single-stream frames contained in this handle, in order
    pub fn flatten(&self) -> Vec<FrameHandle> {
        match &self.0.body {
            FrameBody::Composite(members) => members.clone(),
            FrameBody::Data(_) => vec![self.clone()],
        }
    }

    /// First member of the given stream type
    pub fn find(&self, stream_type: StreamType) -> Option<FrameHandle> {
        self.flatten()
            .into_iter()
            .find(|f| f.stream_type() == stream_type)
    }

    pub fn data(&self) -> Option<&Bytes> {
        match &self.0.body {
            FrameBody::Data(data) => Some(data),
            FrameBody::Composite(_) => None,
        }
    }

    /// Number of live references to this frame
    pub fn ref_count(&self) -> usize {
        Arc::strong_count(&self.0)
    }

    pub fn ptr_eq(&self, other: &FrameHandle) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for FrameHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.0.body {
            FrameBody::Data(data) => f
                .debug_struct("FrameHandle")
                .field("header", &self.0.header)
                .field("bytes", &data.len())
                .finish(),
            FrameBody::Composite(members) => f
                .debug_struct("FrameHandle")
                .field("composite", members)
                .finish(),
        }
    }
}

impl fmt::Display for FrameHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.0.body {
            FrameBody::Data(_) => {
                let h = &self.0.header;
                write!(f, "{} #{} @{:.3}", h.stream_id, h.frame_number, h.timestamp)
            }
            FrameBody::Composite(members) => {
                f.write_str("[")?;
                for (i, member) in members.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{member}")?;
                }
                f.write_str("]")
            }
        }
    }
}

/// Downstream frame callback
///
/// Uses `Arc` so the same callback can be shared between producer threads.
pub type FrameCallback = Arc<dyn Fn(FrameHandle) + Send + Sync>;

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(stream_type: StreamType, number: u64, ts: f64) -> FrameHandle {
        FrameHandle::header_only(FrameHeader::new(
            StreamId::new("cam", stream_type, 0),
            ts,
            number,
            30,
        ))
    }

    #[test]
    fn test_composite_takes_first_member_header() {
        let depth = frame(StreamType::Depth, 7, 100.0);
        let ir = frame(StreamType::Infrared, 7, 100.5);
        let composite = FrameHandle::composite(vec![ir.clone(), depth.clone()]).unwrap();

        assert!(composite.is_composite());
        assert_eq!(composite.stream_type(), StreamType::Infrared);
        assert_eq!(composite.timestamp(), 100.5);
        assert_eq!(composite.members().len(), 2);
    }

    #[test]
    fn test_composite_flattens_nested() {
        let depth = frame(StreamType::Depth, 1, 0.0);
        let ir = frame(StreamType::Infrared, 1, 0.0);
        let color = frame(StreamType::Color, 9, 3.0);
        let inner = FrameHandle::composite(vec![depth, ir]).unwrap();
        let outer = FrameHandle::composite(vec![inner, color]).unwrap();

        let types: Vec<_> = outer.members().iter().map(|f| f.stream_type()).collect();
        assert_eq!(
            types,
            vec![StreamType::Depth, StreamType::Infrared, StreamType::Color]
        );
        assert!(outer.members().iter().all(|f| !f.is_composite()));
    }

    #[test]
    fn test_empty_composite_is_none() {
        assert!(FrameHandle::composite(Vec::new()).is_none());
    }

    #[test]
    fn test_ref_counting() {
        let depth = frame(StreamType::Depth, 1, 0.0);
        assert_eq!(depth.ref_count(), 1);
        let composite = FrameHandle::composite(vec![depth.clone()]).unwrap();
        assert_eq!(depth.ref_count(), 2);
        drop(composite);
        assert_eq!(depth.ref_count(), 1);
    }

    #[test]
    fn test_find_member() {
        let depth = frame(StreamType::Depth, 1, 0.0);
        let color = frame(StreamType::Color, 1, 0.0);
        let composite = FrameHandle::composite(vec![depth.clone(), color]).unwrap();
        assert!(composite.find(StreamType::Depth).unwrap().ptr_eq(&depth));
        assert!(composite.find(StreamType::Gyro).is_none());
        assert!(depth.find(StreamType::Depth).is_some());
    }
}
