//! Mock session: every stream of a [`SessionConfig`] as a running source

use contracts::{FrameCallback, FrameHandle, FrameSource, SessionConfig, StreamId};
use tracing::{debug, info, instrument};

use crate::error::Result;
use crate::mock::{interleave, MockStreamConfig, MockStreamSource};

/// The mock sources of one simulated session
#[derive(Debug)]
pub struct MockSession {
    sources: Vec<MockStreamSource>,
}

impl MockSession {
    /// One source per configured stream, paced at `speed` (0 = unpaced)
    ///
    /// # Errors
    /// `InvalidRate` for a stream with fps 0
    pub fn from_session(session: &SessionConfig, speed: f64) -> Result<Self> {
        let mut sources = Vec::with_capacity(session.stream_count());
        for device in &session.devices {
            for stream in &device.streams {
                let id = StreamId::new(device.id.clone(), stream.stream_type, stream.index);
                let config = MockStreamConfig::from_stream(id, stream, session.duration_ms)
                    .with_speed(speed);
                sources.push(MockStreamSource::new(config)?);
            }
        }
        debug!(streams = sources.len(), "mock session created");
        Ok(Self { sources })
    }

    pub fn from_sources(sources: Vec<MockStreamSource>) -> Self {
        Self { sources }
    }

    pub fn sources(&self) -> &[MockStreamSource] {
        &self.sources
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }

    /// Start every source on its own thread, all feeding `callback`
    #[instrument(level = "debug", name = "mock_session_start", skip_all, fields(streams = self.sources.len()))]
    pub fn start(&self, callback: FrameCallback) -> Result<()> {
        for source in &self.sources {
            if let Err(e) = source.start(callback.clone()) {
                self.stop();
                return Err(e);
            }
        }
        info!(streams = self.sources.len(), "mock session started");
        Ok(())
    }

    pub fn stop(&self) {
        for source in &self.sources {
            source.stop();
        }
    }

    /// Wait for every producer to finish
    pub fn join(&self) {
        for source in &self.sources {
            source.join();
        }
    }

    /// Frames delivered by all sources so far
    pub fn produced(&self) -> u64 {
        self.sources.iter().map(MockStreamSource::produced).sum()
    }

    /// Every frame of the session merged in timestamp order
    pub fn replay_frames(&self) -> Vec<FrameHandle> {
        interleave(&self.sources)
    }

    /// Feed the merged frames to `callback` on the calling thread
    ///
    /// Returns the number of frames fed.
    pub fn replay(&self, callback: impl Fn(FrameHandle)) -> usize {
        let frames = self.replay_frames();
        let count = frames.len();
        for frame in frames {
            callback(frame);
        }
        count
    }
}
