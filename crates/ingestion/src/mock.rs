//! Mock 流数据源
//!
//! 在独立 OS 线程上产生单个流的帧，用于无硬件环境运行同步器。

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use bytes::Bytes;
use contracts::{
    FrameCallback, FrameHandle, FrameHeader, FrameSource, SilenceWindow, StreamConfig, StreamId,
    TimestampDomain,
};
use metrics::counter;
use tracing::{debug, trace, warn};

use crate::error::{IngestionError, Result};

/// Mock stream configuration
#[derive(Debug, Clone)]
pub struct MockStreamConfig {
    pub stream: StreamId,

    /// Nominal frame rate
    pub fps: u32,

    /// Timestamp of frame 0 (ms)
    pub start_ms: f64,

    /// Production stops at this timestamp (ms, exclusive)
    pub duration_ms: f64,

    /// Skip every n-th frame (0 = never)
    pub drop_every: u32,

    /// Windows with no output
    pub silence: Vec<SilenceWindow>,

    /// Payload size per frame
    pub payload_bytes: usize,

    pub domain: TimestampDomain,

    /// Playback speed relative to frame time; 0 = unpaced
    pub speed: f64,
}

impl MockStreamConfig {
    pub fn new(stream: StreamId, fps: u32) -> Self {
        Self {
            stream,
            fps,
            start_ms: 0.0,
            duration_ms: 1000.0,
            drop_every: 0,
            silence: Vec::new(),
            payload_bytes: 0,
            domain: TimestampDomain::default(),
            speed: 1.0,
        }
    }

    /// Build from a session stream entry
    pub fn from_stream(stream: StreamId, config: &StreamConfig, duration_ms: f64) -> Self {
        Self {
            start_ms: config.start_ms,
            duration_ms,
            drop_every: config.drop_every,
            silence: config.silence.clone(),
            ..Self::new(stream, config.fps)
        }
    }

    pub fn with_duration(mut self, duration_ms: f64) -> Self {
        self.duration_ms = duration_ms;
        self
    }

    pub fn with_start(mut self, start_ms: f64) -> Self {
        self.start_ms = start_ms;
        self
    }

    pub fn with_speed(mut self, speed: f64) -> Self {
        self.speed = speed;
        self
    }

    pub fn with_silence(mut self, from_ms: f64, to_ms: f64) -> Self {
        self.silence.push(SilenceWindow { from_ms, to_ms });
        self
    }

    pub fn with_drop_every(mut self, n: u32) -> Self {
        self.drop_every = n;
        self
    }

    pub fn with_domain(mut self, domain: TimestampDomain) -> Self {
        self.domain = domain;
        self
    }

    fn is_silent(&self, timestamp: f64) -> bool {
        self.silence.iter().any(|w| w.contains(timestamp))
    }

    /// Frame n is dropped when it is the `drop_every`-th of its run
    fn is_dropped(&self, n: u64) -> bool {
        self.drop_every > 0 && (n + 1) % u64::from(self.drop_every) == 0
    }
}

/// Mock stream source
///
/// Frame `n` carries `frame_number = n` and `timestamp = start + n * 1000/fps`.
/// Dropped and silenced frames still consume their number, like a device
/// that loses frames on the wire.
pub struct MockStreamSource {
    config: MockStreamConfig,
    listening: Arc<AtomicBool>,
    produced: Arc<AtomicU64>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl MockStreamSource {
    /// # Errors
    /// `InvalidRate` when `fps` is 0
    pub fn new(config: MockStreamConfig) -> Result<Self> {
        if config.fps == 0 {
            return Err(IngestionError::InvalidRate {
                stream: config.stream,
            });
        }
        Ok(Self {
            config,
            listening: Arc::new(AtomicBool::new(false)),
            produced: Arc::new(AtomicU64::new(0)),
            worker: Mutex::new(None),
        })
    }

    pub fn config(&self) -> &MockStreamConfig {
        &self.config
    }

    /// Headers this source emits, in order
    pub fn schedule(&self) -> Vec<FrameHeader> {
        schedule(&self.config)
    }

    /// Frames this source emits, in order
    pub fn frames(&self) -> Vec<FrameHandle> {
        self.schedule()
            .into_iter()
            .map(|header| make_frame(header, self.config.payload_bytes))
            .collect()
    }

    /// Start the producer thread
    ///
    /// # Errors
    /// - `AlreadyListening` if a producer is running
    /// - `Spawn` if the thread could not be created
    pub fn start(&self, callback: FrameCallback) -> Result<()> {
        if self.listening.swap(true, Ordering::SeqCst) {
            return Err(IngestionError::AlreadyListening {
                stream: self.config.stream.clone(),
            });
        }

        let config = self.config.clone();
        let listening = self.listening.clone();
        let produced = self.produced.clone();
        let headers = self.schedule();

        let spawned = thread::Builder::new()
            .name(format!("mock-{}", config.stream))
            .spawn(move || run(config, headers, callback, listening, produced));

        match spawned {
            Ok(handle) => {
                *self.worker.lock().unwrap_or_else(PoisonError::into_inner) = Some(handle);
                Ok(())
            }
            Err(source) => {
                self.listening.store(false, Ordering::SeqCst);
                Err(IngestionError::Spawn {
                    stream: self.config.stream.clone(),
                    source,
                })
            }
        }
    }

    /// Wait for the producer thread to finish
    pub fn join(&self) {
        let handle = self
            .worker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = handle {
            if handle.join().is_err() {
                warn!(stream = %self.config.stream, "mock producer panicked");
            }
        }
    }

    /// Frames delivered so far
    pub fn produced(&self) -> u64 {
        self.produced.load(Ordering::Relaxed)
    }
}

impl FrameSource for MockStreamSource {
    fn stream_id(&self) -> &StreamId {
        &self.config.stream
    }

    fn listen(&self, callback: FrameCallback) {
        if let Err(e) = self.start(callback) {
            debug!(stream = %self.config.stream, error = %e, "listen ignored");
        }
    }

    fn stop(&self) {
        if self.listening.swap(false, Ordering::SeqCst) {
            debug!(stream = %self.config.stream, "stopping mock source");
        }
    }

    fn is_listening(&self) -> bool {
        self.listening.load(Ordering::Relaxed)
    }
}

impl Drop for MockStreamSource {
    fn drop(&mut self) {
        self.listening.store(false, Ordering::SeqCst);
        self.join();
    }
}

impl std::fmt::Debug for MockStreamSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockStreamSource")
            .field("stream", &self.config.stream)
            .field("fps", &self.config.fps)
            .field("listening", &self.is_listening())
            .field("produced", &self.produced())
            .finish()
    }
}

fn schedule(config: &MockStreamConfig) -> Vec<FrameHeader> {
    if config.fps == 0 {
        return Vec::new();
    }
    let period = 1000.0 / f64::from(config.fps);
    let mut headers = Vec::new();
    for n in 0u64.. {
        let timestamp = config.start_ms + n as f64 * period;
        if timestamp >= config.duration_ms {
            break;
        }
        if config.is_dropped(n) {
            counter!("ingestion_frames_skipped_total", "reason" => "dropped").increment(1);
            continue;
        }
        if config.is_silent(timestamp) {
            counter!("ingestion_frames_skipped_total", "reason" => "silence").increment(1);
            continue;
        }
        headers.push(
            FrameHeader::new(config.stream.clone(), timestamp, n, config.fps)
                .with_domain(config.domain),
        );
    }
    headers
}

fn make_frame(header: FrameHeader, payload_bytes: usize) -> FrameHandle {
    if payload_bytes == 0 {
        FrameHandle::header_only(header)
    } else {
        FrameHandle::new(header, Bytes::from(vec![0u8; payload_bytes]))
    }
}

fn run(
    config: MockStreamConfig,
    headers: Vec<FrameHeader>,
    callback: FrameCallback,
    listening: Arc<AtomicBool>,
    produced: Arc<AtomicU64>,
) {
    debug!(
        stream = %config.stream,
        fps = config.fps,
        frames = headers.len(),
        "mock source started"
    );

    let started = Instant::now();
    for header in headers {
        if !listening.load(Ordering::Relaxed) {
            break;
        }
        if config.speed > 0.0 {
            let offset = (header.timestamp - config.start_ms).max(0.0) / 1000.0 / config.speed;
            let due = started + Duration::from_secs_f64(offset);
            let now = Instant::now();
            if due > now {
                thread::sleep(due - now);
            }
        }

        trace!(
            stream = %config.stream,
            frame_number = header.frame_number,
            timestamp = header.timestamp,
            "mock frame"
        );
        counter!("ingestion_frames_generated_total", "stream_type" => config.stream.stream_type.as_str())
            .increment(1);
        callback(make_frame(header, config.payload_bytes));
        produced.fetch_add(1, Ordering::Relaxed);
    }

    listening.store(false, Ordering::SeqCst);
    debug!(stream = %config.stream, "mock source stopped");
}

/// Merge the frames of several sources into one timestamp-ordered sequence
///
/// Ties keep source order, so a replay is deterministic.
pub fn interleave<'a>(sources: impl IntoIterator<Item = &'a MockStreamSource>) -> Vec<FrameHandle> {
    let mut frames: Vec<FrameHandle> = sources.into_iter().flat_map(|s| s.frames()).collect();
    frames.sort_by(|a, b| a.timestamp().total_cmp(&b.timestamp()));
    frames
}
