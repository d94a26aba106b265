//! Simulation runner - coordinates sources, synchronizer and consumer.

use std::sync::Arc;
use std::time::{Duration, Instant};

use contracts::{FrameHandle, SessionConfig};
use ingestion::MockSession;
use observability::SyncMetricsAggregator;
use sync_engine::{StaticDeviceResolver, SyncProcessingBlock};
use tracing::{debug, info, warn};

use super::SimulationStats;
use crate::cli::SourceMode;
use crate::error::Result;

/// Simulation configuration
#[derive(Debug, Clone)]
pub struct SimulationConfig {
    pub session: SessionConfig,

    pub mode: SourceMode,

    /// Pacing of threaded sources (0 = unpaced)
    pub speed: f64,

    /// Stop producing after this long (None = run to the end)
    pub timeout: Option<Duration>,

    /// Print the first N delivered frames
    pub show_frames: usize,
}

/// Runs one session through a [`SyncProcessingBlock`]
pub struct Simulation {
    config: SimulationConfig,
}

impl Simulation {
    pub fn new(config: SimulationConfig) -> Self {
        Self { config }
    }

    /// Run the session to completion
    pub async fn run(self) -> Result<SimulationStats> {
        let started = Instant::now();
        let session = &self.config.session;

        let resolver = Arc::new(StaticDeviceResolver::from_session(session));
        let (block, mut rx) = SyncProcessingBlock::with_channel(session.sync.clone(), resolver);
        let block = Arc::new(block);

        let speed = match self.config.mode {
            SourceMode::Replay => 0.0,
            SourceMode::Threads => self.config.speed,
        };
        let mock = Arc::new(MockSession::from_session(session, speed)?);
        info!(
            streams = mock.len(),
            mode = ?self.config.mode,
            preset = session.preset.as_str(),
            "Simulation starting"
        );

        // Consumer
        let show_frames = self.config.show_frames;
        let consumer = tokio::spawn(async move {
            let mut aggregator = SyncMetricsAggregator::new();
            while let Some(frame) = rx.recv().await {
                if aggregator.total_outputs < show_frames as u64 {
                    println!("{}", describe(&frame));
                }
                aggregator.update(&frame);
            }
            aggregator
        });

        // Producer
        let producer = {
            let block = block.clone();
            let mock = mock.clone();
            let mode = self.config.mode;
            tokio::task::spawn_blocking(move || -> Result<u64> {
                match mode {
                    SourceMode::Replay => Ok(mock.replay(|frame| block.consume(frame)) as u64),
                    SourceMode::Threads => {
                        let sink = block.clone();
                        mock.start(Arc::new(move |frame: FrameHandle| sink.consume(frame)))?;
                        mock.join();
                        Ok(mock.produced())
                    }
                }
            })
        };

        let mut timed_out = false;
        let frames_produced = match self.config.timeout {
            Some(limit) => {
                let mut producer = producer;
                match tokio::time::timeout(limit, &mut producer).await {
                    Ok(joined) => joined??,
                    Err(_) => {
                        warn!(timeout_secs = limit.as_secs(), "Simulation timed out, stopping sources");
                        timed_out = true;
                        mock.stop();
                        producer.await??
                    }
                }
            }
            None => producer.await??,
        };

        let sync = block.stats();
        let topology = block.topology();
        let queued_frames = block.queued_frames();
        debug!(queued_frames, "Producers finished");

        // Last block reference: closes the channel and ends the consumer
        drop(block);
        let sync_metrics = consumer.await?;

        Ok(SimulationStats {
            frames_produced,
            active_streams: mock.len(),
            duration: started.elapsed(),
            timed_out,
            queued_frames,
            topology,
            sync,
            sync_metrics,
        })
    }
}

/// One line per delivered frame
fn describe(frame: &FrameHandle) -> String {
    let members = frame.flatten();
    let parts: Vec<String> = members
        .iter()
        .map(|m| format!("{} fn={} ts={:.2}", m.stream_id(), m.frame_number(), m.timestamp()))
        .collect();
    if frame.is_composite() {
        format!("composite [{}]", parts.join(", "))
    } else {
        format!("single    [{}]", parts.join(", "))
    }
}
