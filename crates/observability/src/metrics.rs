//! 帧同步器指标模块
//!
//! 同步引擎调用的记录函数，以及消费端使用的内存聚合器。

use std::collections::HashMap;

use contracts::{FrameHandle, StreamType};
use metrics::{counter, histogram};

/// Frame entered the synchronizer
pub fn record_frame_received(stream_type: StreamType) {
    counter!(
        "frame_sync_frames_in_total",
        "stream_type" => stream_type.as_str()
    )
    .increment(1);
}

/// Composite frame produced by a matching round
pub fn record_composite_emitted(members: usize) {
    counter!("frame_sync_composites_total").increment(1);
    histogram!("frame_sync_composite_size").record(members as f64);
}

/// Frame delivered without matching
///
/// `reason` is one of `disabled`, `unknown_device`, `excluded`.
pub fn record_passthrough(reason: &'static str) {
    counter!("frame_sync_passthrough_total", "reason" => reason).increment(1);
}

/// Matching round discarded while waiting for a due stream
pub fn record_round_deferred() {
    counter!("frame_sync_rounds_deferred_total").increment(1);
}

/// Silent stream removed from the matcher tree
pub fn record_stream_pruned(stream_type: StreamType) {
    counter!(
        "frame_sync_streams_pruned_total",
        "stream_type" => stream_type.as_str()
    )
    .increment(1);
}

/// Queued frames dropped because their matcher was evicted or pruned
pub fn record_frames_evicted(count: usize) {
    if count > 0 {
        counter!("frame_sync_frames_evicted_total").increment(count as u64);
    }
}

/// Composite allocator returned nothing
pub fn record_allocation_failure() {
    counter!("frame_sync_allocation_failures_total").increment(1);
}

/// Synchronizer output aggregator
///
/// Aggregates delivered frames in memory for summaries.
#[derive(Debug, Clone, Default)]
pub struct SyncMetricsAggregator {
    /// Frames delivered (composite or single)
    pub total_outputs: u64,

    /// Composite frames delivered
    pub composites: u64,

    /// Single frames delivered without matching
    pub singles: u64,

    /// Members per composite
    pub composite_size: RunningStats,

    /// Timestamp spread inside a composite (ms)
    pub spread_ms: RunningStats,

    /// Frames delivered per stream type (composite members included)
    pub per_stream: HashMap<StreamType, u64>,
}

impl SyncMetricsAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Account one delivered frame
    pub fn update(&mut self, frame: &FrameHandle) {
        self.total_outputs += 1;

        let members = frame.flatten();
        if frame.is_composite() {
            self.composites += 1;
            self.composite_size.push(members.len() as f64);

            let (min, max) = members.iter().fold((f64::MAX, f64::MIN), |(lo, hi), f| {
                (lo.min(f.timestamp()), hi.max(f.timestamp()))
            });
            self.spread_ms.push(max - min);
        } else {
            self.singles += 1;
        }

        for member in &members {
            *self.per_stream.entry(member.stream_type()).or_insert(0) += 1;
        }
    }

    /// Summary report
    pub fn summary(&self) -> MetricsSummary {
        MetricsSummary {
            total_outputs: self.total_outputs,
            composites: self.composites,
            singles: self.singles,
            composite_rate: if self.total_outputs > 0 {
                self.composites as f64 / self.total_outputs as f64 * 100.0
            } else {
                0.0
            },
            composite_size: StatsSummary::from(&self.composite_size),
            spread_ms: StatsSummary::from(&self.spread_ms),
            per_stream: self.per_stream.clone(),
        }
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// Metrics summary
#[derive(Debug, Clone, Default)]
pub struct MetricsSummary {
    pub total_outputs: u64,
    pub composites: u64,
    pub singles: u64,
    pub composite_rate: f64,
    pub composite_size: StatsSummary,
    pub spread_ms: StatsSummary,
    pub per_stream: HashMap<StreamType, u64>,
}

impl std::fmt::Display for MetricsSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "=== Frame Sync Summary ===")?;
        writeln!(f, "Delivered frames: {}", self.total_outputs)?;
        writeln!(
            f,
            "Composites: {} ({:.2}%)",
            self.composites, self.composite_rate
        )?;
        writeln!(f, "Unmatched singles: {}", self.singles)?;
        writeln!(f, "Composite size: {}", self.composite_size)?;
        writeln!(f, "Timestamp spread (ms): {}", self.spread_ms)?;

        if !self.per_stream.is_empty() {
            let mut streams: Vec<_> = self.per_stream.iter().collect();
            streams.sort();
            writeln!(f, "Frames per stream type:")?;
            for (stream_type, count) in streams {
                writeln!(f, "  {}: {}", stream_type, count)?;
            }
        }

        Ok(())
    }
}

/// Statistics summary
#[derive(Debug, Clone, Default)]
pub struct StatsSummary {
    pub count: u64,
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub std_dev: f64,
}

impl From<&RunningStats> for StatsSummary {
    fn from(stats: &RunningStats) -> Self {
        Self {
            count: stats.count,
            min: stats.min,
            max: stats.max,
            mean: stats.mean(),
            std_dev: stats.std_dev(),
        }
    }
}

impl std::fmt::Display for StatsSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.count == 0 {
            write!(f, "N/A")
        } else {
            write!(
                f,
                "min={:.3}, max={:.3}, mean={:.3}, std={:.3} (n={})",
                self.min, self.max, self.mean, self.std_dev, self.count
            )
        }
    }
}

/// Online statistics (Welford's algorithm)
#[derive(Debug, Clone, Default)]
pub struct RunningStats {
    count: u64,
    mean: f64,
    m2: f64,
    min: f64,
    max: f64,
}

impl RunningStats {
    pub fn push(&mut self, value: f64) {
        self.count += 1;

        if self.count == 1 {
            self.min = value;
            self.max = value;
            self.mean = value;
            self.m2 = 0.0;
        } else {
            self.min = self.min.min(value);
            self.max = self.max.max(value);

            let delta = value - self.mean;
            self.mean += delta / self.count as f64;
            let delta2 = value - self.mean;
            self.m2 += delta * delta2;
        }
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn mean(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.mean
        }
    }

    /// Sample variance
    pub fn variance(&self) -> f64 {
        if self.count < 2 {
            0.0
        } else {
            self.m2 / (self.count - 1) as f64
        }
    }

    pub fn std_dev(&self) -> f64 {
        self.variance().sqrt()
    }

    pub fn min(&self) -> f64 {
        self.min
    }

    pub fn max(&self) -> f64 {
        self.max
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use contracts::{FrameHeader, StreamId};

    fn frame(stream_type: StreamType, ts: f64) -> FrameHandle {
        FrameHandle::header_only(FrameHeader::new(
            StreamId::new("cam", stream_type, 0),
            ts,
            1,
            30,
        ))
    }

    #[test]
    fn test_running_stats() {
        let mut stats = RunningStats::default();
        for v in [1.0, 2.0, 3.0, 4.0, 5.0] {
            stats.push(v);
        }

        assert_eq!(stats.count(), 5);
        assert!((stats.mean() - 3.0).abs() < 1e-10);
        assert!((stats.min() - 1.0).abs() < 1e-10);
        assert!((stats.max() - 5.0).abs() < 1e-10);
        assert!((stats.variance() - 2.5).abs() < 1e-10);
    }

    #[test]
    fn test_aggregator_update() {
        let mut aggregator = SyncMetricsAggregator::new();

        let composite = FrameHandle::composite(vec![
            frame(StreamType::Depth, 100.0),
            frame(StreamType::Color, 110.0),
        ])
        .unwrap();
        aggregator.update(&composite);
        aggregator.update(&frame(StreamType::Gyro, 101.0));

        assert_eq!(aggregator.total_outputs, 2);
        assert_eq!(aggregator.composites, 1);
        assert_eq!(aggregator.singles, 1);
        assert_eq!(aggregator.per_stream.get(&StreamType::Depth), Some(&1));
        assert_eq!(aggregator.per_stream.get(&StreamType::Gyro), Some(&1));
        assert!((aggregator.spread_ms.max() - 10.0).abs() < 1e-9);

        let summary = aggregator.summary();
        assert!((summary.composite_rate - 50.0).abs() < 1e-9);
    }

    #[test]
    fn test_summary_display() {
        let mut aggregator = SyncMetricsAggregator::new();
        aggregator.update(&frame(StreamType::Depth, 0.0));
        let output = format!("{}", aggregator.summary());
        assert!(output.contains("Delivered frames: 1"));
        assert!(output.contains("depth: 1"));
    }
}
