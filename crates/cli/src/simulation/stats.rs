//! 模拟运行统计

use std::time::Duration;

use observability::SyncMetricsAggregator;
use sync_engine::SyncStats;

/// Statistics from a simulation run
#[derive(Debug, Clone, Default)]
pub struct SimulationStats {
    /// Frames handed to the synchronizer by the mock sources
    pub frames_produced: u64,

    /// Configured streams
    pub active_streams: usize,

    /// Wall-clock duration of the run
    pub duration: Duration,

    /// Sources were stopped by the run timeout
    pub timed_out: bool,

    /// Frames still waiting in matcher queues at the end
    pub queued_frames: usize,

    /// Matcher tree at the end, `None` if nothing was matched
    pub topology: Option<String>,

    /// Synchronizer counters
    pub sync: SyncStats,

    /// Consumer-side aggregation of delivered frames
    pub sync_metrics: SyncMetricsAggregator,
}

impl SimulationStats {
    /// Delivered frames per wall-clock second
    pub fn output_rate(&self) -> f64 {
        if self.duration.as_secs_f64() > 0.0 {
            self.sync_metrics.total_outputs as f64 / self.duration.as_secs_f64()
        } else {
            0.0
        }
    }

    /// Print detailed summary
    pub fn print_summary(&self) {
        println!("\n╔══════════════════════════════════════════════════════════════╗");
        println!("║                   Simulation Statistics                      ║");
        println!("╚══════════════════════════════════════════════════════════════╝\n");

        println!("📊 Overview");
        println!("   ├─ Duration: {:.2}s", self.duration.as_secs_f64());
        println!("   ├─ Streams: {}", self.active_streams);
        println!("   ├─ Frames produced: {}", self.frames_produced);
        println!("   ├─ Frames delivered: {}", self.sync_metrics.total_outputs);
        println!("   ├─ Output rate: {:.2}/s", self.output_rate());
        println!("   └─ Timed out: {}", self.timed_out);

        println!("\n🔗 Synchronizer");
        println!("   ├─ Frames in: {}", self.sync.frames_in);
        println!("   ├─ Composites out: {}", self.sync.composites_out);
        println!("   ├─ Passthrough out: {}", self.sync.passthrough_out);
        println!("   ├─ Deferred rounds: {}", self.sync.deferred_rounds);
        println!("   ├─ Streams pruned: {}", self.sync.streams_pruned);
        println!("   ├─ Frames evicted: {}", self.sync.frames_evicted);
        println!("   ├─ Allocation failures: {}", self.sync.allocation_failures);
        println!("   └─ Still queued: {}", self.queued_frames);

        if let Some(topology) = &self.topology {
            println!("\n🌳 Matcher tree");
            println!("   {topology}");
        }

        println!("\n{}", self.sync_metrics.summary());
    }
}
