//! # Integration Tests
//!
//! 跨 crate 端到端测试。
//!
//! 覆盖：
//! - 契约冒烟测试
//! - 通过公开 block API 的同步场景
//! - OS 线程上的 mock 数据源驱动 block

#[cfg(test)]
mod contract_tests {
    use contracts::{StreamId, StreamType};

    #[test]
    fn test_contracts_compile() {
        let _ = contracts::ConfigVersion::V1;
        assert_eq!(
            StreamId::new("cam", StreamType::Depth, 0).to_string(),
            "cam/depth#0"
        );
    }
}

#[cfg(test)]
mod support {
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex};

    use config_loader::{ConfigFormat, ConfigLoader};
    use contracts::{
        FrameCallback, FrameHandle, FrameHeader, MatcherPreset, SessionConfig, StreamId,
        StreamType, SyncConfig,
    };
    use sync_engine::{PresetMatcherFactory, StaticDeviceResolver, SyncProcessingBlock};

    pub const PERIOD: f64 = 1000.0 / 30.0;

    pub fn sid(stream_type: StreamType, index: u32) -> StreamId {
        StreamId::new("cam", stream_type, index)
    }

    pub fn depth() -> StreamId {
        sid(StreamType::Depth, 0)
    }

    pub fn ir() -> StreamId {
        sid(StreamType::Infrared, 1)
    }

    pub fn color() -> StreamId {
        sid(StreamType::Color, 0)
    }

    pub fn frame(stream: StreamId, ts: f64, number: u64) -> FrameHandle {
        FrameHandle::header_only(FrameHeader::new(stream, ts, number, 30))
    }

    /// Delivered frames, shared with the block callback
    #[derive(Clone, Default)]
    pub struct Collected(Arc<Mutex<Vec<FrameHandle>>>);

    impl Collected {
        pub fn callback(&self) -> FrameCallback {
            let frames = self.0.clone();
            Arc::new(move |frame: FrameHandle| frames.lock().unwrap().push(frame))
        }

        /// Frames delivered since the last call
        pub fn take(&self) -> Vec<FrameHandle> {
            std::mem::take(&mut *self.0.lock().unwrap())
        }
    }

    /// Block for one `cam` device with the given streams
    pub fn block(preset: MatcherPreset, streams: Vec<StreamId>) -> (SyncProcessingBlock, Collected) {
        let factory = Arc::new(PresetMatcherFactory::new(preset, streams));
        let resolver = StaticDeviceResolver::new().with_device("cam", factory);
        let collected = Collected::default();
        let block =
            SyncProcessingBlock::new(SyncConfig::default(), Arc::new(resolver), collected.callback());
        (block, collected)
    }

    pub fn dic_block() -> (SyncProcessingBlock, Collected) {
        block(MatcherPreset::DiC, vec![depth(), ir(), color()])
    }

    pub fn session(toml: &str) -> SessionConfig {
        ConfigLoader::load_from_str(toml, ConfigFormat::Toml).unwrap()
    }

    pub fn types(frame: &FrameHandle) -> Vec<StreamType> {
        frame.flatten().iter().map(FrameHandle::stream_type).collect()
    }

    /// Leaf frame numbers per stream, in delivery order
    pub fn per_stream(frames: &[FrameHandle]) -> HashMap<StreamId, Vec<u64>> {
        let mut streams: HashMap<StreamId, Vec<u64>> = HashMap::new();
        for leaf in frames.iter().flat_map(FrameHandle::flatten) {
            streams
                .entry(leaf.stream_id().clone())
                .or_default()
                .push(leaf.frame_number());
        }
        streams
    }
}

#[cfg(test)]
mod scenario_tests {
    use std::sync::Arc;

    use contracts::{FrameHandle, FrameHeader, StreamId, StreamType, SyncConfig};
    use sync_engine::{StaticDeviceResolver, SyncProcessingBlock};

    use crate::support::*;

    /// Depth and IR with the same frame number leave together; an unseen
    /// color stream does not hold them back.
    #[test]
    fn test_scenario_a_frame_number_pair() {
        let (block, out) = dic_block();

        block.consume(frame(depth(), 1000.0, 100));
        assert!(out.take().is_empty());

        block.consume(frame(ir(), 1000.0, 100));
        let delivered = out.take();
        assert_eq!(delivered.len(), 1);
        assert!(delivered[0].is_composite());
        assert_eq!(
            types(&delivered[0]),
            vec![StreamType::Depth, StreamType::Infrared]
        );
        assert!(delivered[0]
            .flatten()
            .iter()
            .all(|f| f.frame_number() == 100));
        assert_eq!(block.queued_frames(), 0);
    }

    /// Once color is known, the pair waits for the color frame 10ms later
    #[test]
    fn test_scenario_b_color_within_tolerance() {
        let (block, out) = dic_block();

        block.consume(frame(depth(), 1000.0, 0));
        block.consume(frame(ir(), 1000.0, 0));
        block.consume(frame(color(), 1010.0, 0));
        assert_eq!(out.take().len(), 2);

        let ts = 1000.0 + PERIOD;
        block.consume(frame(depth(), ts, 1));
        block.consume(frame(ir(), ts, 1));
        assert!(out.take().is_empty(), "pair must wait for a due color frame");
        assert_eq!(block.queued_frames(), 1);

        block.consume(frame(color(), ts + 10.0, 1));
        let delivered = out.take();
        assert_eq!(delivered.len(), 1);
        assert_eq!(
            types(&delivered[0]),
            vec![StreamType::Depth, StreamType::Infrared, StreamType::Color]
        );
        assert_eq!(block.stats().composites_out, 3);
    }

    /// Color goes silent for 1200ms; the pairs wait out the staleness
    /// budget, then flow without it. A returning color stream gets a
    /// fresh matcher.
    #[test]
    fn test_scenario_c_silent_color_pruned() {
        let (block, out) = dic_block();

        for n in 0..3u64 {
            let ts = 1000.0 + n as f64 * PERIOD;
            block.consume(frame(depth(), ts, n));
            block.consume(frame(ir(), ts, n));
            block.consume(frame(color(), ts + 5.0, n));
        }
        out.take();

        // color next expected at ~1105; silence measured from there
        let mut n = 3u64;
        while block.stats().streams_pruned == 0 {
            let ts = 1000.0 + n as f64 * PERIOD;
            block.consume(frame(depth(), ts, n));
            block.consume(frame(ir(), ts, n));
            n += 1;
            assert!(n < 100, "color never pruned");
        }
        let silence = 1000.0 + (n - 1) as f64 * PERIOD - (1005.0 + 3.0 * PERIOD);
        assert!(silence > 1000.0 && silence < 1000.0 + 2.0 * PERIOD);

        // everything held back is released in order
        let released = out.take();
        let numbers: Vec<u64> = released.iter().map(FrameHandle::frame_number).collect();
        assert_eq!(numbers, (3..n).collect::<Vec<_>>());
        assert_eq!(block.queued_frames(), 0);
        assert_eq!(
            block.topology().as_deref(),
            Some("TS[TS[FN[cam/depth#0, cam/infrared#1]]]")
        );

        // pairs no longer wait
        for m in n..n + 3 {
            let ts = 1000.0 + m as f64 * PERIOD;
            block.consume(frame(depth(), ts, m));
            block.consume(frame(ir(), ts, m));
            assert_eq!(out.take().len(), 1);
        }

        // color comes back: fresh sub-tree, no stale expectation
        let ts = 1000.0 + (n + 3) as f64 * PERIOD + 5.0;
        block.consume(frame(color(), ts, n + 3));
        let delivered = out.take();
        assert_eq!(delivered.len(), 1);
        assert_eq!(types(&delivered[0]), vec![StreamType::Color]);
        assert_eq!(
            block.topology().as_deref(),
            Some("TS[TS[FN[cam/depth#0, cam/infrared#1], cam/color#0]]")
        );
        assert_eq!(block.stats().frames_evicted, 0);
    }

    /// Frames of an unknown device are delivered as they are
    #[test]
    fn test_scenario_d_unknown_device() {
        let (block, out) = dic_block();

        let ghost = StreamId::new("ghost", StreamType::Depth, 0);
        block.consume(frame(ghost.clone(), 1000.0, 1));
        block.consume(FrameHandle::header_only(FrameHeader::new(
            StreamId::anonymous(StreamType::Color, 0),
            1001.0,
            1,
            30,
        )));

        let delivered = out.take();
        assert_eq!(delivered.len(), 2);
        assert!(delivered.iter().all(|f| !f.is_composite()));
        assert_eq!(delivered[0].stream_id(), &ghost);

        let stats = block.stats();
        assert_eq!(stats.passthrough_out, 2);
        assert_eq!(stats.composites_out, 0);
        assert_eq!(block.topology().as_deref(), Some("TS[]"));
    }

    /// Motion streams of a known device are not synchronized
    #[test]
    fn test_motion_stream_passes_through() {
        let gyro = sid(StreamType::Gyro, 0);
        let (block, out) = block(
            contracts::MatcherPreset::Default,
            vec![depth(), ir(), color(), gyro.clone()],
        );

        block.consume(frame(depth(), 1000.0, 1));
        block.consume(frame(gyro, 1001.0, 1));
        let delivered = out.take();
        assert_eq!(delivered.len(), 1);
        assert_eq!(delivered[0].stream_type(), StreamType::Gyro);
        assert!(!delivered[0].is_composite());
        assert_eq!(block.queued_frames(), 1);
    }

    /// Two devices get their own sub-trees under the root
    #[test]
    fn test_two_devices() {
        let session = session(
            r#"
preset = "di"

[[devices]]
id = "front"
[[devices.streams]]
stream_type = "depth"
fps = 30
[[devices.streams]]
stream_type = "infrared"
index = 1
fps = 30

[[devices]]
id = "rear"
[[devices.streams]]
stream_type = "depth"
fps = 30
[[devices.streams]]
stream_type = "infrared"
index = 1
fps = 30
"#,
        );
        let resolver = Arc::new(StaticDeviceResolver::from_session(&session));
        let collected = Collected::default();
        let block = SyncProcessingBlock::new(SyncConfig::default(), resolver, collected.callback());

        for device in ["front", "rear"] {
            block.consume(frame(StreamId::new(device, StreamType::Depth, 0), 1000.0, 7));
        }
        assert!(collected.take().is_empty());

        for device in ["rear", "front"] {
            block.consume(frame(StreamId::new(device, StreamType::Infrared, 1), 1000.0, 7));
        }
        let delivered = collected.take();
        assert_eq!(delivered.len(), 2);
        for composite in &delivered {
            let members = composite.flatten();
            assert_eq!(members.len(), 2);
            assert_eq!(members[0].owning_device(), members[1].owning_device());
        }
        assert_eq!(
            block.topology().as_deref(),
            Some("TS[FN[front/depth#0, front/infrared#1], FN[rear/depth#0, rear/infrared#1]]")
        );
    }
}

#[cfg(test)]
mod property_tests {
    use contracts::{MatcherPreset, StreamType, TimestampDomain};
    use ingestion::{MockSession, MockStreamConfig, MockStreamSource};

    use crate::support::*;

    fn depth_color_replay(color_offset_ms: f64) -> Vec<contracts::FrameHandle> {
        let (block, out) = block(MatcherPreset::DiC, vec![depth(), color()]);
        let session = MockSession::from_sources(vec![
            MockStreamSource::new(MockStreamConfig::new(depth(), 30).with_speed(0.0)).unwrap(),
            MockStreamSource::new(
                MockStreamConfig::new(color(), 30)
                    .with_start(color_offset_ms)
                    .with_speed(0.0),
            )
            .unwrap(),
        ]);
        session.replay(|frame| block.consume(frame));
        out.take()
    }

    fn pairs(delivered: &[contracts::FrameHandle]) -> Vec<(u64, u64)> {
        delivered
            .iter()
            .filter(|f| f.flatten().len() == 2)
            .map(|f| {
                let members = f.flatten();
                (members[0].frame_number(), members[1].frame_number())
            })
            .collect()
    }

    /// 16.6ms apart at 30fps: same round
    #[test]
    fn test_timestamp_within_half_gap_matched() {
        let delivered = depth_color_replay(16.6);
        let pairs = pairs(&delivered);

        assert_eq!(pairs.len(), 29);
        assert!(pairs.iter().all(|(d, c)| d == c));
    }

    /// 16.7ms apart at 30fps: color lands with the next depth frame instead
    #[test]
    fn test_timestamp_beyond_half_gap_not_matched() {
        let delivered = depth_color_replay(16.7);
        let pairs = pairs(&delivered);

        assert_eq!(pairs.len(), 29);
        assert!(pairs.iter().all(|(d, c)| *d == c + 1));
        for composite in delivered.iter().filter(|f| f.flatten().len() == 2) {
            let members = composite.flatten();
            let spread = (members[0].timestamp() - members[1].timestamp()).abs();
            assert!(spread < PERIOD / 2.0);
        }
    }

    /// Every composite of a frame-number group shares one frame number;
    /// a dropped frame only shrinks its own round.
    #[test]
    fn test_frame_number_rounds() {
        let ir2 = sid(StreamType::Infrared, 2);
        let (block, out) = block(MatcherPreset::Dlr, vec![depth(), ir(), ir2.clone()]);
        let session = MockSession::from_sources(vec![
            MockStreamSource::new(MockStreamConfig::new(depth(), 30)).unwrap(),
            MockStreamSource::new(MockStreamConfig::new(ir(), 30)).unwrap(),
            MockStreamSource::new(MockStreamConfig::new(ir2, 30).with_drop_every(5)).unwrap(),
        ]);
        session.replay(|frame| block.consume(frame));

        let delivered = out.take();
        for composite in &delivered {
            let numbers: Vec<u64> = composite.flatten().iter().map(|f| f.frame_number()).collect();
            assert!(numbers.windows(2).all(|w| w[0] == w[1]), "{numbers:?}");
        }
        let full = delivered.iter().filter(|f| f.flatten().len() == 3).count();
        let short = delivered.iter().filter(|f| f.flatten().len() == 2).count();
        assert_eq!(full, 24);
        // frame 29 is still waiting for its partner
        assert_eq!(short, 5);
        assert_eq!(block.queued_frames(), 2);
    }

    /// Pruning releases, it never loses: every produced frame is
    /// delivered exactly once and in order.
    #[test]
    fn test_session_with_silence_conserves_frames() {
        let session = session(
            r#"
preset = "di_c"
duration_ms = 3000.0

[[devices]]
id = "cam"

[[devices.streams]]
stream_type = "depth"
fps = 30

[[devices.streams]]
stream_type = "infrared"
index = 1
fps = 30

[[devices.streams]]
stream_type = "color"
fps = 30
start_ms = 5.0

[[devices.streams.silence]]
from_ms = 1000.0
to_ms = 2200.0
"#,
        );
        let mock = MockSession::from_session(&session, 0.0).unwrap();
        let (block, out) = dic_block();
        let fed = mock.replay(|frame| block.consume(frame));
        assert_eq!(fed, 90 + 90 + 54);

        let delivered = out.take();
        let leaves: usize = delivered.iter().map(|f| f.flatten().len()).sum();
        assert_eq!(leaves, fed);
        assert_eq!(block.queued_frames(), 0);

        let stats = block.stats();
        assert_eq!(stats.streams_pruned, 1);
        assert_eq!(stats.frames_evicted, 0);
        assert_eq!(stats.frames_in, fed as u64);

        let streams = per_stream(&delivered);
        assert_eq!(streams[&depth()], (0..90).collect::<Vec<_>>());
        assert_eq!(streams[&ir()], (0..90).collect::<Vec<_>>());
        let colors: Vec<u64> = (0..30).chain(66..90).collect();
        assert_eq!(streams[&color()], colors);

        // after the gap color is matched with its pair again
        let last = delivered.last().unwrap();
        assert_eq!(
            types(last),
            vec![StreamType::Depth, StreamType::Infrared, StreamType::Color]
        );
        assert_eq!(last.frame_number(), 89);
    }

    /// Color stamped by the host clock while depth and IR use the device
    /// clock: its silence is still bounded by the staleness budget.
    #[test]
    fn test_silence_on_foreign_clock_prunes() {
        let (block, out) = dic_block();
        let session = MockSession::from_sources(vec![
            MockStreamSource::new(MockStreamConfig::new(depth(), 30).with_duration(3000.0))
                .unwrap(),
            MockStreamSource::new(MockStreamConfig::new(ir(), 30).with_duration(3000.0)).unwrap(),
            MockStreamSource::new(
                MockStreamConfig::new(color(), 30)
                    .with_duration(3000.0)
                    .with_start(5.0)
                    .with_silence(1000.0, 2200.0)
                    .with_domain(TimestampDomain::SystemTime),
            )
            .unwrap(),
        ]);
        let fed = session.replay(|frame| block.consume(frame));
        assert_eq!(fed, 90 + 90 + 54);

        let delivered = out.take();
        let leaves: usize = delivered.iter().map(|f| f.flatten().len()).sum();
        assert_eq!(leaves, fed);
        assert_eq!(block.queued_frames(), 0);
        assert_eq!(block.stats().streams_pruned, 1);

        let streams = per_stream(&delivered);
        assert_eq!(streams[&depth()], (0..90).collect::<Vec<_>>());
        let colors: Vec<u64> = (0..30).chain(66..90).collect();
        assert_eq!(streams[&color()], colors);

        let last = delivered.last().unwrap();
        assert_eq!(
            types(last),
            vec![StreamType::Depth, StreamType::Infrared, StreamType::Color]
        );
    }
}

#[cfg(test)]
mod concurrency_tests {
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    use contracts::{EnableOption, FrameCallback, FrameHandle, MatcherPreset, StreamType};
    use ingestion::MockSession;
    use observability::SyncMetricsAggregator;
    use sync_engine::{FrameSyncer, StaticDeviceResolver, SyncError, SyncProcessingBlock};

    use crate::support::*;

    const SESSION: &str = r#"
preset = "default"
duration_ms = 1000.0

[[devices]]
id = "cam"

[[devices.streams]]
stream_type = "depth"
fps = 30

[[devices.streams]]
stream_type = "infrared"
index = 1
fps = 30

[[devices.streams]]
stream_type = "infrared"
index = 2
fps = 30

[[devices.streams]]
stream_type = "color"
fps = 30
start_ms = 3.0

[[devices.streams]]
stream_type = "gyro"
fps = 200
"#;

    fn assert_fifo(delivered: &[FrameHandle]) {
        for (stream, numbers) in per_stream(delivered) {
            assert!(
                numbers.windows(2).all(|w| w[0] < w[1]),
                "{stream} delivered out of order: {numbers:?}"
            );
        }
    }

    /// One producer thread per stream; per-stream order survives
    #[test]
    fn test_threaded_sources_keep_fifo() {
        let session = session(SESSION);
        let resolver = Arc::new(StaticDeviceResolver::from_session(&session));
        let collected = Collected::default();
        let block = Arc::new(SyncProcessingBlock::new(
            session.sync.clone(),
            resolver,
            collected.callback(),
        ));

        let mock = MockSession::from_session(&session, 0.0).unwrap();
        let sink = block.clone();
        mock.start(Arc::new(move |frame: FrameHandle| sink.consume(frame)))
            .unwrap();
        mock.join();

        let delivered = collected.take();
        assert_fifo(&delivered);
        assert_eq!(block.stats().frames_in, mock.produced());

        let gyro = delivered
            .iter()
            .filter(|f| f.stream_type() == StreamType::Gyro)
            .count();
        assert_eq!(gyro, 200);
        assert!(delivered
            .iter()
            .filter(|f| f.stream_type() == StreamType::Gyro)
            .all(|f| !f.is_composite()));
    }

    /// Paced sources feeding a pull-style syncer on a consumer thread
    #[test]
    fn test_frame_syncer_with_paced_sources() {
        let mut session = session(SESSION);
        session.duration_ms = 300.0;
        session.sync.queue_capacity = 256;
        let resolver = Arc::new(StaticDeviceResolver::from_session(&session));
        let syncer = Arc::new(FrameSyncer::new(session.sync.clone(), resolver));

        let mock = MockSession::from_session(&session, 4.0).unwrap();
        let sink = syncer.clone();
        mock.start(Arc::new(move |frame: FrameHandle| sink.consume(frame)))
            .unwrap();

        let consumer = {
            let syncer = syncer.clone();
            thread::spawn(move || {
                let mut frames = Vec::new();
                loop {
                    match syncer.wait_for_frames(Duration::from_millis(500)) {
                        Ok(frame) => frames.push(frame),
                        Err(SyncError::Timeout { .. }) => break,
                        Err(e) => panic!("unexpected error: {e}"),
                    }
                }
                frames
            })
        };

        mock.join();
        let delivered = consumer.join().unwrap();
        assert!(!delivered.is_empty());
        assert_fifo(&delivered);
        assert!(delivered.iter().any(|f| f.flatten().len() >= 3));
        assert!(syncer.poll_for_frames().is_none());
    }

    /// Async consumer over the channel-backed block
    #[tokio::test]
    async fn test_channel_consumer_aggregates() {
        let session = session(SESSION);
        let resolver = Arc::new(StaticDeviceResolver::from_session(&session));
        let (block, mut rx) = SyncProcessingBlock::with_channel(session.sync.clone(), resolver);

        let mock = MockSession::from_session(&session, 0.0).unwrap();
        // the block moves into the task; dropping it closes the channel
        let fed = tokio::task::spawn_blocking(move || mock.replay(|frame| block.consume(frame)))
            .await
            .unwrap();

        let mut aggregator = SyncMetricsAggregator::new();
        while let Some(frame) = rx.recv().await {
            aggregator.update(&frame);
        }

        let summary = aggregator.summary();
        assert_eq!(summary.singles, 200);
        assert!(summary.composites > 0);
        assert!(summary.spread_ms.max < PERIOD / 2.0);
        let leaves: u64 = summary.per_stream.values().sum();
        assert!(leaves as usize <= fed);
        assert_eq!(summary.per_stream[&StreamType::Gyro], 200);
    }

    /// A closed gate delivers every frame unmatched
    #[test]
    fn test_disabled_gate_bypasses_matching() {
        let (block, out) = block(MatcherPreset::DiC, vec![depth(), ir(), color()]);
        let flag = Arc::new(AtomicBool::new(false));
        let option: Arc<dyn EnableOption> = flag.clone();
        block.add_enable_option(&option);

        block.consume(frame(depth(), 1000.0, 1));
        block.consume(frame(ir(), 1000.0, 1));
        let delivered = out.take();
        assert_eq!(delivered.len(), 2);
        assert!(delivered.iter().all(|f| !f.is_composite()));
        assert!(block.topology().is_none());

        flag.store(true, Ordering::Release);
        block.consume(frame(depth(), 1033.0, 2));
        block.consume(frame(ir(), 1033.0, 2));
        assert_eq!(out.take().len(), 1);
    }

    /// A callback feeding frames back into its own block does not deadlock
    #[test]
    fn test_reentrant_pipeline() {
        let downstream = Collected::default();
        let factory = Arc::new(sync_engine::PresetMatcherFactory::new(
            MatcherPreset::Di,
            vec![depth(), ir()],
        ));
        let resolver = Arc::new(StaticDeviceResolver::new().with_device("cam", factory));

        let slot: Arc<std::sync::OnceLock<std::sync::Weak<SyncProcessingBlock>>> =
            Arc::new(std::sync::OnceLock::new());
        let forward = downstream.callback();
        let back = slot.clone();
        let callback: FrameCallback = Arc::new(move |frame: FrameHandle| {
            // echo every composite once as an unrelated stream
            if frame.is_composite() {
                if let Some(block) = back.get().and_then(std::sync::Weak::upgrade) {
                    block.consume(frame_for_echo(&frame));
                }
            }
            forward(frame);
        });
        let block = Arc::new(SyncProcessingBlock::new(
            contracts::SyncConfig::default(),
            resolver,
            callback,
        ));
        let _ = slot.set(Arc::downgrade(&block));

        block.consume(frame(depth(), 1000.0, 1));
        block.consume(frame(ir(), 1000.0, 1));

        let delivered = downstream.take();
        assert_eq!(delivered.len(), 2);
        assert!(delivered[0].is_composite());
        assert_eq!(delivered[1].stream_type(), StreamType::Pose);
    }

    fn frame_for_echo(composite: &FrameHandle) -> FrameHandle {
        frame(
            sid(StreamType::Pose, 0),
            composite.timestamp(),
            composite.frame_number(),
        )
    }
}
