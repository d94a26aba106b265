//! Synchronization processing block.
//!
//! Entry point for producer threads. Matching runs under one lock; matched
//! sets are appended to an egress queue while that lock is held and handed
//! to the callback only after it is released, so the callback may feed
//! frames back into the block.

use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use contracts::{
    DeviceResolver, EnableOption, FrameAllocator, FrameCallback, FrameHandle, HeapAllocator,
    SyncConfig,
};
use tokio::sync::mpsc;
use tracing::{debug, instrument, trace};

use crate::stats::{SyncCounters, SyncStats};
use crate::tree::{MatcherTree, SyncEnv};

/// Multi-stream frame synchronizer.
///
/// `consume` may be called concurrently from any number of producer
/// threads. Every delivered frame is either a composite built by a matching
/// round or a single frame that bypassed matching.
pub struct SyncProcessingBlock {
    config: SyncConfig,
    resolver: Arc<dyn DeviceResolver>,
    allocator: Arc<dyn FrameAllocator>,
    /// Built on the first matched frame
    matcher: Mutex<Option<MatcherTree>>,
    enable_options: Mutex<Vec<Weak<dyn EnableOption>>>,
    egress: Mutex<VecDeque<FrameHandle>>,
    delivering: AtomicBool,
    callback: FrameCallback,
    counters: SyncCounters,
}

impl SyncProcessingBlock {
    pub fn new(config: SyncConfig, resolver: Arc<dyn DeviceResolver>, callback: FrameCallback) -> Self {
        Self {
            config,
            resolver,
            allocator: Arc::new(HeapAllocator),
            matcher: Mutex::new(None),
            enable_options: Mutex::new(Vec::new()),
            egress: Mutex::new(VecDeque::new()),
            delivering: AtomicBool::new(false),
            callback,
            counters: SyncCounters::default(),
        }
    }

    /// Block delivering into an unbounded channel
    pub fn with_channel(
        config: SyncConfig,
        resolver: Arc<dyn DeviceResolver>,
    ) -> (Self, mpsc::UnboundedReceiver<FrameHandle>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let callback: FrameCallback = Arc::new(move |frame: FrameHandle| {
            if tx.send(frame).is_err() {
                trace!("frame receiver dropped");
            }
        });
        (Self::new(config, resolver, callback), rx)
    }

    /// Replace the composite allocator
    pub fn with_allocator(mut self, allocator: Arc<dyn FrameAllocator>) -> Self {
        self.allocator = allocator;
        self
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Register a gate option. The block only holds a weak reference; a
    /// dropped option no longer gates.
    pub fn add_enable_option(&self, option: &Arc<dyn EnableOption>) {
        lock(&self.enable_options).push(Arc::downgrade(option));
    }

    #[instrument(
        level = "trace",
        name = "sync_block_consume",
        skip(self, frame),
        fields(stream = %frame.stream_id(), frame_number = frame.frame_number())
    )]
    pub fn consume(&self, frame: FrameHandle) {
        self.counters.frame_in();
        observability::record_frame_received(frame.stream_type());

        if self.is_enabled() {
            self.dispatch(frame);
        } else {
            self.counters.passthrough_out();
            observability::record_passthrough("disabled");
            lock(&self.egress).push_back(frame);
        }

        self.deliver();
    }

    pub fn stats(&self) -> SyncStats {
        self.counters.snapshot()
    }

    /// Current matcher tree, `None` before the first matched frame
    pub fn topology(&self) -> Option<String> {
        lock(&self.matcher).as_ref().map(MatcherTree::topology)
    }

    /// Frames waiting in matcher queues
    pub fn queued_frames(&self) -> usize {
        lock(&self.matcher)
            .as_ref()
            .map_or(0, MatcherTree::queued_frames)
    }

    /// Gate state: open when no live option is registered or any is enabled
    fn is_enabled(&self) -> bool {
        let mut options = lock(&self.enable_options);
        if options.is_empty() {
            return true;
        }

        let mut any_alive = false;
        let mut enabled = false;
        options.retain(|option| match option.upgrade() {
            Some(option) => {
                any_alive = true;
                enabled |= option.is_enabled();
                true
            }
            None => false,
        });
        enabled || !any_alive
    }

    fn dispatch(&self, frame: FrameHandle) {
        let mut matcher = lock(&self.matcher);
        let tree = matcher.get_or_insert_with(|| {
            debug!(first = %frame.stream_id(), "building root matcher");
            MatcherTree::new()
        });

        let mut env = SyncEnv {
            config: &self.config,
            resolver: self.resolver.as_ref(),
            allocator: self.allocator.as_ref(),
            counters: &self.counters,
            out: Vec::new(),
        };
        tree.dispatch(frame, &mut env);

        if !env.out.is_empty() {
            // still under the matcher lock: egress order is production order
            lock(&self.egress).extend(env.out);
        }
    }

    /// Drain the egress queue into the callback. Only one thread drains at a
    /// time; others leave their frames to it.
    fn deliver(&self) {
        loop {
            if self
                .delivering
                .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
                .is_err()
            {
                return;
            }
            let claim = DeliveryClaim(&self.delivering);

            loop {
                let next = lock(&self.egress).pop_front();
                let Some(frame) = next else {
                    break;
                };
                if self.config.log_frames {
                    debug!(frame = %frame, "deliver");
                }
                (self.callback)(frame);
            }

            drop(claim);
            if lock(&self.egress).is_empty() {
                return;
            }
        }
    }
}

impl fmt::Debug for SyncProcessingBlock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SyncProcessingBlock")
            .field("config", &self.config)
            .field("stats", &self.stats())
            .finish()
    }
}

/// Held while draining; releases the flag even if the callback unwinds
struct DeliveryClaim<'a>(&'a AtomicBool);

impl Drop for DeliveryClaim<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
