//! Matcher tree.
//!
//! Arena of matcher nodes rooted at a timestamp composite. A frame descends
//! from the root to the identity leaf owning its stream, then climbs back
//! through every composite on the way up; each composite buffers it until a
//! matching round releases a set. Sub-trees are grown lazily from device
//! factories and removed again when their streams go silent.

use std::collections::HashSet;

use contracts::{
    DeviceResolver, FrameAllocator, FrameHandle, MatcherSpec, StreamKey, SyncConfig, SyncError,
};
use slab::Slab;
use tracing::{debug, instrument, trace, warn};

use crate::matcher::{stream_type_of, CompositeMatcher, Node, NodeKey, NodeKind, Output};
use crate::policy::SyncPolicy;
use crate::stats::SyncCounters;

/// Collaborators and output buffer of one dispatch
pub(crate) struct SyncEnv<'a> {
    pub config: &'a SyncConfig,
    pub resolver: &'a dyn DeviceResolver,
    pub allocator: &'a dyn FrameAllocator,
    pub counters: &'a SyncCounters,
    /// Frames released for the consumer, in production order
    pub out: Vec<FrameHandle>,
}

#[derive(Debug)]
pub(crate) struct MatcherTree {
    nodes: Slab<Node>,
    root: NodeKey,
}

impl MatcherTree {
    pub fn new() -> Self {
        let mut nodes = Slab::new();
        let root = nodes.insert(Node::composite(SyncPolicy::Timestamp, Output::Egress));
        Self { nodes, root }
    }

    /// Route a frame to its leaf and run every round it unlocks
    #[instrument(
        level = "trace",
        name = "matcher_tree_dispatch",
        skip(self, frame, env),
        fields(stream = %frame.stream_id(), ts = frame.timestamp())
    )]
    pub fn dispatch(&mut self, frame: FrameHandle, env: &mut SyncEnv<'_>) {
        if env.config.log_frames {
            debug!(frame = %frame, "dispatch");
        }

        let mut key = self.root;
        loop {
            match self.nodes.get(key) {
                Some(node) if node.is_identity() => break,
                Some(_) => key = self.find_matcher(key, &frame, env),
                None => {
                    let error = SyncError::UnknownMatcher {
                        stream: frame.stream_id().to_string(),
                    };
                    warn!(%error, "dropping frame");
                    return;
                }
            }
        }
        self.emit(key, frame, env);
    }

    /// Composite tree rendered as `TS[FN[cam/depth#0, cam/infrared#1], cam/color#0]`
    pub fn topology(&self) -> String {
        self.describe(self.root)
    }

    /// Frames buffered anywhere in the tree
    pub fn queued_frames(&self) -> usize {
        self.nodes
            .iter()
            .filter_map(|(_, node)| node.as_composite())
            .map(CompositeMatcher::queued)
            .sum()
    }

    /// Live nodes, root and passthrough leaves included
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    fn composite(&self, key: NodeKey) -> Option<&CompositeMatcher> {
        self.nodes.get(key).and_then(Node::as_composite)
    }

    fn composite_mut(&mut self, key: NodeKey) -> Option<&mut CompositeMatcher> {
        self.nodes.get_mut(key).and_then(Node::as_composite_mut)
    }

    fn lookup(&self, key: NodeKey, stream: &StreamKey) -> Option<NodeKey> {
        self.composite(key)
            .and_then(|c| c.registry.get(stream))
            .copied()
    }

    fn emit(&mut self, key: NodeKey, frame: FrameHandle, env: &mut SyncEnv<'_>) {
        let Some(output) = self.nodes.get(key).map(|node| node.output) else {
            return;
        };
        match output {
            Output::Parent(parent) => self.sync(parent, key, frame, env),
            Output::Egress => {
                env.counters.composite_out();
                observability::record_composite_emitted(frame.members().len().max(1));
                env.out.push(frame);
            }
            Output::Passthrough(reason) => {
                env.counters.passthrough_out();
                observability::record_passthrough(reason);
                env.out.push(frame);
            }
        }
    }

    #[instrument(
        level = "trace",
        name = "matcher_tree_sync",
        skip(self, frame, env),
        fields(stream = %frame.stream_id())
    )]
    fn sync(&mut self, key: NodeKey, from: NodeKey, frame: FrameHandle, env: &mut SyncEnv<'_>) {
        let Some(composite) = self.composite_mut(key) else {
            return;
        };
        composite.enqueue(from, frame);

        loop {
            let Some(composite) = self.composite(key) else {
                break;
            };
            let round = composite.plan_round(env.config);

            for child in &round.stale {
                self.prune(key, *child, env);
            }

            if round.is_ready() {
                let Some(composite) = self.composite_mut(key) else {
                    break;
                };
                let frames = composite.take_heads(&round.members, env.config);
                if frames.is_empty() {
                    break;
                }
                if let Some(set) = Self::assemble(frames, env) {
                    self.emit(key, set, env);
                }
                continue;
            }

            if round.stale.is_empty() {
                if round.deferred {
                    trace!(matcher = %self.describe(key), "waiting for due stream");
                    env.counters.round_deferred();
                    observability::record_round_deferred();
                }
                break;
            }
        }
    }

    fn assemble(mut frames: Vec<FrameHandle>, env: &SyncEnv<'_>) -> Option<FrameHandle> {
        if frames.len() == 1 && frames[0].is_composite() {
            return frames.pop();
        }

        let members = frames.len();
        let set = env.allocator.allocate_composite_frame(frames);
        if set.is_none() {
            let error = SyncError::AllocationFailed { members };
            warn!(%error, "matched frames released");
            env.counters.allocation_failure();
            observability::record_allocation_failure();
        }
        set
    }

    /// Resolve the direct child of `key` serving the frame's stream,
    /// growing the tree when the stream is new
    #[instrument(
        level = "trace",
        name = "matcher_tree_find_matcher",
        skip(self, frame, env),
        fields(stream = %frame.stream_id())
    )]
    fn find_matcher(&mut self, key: NodeKey, frame: &FrameHandle, env: &SyncEnv<'_>) -> NodeKey {
        let id_key = StreamKey::Id(frame.stream_id().clone());
        if let Some(child) = self.lookup(key, &id_key) {
            return child;
        }

        let factory = frame
            .owning_device()
            .and_then(|device| env.resolver.matcher_factory(device));
        let Some(factory) = factory else {
            let type_key = StreamKey::Type(frame.stream_type());
            if let Some(child) = self.lookup(key, &type_key) {
                return child;
            }
            debug!(stream = %frame.stream_id(), "no device for stream, passing through");
            return self.add_passthrough(key, type_key, "unknown_device");
        };

        let spec = factory
            .create_matcher(frame)
            .filter(|spec| spec.streams().contains(frame.stream_id()));
        if let Some(spec) = spec {
            self.attach(key, &spec, env);
            if let Some(child) = self.lookup(key, &id_key) {
                return child;
            }
        }
        debug!(stream = %frame.stream_id(), "stream excluded by device policy, passing through");
        self.add_passthrough(key, id_key, "excluded")
    }

    fn add_passthrough(&mut self, parent: NodeKey, stream: StreamKey, reason: &'static str) -> NodeKey {
        let leaf = self
            .nodes
            .insert(Node::identity(stream.clone(), Output::Passthrough(reason)));
        if let Some(composite) = self.composite_mut(parent) {
            composite.registry.insert(stream, leaf);
        }
        leaf
    }

    /// Build `spec` under `parent`, taking over every stream it reports
    fn attach(&mut self, parent: NodeKey, spec: &MatcherSpec, env: &SyncEnv<'_>) -> NodeKey {
        let child = self.instantiate(spec, Output::Parent(parent));
        let streams = self
            .nodes
            .get(child)
            .map(|node| node.streams.clone())
            .unwrap_or_default();

        for stream in &streams {
            if let Some(owner) = self.lookup(parent, stream) {
                self.evict(owner, stream, env);
            }
        }

        if let Some(composite) = self.composite_mut(parent) {
            composite.add_child(child, &streams);
        }
        self.register(parent, &streams);

        debug!(matcher = %self.describe(child), "matcher created");
        child
    }

    fn instantiate(&mut self, spec: &MatcherSpec, output: Output) -> NodeKey {
        let (policy, children) = match spec {
            MatcherSpec::Identity(id) => {
                return self
                    .nodes
                    .insert(Node::identity(StreamKey::Id(id.clone()), output));
            }
            MatcherSpec::FrameNumber(children) => (SyncPolicy::FrameNumber, children),
            MatcherSpec::Timestamp(children) => (SyncPolicy::Timestamp, children),
        };

        let key = self.nodes.insert(Node::composite(policy, output));
        for child_spec in children {
            let child = self.instantiate(child_spec, Output::Parent(key));
            let streams = self
                .nodes
                .get(child)
                .map(|node| node.streams.clone())
                .unwrap_or_default();
            if let Some(node) = self.nodes.get_mut(key) {
                node.streams.extend(streams.iter().cloned());
                if let Some(composite) = node.as_composite_mut() {
                    composite.add_child(child, &streams);
                }
            }
        }
        key
    }

    /// Record `streams` on `key` and route them through it from every ancestor
    fn register(&mut self, mut key: NodeKey, streams: &[StreamKey]) {
        let mut via = None;
        loop {
            let Some(node) = self.nodes.get_mut(key) else {
                return;
            };
            for stream in streams {
                if !node.streams.contains(stream) {
                    node.streams.push(stream.clone());
                }
            }
            if let (Some(via), Some(composite)) = (via, node.as_composite_mut()) {
                for stream in streams {
                    composite.registry.insert(stream.clone(), via);
                }
            }
            match node.output {
                Output::Parent(parent) => {
                    via = Some(key);
                    key = parent;
                }
                Output::Egress | Output::Passthrough(_) => return,
            }
        }
    }

    /// Forget `streams` on `key` and every ancestor
    fn unregister(&mut self, mut key: NodeKey, streams: &[StreamKey]) {
        loop {
            let Some(node) = self.nodes.get_mut(key) else {
                return;
            };
            node.streams.retain(|stream| !streams.contains(stream));
            if let Some(composite) = node.as_composite_mut() {
                for stream in streams {
                    composite.registry.remove(stream);
                }
            }
            match node.output {
                Output::Parent(parent) => key = parent,
                Output::Egress | Output::Passthrough(_) => return,
            }
        }
    }

    /// Take `stream` away from its current owner sub-tree
    fn evict(&mut self, owner: NodeKey, stream: &StreamKey, env: &SyncEnv<'_>) {
        let mut leaf = owner;
        while let Some(next) = self.composite(leaf).and_then(|c| c.registry.get(stream)) {
            leaf = *next;
        }

        debug!(stream = %stream, previous = %self.describe(owner), "stream claimed by new matcher");
        match self.nodes.get(leaf) {
            Some(node) if node.is_identity() => self.detach(leaf, env),
            Some(_) => self.unregister(leaf, std::slice::from_ref(stream)),
            None => {}
        }
    }

    fn prune(&mut self, parent: NodeKey, child: NodeKey, env: &SyncEnv<'_>) {
        let streams = self
            .nodes
            .get(child)
            .map(|node| node.streams.clone())
            .unwrap_or_default();

        warn!(
            matcher = %self.describe(parent),
            pruned = %self.describe(child),
            staleness_ms = env.config.staleness_ms,
            "stream silent too long, pruning"
        );
        for stream in &streams {
            env.counters.stream_pruned();
            observability::record_stream_pruned(stream_type_of(stream));
        }
        self.detach(child, env);
    }

    /// Remove a node and its sub-tree. A composite left without children is
    /// removed as well, up to (not including) the root.
    fn detach(&mut self, key: NodeKey, env: &SyncEnv<'_>) {
        if key == self.root {
            return;
        }
        let Some(node) = self.nodes.get(key) else {
            return;
        };
        let output = node.output;
        let streams = node.streams.clone();

        let Output::Parent(parent) = output else {
            for (_, node) in self.nodes.iter_mut() {
                if let Some(composite) = node.as_composite_mut() {
                    composite.registry.retain(|_, owner| *owner != key);
                }
            }
            self.free(key);
            return;
        };

        let mut dropped = self
            .composite_mut(parent)
            .map(|c| c.remove_child(key).len())
            .unwrap_or(0);
        dropped += self.free(key);
        self.unregister(parent, &streams);

        if dropped > 0 {
            debug!(dropped, "queued frames released with removed matcher");
            env.counters.frames_evicted(dropped);
            observability::record_frames_evicted(dropped);
        }

        let orphaned = parent != self.root
            && self
                .composite(parent)
                .is_some_and(|c| c.children.is_empty());
        if orphaned {
            debug!(matcher = %self.describe(parent), "matcher left without streams, removing");
            self.detach(parent, env);
        }
    }

    /// Release a sub-tree; returns the number of frames it still buffered
    fn free(&mut self, key: NodeKey) -> usize {
        let Some(node) = self.nodes.try_remove(key) else {
            return 0;
        };
        let NodeKind::Composite(composite) = node.kind else {
            return 0;
        };

        let mut dropped = composite.queued();
        let owned: HashSet<NodeKey> = composite
            .children
            .iter()
            .chain(composite.registry.values())
            .copied()
            .collect();
        for child in owned {
            dropped += self.free(child);
        }
        dropped
    }

    fn describe(&self, key: NodeKey) -> String {
        let Some(node) = self.nodes.get(key) else {
            return "<removed>".to_string();
        };
        match &node.kind {
            NodeKind::Identity => node
                .streams
                .first()
                .map(ToString::to_string)
                .unwrap_or_default(),
            NodeKind::Composite(composite) => {
                let children: Vec<String> = composite
                    .children
                    .iter()
                    .map(|child| self.describe(*child))
                    .collect();
                format!("{}[{}]", composite.policy.name(), children.join(", "))
            }
        }
    }
}

impl Default for MatcherTree {
    fn default() -> Self {
        Self::new()
    }
}
