//! Matcher nodes.
//!
//! Nodes live in the [`MatcherTree`](crate::tree::MatcherTree) arena and refer
//! to each other by key. A node is either an identity leaf (one stream, no
//! buffering) or a composite that buffers one FIFO per child and matches
//! their heads under a [`SyncPolicy`].

use std::collections::{HashMap, VecDeque};
use std::fmt;

use contracts::{FrameHandle, FrameHeader, StreamKey, StreamType, SyncConfig, TimestampDomain};

use crate::policy::{MissingVerdict, NextExpected, SyncPolicy};

pub(crate) type NodeKey = usize;

pub(crate) fn stream_type_of(key: &StreamKey) -> StreamType {
    match key {
        StreamKey::Id(id) => id.stream_type,
        StreamKey::Type(stream_type) => *stream_type,
    }
}

/// Where a node sends the frames it is done with
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Output {
    /// Enqueue on the parent composite
    Parent(NodeKey),
    /// Deliver to the block's consumer (root only)
    Egress,
    /// Deliver unmatched; the reason is reported in metrics
    Passthrough(&'static str),
}

#[derive(Debug)]
pub(crate) struct Node {
    pub output: Output,
    /// Stream keys served by this node and its descendants
    pub streams: Vec<StreamKey>,
    pub kind: NodeKind,
}

#[derive(Debug)]
pub(crate) enum NodeKind {
    Identity,
    Composite(CompositeMatcher),
}

impl Node {
    pub fn identity(key: StreamKey, output: Output) -> Self {
        Self {
            output,
            streams: vec![key],
            kind: NodeKind::Identity,
        }
    }

    pub fn is_identity(&self) -> bool {
        matches!(self.kind, NodeKind::Identity)
    }

    pub fn composite(policy: SyncPolicy, output: Output) -> Self {
        Self {
            output,
            streams: Vec::new(),
            kind: NodeKind::Composite(CompositeMatcher::new(policy)),
        }
    }

    pub fn as_composite(&self) -> Option<&CompositeMatcher> {
        match &self.kind {
            NodeKind::Composite(c) => Some(c),
            NodeKind::Identity => None,
        }
    }

    pub fn as_composite_mut(&mut self) -> Option<&mut CompositeMatcher> {
        match &mut self.kind {
            NodeKind::Composite(c) => Some(c),
            NodeKind::Identity => None,
        }
    }
}

/// Buffers of a composite matcher
#[derive(Debug)]
pub(crate) struct CompositeMatcher {
    pub policy: SyncPolicy,
    /// Stream key -> direct child serving it
    pub registry: HashMap<StreamKey, NodeKey>,
    /// Children in discovery order; composites list members in this order
    pub children: Vec<NodeKey>,
    pub queues: HashMap<NodeKey, VecDeque<FrameHandle>>,
    pub next_expected: HashMap<NodeKey, NextExpected>,
    /// Most recent frame enqueued on any child
    pub newest: Option<FrameHeader>,
    /// Per timestamp domain: first and latest timestamp enqueued
    clocks: HashMap<TimestampDomain, DomainClock>,
    /// Latest timestamp of each domain when the child last produced a frame
    heard_at: HashMap<NodeKey, HashMap<TimestampDomain, f64>>,
}

#[derive(Debug, Clone, Copy)]
struct DomainClock {
    first: f64,
    latest: f64,
}

/// Outcome of one matching round
#[derive(Debug, Default, PartialEq)]
pub(crate) struct Round {
    /// Children whose heads form the set, in discovery order
    pub members: Vec<NodeKey>,
    /// Missing children silent past the staleness budget
    pub stale: Vec<NodeKey>,
    /// A due child is missing; nothing is emitted
    pub deferred: bool,
}

impl Round {
    pub fn is_ready(&self) -> bool {
        !self.members.is_empty() && !self.deferred
    }
}

impl CompositeMatcher {
    pub fn new(policy: SyncPolicy) -> Self {
        Self {
            policy,
            registry: HashMap::new(),
            children: Vec::new(),
            queues: HashMap::new(),
            next_expected: HashMap::new(),
            newest: None,
            clocks: HashMap::new(),
            heard_at: HashMap::new(),
        }
    }

    pub fn add_child(&mut self, child: NodeKey, streams: &[StreamKey]) {
        for key in streams {
            self.registry.insert(key.clone(), child);
        }
        self.children.push(child);
        self.queues.insert(child, VecDeque::new());
    }

    /// Forget a direct child; returns its queued frames
    pub fn remove_child(&mut self, child: NodeKey) -> VecDeque<FrameHandle> {
        self.registry.retain(|_, owner| *owner != child);
        self.children.retain(|c| *c != child);
        self.next_expected.remove(&child);
        self.heard_at.remove(&child);
        self.queues.remove(&child).unwrap_or_default()
    }

    pub fn enqueue(&mut self, child: NodeKey, frame: FrameHandle) {
        let header = frame.header();
        self.clocks
            .entry(header.domain)
            .and_modify(|clock| clock.latest = clock.latest.max(header.timestamp))
            .or_insert(DomainClock {
                first: header.timestamp,
                latest: header.timestamp,
            });
        let seen = self
            .clocks
            .iter()
            .map(|(domain, clock)| (*domain, clock.latest))
            .collect();
        self.heard_at.insert(child, seen);
        self.newest = Some(header.clone());
        self.queues.entry(child).or_default().push_back(frame);
    }

    /// How long `child` has been quiet, on the clock of `now`.
    ///
    /// A domain first seen after the child went quiet counts from its first
    /// frame.
    fn silence_ms(&self, child: NodeKey, now: &FrameHeader) -> Option<f64> {
        let heard = self.heard_at.get(&child)?;
        let since = heard
            .get(&now.domain)
            .copied()
            .or_else(|| self.clocks.get(&now.domain).map(|clock| clock.first))?;
        Some(now.timestamp - since)
    }

    /// Dequeue the head of every member and record their next expected value
    pub fn take_heads(&mut self, members: &[NodeKey], config: &SyncConfig) -> Vec<FrameHandle> {
        let mut frames = Vec::with_capacity(members.len());
        for member in members {
            let Some(frame) = self.queues.get_mut(member).and_then(VecDeque::pop_front) else {
                continue;
            };
            let next = self.policy.next_expected(frame.header(), config);
            self.next_expected.insert(*member, next);
            frames.push(frame);
        }
        frames
    }

    pub fn queued(&self) -> usize {
        self.queues.values().map(VecDeque::len).sum()
    }

    /// Plan the next round from the current queue heads.
    ///
    /// The first non-empty child seeds the reference. An older head replaces
    /// it and restarts the set; any non-equivalent head marks the round as
    /// holding old frames, in which case missing children are not consulted.
    pub fn plan_round(&self, config: &SyncConfig) -> Round {
        let policy = self.policy;
        let mut reference: Option<&FrameHeader> = None;
        let mut round = Round::default();
        let mut old_frames = false;

        for child in &self.children {
            let Some(head) = self.queues.get(child).and_then(VecDeque::front) else {
                continue;
            };
            let header = head.header();
            match reference {
                None => {
                    reference = Some(header);
                    round.members.push(*child);
                }
                Some(r) if policy.are_equivalent(header, r, config) => {
                    round.members.push(*child);
                }
                Some(r) => {
                    if policy.is_smaller_than(header, r) {
                        reference = Some(header);
                        round.members.clear();
                        round.members.push(*child);
                    }
                    old_frames = true;
                }
            }
        }

        let Some(reference) = reference else {
            return round;
        };
        if old_frames {
            return round;
        }

        let newest = self.newest.as_ref().unwrap_or(reference);
        for child in &self.children {
            if round.members.contains(child) {
                continue;
            }
            let next = match self.next_expected.get(child) {
                Some(next) => *next,
                None => match policy.seed_unseen(reference, config) {
                    Some(seeded) => seeded,
                    None => continue,
                },
            };
            let silence = self.silence_ms(*child, newest);
            match policy.judge_missing(reference, newest, &next, silence, config) {
                MissingVerdict::Ahead => {}
                MissingVerdict::Due => round.deferred = true,
                MissingVerdict::Stale => round.stale.push(*child),
            }
        }
        round
    }
}

impl fmt::Display for CompositeMatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} matcher", self.policy.name())
    }
}
