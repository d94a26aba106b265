//! Equivalence policies of composite matchers.
//!
//! A policy decides whether two frames of different streams belong to the
//! same set, which of two frames is older, and how far a missing stream is
//! behind the current reference frame.

use contracts::{FrameHeader, SyncConfig, TimestampDomain};

/// Matching policy of a composite matcher
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncPolicy {
    /// Hardware-synchronized streams sharing one frame counter
    FrameNumber,
    /// Free-running streams matched by timestamp proximity
    Timestamp,
}

/// Predicted value of a stream's next frame
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NextExpected {
    /// Timestamp (ms) or frame number, depending on the policy
    pub value: f64,
    pub fps: f64,
    pub domain: TimestampDomain,
}

/// How a matching round treats a stream with an empty queue
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MissingVerdict {
    /// Next frame is not due yet; match without it
    Ahead,
    /// Due or ambiguous; wait for more data
    Due,
    /// Silent for longer than the staleness budget; prune it
    Stale,
}

impl SyncPolicy {
    pub fn name(self) -> &'static str {
        match self {
            Self::FrameNumber => "FN",
            Self::Timestamp => "TS",
        }
    }

    pub fn are_equivalent(self, a: &FrameHeader, b: &FrameHeader, config: &SyncConfig) -> bool {
        match self {
            Self::FrameNumber => a.frame_number == b.frame_number,
            Self::Timestamp => {
                let min_fps = config
                    .fps_or_fallback(a.framerate)
                    .min(config.fps_or_fallback(b.framerate));
                let gap = 1000.0 / min_fps;
                (a.timestamp - b.timestamp).abs() < gap / 2.0
            }
        }
    }

    pub fn is_smaller_than(self, a: &FrameHeader, b: &FrameHeader) -> bool {
        match self {
            Self::FrameNumber => a.frame_number < b.frame_number,
            Self::Timestamp => a.timestamp < b.timestamp,
        }
    }

    /// Prediction made after `frame` was matched and dequeued
    pub fn next_expected(self, frame: &FrameHeader, config: &SyncConfig) -> NextExpected {
        let fps = config.fps_or_fallback(frame.framerate);
        let value = match self {
            Self::FrameNumber => frame.frame_number as f64 + 1.0,
            Self::Timestamp => frame.timestamp + 1000.0 / fps,
        };
        NextExpected {
            value,
            fps,
            domain: frame.domain,
        }
    }

    /// Prediction for a child that has not produced a frame yet.
    ///
    /// Frame-number siblings share the reference's counter, so an unseen
    /// sibling is expected at the reference's frame number. Nothing is known
    /// about the phase of an unseen free-running stream, so it is not waited
    /// for until its first frame arrives.
    pub fn seed_unseen(self, reference: &FrameHeader, config: &SyncConfig) -> Option<NextExpected> {
        match self {
            Self::FrameNumber => Some(NextExpected {
                value: reference.frame_number as f64,
                fps: config.fps_or_fallback(reference.framerate),
                domain: reference.domain,
            }),
            Self::Timestamp => None,
        }
    }

    /// Judge a missing stream.
    ///
    /// `reference` is the round's reference frame, `newest` the most recent
    /// frame enqueued in the matcher; silence is measured against `newest`.
    /// `silence_ms` is how long the stream has been quiet on `newest`'s own
    /// clock. It bounds the wait when the stream's timestamps cannot be
    /// compared with the reference.
    pub fn judge_missing(
        self,
        reference: &FrameHeader,
        newest: &FrameHeader,
        next: &NextExpected,
        silence_ms: Option<f64>,
        config: &SyncConfig,
    ) -> MissingVerdict {
        match self {
            Self::FrameNumber => {
                if next.value > reference.frame_number as f64 {
                    return MissingVerdict::Ahead;
                }
                let fps = config.fps_or_fallback(newest.framerate);
                let overdue_ms = (newest.frame_number as f64 - next.value) * 1000.0 / fps;
                Self::overdue_verdict(overdue_ms, config)
            }
            Self::Timestamp => {
                if next.domain != reference.domain {
                    return Self::silence_verdict(silence_ms, config);
                }
                let gap = 1000.0 / config.fps_or_fallback(reference.framerate);
                if next.value - reference.timestamp >= gap / 2.0 {
                    return MissingVerdict::Ahead;
                }
                if next.domain != newest.domain {
                    return Self::silence_verdict(silence_ms, config);
                }
                Self::overdue_verdict(newest.timestamp - next.value, config)
            }
        }
    }

    /// Timelines differ: wait, unless the stream has been quiet too long
    fn silence_verdict(silence_ms: Option<f64>, config: &SyncConfig) -> MissingVerdict {
        match silence_ms {
            Some(silence) => Self::overdue_verdict(silence, config),
            None => MissingVerdict::Due,
        }
    }

    fn overdue_verdict(overdue_ms: f64, config: &SyncConfig) -> MissingVerdict {
        if overdue_ms > config.staleness_ms {
            MissingVerdict::Stale
        } else {
            MissingVerdict::Due
        }
    }
}
