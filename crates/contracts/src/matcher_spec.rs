//! MatcherSpec - declarative synchronization policy of one device
//!
//! A device factory describes the matcher sub-tree it wants; the sync engine
//! instantiates it.

use serde::{Deserialize, Serialize};

use crate::StreamId;

/// Matcher sub-tree description
#[derive(Debug, Clone, PartialEq)]
pub enum MatcherSpec {
    /// Single-stream leaf
    Identity(StreamId),

    /// Children matched by equal frame number
    FrameNumber(Vec<MatcherSpec>),

    /// Children matched by timestamp proximity
    Timestamp(Vec<MatcherSpec>),
}

impl MatcherSpec {
    /// Frame-number composite; collapses to the child when only one is given
    pub fn frame_number(children: Vec<MatcherSpec>) -> Option<Self> {
        Self::collapse(children, Self::FrameNumber)
    }

    /// Timestamp composite; collapses to the child when only one is given
    pub fn timestamp(children: Vec<MatcherSpec>) -> Option<Self> {
        Self::collapse(children, Self::Timestamp)
    }

    fn collapse(
        mut children: Vec<MatcherSpec>,
        make: fn(Vec<MatcherSpec>) -> MatcherSpec,
    ) -> Option<Self> {
        match children.len() {
            0 => None,
            1 => children.pop(),
            _ => Some(make(children)),
        }
    }

    /// Every stream id reported by this sub-tree, depth first
    pub fn streams(&self) -> Vec<StreamId> {
        let mut out = Vec::new();
        self.collect_streams(&mut out);
        out
    }

    fn collect_streams(&self, out: &mut Vec<StreamId>) {
        match self {
            Self::Identity(id) => out.push(id.clone()),
            Self::FrameNumber(children) | Self::Timestamp(children) => {
                for child in children {
                    child.collect_streams(out);
                }
            }
        }
    }
}

/// Device-level synchronization presets
///
/// D = depth, I = infrared, L/R = left/right infrared, C = color.
/// The streams before the optional `C` are frame-number matched; the color
/// stream is then timestamp matched against that group.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatcherPreset {
    /// Depth + IR frame-number matched, color and other image streams
    /// timestamp matched, motion streams unsynchronized
    #[default]
    Default,
    Di,
    DiC,
    Dlr,
    DlrC,
    /// Depth + IR + confidence
    Dic,
    DicC,
}

impl MatcherPreset {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Default => "default",
            Self::Di => "di",
            Self::DiC => "di_c",
            Self::Dlr => "dlr",
            Self::DlrC => "dlr_c",
            Self::Dic => "dic",
            Self::DicC => "dic_c",
        }
    }
}
