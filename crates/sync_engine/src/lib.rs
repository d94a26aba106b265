//! # Sync Engine
//!
//! 多流帧同步器。
//!
//! 各传感器线程产生的帧经过一棵 matcher 树：每个流一个 identity 叶子，
//! 硬件同步的流按帧号匹配，自由运行的流按时间戳匹配。
//! 每一轮匹配为一组一致的帧输出一个复合帧。
//!
//! 职责：
//! - 按设备预设懒构建 matcher 树
//! - 帧号 / 时间戳等价判定
//! - 缺失流等待与超时剪枝
//! - 在匹配锁外按序交付
//!
//! ## 使用示例
//!
//! ```ignore
//! use sync_engine::{FrameSyncer, StaticDeviceResolver};
//!
//! let resolver = Arc::new(StaticDeviceResolver::from_session(&session));
//! let syncer = FrameSyncer::new(session.sync.clone(), resolver);
//!
//! // Producer threads
//! syncer.consume(frame);
//!
//! // Consumer
//! let set = syncer.wait_for_frames(Duration::from_secs(5))?;
//! for member in set.flatten() {
//!     println!("{member}");
//! }
//! ```

mod block;
mod matcher;
mod policy;
mod preset;
mod stats;
mod syncer;
mod tree;

pub use block::SyncProcessingBlock;
pub use policy::{MissingVerdict, NextExpected, SyncPolicy};
pub use preset::{PresetMatcherFactory, StaticDeviceResolver};
pub use stats::SyncStats;
pub use syncer::FrameSyncer;

// Re-export contracts types
pub use contracts::{FrameHandle, MatcherPreset, MatcherSpec, SyncConfig, SyncError};
