//! 索引模块
//!
//! - [`ClientServiceIndex`]：客户端与服务之间的发布/订阅双向索引
//! - [`FuzzyWatchEngine`]：模糊订阅表达式与服务、客户端之间的索引

pub mod client_service;
pub mod fuzzy_watch;
pub mod pattern;

pub use client_service::ClientServiceIndex;
pub use fuzzy_watch::{FuzzyWatchEngine, FuzzyWatchSweepTask, WatchOutcome};
pub use pattern::{FuzzyPattern, build_pattern, canonical_pattern, matches_pattern, namespace_of};
