//! 健康检查模块
//!
//! - [`state`]：实例级状态机（阈值翻转、检查中标记、自适应间隔）
//! - [`checker`]：TCP / HTTP / MySQL 探测器
//! - [`status`]：把探测结论落到状态机上并发布事件
//! - [`task`] / [`reactor`]：按实例调度的周期检查

pub mod checker;
pub mod params;
pub mod reactor;
pub mod state;
pub mod status;
pub mod task;

pub use checker::{HealthCheckType, HealthChecker, ProbeContext, ProbeOutcome, TCP_CONNECT_TIMEOUT};
pub use params::HealthParams;
pub use reactor::HealthCheckReactor;
pub use state::{CheckGuard, CheckRt, HealthState, HealthTransition, InstanceHealth};
pub use status::{HealthCheckTarget, HealthStatusUpdater};
pub use task::{HealthCheckTask, run_contained};
