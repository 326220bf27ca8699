//! 注册中心运行时框架
//!
//! 通过 `Task` trait 管理后台任务，使用 `JoinSet` 并发运行，关闭时逐个发送
//! 关闭信号并在超时内等待退出。

pub mod config;
pub mod runtime;
pub mod task;

pub use config::RuntimeConfig;
pub use runtime::{NamingRuntime, RuntimeHandle};
pub use task::{SpawnTask, Task, TaskResult};
