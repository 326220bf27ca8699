//! 任务定义模块
//!
//! 提供统一的后台任务抽象：模糊订阅清理、空服务清理、入站事件消费等

use std::future::Future;
use std::pin::Pin;

/// 任务执行结果
pub type TaskResult = Result<(), Box<dyn std::error::Error + Send + Sync>>;

/// 任务 trait
///
/// 所有需要在运行时中管理的任务都必须实现此 trait
pub trait Task: Send {
    /// 获取任务名称
    fn name(&self) -> &str;

    /// 运行任务
    ///
    /// # 参数
    /// * `shutdown_rx` - 关闭信号接收器，当收到信号时任务应该优雅关闭
    fn run(
        self: Box<Self>,
        shutdown_rx: tokio::sync::oneshot::Receiver<()>,
    ) -> Pin<Box<dyn Future<Output = TaskResult> + Send>>;
}

type FutureFn = Box<
    dyn FnOnce(tokio::sync::oneshot::Receiver<()>) -> Pin<Box<dyn Future<Output = TaskResult> + Send>>
        + Send
        + 'static,
>;

/// Spawn 任务
///
/// 用闭包延迟构建 Future，以便在 run 时传入 shutdown_rx
pub struct SpawnTask {
    name: String,
    future_fn: FutureFn,
}

impl SpawnTask {
    /// 创建新的 spawn 任务（不需要 shutdown_rx）
    pub fn new<Fut>(name: impl Into<String>, future: Fut) -> Self
    where
        Fut: Future<Output = TaskResult> + Send + 'static,
    {
        Self {
            name: name.into(),
            future_fn: Box::new(move |_shutdown_rx| Box::pin(future)),
        }
    }

    /// 创建新的 spawn 任务（需要 shutdown_rx）
    ///
    /// # 参数
    /// * `name` - 任务名称
    /// * `future_fn` - 闭包，接收 shutdown_rx，返回 Future
    pub fn with_shutdown<F, Fut>(name: impl Into<String>, future_fn: F) -> Self
    where
        F: FnOnce(tokio::sync::oneshot::Receiver<()>) -> Fut + Send + 'static,
        Fut: Future<Output = TaskResult> + Send + 'static,
    {
        Self {
            name: name.into(),
            future_fn: Box::new(move |shutdown_rx| Box::pin(future_fn(shutdown_rx))),
        }
    }
}

impl Task for SpawnTask {
    fn name(&self) -> &str {
        &self.name
    }

    fn run(
        self: Box<Self>,
        shutdown_rx: tokio::sync::oneshot::Receiver<()>,
    ) -> Pin<Box<dyn Future<Output = TaskResult> + Send>> {
        (self.future_fn)(shutdown_rx)
    }
}
