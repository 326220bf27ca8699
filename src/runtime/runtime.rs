//! 注册中心运行时实现
//!
//! 统一管理注册中心后台任务的生命周期：
//! - 启动任务（模糊订阅清理、空服务清理、入站事件消费等）
//! - 等待关闭信号
//! - 优雅停机（超时后强制中止）

use std::collections::HashSet;
use std::future::Future;
use tokio::sync::oneshot;
use tokio::task::JoinSet;
use tracing::{error, info, warn};

use crate::error::InfraResult;
use crate::runtime::config::RuntimeConfig;
use crate::runtime::task::{SpawnTask, Task, TaskResult};

/// 注册中心运行时
///
/// # 使用示例
///
/// ```rust,no_run
/// use std::sync::Arc;
/// use flare_naming_core::{Config, NamingRegistry};
///
/// # async fn demo() -> anyhow::Result<()> {
/// let registry = Arc::new(NamingRegistry::new(Config::default())?);
/// registry.runtime().run().await?;
/// # Ok(())
/// # }
/// ```
pub struct NamingRuntime {
    name: String,
    tasks: Vec<Box<dyn Task>>,
    config: RuntimeConfig,
}

impl NamingRuntime {
    /// 创建新的运行时
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            tasks: Vec::new(),
            config: RuntimeConfig::default(),
        }
    }

    /// 设置运行时配置
    pub fn with_config(mut self, config: RuntimeConfig) -> Self {
        self.config = config;
        self
    }

    /// 添加任务
    pub fn add_task(mut self, task: Box<dyn Task>) -> Self {
        info!(target: "naming::runtime", task_name = %task.name(), "Adding task to runtime");
        self.tasks.push(task);
        self
    }

    /// 添加 spawn 任务（需要 shutdown_rx）
    ///
    /// # 参数
    /// * `name` - 任务名称
    /// * `future_fn` - 闭包，接收 shutdown_rx，返回 Future
    pub fn add_spawn_with_shutdown<F, Fut>(self, name: impl Into<String>, future_fn: F) -> Self
    where
        F: FnOnce(oneshot::Receiver<()>) -> Fut + Send + 'static,
        Fut: Future<Output = TaskResult> + Send + 'static,
    {
        self.add_task(Box::new(SpawnTask::with_shutdown(name, future_fn)))
    }

    pub fn task_names(&self) -> Vec<String> {
        self.tasks.iter().map(|t| t.name().to_string()).collect()
    }

    /// 启动所有任务，必须在 tokio 运行时中调用
    pub fn start(self) -> InfraResult<RuntimeHandle> {
        let mut seen = HashSet::new();
        for task in &self.tasks {
            if !seen.insert(task.name().to_string()) {
                return Err(anyhow::anyhow!("Task '{}' is registered more than once", task.name()));
            }
        }

        info!(
            target: "naming::runtime",
            runtime = %self.name,
            task_count = self.tasks.len(),
            "Starting naming runtime"
        );

        let mut join_set = JoinSet::new();
        let mut shutdowns = Vec::with_capacity(self.tasks.len());
        for task in self.tasks {
            let task_name = task.name().to_string();
            let (shutdown_tx, shutdown_rx) = oneshot::channel();
            shutdowns.push(shutdown_tx);

            let task_future = task.run(shutdown_rx);
            join_set.spawn(async move {
                let result = task_future.await;
                match &result {
                    Ok(_) => info!(target: "naming::runtime", task_name = %task_name, "Task completed"),
                    Err(e) => error!(target: "naming::runtime", task_name = %task_name, error = %e, "Task failed"),
                }
                result
            });
        }

        Ok(RuntimeHandle {
            name: self.name,
            join_set,
            shutdowns,
            config: self.config,
        })
    }

    /// 启动所有任务，等待 `signal` 完成后优雅关闭
    pub async fn run_until<F>(self, signal: F) -> InfraResult<()>
    where
        F: Future<Output = ()>,
    {
        let handle = self.start()?;
        signal.await;
        info!(target: "naming::runtime", runtime = %handle.name, "Shutdown signal received");
        handle.shutdown().await
    }

    /// 启动所有任务，收到 Ctrl+C 后优雅关闭
    pub async fn run(self) -> InfraResult<()> {
        self.run_until(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!(target: "naming::runtime", error = %e, "Failed to listen for Ctrl+C");
            }
        })
        .await
    }
}

/// 已启动的运行时
pub struct RuntimeHandle {
    name: String,
    join_set: JoinSet<TaskResult>,
    shutdowns: Vec<oneshot::Sender<()>>,
    config: RuntimeConfig,
}

impl RuntimeHandle {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// 仍在运行的任务数
    pub fn running_tasks(&self) -> usize {
        self.join_set.len()
    }

    /// 发送关闭信号并等待所有任务退出，超时后强制中止
    pub async fn shutdown(mut self) -> InfraResult<()> {
        for tx in self.shutdowns.drain(..) {
            let _ = tx.send(());
        }

        let join_set = &mut self.join_set;
        let waited = tokio::time::timeout(self.config.shutdown_timeout, async {
            while let Some(result) = join_set.join_next().await {
                match result {
                    Ok(Ok(_)) => {}
                    Ok(Err(e)) => warn!(target: "naming::runtime", error = %e, "Task completed with error"),
                    Err(e) => warn!(target: "naming::runtime", error = %e, "Task join error"),
                }
            }
        })
        .await;

        if waited.is_err() {
            warn!(target: "naming::runtime", runtime = %self.name, "Tasks shutdown timeout, forcing exit");
            self.join_set.abort_all();
        }
        info!(target: "naming::runtime", runtime = %self.name, "Naming runtime stopped");
        Ok(())
    }
}

impl std::fmt::Debug for RuntimeHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RuntimeHandle")
            .field("name", &self.name)
            .field("running_tasks", &self.join_set.len())
            .field("shutdown_timeout", &self.config.shutdown_timeout)
            .finish()
    }
}
