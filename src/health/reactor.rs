//! 健康检查反应器
//!
//! 为每个持久化实例调度一个 [`HealthCheckTask`]，实例注销或客户端断开时取消。

use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::checker::{HealthChecker, ProbeContext};
use super::params::HealthParams;
use super::status::{HealthCheckTarget, HealthStatusUpdater};
use super::task::{CheckShared, HealthCheckTask};
use crate::client::PublishedInstance;
use crate::config::HealthConfig;
use crate::metadata::NamingMetadataManager;
use crate::metrics::MetricsMonitor;
use crate::types::Service;

/// 健康检查反应器
#[derive(Debug)]
pub struct HealthCheckReactor {
    tasks: DashMap<String, HealthCheckTask>,
    root: CancellationToken,
    shared: Arc<CheckShared>,
}

impl HealthCheckReactor {
    pub fn new(
        config: HealthConfig,
        updater: Arc<HealthStatusUpdater>,
        metadata: Arc<NamingMetadataManager>,
        metrics: Arc<MetricsMonitor>,
    ) -> Self {
        let probe = ProbeContext::new(Duration::from_millis(config.probe_timeout_ms));
        Self {
            tasks: DashMap::new(),
            root: CancellationToken::new(),
            shared: Arc::new(CheckShared {
                config,
                updater,
                metadata,
                metrics,
                probe,
            }),
        }
    }

    fn task_key(client_id: &str, service: &Service) -> String {
        format!("{client_id}#{}", service.service_key())
    }

    /// 为实例调度检查任务，已有任务会被替换
    ///
    /// 返回是否启动了检查循环；健康检查关闭或不在 tokio 运行时中时不启动。
    pub fn schedule(&self, service: &Service, client_id: &str, published: &PublishedInstance) -> bool {
        if !self.shared.config.enabled {
            return false;
        }
        let key = Self::task_key(client_id, service);
        let task = HealthCheckTask::new(
            HealthCheckTarget {
                service: service.clone(),
                client_id: client_id.to_string(),
                instance: published.info.clone(),
                health: published.health.clone(),
            },
            self.root.child_token(),
            self.shared.clone(),
        );
        if let Some(previous) = self.tasks.insert(key, task.clone()) {
            previous.cancel();
        }

        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(task.run());
                debug!(
                    target: "naming::health",
                    service = %service,
                    client_id,
                    address = %published.info.address(),
                    "Health check task scheduled"
                );
                true
            }
            Err(_) => {
                warn!(
                    target: "naming::health",
                    service = %service,
                    client_id,
                    "No tokio runtime available, health check loop not started"
                );
                false
            }
        }
    }

    /// 取消实例的检查任务
    pub fn cancel(&self, client_id: &str, service: &Service) -> bool {
        match self.tasks.remove(&Self::task_key(client_id, service)) {
            Some((_, task)) => {
                task.cancel();
                debug!(target: "naming::health", service = %service, client_id, "Health check task cancelled");
                true
            }
            None => false,
        }
    }

    pub fn get_task(&self, client_id: &str, service: &Service) -> Option<HealthCheckTask> {
        self.tasks
            .get(&Self::task_key(client_id, service))
            .map(|t| t.value().clone())
    }

    pub fn task_count(&self) -> usize {
        self.tasks.len()
    }

    /// 实例所在集群当前生效的检查器
    pub fn resolve_checker(&self, target: &HealthCheckTarget) -> HealthChecker {
        self.shared.resolve(target).health_checker
    }

    /// 实例所在集群检查器对应的自适应参数
    pub fn params_for(&self, target: &HealthCheckTarget) -> HealthParams {
        *self
            .shared
            .config
            .params_for(self.resolve_checker(target).check_type())
    }

    pub fn updater(&self) -> &Arc<HealthStatusUpdater> {
        &self.shared.updater
    }

    /// 停止全部检查任务
    pub fn shutdown(&self) {
        self.root.cancel();
        let count = self.tasks.len();
        self.tasks.clear();
        info!(target: "naming::health", tasks = count, "Health check reactor stopped");
    }
}

impl Drop for HealthCheckReactor {
    fn drop(&mut self) {
        self.root.cancel();
    }
}
