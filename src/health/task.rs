//! 单实例健康检查任务
//!
//! 每个持久化实例对应一个任务。任务按实例的自适应间隔循环，每一轮探测都在
//! 独立的 tokio 任务中执行，探测 panic 只影响这一轮，检查中标记由守卫释放。

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::checker::{HealthCheckType, HealthChecker, ProbeContext, ProbeOutcome};
use super::status::{HealthCheckTarget, HealthStatusUpdater};
use crate::config::HealthConfig;
use crate::metadata::{ClusterMetadata, NamingMetadataManager};
use crate::metrics::MetricsMonitor;

/// 检查任务之间共享的依赖
#[derive(Debug)]
pub struct CheckShared {
    pub config: HealthConfig,
    pub updater: Arc<HealthStatusUpdater>,
    pub metadata: Arc<NamingMetadataManager>,
    pub metrics: Arc<MetricsMonitor>,
    pub probe: ProbeContext,
}

impl CheckShared {
    /// 集群配置了检查器时使用集群的，否则使用默认类型
    pub fn resolve(&self, target: &HealthCheckTarget) -> ClusterMetadata {
        self.metadata
            .get_cluster_metadata(&target.service, &target.instance.cluster)
            .unwrap_or_else(|| {
                ClusterMetadata::with_checker(HealthChecker::from_type(self.config.default_checker))
            })
    }
}

/// 在独立任务中执行一轮探测，panic 时按实例记录日志
///
/// 返回 false 表示探测没有正常结束。
pub async fn run_contained<F>(target: &HealthCheckTarget, probe: F) -> bool
where
    F: Future<Output = ()> + Send + 'static,
{
    match tokio::spawn(probe).await {
        Ok(()) => true,
        Err(err) => {
            if err.is_panic() {
                warn!(
                    target: "naming::health",
                    service = %target.service,
                    ip = %target.instance.ip,
                    port = target.instance.port,
                    error = %err,
                    "Health check panicked"
                );
            }
            false
        }
    }
}

/// 健康检查任务
#[derive(Debug, Clone)]
pub struct HealthCheckTask {
    target: HealthCheckTarget,
    cancel: CancellationToken,
    shared: Arc<CheckShared>,
}

impl HealthCheckTask {
    pub fn new(target: HealthCheckTarget, cancel: CancellationToken, shared: Arc<CheckShared>) -> Self {
        Self {
            target,
            cancel,
            shared,
        }
    }

    pub fn target(&self) -> &HealthCheckTarget {
        &self.target
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// 循环执行检查直到任务被取消
    pub async fn run(self) {
        loop {
            let delay = Duration::from_millis(self.target.health.normalized_interval());
            tokio::select! {
                _ = self.cancel.cancelled() => break,
                _ = tokio::time::sleep(delay) => {}
            }
            let _ = self.spawn_check();
        }
        debug!(
            target: "naming::health",
            service = %self.target.service,
            ip = %self.target.instance.ip,
            port = self.target.instance.port,
            "Health check task stopped"
        );
    }

    /// 在独立任务中执行一轮检查，句柄的结果为 false 表示本轮探测 panic
    pub fn spawn_check(&self) -> JoinHandle<bool> {
        let task = self.clone();
        tokio::spawn(async move {
            let probe = task.clone();
            run_contained(&task.target, async move {
                probe.check_now().await;
            })
            .await
        })
    }

    /// 执行一轮检查并返回探测结论
    ///
    /// 未执行探测时返回 None：任务已取消、检查器为 `none`、上一轮仍未结束、地址非法。
    /// 任务取消检查发生在任何状态修改之前。
    pub async fn check_now(&self) -> Option<ProbeOutcome> {
        if self.is_cancelled() || !self.shared.config.enabled {
            return None;
        }
        let cluster = self.shared.resolve(&self.target);
        let checker = cluster.health_checker.clone();
        let check_type = checker.check_type();
        if check_type == HealthCheckType::None {
            return None;
        }
        let params = *self.shared.config.params_for(check_type);

        let Some(_guard) = self.target.health.begin_check() else {
            // 上一轮未结束：跳过本轮并放慢节奏
            let penalty = self.target.health.normalized_interval().saturating_mul(2);
            let next = self.shared.updater.re_evaluate(&self.target, penalty, &params);
            self.shared.metrics.record_probe_skipped();
            debug!(
                target: "naming::health",
                service = %self.target.service,
                ip = %self.target.instance.ip,
                port = self.target.instance.port,
                next_interval_ms = next,
                "Previous check still in flight, skipped"
            );
            return None;
        };

        let Some(address) = cluster.check_address(&self.target.instance) else {
            warn!(
                target: "naming::health",
                service = %self.target.service,
                ip = %self.target.instance.ip,
                "Instance address is not a valid IP, check skipped"
            );
            return None;
        };

        let started = Instant::now();
        let outcome = checker.probe(address, &self.shared.probe).await;
        let rt = started.elapsed().as_millis() as u64;

        if self.is_cancelled() {
            debug!(
                target: "naming::health",
                service = %self.target.service,
                address = %address,
                "Task cancelled during probe, result discarded"
            );
            return None;
        }
        if outcome == ProbeOutcome::Skipped {
            return Some(outcome);
        }

        self.shared.metrics.record_probe(check_type, outcome.is_success());
        self.shared.updater.apply(&self.target, &outcome);
        let measured = if outcome.is_success() { rt } else { params.max };
        self.shared.updater.re_evaluate(&self.target, measured, &params);
        Some(outcome)
    }
}
