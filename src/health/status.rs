//! 健康状态更新
//!
//! 把探测结论落到实例的状态机上，发生翻转时发布 `HealthStateChanged`。

use std::sync::Arc;
use tracing::{debug, info, warn};

use super::checker::ProbeOutcome;
use super::params::HealthParams;
use super::state::{HealthTransition, InstanceHealth};
use crate::client::InstancePublishInfo;
use crate::event::{EventBus, NamingEvent};
use crate::metrics::MetricsMonitor;
use crate::types::Service;

/// 一个被检查的实例
#[derive(Debug, Clone)]
pub struct HealthCheckTarget {
    pub service: Service,
    pub client_id: String,
    pub instance: Arc<InstancePublishInfo>,
    pub health: Arc<InstanceHealth>,
}

impl HealthCheckTarget {
    pub fn instance_id(&self) -> String {
        self.instance.instance_id(&self.service)
    }
}

/// 健康状态更新器
#[derive(Debug)]
pub struct HealthStatusUpdater {
    bus: Arc<EventBus>,
    metrics: Arc<MetricsMonitor>,
    check_times: u32,
}

impl HealthStatusUpdater {
    pub fn new(bus: Arc<EventBus>, metrics: Arc<MetricsMonitor>, check_times: u32) -> Self {
        Self {
            bus,
            metrics,
            check_times,
        }
    }

    pub fn check_times(&self) -> u32 {
        self.check_times
    }

    pub fn check_ok(&self, target: &HealthCheckTarget, reason: &str) -> Option<HealthTransition> {
        let transition = target.health.check_ok(self.check_times);
        self.emit(target, transition, reason)
    }

    pub fn check_fail(&self, target: &HealthCheckTarget, reason: &str) -> Option<HealthTransition> {
        let transition = target.health.check_fail(self.check_times);
        if transition.is_none() {
            debug!(
                target: "naming::health",
                service = %target.service,
                ip = %target.instance.ip,
                port = target.instance.port,
                fail_count = target.health.fail_count(),
                reason,
                "Health check failed"
            );
        }
        self.emit(target, transition, reason)
    }

    pub fn check_fail_now(&self, target: &HealthCheckTarget, reason: &str) -> Option<HealthTransition> {
        let transition = target.health.check_fail_now();
        self.emit(target, transition, reason)
    }

    /// 按探测结论更新状态：`Unreachable` 立即翻转，`Unhealthy` 计入阈值
    pub fn apply(&self, target: &HealthCheckTarget, outcome: &ProbeOutcome) -> Option<HealthTransition> {
        match outcome {
            ProbeOutcome::Healthy => self.check_ok(target, outcome.reason()),
            ProbeOutcome::Unhealthy { reason } => self.check_fail(target, reason),
            ProbeOutcome::Unreachable { reason } => self.check_fail_now(target, reason),
            ProbeOutcome::Skipped => None,
        }
    }

    /// 根据探测耗时调整下次探测间隔
    pub fn re_evaluate(&self, target: &HealthCheckTarget, rt_millis: u64, params: &HealthParams) -> u64 {
        target.health.re_evaluate_interval(rt_millis, params)
    }

    fn emit(
        &self,
        target: &HealthCheckTarget,
        transition: Option<HealthTransition>,
        reason: &str,
    ) -> Option<HealthTransition> {
        let t = transition?;
        self.metrics.record_health_transition();
        if t.new.is_healthy() {
            info!(
                target: "naming::health",
                service = %target.service,
                ip = %target.instance.ip,
                port = target.instance.port,
                cluster = %target.instance.cluster,
                reason,
                "Instance became healthy"
            );
        } else {
            warn!(
                target: "naming::health",
                service = %target.service,
                ip = %target.instance.ip,
                port = target.instance.port,
                cluster = %target.instance.cluster,
                reason,
                "Instance became unhealthy"
            );
        }
        self.bus.publish(NamingEvent::HealthStateChanged {
            service: target.service.clone(),
            instance_id: target.instance_id(),
            ip: target.instance.ip.clone(),
            port: target.instance.port,
            cluster: target.instance.cluster.clone(),
            old: t.old,
            new: t.new,
            reason: reason.to_string(),
            timestamp: t.timestamp,
        });
        Some(t)
    }
}
