//! 指标收集模块

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::health::HealthCheckType;

/// 指标快照
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Metrics {
    pub tcp_probes: u64,
    pub http_probes: u64,
    pub mysql_probes: u64,
    pub probe_failures: u64,
    pub probes_skipped: u64,
    pub health_transitions: u64,
    pub view_rebuilds: u64,
    pub view_cache_hits: u64,
    pub fuzzy_over_limit_rejections: u64,
    pub fuzzy_incremental_skips: u64,
    pub fuzzy_patterns_swept: u64,
    pub empty_services_cleaned: u64,
}

/// 指标收集器，全部为无锁计数
#[derive(Debug, Default)]
pub struct MetricsMonitor {
    tcp_probes: AtomicU64,
    http_probes: AtomicU64,
    mysql_probes: AtomicU64,
    probe_failures: AtomicU64,
    probes_skipped: AtomicU64,
    health_transitions: AtomicU64,
    view_rebuilds: AtomicU64,
    view_cache_hits: AtomicU64,
    fuzzy_over_limit_rejections: AtomicU64,
    fuzzy_incremental_skips: AtomicU64,
    fuzzy_patterns_swept: AtomicU64,
    empty_services_cleaned: AtomicU64,
}

fn incr(counter: &AtomicU64) {
    counter.fetch_add(1, Ordering::Relaxed);
}

impl MetricsMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_probe(&self, checker: HealthCheckType, success: bool) {
        match checker {
            HealthCheckType::Tcp => incr(&self.tcp_probes),
            HealthCheckType::Http => incr(&self.http_probes),
            HealthCheckType::Mysql => incr(&self.mysql_probes),
            HealthCheckType::None => {}
        }
        if !success {
            incr(&self.probe_failures);
        }
    }

    /// 上一次探测尚未结束，本轮被跳过
    pub fn record_probe_skipped(&self) {
        incr(&self.probes_skipped);
    }

    pub fn record_health_transition(&self) {
        incr(&self.health_transitions);
    }

    pub fn record_view_rebuild(&self) {
        incr(&self.view_rebuilds);
    }

    pub fn record_view_cache_hit(&self) {
        incr(&self.view_cache_hits);
    }

    pub fn record_fuzzy_over_limit(&self) {
        incr(&self.fuzzy_over_limit_rejections);
    }

    pub fn record_fuzzy_incremental_skip(&self) {
        incr(&self.fuzzy_incremental_skips);
    }

    pub fn record_fuzzy_swept(&self, count: usize) {
        self.fuzzy_patterns_swept
            .fetch_add(count as u64, Ordering::Relaxed);
    }

    pub fn record_empty_service_cleaned(&self, count: usize) {
        self.empty_services_cleaned
            .fetch_add(count as u64, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> Metrics {
        let load = |c: &AtomicU64| c.load(Ordering::Relaxed);
        Metrics {
            tcp_probes: load(&self.tcp_probes),
            http_probes: load(&self.http_probes),
            mysql_probes: load(&self.mysql_probes),
            probe_failures: load(&self.probe_failures),
            probes_skipped: load(&self.probes_skipped),
            health_transitions: load(&self.health_transitions),
            view_rebuilds: load(&self.view_rebuilds),
            view_cache_hits: load(&self.view_cache_hits),
            fuzzy_over_limit_rejections: load(&self.fuzzy_over_limit_rejections),
            fuzzy_incremental_skips: load(&self.fuzzy_incremental_skips),
            fuzzy_patterns_swept: load(&self.fuzzy_patterns_swept),
            empty_services_cleaned: load(&self.empty_services_cleaned),
        }
    }

    /// 以 JSON 形式导出快照，供诊断接口使用
    pub fn snapshot_json(&self) -> serde_json::Value {
        serde_json::to_value(self.snapshot()).unwrap_or(serde_json::Value::Null)
    }
}
