//! 模糊订阅匹配引擎
//!
//! 维护两张相互独立的索引：
//! - 表达式 → 匹配到的服务 key 集合
//! - 表达式 → 订阅该表达式的客户端集合
//!
//! 匹配集在表达式首次被订阅时通过扫描命名空间内的全部服务建立，之后随服务的
//! 增删增量维护。取消订阅只移除订阅者，匹配集留给周期清理任务回收。

use dashmap::mapref::entry::Entry;
use dashmap::{DashMap, DashSet};
use std::collections::HashSet;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tracing::{debug, info, warn};

use super::pattern::{FuzzyPattern, canonical_pattern};
use crate::config::FuzzyWatchConfig;
use crate::error::{NamingError, Result};
use crate::event::{EventBus, NamingEvent, NamingEventListener, ServiceChangedType};
use crate::metrics::MetricsMonitor;
use crate::runtime::{Task, TaskResult};
use crate::service::ServiceManager;
use crate::types::Service;

/// 一次订阅的结果
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WatchOutcome {
    /// 当前完整匹配集
    pub matched: HashSet<String>,
    /// 该客户端第一次订阅此表达式
    pub first_watch: bool,
    /// 相对客户端已知集合新增的 key
    pub added: HashSet<String>,
    /// 客户端已知但已不再匹配的 key
    pub removed: HashSet<String>,
}

/// 模糊订阅匹配引擎
#[derive(Debug)]
pub struct FuzzyWatchEngine {
    matched: DashMap<String, Arc<DashSet<String>>>,
    watchers: DashMap<String, Arc<DashSet<String>>>,
    pattern_count: AtomicUsize,
    config: FuzzyWatchConfig,
    services: Arc<ServiceManager>,
    bus: Arc<EventBus>,
    metrics: Arc<MetricsMonitor>,
}

impl FuzzyWatchEngine {
    pub fn new(
        config: FuzzyWatchConfig,
        services: Arc<ServiceManager>,
        bus: Arc<EventBus>,
        metrics: Arc<MetricsMonitor>,
    ) -> Self {
        Self {
            matched: DashMap::new(),
            watchers: DashMap::new(),
            pattern_count: AtomicUsize::new(0),
            config,
            services,
            bus,
            metrics,
        }
    }

    /// 订阅表达式
    ///
    /// # 参数
    /// * `pattern` - 完整表达式 `namespace>>group>>service`
    /// * `client_id` - 订阅方
    /// * `known` - 客户端本地已经持有的 service key，首次订阅时通常为空
    ///
    /// 表达式数量或匹配数量超限时返回容量错误，且不会留下部分匹配集。
    pub fn watch(
        &self,
        pattern: &str,
        client_id: &str,
        known: &HashSet<String>,
    ) -> Result<WatchOutcome> {
        let parsed = FuzzyPattern::parse(pattern).ok_or_else(|| NamingError::invalid_pattern(pattern))?;
        // 空命名空间与 public 是同一个表达式
        let key = parsed.to_string();

        // 先登记订阅者再确保匹配集存在：清理任务只回收无人订阅的表达式
        let first_watch = self
            .watchers
            .entry(key.clone())
            .or_default()
            .insert(client_id.to_string());

        let matched = match self.ensure_matched(&key, &parsed) {
            Ok(set) => set,
            Err(err) => {
                if first_watch {
                    if let Some(set) = self.watchers.get(&key) {
                        set.remove(client_id);
                    }
                    self.watchers.remove_if(&key, |_, set| set.is_empty());
                }
                self.metrics.record_fuzzy_over_limit();
                warn!(
                    target: "naming::fuzzy",
                    pattern,
                    client_id,
                    error = %err,
                    "Fuzzy watch rejected"
                );
                return Err(err);
            }
        };

        let matched: HashSet<String> = matched.iter().map(|k| k.key().clone()).collect();
        let added: HashSet<String> = matched.difference(known).cloned().collect();
        let removed: HashSet<String> = known.difference(&matched).cloned().collect();

        if first_watch {
            info!(
                target: "naming::fuzzy",
                pattern,
                client_id,
                matched = matched.len(),
                "Fuzzy watch registered"
            );
            self.bus.publish(NamingEvent::FuzzyWatchInit {
                client_id: client_id.to_string(),
                pattern: pattern.to_string(),
                matched_service_keys: matched.clone(),
            });
        } else if !added.is_empty() || !removed.is_empty() {
            debug!(
                target: "naming::fuzzy",
                pattern,
                client_id,
                added = added.len(),
                removed = removed.len(),
                "Fuzzy watch resynchronized"
            );
            self.bus.publish(NamingEvent::FuzzyWatchSync {
                client_id: client_id.to_string(),
                pattern: pattern.to_string(),
                added: added.clone(),
                removed: removed.clone(),
            });
        }

        Ok(WatchOutcome {
            matched,
            first_watch,
            added,
            removed,
        })
    }

    /// 返回表达式的匹配集，不存在时扫描建立
    ///
    /// 匹配集登记后再补扫一次：首扫与登记之间新增的服务，其增量事件可能已经错过这个表达式。
    fn ensure_matched(&self, pattern: &str, parsed: &FuzzyPattern) -> Result<Arc<DashSet<String>>> {
        if let Some(set) = self.matched.get(pattern) {
            return Ok(set.clone());
        }

        self.reserve_pattern_slot(pattern)?;

        let mut initial = HashSet::new();
        for service in self.services.get_singletons(parsed.namespace()) {
            if parsed.matches_service(&service) {
                initial.insert(service.service_key());
                if initial.len() > self.config.max_matched_service_count {
                    self.release_pattern_slot();
                    return Err(NamingError::match_count_over_limit(
                        pattern,
                        self.config.max_matched_service_count,
                    ));
                }
            }
        }

        let fresh: DashSet<String> = initial.into_iter().collect();
        let set = match self.matched.entry(pattern.to_string()) {
            Entry::Occupied(entry) => {
                // 并发的首次订阅已经建好匹配集，归还预占的名额
                self.release_pattern_slot();
                return Ok(entry.get().clone());
            }
            Entry::Vacant(entry) => entry.insert(Arc::new(fresh)).value().clone(),
        };

        let mut caught_up = 0usize;
        for service in self.services.get_singletons(parsed.namespace()) {
            if set.len() >= self.config.max_matched_service_count {
                break;
            }
            if parsed.matches_service(&service) && set.insert(service.service_key()) {
                caught_up += 1;
            }
        }
        debug!(
            target: "naming::fuzzy",
            pattern,
            matched = set.len(),
            caught_up,
            "Pattern matched set initialized"
        );
        Ok(set)
    }

    fn reserve_pattern_slot(&self, pattern: &str) -> Result<()> {
        let limit = self.config.max_pattern_count;
        self.pattern_count
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| (n < limit).then_some(n + 1))
            .map(|_| ())
            .map_err(|_| NamingError::pattern_over_limit(pattern, limit))
    }

    fn release_pattern_slot(&self) {
        let _ = self
            .pattern_count
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1));
    }

    /// 取消订阅；匹配集保留到下一次清理
    pub fn cancel_watch(&self, pattern: &str, client_id: &str) -> bool {
        let removed = self
            .watchers
            .get(canonical_pattern(pattern).as_str())
            .is_some_and(|set| set.remove(client_id).is_some());
        if removed {
            debug!(target: "naming::fuzzy", pattern, client_id, "Fuzzy watch cancelled");
        }
        removed
    }

    /// 新服务出现：返回匹配集发生变化的表达式
    pub fn on_service_added(&self, service: &Service) -> HashSet<String> {
        let key = service.service_key();
        let mut changed = HashSet::new();
        for entry in self.matched.iter() {
            let pattern = entry.key();
            let set = entry.value();
            if set.contains(&key) {
                continue;
            }
            let Some(parsed) = FuzzyPattern::parse(pattern) else {
                continue;
            };
            if !parsed.matches_service(service) {
                continue;
            }
            if set.len() >= self.config.max_matched_service_count {
                self.metrics.record_fuzzy_incremental_skip();
                warn!(
                    target: "naming::fuzzy",
                    pattern = %pattern,
                    service_key = %key,
                    limit = self.config.max_matched_service_count,
                    "Matched set is full, service not added"
                );
                continue;
            }
            if set.insert(key.clone()) {
                changed.insert(pattern.clone());
            }
        }
        changed
    }

    /// 服务消失：返回匹配集发生变化的表达式
    pub fn on_service_removed(&self, service: &Service) -> HashSet<String> {
        let key = service.service_key();
        let mut changed = HashSet::new();
        for entry in self.matched.iter() {
            if entry.value().remove(&key).is_some() {
                changed.insert(entry.key().clone());
            }
        }
        changed
    }

    /// 客户端断开：从所有表达式的订阅者集合中移除
    pub fn on_client_released(&self, client_id: &str) {
        let mut count = 0usize;
        for entry in self.watchers.iter() {
            if entry.value().remove(client_id).is_some() {
                count += 1;
            }
        }
        if count > 0 {
            debug!(target: "naming::fuzzy", client_id, patterns = count, "Released client removed from fuzzy watchers");
        }
    }

    /// 回收无人订阅的表达式，返回回收数量
    pub fn sweep(&self) -> usize {
        let patterns: Vec<String> = self.matched.iter().map(|e| e.key().clone()).collect();
        let mut swept = 0usize;
        for pattern in patterns {
            let removed = self
                .matched
                .remove_if(&pattern, |p, _| {
                    self.watchers.get(p).is_none_or(|w| w.is_empty())
                })
                .is_some();
            if removed {
                self.release_pattern_slot();
                swept += 1;
                debug!(target: "naming::fuzzy", pattern = %pattern, "Abandoned pattern swept");
            }
        }
        self.watchers.retain(|_, set| !set.is_empty());
        if swept > 0 {
            self.metrics.record_fuzzy_swept(swept);
            info!(target: "naming::fuzzy", swept, remaining = self.pattern_count(), "Fuzzy watch sweep finished");
        }
        swept
    }

    pub fn get_matched_services(&self, pattern: &str) -> HashSet<String> {
        self.matched
            .get(canonical_pattern(pattern).as_str())
            .map(|set| set.iter().map(|k| k.key().clone()).collect())
            .unwrap_or_default()
    }

    pub fn get_watchers_of_pattern(&self, pattern: &str) -> HashSet<String> {
        self.watchers
            .get(canonical_pattern(pattern).as_str())
            .map(|set| set.iter().map(|c| c.key().clone()).collect())
            .unwrap_or_default()
    }

    /// 订阅了任一给定表达式的客户端
    pub fn watchers_of_patterns<'a>(&self, patterns: impl IntoIterator<Item = &'a String>) -> HashSet<String> {
        let mut clients = HashSet::new();
        for pattern in patterns {
            if let Some(set) = self.watchers.get(pattern) {
                clients.extend(set.iter().map(|c| c.key().clone()));
            }
        }
        clients
    }

    /// 订阅了能匹配该服务的表达式的客户端
    pub fn fuzzy_watched_clients(&self, service: &Service) -> HashSet<String> {
        let patterns: Vec<String> = self
            .watchers
            .iter()
            .filter(|e| FuzzyPattern::parse(e.key()).is_some_and(|p| p.matches_service(service)))
            .map(|e| e.key().clone())
            .collect();
        self.watchers_of_patterns(&patterns)
    }

    /// 当前持有匹配集的表达式数量
    pub fn pattern_count(&self) -> usize {
        self.pattern_count.load(Ordering::Acquire)
    }

    pub fn patterns(&self) -> Vec<String> {
        self.matched.iter().map(|e| e.key().clone()).collect()
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_millis(self.config.sweep_interval_ms.max(1))
    }
}

impl NamingEventListener for FuzzyWatchEngine {
    fn name(&self) -> &str {
        "fuzzy-watch"
    }

    fn on_event(&self, event: &NamingEvent, bus: &EventBus) {
        let (service, changed_type, changed) = match event {
            NamingEvent::ServiceChanged {
                service,
                changed_type: ServiceChangedType::AddService,
                ..
            } => (service, ServiceChangedType::AddService, self.on_service_added(service)),
            NamingEvent::ServiceChanged {
                service,
                changed_type: ServiceChangedType::DeleteService,
                ..
            }
            | NamingEvent::ServiceRemoved { service } => (
                service,
                ServiceChangedType::DeleteService,
                self.on_service_removed(service),
            ),
            _ => return,
        };
        if changed.is_empty() {
            return;
        }
        let client_ids = self.watchers_of_patterns(&changed);
        debug!(
            target: "naming::fuzzy",
            service = %service,
            changed_type = ?changed_type,
            patterns = changed.len(),
            clients = client_ids.len(),
            "Matched sets updated"
        );
        if client_ids.is_empty() {
            return;
        }
        bus.publish(NamingEvent::FuzzyWatchChanged {
            service_key: service.service_key(),
            changed_type,
            client_ids,
        });
    }
}

/// 周期回收无人订阅表达式的后台任务
pub struct FuzzyWatchSweepTask {
    engine: Arc<FuzzyWatchEngine>,
    interval: Duration,
}

impl FuzzyWatchSweepTask {
    pub fn new(engine: Arc<FuzzyWatchEngine>) -> Self {
        let interval = engine.sweep_interval();
        Self { engine, interval }
    }

    /// 覆盖清理周期
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }
}

impl Task for FuzzyWatchSweepTask {
    fn name(&self) -> &str {
        "fuzzy-watch-sweep"
    }

    fn run(
        self: Box<Self>,
        mut shutdown_rx: tokio::sync::oneshot::Receiver<()>,
    ) -> Pin<Box<dyn Future<Output = TaskResult> + Send>> {
        Box::pin(async move {
            let mut ticker = tokio::time::interval(self.interval);
            // 第一次 tick 立即返回，跳过
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = &mut shutdown_rx => {
                        info!(target: "naming::runtime", task_name = "fuzzy-watch-sweep", "Shutdown signal received");
                        break;
                    }
                    _ = ticker.tick() => {
                        self.engine.sweep();
                    }
                }
            }
            Ok(())
        })
    }
}
