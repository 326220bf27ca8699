//! 空服务自动清理
//!
//! 服务没有任何发布者且超过 `expired_ms` 未更新时被删除。

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use crate::config::EmptyServiceConfig;
use crate::event::{EventBus, NamingEvent, ServiceChangedType};
use crate::index::ClientServiceIndex;
use crate::metadata::NamingMetadataManager;
use crate::metrics::MetricsMonitor;
use crate::runtime::{Task, TaskResult};
use crate::service::ServiceManager;
use crate::types::Service;
use crate::utils::now_millis;

/// 空服务清理器
#[derive(Debug, Clone)]
pub struct EmptyServiceCleaner {
    services: Arc<ServiceManager>,
    index: Arc<ClientServiceIndex>,
    metadata: Arc<NamingMetadataManager>,
    bus: Arc<EventBus>,
    metrics: Arc<MetricsMonitor>,
    config: EmptyServiceConfig,
}

impl EmptyServiceCleaner {
    pub fn new(
        services: Arc<ServiceManager>,
        index: Arc<ClientServiceIndex>,
        metadata: Arc<NamingMetadataManager>,
        bus: Arc<EventBus>,
        metrics: Arc<MetricsMonitor>,
        config: EmptyServiceConfig,
    ) -> Self {
        Self {
            services,
            index,
            metadata,
            bus,
            metrics,
            config,
        }
    }

    /// 执行一轮清理，返回被删除的服务
    pub fn clean_once(&self) -> Vec<Service> {
        let now = now_millis();
        let expired_ms = self.config.expired_ms as i64;
        let mut removed = Vec::new();

        for service in self.services.all_services() {
            if self.index.has_publishers(&service) {
                continue;
            }
            // 在服务条目锁内复查，避免删掉刚刚重新注册的服务
            let hit = self.services.remove_singleton_if(&service, |last_updated| {
                !self.index.has_publishers(&service) && now - last_updated >= expired_ms
            });
            if !hit {
                continue;
            }
            self.metadata.remove_service(&service);
            self.bus.publish(NamingEvent::ServiceChanged {
                service: service.clone(),
                changed_type: ServiceChangedType::DeleteService,
                publisher_change: false,
            });
            self.bus.publish(NamingEvent::ServiceRemoved {
                service: service.clone(),
            });
            removed.push(service);
        }

        if !removed.is_empty() {
            self.metrics.record_empty_service_cleaned(removed.len());
            info!(target: "naming::service", removed = removed.len(), "Empty services cleaned");
        }
        removed
    }
}

/// 空服务清理后台任务
pub struct EmptyServiceCleanerTask {
    cleaner: EmptyServiceCleaner,
    interval: Duration,
}

impl EmptyServiceCleanerTask {
    pub fn new(cleaner: EmptyServiceCleaner) -> Self {
        let interval = Duration::from_millis(cleaner.config.clean_interval_ms.max(1));
        Self { cleaner, interval }
    }
}

impl Task for EmptyServiceCleanerTask {
    fn name(&self) -> &str {
        "empty-service-cleaner"
    }

    fn run(
        self: Box<Self>,
        mut shutdown_rx: tokio::sync::oneshot::Receiver<()>,
    ) -> Pin<Box<dyn Future<Output = TaskResult> + Send>> {
        Box::pin(async move {
            let mut ticker = tokio::time::interval(self.interval);
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = &mut shutdown_rx => break,
                    _ = ticker.tick() => {
                        self.cleaner.clean_once();
                    }
                }
            }
            Ok(())
        })
    }
}
