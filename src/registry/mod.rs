//! 注册中心门面
//!
//! [`NamingRegistry`] 负责组装各个组件并把监听者挂到事件总线上，对外提供
//! 写入操作（注册、订阅、模糊订阅、客户端释放）和只读查询（发现视图、集群、
//! 模糊匹配集）。

pub mod cleaner;
pub mod operation;

pub use cleaner::{EmptyServiceCleaner, EmptyServiceCleanerTask};
pub use operation::ClientOperationService;

use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;
use tracing::info;

use crate::client::{ClientManager, InstancePublishInfo};
use crate::config::Config;
use crate::error::Result;
use crate::event::{ClientEvent, EventBus, NamingEvent};
use crate::health::{HealthCheckReactor, HealthStatusUpdater, HealthTransition};
use crate::index::{ClientServiceIndex, FuzzyWatchEngine, FuzzyWatchSweepTask, WatchOutcome};
use crate::metadata::NamingMetadataManager;
use crate::metrics::MetricsMonitor;
use crate::runtime::{NamingRuntime, RuntimeConfig, Task};
use crate::service::ServiceManager;
use crate::storage::ServiceStorage;
use crate::types::{Service, ServiceInfo};

/// 注册中心
#[derive(Debug)]
pub struct NamingRegistry {
    config: Config,
    bus: Arc<EventBus>,
    metrics: Arc<MetricsMonitor>,
    clients: Arc<ClientManager>,
    services: Arc<ServiceManager>,
    metadata: Arc<NamingMetadataManager>,
    index: Arc<ClientServiceIndex>,
    fuzzy: Arc<FuzzyWatchEngine>,
    storage: Arc<ServiceStorage>,
    health: Arc<HealthCheckReactor>,
    operations: ClientOperationService,
}

impl NamingRegistry {
    /// 校验配置并组装全部组件
    pub fn new(config: Config) -> Result<Self> {
        config.validate()?;

        let bus = Arc::new(EventBus::new(config.event_bus.capacity));
        let metrics = Arc::new(MetricsMonitor::new());
        let clients = Arc::new(ClientManager::new());
        let services = Arc::new(ServiceManager::new());
        let metadata = Arc::new(NamingMetadataManager::new(bus.clone()));
        let index = Arc::new(ClientServiceIndex::new(bus.clone()));
        let fuzzy = Arc::new(FuzzyWatchEngine::new(
            config.fuzzy_watch.clone(),
            services.clone(),
            bus.clone(),
            metrics.clone(),
        ));
        let storage = Arc::new(ServiceStorage::new(
            config.view.cache_millis,
            index.clone(),
            clients.clone(),
            services.clone(),
            metadata.clone(),
            metrics.clone(),
        ));
        let updater = Arc::new(HealthStatusUpdater::new(
            bus.clone(),
            metrics.clone(),
            config.health.check_times,
        ));
        let health = Arc::new(HealthCheckReactor::new(
            config.health.clone(),
            updater,
            metadata.clone(),
            metrics.clone(),
        ));

        // 注册顺序即分发顺序：先刷新服务时间戳和视图，再通知模糊订阅
        bus.register_listener(services.clone());
        bus.register_listener(storage.clone());
        bus.register_listener(fuzzy.clone());

        let operations = ClientOperationService::new(
            clients.clone(),
            services.clone(),
            index.clone(),
            fuzzy.clone(),
            health.clone(),
        );

        info!(
            target: "naming::runtime",
            max_patterns = config.fuzzy_watch.max_pattern_count,
            max_matched = config.fuzzy_watch.max_matched_service_count,
            health_enabled = config.health.enabled,
            "Naming registry created"
        );

        Ok(Self {
            config,
            bus,
            metrics,
            clients,
            services,
            metadata,
            index,
            fuzzy,
            storage,
            health,
            operations,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn event_bus(&self) -> &Arc<EventBus> {
        &self.bus
    }

    pub fn metrics(&self) -> &Arc<MetricsMonitor> {
        &self.metrics
    }

    pub fn client_manager(&self) -> &Arc<ClientManager> {
        &self.clients
    }

    pub fn service_manager(&self) -> &Arc<ServiceManager> {
        &self.services
    }

    pub fn metadata(&self) -> &Arc<NamingMetadataManager> {
        &self.metadata
    }

    pub fn index(&self) -> &Arc<ClientServiceIndex> {
        &self.index
    }

    pub fn fuzzy_watch_engine(&self) -> &Arc<FuzzyWatchEngine> {
        &self.fuzzy
    }

    pub fn storage(&self) -> &Arc<ServiceStorage> {
        &self.storage
    }

    pub fn health(&self) -> &Arc<HealthCheckReactor> {
        &self.health
    }

    pub fn operations(&self) -> &ClientOperationService {
        &self.operations
    }

    pub fn register_instance(
        &self,
        client_id: &str,
        service: &Service,
        instance: InstancePublishInfo,
        ephemeral: bool,
    ) -> Result<()> {
        self.operations
            .register_instance(client_id, service, instance, ephemeral)
    }

    pub fn deregister_instance(&self, client_id: &str, service: &Service) -> bool {
        self.operations.deregister_instance(client_id, service)
    }

    /// 订阅服务并返回当前视图
    pub fn subscribe(&self, client_id: &str, service: &Service) -> Result<Arc<ServiceInfo>> {
        self.operations.subscribe(client_id, service)?;
        Ok(self.storage.get_data(service))
    }

    pub fn unsubscribe(&self, client_id: &str, service: &Service) -> bool {
        self.operations.unsubscribe(client_id, service)
    }

    pub fn fuzzy_watch(
        &self,
        client_id: &str,
        pattern: &str,
        known: &HashSet<String>,
    ) -> Result<WatchOutcome> {
        self.operations.fuzzy_watch(client_id, pattern, known)
    }

    pub fn cancel_fuzzy_watch(&self, client_id: &str, pattern: &str) -> bool {
        self.operations.cancel_fuzzy_watch(client_id, pattern)
    }

    pub fn release_client(&self, client_id: &str) -> bool {
        self.operations.release_client(client_id)
    }

    pub fn apply_probe_result(
        &self,
        client_id: &str,
        service: &Service,
        success: bool,
        fail_now: bool,
        rt_millis: u64,
        reason: &str,
    ) -> Option<HealthTransition> {
        self.operations
            .apply_probe_result(client_id, service, success, fail_now, rt_millis, reason)
    }

    /// 处理一条入站客户端事件
    pub fn handle_client_event(&self, event: ClientEvent) -> Result<()> {
        match event {
            ClientEvent::RegisterInstance {
                client_id,
                service,
                instance,
                ephemeral,
            } => self.register_instance(&client_id, &service, instance, ephemeral),
            ClientEvent::DeregisterInstance { client_id, service } => {
                self.deregister_instance(&client_id, &service);
                Ok(())
            }
            ClientEvent::Subscribe { client_id, service } => {
                self.operations.subscribe(&client_id, &service).map(|_| ())
            }
            ClientEvent::Unsubscribe { client_id, service } => {
                self.unsubscribe(&client_id, &service);
                Ok(())
            }
            ClientEvent::FuzzyWatch {
                client_id,
                pattern,
                known_service_keys,
            } => self
                .fuzzy_watch(&client_id, &pattern, &known_service_keys)
                .map(|_| ()),
            ClientEvent::CancelFuzzyWatch { client_id, pattern } => {
                self.cancel_fuzzy_watch(&client_id, &pattern);
                Ok(())
            }
            ClientEvent::Released { client_id } => {
                self.release_client(&client_id);
                Ok(())
            }
            ClientEvent::HealthProbeResult {
                client_id,
                service,
                success,
                fail_now,
                rt_millis,
                reason,
            } => {
                self.apply_probe_result(&client_id, &service, success, fail_now, rt_millis, &reason);
                Ok(())
            }
        }
    }

    /// 服务的发现视图
    pub fn get_discovery_view(&self, service: &Service) -> Arc<ServiceInfo> {
        self.storage.get_data(service)
    }

    pub fn get_clusters(&self, service: &Service) -> BTreeSet<String> {
        self.storage.get_clusters(service)
    }

    pub fn get_matched_services(&self, pattern: &str) -> HashSet<String> {
        self.fuzzy.get_matched_services(pattern)
    }

    pub fn get_watchers_of_pattern(&self, pattern: &str) -> HashSet<String> {
        self.fuzzy.get_watchers_of_pattern(pattern)
    }

    /// 订阅对外广播的注册中心事件
    pub fn subscribe_events(&self) -> async_broadcast::Receiver<NamingEvent> {
        self.bus.subscribe()
    }

    /// 注册中心自带的后台任务
    pub fn background_tasks(&self) -> Vec<Box<dyn Task>> {
        let mut tasks: Vec<Box<dyn Task>> = vec![Box::new(FuzzyWatchSweepTask::new(self.fuzzy.clone()))];
        if self.config.empty_service.enabled {
            let cleaner = EmptyServiceCleaner::new(
                self.services.clone(),
                self.index.clone(),
                self.metadata.clone(),
                self.bus.clone(),
                self.metrics.clone(),
                self.config.empty_service.clone(),
            );
            tasks.push(Box::new(EmptyServiceCleanerTask::new(cleaner)));
        }
        tasks
    }

    /// 装配好后台任务的运行时
    pub fn runtime(&self) -> NamingRuntime {
        self.background_tasks().into_iter().fold(
            NamingRuntime::new("naming-registry")
                .with_config(RuntimeConfig::from(&self.config.runtime)),
            |runtime, task| runtime.add_task(task),
        )
    }

    /// 停止所有健康检查任务
    pub fn shutdown(&self) {
        self.health.shutdown();
        info!(target: "naming::runtime", "Naming registry shut down");
    }
}
