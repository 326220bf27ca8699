//! 服务视图存储
//!
//! 按服务缓存发现视图 [`ServiceInfo`] 和集群集合。视图完全由发布者索引、
//! 客户端的实例数据和实例元数据推导而来，不持有独立的数据源；索引变化时整体失效，
//! 下一次读取时重建。
//!
//! 并发重建不做串行化，以最后一次写入为准。每个已缓存过的服务持有一个全局递增的版本号，
//! 重建开始后若发生过失效或移除，重建结果只返回给调用方而不写入缓存。服务被移除时
//! 版本号一并摘除。

use dashmap::DashMap;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, trace};

use crate::client::ClientManager;
use crate::event::{EventBus, NamingEvent, NamingEventListener};
use crate::index::ClientServiceIndex;
use crate::metadata::NamingMetadataManager;
use crate::metrics::MetricsMonitor;
use crate::service::ServiceManager;
use crate::types::{Instance, Service, ServiceInfo};
use crate::utils::now_millis;

/// 服务视图存储
#[derive(Debug)]
pub struct ServiceStorage {
    views: DashMap<Service, Arc<ServiceInfo>>,
    clusters: DashMap<Service, Arc<BTreeSet<String>>>,
    revisions: DashMap<Service, u64>,
    next_revision: AtomicU64,
    cache_millis: u64,
    index: Arc<ClientServiceIndex>,
    clients: Arc<ClientManager>,
    services: Arc<ServiceManager>,
    metadata: Arc<NamingMetadataManager>,
    metrics: Arc<MetricsMonitor>,
}

impl ServiceStorage {
    pub fn new(
        cache_millis: u64,
        index: Arc<ClientServiceIndex>,
        clients: Arc<ClientManager>,
        services: Arc<ServiceManager>,
        metadata: Arc<NamingMetadataManager>,
        metrics: Arc<MetricsMonitor>,
    ) -> Self {
        Self {
            views: DashMap::new(),
            clusters: DashMap::new(),
            revisions: DashMap::new(),
            next_revision: AtomicU64::new(0),
            cache_millis,
            index,
            clients,
            services,
            metadata,
            metrics,
        }
    }

    /// 获取服务的发现视图
    ///
    /// 未知服务与无实例服务返回同样形状的空视图，由调用方自行区分。
    pub fn get_data(&self, service: &Service) -> Arc<ServiceInfo> {
        if let Some(view) = self.views.get(service) {
            self.metrics.record_view_cache_hit();
            return view.clone();
        }
        if !self.services.contains(service) {
            // 未登记的服务不缓存，登记后无需额外失效
            return Arc::new(ServiceInfo::empty(service, self.cache_millis));
        }
        self.rebuild(service).0
    }

    /// 获取服务的集群集合
    pub fn get_clusters(&self, service: &Service) -> BTreeSet<String> {
        if let Some(clusters) = self.clusters.get(service) {
            return clusters.value().as_ref().clone();
        }
        if !self.services.contains(service) {
            return BTreeSet::new();
        }
        self.rebuild(service).1.as_ref().clone()
    }

    /// 丢弃缓存的视图和集群集合
    ///
    /// 从未重建过的服务没有版本号，也不会为它新建。
    pub fn invalidate(&self, service: &Service) {
        if let Some(mut revision) = self.revisions.get_mut(service) {
            *revision = self.next_revision();
        }
        self.views.remove(service);
        self.clusters.remove(service);
        trace!(target: "naming::storage", service = %service, "View invalidated");
    }

    /// 服务已被移除：丢弃缓存并摘除版本号
    pub fn remove(&self, service: &Service) {
        self.revisions.remove(service);
        self.views.remove(service);
        self.clusters.remove(service);
        debug!(target: "naming::storage", service = %service, "View removed");
    }

    pub fn cached_count(&self) -> usize {
        self.views.len()
    }

    pub fn is_cached(&self, service: &Service) -> bool {
        self.views.contains_key(service)
    }

    /// 持有版本号的服务数量
    pub fn revision_count(&self) -> usize {
        self.revisions.len()
    }

    fn next_revision(&self) -> u64 {
        self.next_revision.fetch_add(1, Ordering::Relaxed) + 1
    }

    fn rebuild(&self, service: &Service) -> (Arc<ServiceInfo>, Arc<BTreeSet<String>>) {
        let revision = *self
            .revisions
            .entry(service.clone())
            .or_insert_with(|| self.next_revision());
        let (hosts, clusters) = self.collect_instances(service);

        let view = Arc::new(ServiceInfo {
            namespace: service.namespace().to_string(),
            group_name: service.group().to_string(),
            name: service.name().to_string(),
            clusters: clusters.iter().cloned().collect::<Vec<_>>().join(","),
            cache_millis: self.cache_millis,
            hosts,
            last_ref_time: now_millis(),
        });
        let clusters = Arc::new(clusters);

        // 与 invalidate/remove 在同一个版本号条目锁下比较，失效或移除之后的旧结果不会写回
        if let Some(current) = self.revisions.get(service) {
            if *current == revision && self.services.contains(service) {
                self.views.insert(service.clone(), view.clone());
                self.clusters.insert(service.clone(), clusters.clone());
            }
        }
        if !self.services.contains(service) {
            // 重建期间服务已被移除
            self.revisions.remove_if(service, |_, r| *r == revision);
        }

        self.metrics.record_view_rebuild();
        debug!(
            target: "naming::storage",
            service = %service,
            hosts = view.hosts.len(),
            "View rebuilt"
        );
        (view, clusters)
    }

    /// 汇总发布者的实例，已断开或已注销的客户端直接跳过
    fn collect_instances(&self, service: &Service) -> (Vec<Instance>, BTreeSet<String>) {
        let mut instances: HashMap<String, Instance> = HashMap::new();
        let mut clusters = BTreeSet::new();

        for client_id in self.index.get_publishers(service) {
            let Some(client) = self.clients.get(&client_id) else {
                trace!(target: "naming::storage", client_id = %client_id, "Publisher no longer connected, skipped");
                continue;
            };
            let Some(published) = client.get_instance_publish_info(service) else {
                continue;
            };
            let info = &published.info;
            let instance_id = info.instance_id(service);
            let mut instance = Instance {
                instance_id: instance_id.clone(),
                ip: info.ip.clone(),
                port: info.port,
                weight: info.weight,
                healthy: published.health.is_healthy(),
                enabled: info.enabled,
                ephemeral: client.is_ephemeral(),
                cluster_name: info.cluster.clone(),
                service_name: service.grouped_name(),
                metadata: info.metadata.clone(),
            };
            if let Some(overlay) = self.metadata.get_instance_metadata(service, &instance_id) {
                overlay.apply_to(&mut instance);
            }
            clusters.insert(instance.cluster_name.clone());
            instances.insert(instance_id, instance);
        }

        let mut hosts: Vec<Instance> = instances.into_values().collect();
        hosts.sort_by(|a, b| a.instance_id.cmp(&b.instance_id));
        (hosts, clusters)
    }
}

impl NamingEventListener for ServiceStorage {
    fn name(&self) -> &str {
        "service-storage"
    }

    fn on_event(&self, event: &NamingEvent, _bus: &EventBus) {
        match event {
            NamingEvent::ServiceChanged { service, .. }
            | NamingEvent::HealthStateChanged { service, .. } => self.invalidate(service),
            NamingEvent::ServiceRemoved { service } => self.remove(service),
            _ => {}
        }
    }
}
