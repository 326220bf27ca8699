//! 命名元数据
//!
//! 管理端写入的覆盖数据：服务/集群级元数据（含健康检查器配置）和实例级元数据。
//! 视图重建时实例元数据覆盖客户端发布的实例数据。

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::debug;

use crate::client::InstancePublishInfo;
use crate::event::{EventBus, NamingEvent, ServiceChangedType};
use crate::health::HealthChecker;
use crate::types::{Instance, Service};

/// 集群元数据
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClusterMetadata {
    pub health_checker: HealthChecker,
    /// 探测端口，`use_instance_port` 为 false 时生效
    pub check_port: u16,
    pub use_instance_port: bool,
    pub extend_data: HashMap<String, String>,
}

impl Default for ClusterMetadata {
    fn default() -> Self {
        Self {
            health_checker: HealthChecker::default(),
            check_port: 80,
            use_instance_port: true,
            extend_data: HashMap::new(),
        }
    }
}

impl ClusterMetadata {
    pub fn with_checker(checker: HealthChecker) -> Self {
        Self {
            health_checker: checker,
            ..Self::default()
        }
    }

    /// 实例的探测地址，IP 非法时返回 None
    pub fn check_address(&self, instance: &InstancePublishInfo) -> Option<SocketAddr> {
        let mut addr = instance.socket_addr()?;
        if !self.use_instance_port {
            addr.set_port(self.check_port);
        }
        Some(addr)
    }
}

/// 服务元数据
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceMetadata {
    pub protect_threshold: f32,
    pub extend_data: HashMap<String, String>,
    pub clusters: HashMap<String, ClusterMetadata>,
}

/// 实例元数据，只覆盖设置了的字段
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InstanceMetadata {
    pub enabled: Option<bool>,
    pub weight: Option<f64>,
    pub extend_data: HashMap<String, String>,
}

impl InstanceMetadata {
    /// 覆盖视图实例中被设置的字段，扩展数据按 key 合并
    pub fn apply_to(&self, instance: &mut Instance) {
        if let Some(enabled) = self.enabled {
            instance.enabled = enabled;
        }
        if let Some(weight) = self.weight {
            instance.weight = weight;
        }
        instance
            .metadata
            .extend(self.extend_data.iter().map(|(k, v)| (k.clone(), v.clone())));
    }
}

/// 元数据管理器
#[derive(Debug)]
pub struct NamingMetadataManager {
    service_metadata: DashMap<Service, ServiceMetadata>,
    instance_metadata: DashMap<Service, HashMap<String, InstanceMetadata>>,
    bus: Arc<EventBus>,
}

impl NamingMetadataManager {
    pub fn new(bus: Arc<EventBus>) -> Self {
        Self {
            service_metadata: DashMap::new(),
            instance_metadata: DashMap::new(),
            bus,
        }
    }

    pub fn update_service_metadata(&self, service: &Service, metadata: ServiceMetadata) {
        self.service_metadata.insert(service.clone(), metadata);
        debug!(target: "naming::metadata", service = %service, "Service metadata updated");
    }

    pub fn get_service_metadata(&self, service: &Service) -> Option<ServiceMetadata> {
        self.service_metadata.get(service).map(|m| m.clone())
    }

    pub fn update_cluster_metadata(&self, service: &Service, cluster: &str, metadata: ClusterMetadata) {
        self.service_metadata
            .entry(service.clone())
            .or_default()
            .clusters
            .insert(cluster.to_string(), metadata);
        debug!(target: "naming::metadata", service = %service, cluster, "Cluster metadata updated");
    }

    pub fn get_cluster_metadata(&self, service: &Service, cluster: &str) -> Option<ClusterMetadata> {
        self.service_metadata
            .get(service)
            .and_then(|m| m.clusters.get(cluster).cloned())
    }

    /// 更新实例元数据并触发视图刷新
    pub fn update_instance_metadata(&self, service: &Service, instance_id: &str, metadata: InstanceMetadata) {
        self.instance_metadata
            .entry(service.clone())
            .or_default()
            .insert(instance_id.to_string(), metadata);
        debug!(target: "naming::metadata", service = %service, instance_id, "Instance metadata updated");
        self.publish_changed(service);
    }

    pub fn get_instance_metadata(&self, service: &Service, instance_id: &str) -> Option<InstanceMetadata> {
        self.instance_metadata
            .get(service)
            .and_then(|m| m.get(instance_id).cloned())
    }

    pub fn remove_instance_metadata(&self, service: &Service, instance_id: &str) -> bool {
        let removed = self
            .instance_metadata
            .get_mut(service)
            .is_some_and(|mut m| m.remove(instance_id).is_some());
        if removed {
            self.instance_metadata.remove_if(service, |_, m| m.is_empty());
            self.publish_changed(service);
        }
        removed
    }

    /// 服务被删除时清理它的全部元数据
    pub fn remove_service(&self, service: &Service) {
        self.service_metadata.remove(service);
        self.instance_metadata.remove(service);
    }

    fn publish_changed(&self, service: &Service) {
        self.bus.publish(NamingEvent::ServiceChanged {
            service: service.clone(),
            changed_type: ServiceChangedType::InstanceChanged,
            publisher_change: false,
        });
    }
}
