//! 客户端与服务的双向索引
//!
//! - 发布者索引：服务 → 发布该服务实例的客户端集合
//! - 订阅者索引：服务 → 订阅该服务的客户端集合
//!
//! 集合为空时条目立即摘除。每个条目上的读改写由 DashMap 分片锁保证线性一致，
//! 事件总是在释放条目锁之后发布。

use dashmap::mapref::entry::Entry;
use dashmap::{DashMap, DashSet};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::debug;

use crate::client::Client;
use crate::event::{EventBus, NamingEvent, ServiceChangedType};
use crate::types::Service;

/// 客户端-服务索引
#[derive(Debug)]
pub struct ClientServiceIndex {
    publishers: DashMap<Service, DashSet<String>>,
    subscribers: DashMap<Service, DashSet<String>>,
    bus: Arc<EventBus>,
}

impl ClientServiceIndex {
    pub fn new(bus: Arc<EventBus>) -> Self {
        Self {
            publishers: DashMap::new(),
            subscribers: DashMap::new(),
            bus,
        }
    }

    /// 登记发布者
    ///
    /// 服务首次出现发布者时发布 `AddService`；新的客户端加入发布 `InstanceRegistered`；
    /// 同一客户端重复登记不改变索引，发布 `InstanceChanged` 让视图刷新实例数据。
    pub fn add_publisher(&self, service: &Service, client_id: &str) {
        let changed_type = match self.publishers.entry(service.clone()) {
            Entry::Occupied(entry) => {
                // 与并发移除交错时可能遇到尚未摘除的空集合
                let was_empty = entry.get().is_empty();
                match (entry.get().insert(client_id.to_string()), was_empty) {
                    (true, true) => ServiceChangedType::AddService,
                    (true, false) => ServiceChangedType::InstanceRegistered,
                    (false, _) => ServiceChangedType::InstanceChanged,
                }
            }
            Entry::Vacant(entry) => {
                let set = DashSet::new();
                set.insert(client_id.to_string());
                entry.insert(set);
                ServiceChangedType::AddService
            }
        };
        debug!(
            target: "naming::index",
            service = %service,
            client_id,
            changed_type = ?changed_type,
            "Publisher added"
        );
        self.bus.publish(NamingEvent::ServiceChanged {
            service: service.clone(),
            changed_type,
            publisher_change: changed_type != ServiceChangedType::InstanceChanged,
        });
    }

    /// 移除发布者，关系本就不存在时不做任何事
    pub fn remove_publisher(&self, service: &Service, client_id: &str) {
        let removed = self
            .publishers
            .get(service)
            .is_some_and(|set| set.remove(client_id).is_some());
        if !removed {
            return;
        }
        let pruned = self
            .publishers
            .remove_if(service, |_, set| set.is_empty())
            .is_some();
        let changed_type = if pruned {
            ServiceChangedType::DeleteService
        } else {
            ServiceChangedType::InstanceDeregistered
        };
        debug!(
            target: "naming::index",
            service = %service,
            client_id,
            changed_type = ?changed_type,
            "Publisher removed"
        );
        self.bus.publish(NamingEvent::ServiceChanged {
            service: service.clone(),
            changed_type,
            publisher_change: true,
        });
    }

    /// 登记订阅者，返回 true 表示首次订阅
    ///
    /// 只有首次订阅会发布 `ServiceSubscribed`，重复订阅不触发下游工作。
    pub fn add_subscriber(&self, service: &Service, client_id: &str) -> bool {
        let first = self
            .subscribers
            .entry(service.clone())
            .or_default()
            .insert(client_id.to_string());
        if first {
            debug!(target: "naming::index", service = %service, client_id, "Subscriber added");
            self.bus.publish(NamingEvent::ServiceSubscribed {
                service: service.clone(),
                client_id: client_id.to_string(),
            });
        }
        first
    }

    /// 移除订阅者，集合为空时摘除条目
    pub fn remove_subscriber(&self, service: &Service, client_id: &str) -> bool {
        let removed = self
            .subscribers
            .get(service)
            .is_some_and(|set| set.remove(client_id).is_some());
        if removed {
            self.subscribers.remove_if(service, |_, set| set.is_empty());
            debug!(target: "naming::index", service = %service, client_id, "Subscriber removed");
        }
        removed
    }

    /// 发布者快照，可能为空
    pub fn get_publishers(&self, service: &Service) -> HashSet<String> {
        self.publishers
            .get(service)
            .map(|set| set.iter().map(|c| c.key().clone()).collect())
            .unwrap_or_default()
    }

    /// 订阅者快照，可能为空
    pub fn get_subscribers(&self, service: &Service) -> HashSet<String> {
        self.subscribers
            .get(service)
            .map(|set| set.iter().map(|c| c.key().clone()).collect())
            .unwrap_or_default()
    }

    pub fn publisher_count(&self, service: &Service) -> usize {
        self.publishers.get(service).map_or(0, |set| set.len())
    }

    pub fn has_publishers(&self, service: &Service) -> bool {
        self.publisher_count(service) > 0
    }

    pub fn published_services(&self) -> Vec<Service> {
        self.publishers.iter().map(|e| e.key().clone()).collect()
    }

    pub fn subscribed_services(&self) -> Vec<Service> {
        self.subscribers.iter().map(|e| e.key().clone()).collect()
    }

    /// 客户端断开：对它发布和订阅过的每个服务执行反注册
    ///
    /// 必须穷尽，漏掉任何一个服务都会留下幽灵实例。
    pub fn on_client_released(&self, client: &Client) {
        for service in client.published_services() {
            self.remove_publisher(&service, client.client_id());
        }
        for service in client.subscribed_services() {
            self.remove_subscriber(&service, client.client_id());
        }
    }
}
