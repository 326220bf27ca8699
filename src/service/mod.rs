//! 服务管理器
//!
//! 保存注册中心已知的全部服务，并按命名空间建立二级索引，供模糊订阅的
//! 初始扫描使用。由注册中心显式构造并以引用传递，不存在进程级单例。

use dashmap::{DashMap, DashSet};
use std::sync::atomic::{AtomicI64, Ordering};
use tracing::{debug, info};

use crate::event::{EventBus, NamingEvent, NamingEventListener};
use crate::types::Service;
use crate::utils::now_millis;

#[derive(Debug)]
struct ServiceEntry {
    created_at: i64,
    last_updated: AtomicI64,
}

impl ServiceEntry {
    fn new() -> Self {
        let now = now_millis();
        Self {
            created_at: now,
            last_updated: AtomicI64::new(now),
        }
    }

    fn touch(&self) {
        self.last_updated.store(now_millis(), Ordering::Release);
    }
}

/// 服务管理器
#[derive(Debug, Default)]
pub struct ServiceManager {
    services: DashMap<Service, ServiceEntry>,
    namespaces: DashMap<String, DashSet<Service>>,
}

impl ServiceManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// 获取服务，首次出现时登记
    ///
    /// 已存在时刷新最近更新时间，避免正在注册的服务被空服务清理误删。
    pub fn get_singleton(&self, service: &Service) -> Service {
        let mut created = false;
        self.services
            .entry(service.clone())
            .and_modify(|e| e.touch())
            .or_insert_with(|| {
                created = true;
                ServiceEntry::new()
            });
        if created {
            self.namespaces
                .entry(service.namespace().to_string())
                .or_default()
                .insert(service.clone());
            info!(target: "naming::service", service = %service, "Service registered");
        }
        service.clone()
    }

    pub fn contains(&self, service: &Service) -> bool {
        self.services.contains_key(service)
    }

    /// 命名空间下的全部服务快照
    pub fn get_singletons(&self, namespace: &str) -> Vec<Service> {
        self.namespaces
            .get(namespace)
            .map(|set| set.iter().map(|s| s.key().clone()).collect())
            .unwrap_or_default()
    }

    /// 移除服务，返回是否确实移除
    pub fn remove_singleton(&self, service: &Service) -> bool {
        self.remove_singleton_if(service, |_| true)
    }

    /// 条件移除：`predicate` 在持有该服务条目锁时执行，参数为最近更新时间
    pub fn remove_singleton_if(
        &self,
        service: &Service,
        predicate: impl FnOnce(i64) -> bool,
    ) -> bool {
        // 命名空间索引在服务条目锁内同步摘除，避免与并发的重新登记交错
        let removed = self
            .services
            .remove_if(service, |_, e| {
                let hit = predicate(e.last_updated.load(Ordering::Acquire));
                if hit {
                    if let Some(set) = self.namespaces.get(service.namespace()) {
                        set.remove(service);
                    }
                }
                hit
            })
            .is_some();
        if removed {
            self.namespaces
                .remove_if(service.namespace(), |_, set| set.is_empty());
            info!(target: "naming::service", service = %service, "Service removed");
        }
        removed
    }

    pub fn namespaces(&self) -> Vec<String> {
        self.namespaces.iter().map(|e| e.key().clone()).collect()
    }

    pub fn all_services(&self) -> Vec<Service> {
        self.services.iter().map(|e| e.key().clone()).collect()
    }

    pub fn created_millis(&self, service: &Service) -> Option<i64> {
        self.services.get(service).map(|e| e.created_at)
    }

    pub fn last_updated_millis(&self, service: &Service) -> Option<i64> {
        self.services
            .get(service)
            .map(|e| e.last_updated.load(Ordering::Acquire))
    }

    pub fn len(&self) -> usize {
        self.services.len()
    }

    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }
}

impl NamingEventListener for ServiceManager {
    fn name(&self) -> &str {
        "service-manager"
    }

    fn on_event(&self, event: &NamingEvent, _bus: &EventBus) {
        if let NamingEvent::ServiceChanged { service, .. } = event {
            if let Some(entry) = self.services.get(service) {
                entry.touch();
            } else {
                debug!(target: "naming::service", service = %service, "Change for unknown service ignored");
            }
        }
    }
}
