//! 客户端模块
//!
//! 一个客户端代表一条逻辑连接（或一个 IP:Port 注册方），持有它发布的实例、
//! 订阅的服务和模糊订阅表达式。客户端销毁时必须清理它触及的所有索引。

pub mod consumer;
pub mod instance;
pub mod manager;

pub use consumer::ClientEventConsumer;
pub use instance::{InstancePublishInfo, PublishedInstance};
pub use manager::ClientManager;

use dashmap::{DashMap, DashSet};
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};

use crate::types::Service;
use crate::utils::now_millis;

/// 客户端
#[derive(Debug)]
pub struct Client {
    client_id: String,
    ephemeral: bool,
    published: DashMap<Service, PublishedInstance>,
    subscribed: DashSet<Service>,
    fuzzy_patterns: DashSet<String>,
    last_updated: AtomicI64,
    revision: AtomicU64,
}

impl Client {
    pub fn new(client_id: impl Into<String>, ephemeral: bool) -> Self {
        Self {
            client_id: client_id.into(),
            ephemeral,
            published: DashMap::new(),
            subscribed: DashSet::new(),
            fuzzy_patterns: DashSet::new(),
            last_updated: AtomicI64::new(now_millis()),
            revision: AtomicU64::new(0),
        }
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    pub fn is_ephemeral(&self) -> bool {
        self.ephemeral
    }

    pub fn last_updated_millis(&self) -> i64 {
        self.last_updated.load(Ordering::Acquire)
    }

    pub fn revision(&self) -> u64 {
        self.revision.load(Ordering::Acquire)
    }

    fn touch(&self) {
        self.last_updated.store(now_millis(), Ordering::Release);
        self.revision.fetch_add(1, Ordering::AcqRel);
    }

    /// 发布实例
    ///
    /// 同一地址重复发布时沿用原有健康状态，避免重注册把探活结果清零。
    pub fn add_service_instance(
        &self,
        service: Service,
        info: InstancePublishInfo,
    ) -> PublishedInstance {
        let published = match self.published.get(&service) {
            Some(existing) if existing.info.same_identity(&info) => PublishedInstance {
                info: std::sync::Arc::new(info),
                health: existing.health.clone(),
                published_at: now_millis(),
            },
            _ => PublishedInstance::new(info),
        };
        self.published.insert(service, published.clone());
        self.touch();
        published
    }

    pub fn remove_service_instance(&self, service: &Service) -> Option<PublishedInstance> {
        let removed = self.published.remove(service).map(|(_, v)| v);
        if removed.is_some() {
            self.touch();
        }
        removed
    }

    pub fn get_instance_publish_info(&self, service: &Service) -> Option<PublishedInstance> {
        self.published.get(service).map(|e| e.value().clone())
    }

    pub fn published_services(&self) -> Vec<Service> {
        self.published.iter().map(|e| e.key().clone()).collect()
    }

    /// 返回 true 表示首次订阅
    pub fn add_subscription(&self, service: Service) -> bool {
        let added = self.subscribed.insert(service);
        if added {
            self.touch();
        }
        added
    }

    pub fn remove_subscription(&self, service: &Service) -> bool {
        let removed = self.subscribed.remove(service).is_some();
        if removed {
            self.touch();
        }
        removed
    }

    pub fn is_subscribed(&self, service: &Service) -> bool {
        self.subscribed.contains(service)
    }

    pub fn subscribed_services(&self) -> Vec<Service> {
        self.subscribed.iter().map(|s| s.key().clone()).collect()
    }

    pub fn add_fuzzy_pattern(&self, pattern: impl Into<String>) -> bool {
        let added = self.fuzzy_patterns.insert(pattern.into());
        if added {
            self.touch();
        }
        added
    }

    pub fn remove_fuzzy_pattern(&self, pattern: &str) -> bool {
        let removed = self.fuzzy_patterns.remove(pattern).is_some();
        if removed {
            self.touch();
        }
        removed
    }

    pub fn fuzzy_patterns(&self) -> Vec<String> {
        self.fuzzy_patterns.iter().map(|p| p.key().clone()).collect()
    }
}
