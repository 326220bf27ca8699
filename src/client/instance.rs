//! 实例发布信息定义

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use crate::health::InstanceHealth;
use crate::types::Service;
use crate::utils::{self, DEFAULT_CLUSTER};

/// 客户端发布的实例信息
///
/// 注册后不再修改；健康状态保存在独立的 [`InstanceHealth`] 中。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstancePublishInfo {
    pub ip: String,
    pub port: u16,
    pub cluster: String,
    pub weight: f64,
    pub enabled: bool,
    /// 注册时声明的初始健康状态
    pub healthy: bool,
    pub metadata: HashMap<String, String>,
}

impl InstancePublishInfo {
    /// 创建新的实例发布信息
    pub fn new(ip: impl Into<String>, port: u16) -> Self {
        Self {
            ip: ip.into(),
            port,
            cluster: DEFAULT_CLUSTER.to_string(),
            weight: 1.0,
            enabled: true,
            healthy: true,
            metadata: HashMap::new(),
        }
    }

    /// 设置集群
    pub fn with_cluster(mut self, cluster: impl Into<String>) -> Self {
        self.cluster = cluster.into();
        self
    }

    /// 设置权重
    pub fn with_weight(mut self, weight: f64) -> Self {
        self.weight = weight;
        self
    }

    /// 设置是否启用
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// 设置初始健康状态
    pub fn with_healthy(mut self, healthy: bool) -> Self {
        self.healthy = healthy;
        self
    }

    /// 添加元数据
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    pub fn address(&self) -> String {
        format!("{}:{}", self.ip, self.port)
    }

    /// 解析为 SocketAddr，IP 非法时返回 None
    pub fn socket_addr(&self) -> Option<SocketAddr> {
        self.ip
            .parse::<IpAddr>()
            .ok()
            .map(|ip| SocketAddr::new(ip, self.port))
    }

    /// 实例在服务内的唯一标识
    pub fn instance_id(&self, service: &Service) -> String {
        utils::instance_id(&self.ip, self.port, &self.cluster, &service.grouped_name())
    }

    /// 地址与集群相同即视为同一个实例
    pub fn same_identity(&self, other: &InstancePublishInfo) -> bool {
        self.ip == other.ip && self.port == other.port && self.cluster == other.cluster
    }
}

/// 客户端持有的一条发布记录：不可变实例信息 + 独立的健康状态
#[derive(Debug, Clone)]
pub struct PublishedInstance {
    pub info: Arc<InstancePublishInfo>,
    pub health: Arc<InstanceHealth>,
    pub published_at: i64,
}

impl PublishedInstance {
    pub fn new(info: InstancePublishInfo) -> Self {
        let health = Arc::new(InstanceHealth::new(info.healthy));
        Self {
            info: Arc::new(info),
            health,
            published_at: utils::now_millis(),
        }
    }
}
