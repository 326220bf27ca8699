use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

use crate::utils;

/// 服务标识 `(namespace, group, name)`
///
/// 不可变值类型，可直接作为 map 的 key。临时/持久属性属于注册行为，不属于服务标识。
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Service {
    namespace: String,
    group: String,
    name: String,
}

impl Service {
    pub fn new(
        namespace: impl Into<String>,
        group: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self {
            namespace: namespace.into(),
            group: group.into(),
            name: name.into(),
        }
    }

    /// 使用默认命名空间与默认分组
    pub fn with_name(name: impl Into<String>) -> Self {
        Self::new(utils::DEFAULT_NAMESPACE, utils::DEFAULT_GROUP, name)
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn group(&self) -> &str {
        &self.group
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// `group@@name`
    pub fn grouped_name(&self) -> String {
        utils::grouped_name(&self.group, &self.name)
    }

    /// `namespace##group@@name`，模糊订阅匹配集使用的不透明 key
    pub fn service_key(&self) -> String {
        utils::service_key(&self.namespace, &self.group, &self.name)
    }
}

impl fmt::Display for Service {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.namespace, self.group, self.name)
    }
}

/// 对外暴露的实例（视图中的一条记录）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Instance {
    pub instance_id: String,
    pub ip: String,
    pub port: u16,
    pub weight: f64,
    pub healthy: bool,
    pub enabled: bool,
    pub ephemeral: bool,
    pub cluster_name: String,
    /// `group@@name`
    pub service_name: String,
    pub metadata: HashMap<String, String>,
}

impl Instance {
    pub fn address(&self) -> String {
        format!("{}:{}", self.ip, self.port)
    }
}

/// 服务发现视图
///
/// 由 [`crate::storage::ServiceStorage`] 物化并缓存，外部代码只读。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceInfo {
    pub namespace: String,
    pub group_name: String,
    pub name: String,
    /// 逗号分隔的集群名
    pub clusters: String,
    /// 客户端缓存时间提示（毫秒）
    pub cache_millis: u64,
    pub hosts: Vec<Instance>,
    /// 构建时间（毫秒时间戳）
    pub last_ref_time: i64,
}

impl ServiceInfo {
    /// 空视图：服务不存在与服务无实例返回同样的形状
    pub fn empty(service: &Service, cache_millis: u64) -> Self {
        Self {
            namespace: service.namespace().to_string(),
            group_name: service.group().to_string(),
            name: service.name().to_string(),
            clusters: String::new(),
            cache_millis,
            hosts: Vec::new(),
            last_ref_time: chrono::Utc::now().timestamp_millis(),
        }
    }

    pub fn ip_count(&self) -> usize {
        self.hosts.len()
    }

    pub fn healthy_hosts(&self) -> impl Iterator<Item = &Instance> {
        self.hosts.iter().filter(|h| h.healthy && h.enabled)
    }

    /// 构建视图的服务标识
    pub fn service(&self) -> Service {
        Service::new(&self.namespace, &self.group_name, &self.name)
    }
}
