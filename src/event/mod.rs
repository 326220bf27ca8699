//! 事件定义
//!
//! 组件之间通过类型化事件协作：入站的 [`ClientEvent`] 由会话/传输层产生，
//! 出站的 [`NamingEvent`] 由核心产生，供推送层和内部监听者消费。
//! 事件都是“发出即忘”的，最终一致而非请求/响应。

pub mod bus;

pub use bus::{EventBus, NamingEventListener};

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::client::InstancePublishInfo;
use crate::health::HealthState;
use crate::types::Service;

/// 入站客户端操作事件
#[derive(Debug, Clone)]
pub enum ClientEvent {
    RegisterInstance {
        client_id: String,
        service: Service,
        instance: InstancePublishInfo,
        ephemeral: bool,
    },
    DeregisterInstance {
        client_id: String,
        service: Service,
    },
    Subscribe {
        client_id: String,
        service: Service,
    },
    Unsubscribe {
        client_id: String,
        service: Service,
    },
    FuzzyWatch {
        client_id: String,
        pattern: String,
        known_service_keys: HashSet<String>,
    },
    CancelFuzzyWatch {
        client_id: String,
        pattern: String,
    },
    /// 客户端断开
    Released {
        client_id: String,
    },
    /// 探活结果（由协议相关的探测器产生）
    HealthProbeResult {
        client_id: String,
        service: Service,
        success: bool,
        /// 明确失败（如连接被拒绝）时为 true
        fail_now: bool,
        rt_millis: u64,
        reason: String,
    },
}

impl ClientEvent {
    pub fn client_id(&self) -> &str {
        match self {
            ClientEvent::RegisterInstance { client_id, .. }
            | ClientEvent::DeregisterInstance { client_id, .. }
            | ClientEvent::Subscribe { client_id, .. }
            | ClientEvent::Unsubscribe { client_id, .. }
            | ClientEvent::FuzzyWatch { client_id, .. }
            | ClientEvent::CancelFuzzyWatch { client_id, .. }
            | ClientEvent::Released { client_id }
            | ClientEvent::HealthProbeResult { client_id, .. } => client_id,
        }
    }
}

/// 服务变更类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ServiceChangedType {
    /// 服务出现第一个发布者
    AddService,
    /// 服务最后一个发布者离开
    DeleteService,
    /// 新增发布者
    InstanceRegistered,
    /// 移除发布者
    InstanceDeregistered,
    /// 发布者不变，实例数据、元数据或健康状态变化
    InstanceChanged,
}

impl ServiceChangedType {
    /// 是否为新增方向
    pub fn is_addition(&self) -> bool {
        matches!(
            self,
            ServiceChangedType::AddService | ServiceChangedType::InstanceRegistered
        )
    }

    /// 是否为移除方向
    pub fn is_removal(&self) -> bool {
        matches!(
            self,
            ServiceChangedType::DeleteService | ServiceChangedType::InstanceDeregistered
        )
    }
}

/// 核心产生的事件
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum NamingEvent {
    ServiceChanged {
        service: Service,
        changed_type: ServiceChangedType,
        /// 发布者索引本身发生变化
        publisher_change: bool,
    },
    /// 某客户端首次订阅某服务
    ServiceSubscribed {
        service: Service,
        client_id: String,
    },
    /// 服务被彻底删除（空服务清理）
    ServiceRemoved {
        service: Service,
    },
    /// 新的模糊订阅者初始化，携带完整匹配集
    FuzzyWatchInit {
        client_id: String,
        pattern: String,
        matched_service_keys: HashSet<String>,
    },
    /// 重复订阅时与客户端已知集合的差异
    FuzzyWatchSync {
        client_id: String,
        pattern: String,
        added: HashSet<String>,
        removed: HashSet<String>,
    },
    /// 服务的增删改变了某些表达式的匹配集
    FuzzyWatchChanged {
        service_key: String,
        changed_type: ServiceChangedType,
        client_ids: HashSet<String>,
    },
    HealthStateChanged {
        service: Service,
        instance_id: String,
        ip: String,
        port: u16,
        cluster: String,
        old: HealthState,
        new: HealthState,
        reason: String,
        timestamp: i64,
    },
}

impl NamingEvent {
    /// 事件名，用于日志
    pub fn name(&self) -> &'static str {
        match self {
            NamingEvent::ServiceChanged { .. } => "service_changed",
            NamingEvent::ServiceSubscribed { .. } => "service_subscribed",
            NamingEvent::ServiceRemoved { .. } => "service_removed",
            NamingEvent::FuzzyWatchInit { .. } => "fuzzy_watch_init",
            NamingEvent::FuzzyWatchSync { .. } => "fuzzy_watch_sync",
            NamingEvent::FuzzyWatchChanged { .. } => "fuzzy_watch_changed",
            NamingEvent::HealthStateChanged { .. } => "health_state_changed",
        }
    }
}
