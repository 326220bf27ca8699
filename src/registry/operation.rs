//! 客户端操作
//!
//! 每个操作先修改客户端自身的状态，再更新对应的索引。索引更新会发布事件，
//! 由监听者完成视图失效、模糊订阅匹配集维护等后续工作。

use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info};

use crate::client::{ClientManager, InstancePublishInfo};
use crate::error::{ErrorCode, NamingError, Result};
use crate::health::{HealthCheckReactor, HealthCheckTarget, HealthTransition};
use crate::index::{ClientServiceIndex, FuzzyWatchEngine, WatchOutcome, canonical_pattern};
use crate::service::ServiceManager;
use crate::types::Service;
use crate::utils::is_valid_cluster_name;

/// 客户端操作服务
#[derive(Debug)]
pub struct ClientOperationService {
    clients: Arc<ClientManager>,
    services: Arc<ServiceManager>,
    index: Arc<ClientServiceIndex>,
    fuzzy: Arc<FuzzyWatchEngine>,
    health: Arc<HealthCheckReactor>,
}

impl ClientOperationService {
    pub fn new(
        clients: Arc<ClientManager>,
        services: Arc<ServiceManager>,
        index: Arc<ClientServiceIndex>,
        fuzzy: Arc<FuzzyWatchEngine>,
        health: Arc<HealthCheckReactor>,
    ) -> Self {
        Self {
            clients,
            services,
            index,
            fuzzy,
            health,
        }
    }

    /// 注册实例
    ///
    /// # 参数
    /// * `client_id` - 注册方，首次出现时创建客户端
    /// * `service` - 服务标识
    /// * `instance` - 实例发布信息
    /// * `ephemeral` - 临时实例依赖连接存活；持久化实例由健康检查任务探活
    pub fn register_instance(
        &self,
        client_id: &str,
        service: &Service,
        instance: InstancePublishInfo,
        ephemeral: bool,
    ) -> Result<()> {
        validate_service(service)?;
        validate_instance(&instance)?;

        let client = self.clients.client_connected(client_id, ephemeral);
        if client.is_ephemeral() != ephemeral {
            return Err(NamingError::invalid_parameter(format!(
                "client {client_id} is {} but the instance is registered as {}",
                kind(client.is_ephemeral()),
                kind(ephemeral)
            )));
        }

        self.services.get_singleton(service);
        let address = instance.address();
        let published = client.add_service_instance(service.clone(), instance);
        self.index.add_publisher(service, client_id);
        if !ephemeral {
            self.health.schedule(service, client_id, &published);
        }
        info!(
            target: "naming::client",
            service = %service,
            client_id,
            address = %address,
            ephemeral,
            "Instance registered"
        );
        Ok(())
    }

    /// 注销实例；客户端或实例不存在时不做任何事
    pub fn deregister_instance(&self, client_id: &str, service: &Service) -> bool {
        let Some(client) = self.clients.get(client_id) else {
            debug!(target: "naming::client", client_id, "Deregister from unknown client ignored");
            return false;
        };
        if client.remove_service_instance(service).is_none() {
            return false;
        }
        self.health.cancel(client_id, service);
        self.index.remove_publisher(service, client_id);
        info!(target: "naming::client", service = %service, client_id, "Instance deregistered");
        true
    }

    /// 订阅服务，返回 true 表示该客户端首次订阅
    pub fn subscribe(&self, client_id: &str, service: &Service) -> Result<bool> {
        validate_service(service)?;
        let client = self.clients.client_connected(client_id, true);
        if !client.add_subscription(service.clone()) {
            return Ok(false);
        }
        Ok(self.index.add_subscriber(service, client_id))
    }

    pub fn unsubscribe(&self, client_id: &str, service: &Service) -> bool {
        let Some(client) = self.clients.get(client_id) else {
            return false;
        };
        if !client.remove_subscription(service) {
            return false;
        }
        self.index.remove_subscriber(service, client_id)
    }

    /// 模糊订阅，容量超限时返回错误
    pub fn fuzzy_watch(
        &self,
        client_id: &str,
        pattern: &str,
        known: &HashSet<String>,
    ) -> Result<WatchOutcome> {
        let client = self.clients.client_connected(client_id, true);
        let outcome = self.fuzzy.watch(pattern, client_id, known)?;
        client.add_fuzzy_pattern(canonical_pattern(pattern));
        Ok(outcome)
    }

    pub fn cancel_fuzzy_watch(&self, client_id: &str, pattern: &str) -> bool {
        if let Some(client) = self.clients.get(client_id) {
            client.remove_fuzzy_pattern(&canonical_pattern(pattern));
        }
        self.fuzzy.cancel_watch(pattern, client_id)
    }

    /// 释放客户端并清理它触及的全部索引
    pub fn release_client(&self, client_id: &str) -> bool {
        let Some(client) = self.clients.release(client_id) else {
            return false;
        };
        let published = client.published_services();
        for service in &published {
            self.health.cancel(client_id, service);
        }
        self.index.on_client_released(&client);
        self.fuzzy.on_client_released(client_id);
        info!(
            target: "naming::client",
            client_id,
            published = published.len(),
            subscribed = client.subscribed_services().len(),
            patterns = client.fuzzy_patterns().len(),
            "Client released and indexes cleaned"
        );
        true
    }

    /// 应用外部探测器上报的结果；客户端或实例已不存在时忽略
    pub fn apply_probe_result(
        &self,
        client_id: &str,
        service: &Service,
        success: bool,
        fail_now: bool,
        rt_millis: u64,
        reason: &str,
    ) -> Option<HealthTransition> {
        let client = self.clients.get(client_id)?;
        let published = client.get_instance_publish_info(service)?;
        let target = HealthCheckTarget {
            service: service.clone(),
            client_id: client_id.to_string(),
            instance: published.info,
            health: published.health,
        };
        let updater = self.health.updater();
        let params = self.health.params_for(&target);
        let transition = if success {
            updater.check_ok(&target, reason)
        } else if fail_now {
            updater.check_fail_now(&target, reason)
        } else {
            updater.check_fail(&target, reason)
        };
        let measured = if success { rt_millis } else { params.max };
        updater.re_evaluate(&target, measured, &params);
        transition
    }
}

fn kind(ephemeral: bool) -> &'static str {
    if ephemeral { "ephemeral" } else { "persistent" }
}

fn validate_service(service: &Service) -> Result<()> {
    if service.namespace().is_empty() || service.group().is_empty() || service.name().is_empty() {
        return Err(NamingError::localized(
            ErrorCode::InvalidServiceName,
            format!("service identity must not contain empty parts: {service}"),
        ));
    }
    Ok(())
}

fn validate_instance(instance: &InstancePublishInfo) -> Result<()> {
    if instance.ip.trim().is_empty() {
        return Err(NamingError::invalid_parameter("instance ip must not be empty"));
    }
    if !is_valid_cluster_name(&instance.cluster) {
        return Err(NamingError::invalid_parameter(format!(
            "cluster name {} is invalid, only 0-9a-zA-Z-_. are allowed",
            instance.cluster
        )));
    }
    if !instance.weight.is_finite() || !(0.0..=10_000.0).contains(&instance.weight) {
        return Err(NamingError::invalid_parameter(format!(
            "instance weight {} is outside [0, 10000]",
            instance.weight
        )));
    }
    Ok(())
}
