//! 客户端管理器

use dashmap::DashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{debug, info};

use super::Client;

/// 客户端管理器
///
/// 管理所有在线客户端，客户端在首次连接/注册时创建，断开时释放。
#[derive(Debug, Default)]
pub struct ClientManager {
    clients: DashMap<String, Arc<Client>>,
}

impl ClientManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// 生成连接型客户端 ID
    pub fn new_connection_id() -> String {
        uuid::Uuid::new_v4().to_string()
    }

    /// IP:Port 型客户端 ID，格式 `ip:port#ephemeral`
    pub fn ip_port_client_id(address: SocketAddr, ephemeral: bool) -> String {
        format!("{address}#{ephemeral}")
    }

    /// 获取客户端，不存在时创建
    pub fn client_connected(&self, client_id: &str, ephemeral: bool) -> Arc<Client> {
        self.clients
            .entry(client_id.to_string())
            .or_insert_with(|| {
                info!(target: "naming::client", client_id, ephemeral, "Client connected");
                Arc::new(Client::new(client_id, ephemeral))
            })
            .clone()
    }

    pub fn get(&self, client_id: &str) -> Option<Arc<Client>> {
        self.clients.get(client_id).map(|c| c.value().clone())
    }

    pub fn contains(&self, client_id: &str) -> bool {
        self.clients.contains_key(client_id)
    }

    /// 移除客户端并返回它，调用方负责清理索引
    pub fn release(&self, client_id: &str) -> Option<Arc<Client>> {
        let released = self.clients.remove(client_id).map(|(_, c)| c);
        match &released {
            Some(_) => info!(target: "naming::client", client_id, "Client released"),
            None => debug!(target: "naming::client", client_id, "Release of unknown client ignored"),
        }
        released
    }

    pub fn client_ids(&self) -> Vec<String> {
        self.clients.iter().map(|e| e.key().clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }
}
