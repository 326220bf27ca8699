//! 命名相关的工具函数

pub const DEFAULT_NAMESPACE: &str = "public";
pub const DEFAULT_GROUP: &str = "DEFAULT_GROUP";
pub const DEFAULT_CLUSTER: &str = "DEFAULT";

/// 分组与服务名之间的分隔符
pub const GROUP_SEPARATOR: &str = "@@";
/// 命名空间与分组服务名之间的分隔符
pub const NAMESPACE_SEPARATOR: &str = "##";

/// 返回 `group@@name`
pub fn grouped_name(group: &str, name: &str) -> String {
    format!("{group}{GROUP_SEPARATOR}{name}")
}

/// 返回 `namespace##group@@name`
pub fn service_key(namespace: &str, group: &str, name: &str) -> String {
    format!("{namespace}{NAMESPACE_SEPARATOR}{}", grouped_name(group, name))
}

/// 生成实例 ID：`ip#port#cluster#group@@name`
pub fn instance_id(ip: &str, port: u16, cluster: &str, grouped_service: &str) -> String {
    format!("{ip}#{port}#{cluster}#{grouped_service}")
}

/// 当前毫秒时间戳
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// 集群名只允许 `0-9a-zA-Z-_.`
pub fn is_valid_cluster_name(cluster: &str) -> bool {
    !cluster.is_empty()
        && cluster
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
}
