use serde::{Deserialize, Serialize};

use crate::error::{NamingError, Result};
use crate::health::{HealthCheckType, HealthParams};

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    pub view: ViewConfig,
    pub fuzzy_watch: FuzzyWatchConfig,
    pub health: HealthConfig,
    pub empty_service: EmptyServiceConfig,
    pub event_bus: EventBusConfig,
    pub logging: LoggingConfig,
    pub runtime: RuntimeSection,
}

/// 服务视图缓存配置
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ViewConfig {
    /// 推送给客户端的缓存时间提示（毫秒）
    pub cache_millis: u64,
}

impl Default for ViewConfig {
    fn default() -> Self {
        Self {
            cache_millis: 10_000,
        }
    }
}

/// 模糊订阅配置
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct FuzzyWatchConfig {
    /// 全局最多允许的模糊订阅表达式数量
    pub max_pattern_count: usize,
    /// 单个表达式最多匹配的服务数量
    pub max_matched_service_count: usize,
    /// 清理无人订阅表达式的周期（毫秒）
    pub sweep_interval_ms: u64,
}

impl Default for FuzzyWatchConfig {
    fn default() -> Self {
        Self {
            max_pattern_count: 20,
            max_matched_service_count: 500,
            sweep_interval_ms: 30_000,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct HealthConfig {
    pub enabled: bool,
    /// 连续多少次同向结果才翻转健康状态
    pub check_times: u32,
    /// 集群未配置检查器时使用的默认类型
    pub default_checker: HealthCheckType,
    /// 单次探测超时（毫秒）
    pub probe_timeout_ms: u64,
    pub tcp: HealthParams,
    pub http: HealthParams,
    pub mysql: HealthParams,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            check_times: 3,
            default_checker: HealthCheckType::Tcp,
            probe_timeout_ms: 3_000,
            tcp: HealthParams::tcp(),
            http: HealthParams::http(),
            mysql: HealthParams::mysql(),
        }
    }
}

impl HealthConfig {
    /// 获取指定检查类型的自适应参数
    pub fn params_for(&self, checker: HealthCheckType) -> &HealthParams {
        match checker {
            HealthCheckType::Http => &self.http,
            HealthCheckType::Mysql => &self.mysql,
            HealthCheckType::Tcp | HealthCheckType::None => &self.tcp,
        }
    }
}

/// 空服务自动清理配置
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct EmptyServiceConfig {
    pub enabled: bool,
    pub clean_interval_ms: u64,
    /// 服务无实例超过该时长后被删除（毫秒）
    pub expired_ms: u64,
}

impl Default for EmptyServiceConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            clean_interval_ms: 60_000,
            expired_ms: 60_000,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct EventBusConfig {
    /// 对外广播通道容量，满时丢弃最旧事件
    pub capacity: usize,
}

impl Default for EventBusConfig {
    fn default() -> Self {
        Self { capacity: 16_384 }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RuntimeSection {
    pub shutdown_timeout_ms: u64,
}

impl Default for RuntimeSection {
    fn default() -> Self {
        Self {
            shutdown_timeout_ms: 5_000,
        }
    }
}

impl Config {
    pub fn load_from_file(path: &str) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| NamingError::config(format!("failed to read {path}: {e}")))?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// 校验配置取值
    pub fn validate(&self) -> Result<()> {
        if self.fuzzy_watch.max_pattern_count == 0 {
            return Err(NamingError::config("fuzzy_watch.max_pattern_count must be > 0"));
        }
        if self.fuzzy_watch.max_matched_service_count == 0 {
            return Err(NamingError::config(
                "fuzzy_watch.max_matched_service_count must be > 0",
            ));
        }
        if self.health.check_times == 0 {
            return Err(NamingError::config("health.check_times must be > 0"));
        }
        if self.event_bus.capacity == 0 {
            return Err(NamingError::config("event_bus.capacity must be > 0"));
        }
        for (name, params) in [
            ("tcp", &self.health.tcp),
            ("http", &self.health.http),
            ("mysql", &self.health.mysql),
        ] {
            params
                .validate()
                .map_err(|reason| NamingError::config(format!("health.{name}: {reason}")))?;
        }
        Ok(())
    }
}
