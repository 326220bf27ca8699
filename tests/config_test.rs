//! 配置、日志与指标测试

use flare_naming_core::config::Config;
use flare_naming_core::error::ErrorCode;
use flare_naming_core::health::HealthCheckType;
use flare_naming_core::logging::init_tracing;
use flare_naming_core::metrics::MetricsMonitor;
use flare_naming_core::registry::NamingRegistry;
use tokio_test::{assert_err, assert_ok};

/// 测试：默认配置取值
#[test]
fn test_default_config() {
    let config = Config::default();

    assert_eq!(config.view.cache_millis, 10_000);
    assert_eq!(config.fuzzy_watch.max_pattern_count, 20);
    assert_eq!(config.fuzzy_watch.max_matched_service_count, 500);
    assert_eq!(config.health.check_times, 3);
    assert_eq!(config.health.default_checker, HealthCheckType::Tcp);
    assert!(config.health.enabled);
    assert!(config.empty_service.enabled);
    assert_eq!(config.logging.level, "info");
    assert_ok!(config.validate());
}

/// 测试：只写部分字段的 TOML，其余取默认值
#[test]
fn test_partial_toml() {
    let content = r#"
[fuzzy_watch]
max_pattern_count = 5

[health]
default_checker = "http"

[health.http]
max = 8000
min = 1000
factor = 0.5

[logging]
json = true
"#;

    let config = assert_ok!(Config::from_toml_str(content));

    assert_eq!(config.fuzzy_watch.max_pattern_count, 5);
    assert_eq!(config.fuzzy_watch.max_matched_service_count, 500);
    assert_eq!(config.health.default_checker, HealthCheckType::Http);
    assert_eq!(config.health.params_for(HealthCheckType::Http).max, 8_000);
    assert_eq!(config.health.check_times, 3);
    assert!(config.logging.json);
    assert_eq!(config.logging.level, "info");
}

/// 测试：非法 TOML 返回配置错误
#[test]
fn test_invalid_toml() {
    let err = assert_err!(Config::from_toml_str("[fuzzy_watch\nmax_pattern_count = 1"));
    assert_eq!(err.code(), ErrorCode::ConfigurationError);

    let err = assert_err!(Config::from_toml_str("[health]\ncheck_times = \"three\""));
    assert_eq!(err.code(), ErrorCode::ConfigurationError);
}

/// 测试：取值校验
#[test]
fn test_validate_rejects_bad_values() {
    let err = assert_err!(Config::from_toml_str("[health]\ncheck_times = 0"));
    assert_eq!(err.code(), ErrorCode::ConfigurationError);

    let err = assert_err!(Config::from_toml_str(
        "[health.tcp]\nmax = 1000\nmin = 2000\nfactor = 0.75"
    ));
    assert!(err.reason().contains("health.tcp"), "reason: {}", err.reason());

    let mut config = Config::default();
    config.fuzzy_watch.max_matched_service_count = 0;
    assert_err!(config.validate());

    let mut config = Config::default();
    config.event_bus.capacity = 0;
    let err = assert_err!(NamingRegistry::new(config));
    assert_eq!(err.code(), ErrorCode::ConfigurationError);
}

/// 测试：从文件加载配置
#[test]
fn test_load_from_file() {
    let path = std::env::temp_dir().join(format!("naming-config-{}.toml", uuid::Uuid::new_v4()));
    std::fs::write(&path, "[view]\ncache_millis = 3000\n").expect("Failed to write config file");

    let result = Config::load_from_file(path.to_str().expect("temp path is utf-8"));
    let _ = std::fs::remove_file(&path);

    let config = assert_ok!(result);
    assert_eq!(config.view.cache_millis, 3_000);

    let err = assert_err!(Config::load_from_file("/nonexistent/naming.toml"));
    assert_eq!(err.code(), ErrorCode::ConfigurationError);
}

/// 测试：全局 subscriber 只能安装一次
#[test]
fn test_init_tracing_once() {
    let config = Config::default();

    init_tracing(&config.logging);

    assert!(!init_tracing(&config.logging));
}

/// 测试：指标快照导出为 JSON
#[test]
fn test_metrics_snapshot_json() {
    let metrics = MetricsMonitor::new();
    metrics.record_probe(HealthCheckType::Http, false);
    metrics.record_probe(HealthCheckType::Tcp, true);
    metrics.record_fuzzy_swept(3);

    let json = metrics.snapshot_json();

    assert_eq!(json["http_probes"], 1);
    assert_eq!(json["tcp_probes"], 1);
    assert_eq!(json["probe_failures"], 1);
    assert_eq!(json["fuzzy_patterns_swept"], 3);
    assert_eq!(json["empty_services_cleaned"], 0);
}
