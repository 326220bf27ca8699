//! 模糊订阅匹配引擎测试

use std::collections::HashSet;
use std::sync::Arc;

use async_broadcast::Receiver;
use flare_naming_core::config::FuzzyWatchConfig;
use flare_naming_core::error::ErrorCode;
use flare_naming_core::event::{EventBus, NamingEvent, ServiceChangedType};
use flare_naming_core::index::{FuzzyPattern, FuzzyWatchEngine, build_pattern, matches_pattern, namespace_of};
use flare_naming_core::metrics::MetricsMonitor;
use flare_naming_core::service::ServiceManager;
use flare_naming_core::types::Service;
use tokio_test::{assert_err, assert_ok};

struct Fixture {
    engine: Arc<FuzzyWatchEngine>,
    services: Arc<ServiceManager>,
    bus: Arc<EventBus>,
    metrics: Arc<MetricsMonitor>,
    rx: Receiver<NamingEvent>,
}

fn setup(config: FuzzyWatchConfig) -> Fixture {
    let bus = Arc::new(EventBus::new(1024));
    let rx = bus.subscribe();
    let services = Arc::new(ServiceManager::new());
    let metrics = Arc::new(MetricsMonitor::new());
    let engine = Arc::new(FuzzyWatchEngine::new(
        config,
        services.clone(),
        bus.clone(),
        metrics.clone(),
    ));
    bus.register_listener(engine.clone());
    Fixture {
        engine,
        services,
        bus,
        metrics,
        rx,
    }
}

fn drain(rx: &mut Receiver<NamingEvent>) -> Vec<NamingEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

fn keys(services: &[&Service]) -> HashSet<String> {
    services.iter().map(|s| s.service_key()).collect()
}

fn service_changed(service: &Service, changed_type: ServiceChangedType) -> NamingEvent {
    NamingEvent::ServiceChanged {
        service: service.clone(),
        changed_type,
        publisher_change: true,
    }
}

/// 测试：通配符可以出现在任意位置
#[test]
fn test_pattern_glob_matching() {
    let svc = Service::new("ns1", "g1", "svcX");

    assert!(matches_pattern("ns1>>g1>>svc*", &svc));
    assert!(matches_pattern("ns1>>g1>>*X", &svc));
    assert!(matches_pattern("ns1>>g1>>s*c*X", &svc));
    assert!(matches_pattern("ns1>>*>>*", &svc));
    assert!(matches_pattern("ns1>>g1>>svcX", &svc));
    assert!(!matches_pattern("ns1>>g1>>svcY", &svc));
    assert!(!matches_pattern("ns1>>g2*>>svc*", &svc));
    assert!(!matches_pattern("ns2>>g1>>svc*", &svc));
    assert!(!matches_pattern("ns1>>g1", &svc), "malformed pattern matches nothing");
}

/// 测试：命名空间为空时使用默认命名空间
#[test]
fn test_pattern_default_namespace() {
    let svc = Service::with_name("order");

    assert!(matches_pattern(">>DEFAULT_GROUP>>ord*", &svc));
    assert_eq!(namespace_of(">>g>>s").as_deref(), Some("public"));
    assert_eq!(build_pattern("ns1", "g*", "s*"), "ns1>>g*>>s*");
}

/// 测试：格式非法的表达式
#[test]
fn test_pattern_parse_rejects_malformed() {
    assert!(FuzzyPattern::parse("ns1>>g1").is_none());
    assert!(FuzzyPattern::parse("ns1>>g1>>s>>extra").is_none());
    assert!(FuzzyPattern::parse("ns1>>>>svc").is_none());
    assert!(FuzzyPattern::parse("ns1>>g1>>").is_none());
    assert!(FuzzyPattern::parse("ns*>>g1>>svc").is_none());

    let parsed = FuzzyPattern::parse("ns1>>g*>>svc").expect("valid pattern");
    assert_eq!(parsed.namespace(), "ns1");
    assert_eq!(parsed.group_pattern(), "g*");
    assert_eq!(parsed.service_pattern(), "svc");
    assert_eq!(parsed.to_string(), "ns1>>g*>>svc");
}

/// 测试：首次订阅扫描命名空间并发布初始化事件
#[tokio::test]
async fn test_first_watch_scans_namespace() {
    let mut f = setup(FuzzyWatchConfig::default());
    let a = Service::new("ns1", "g1", "svcA");
    let b = Service::new("ns1", "g1", "svcB");
    let other_group = Service::new("ns1", "g2", "svcC");
    let other_ns = Service::new("ns2", "g1", "svcA");
    for s in [&a, &b, &other_group, &other_ns] {
        f.services.get_singleton(s);
    }

    let outcome = assert_ok!(f.engine.watch("ns1>>g1>>svc*", "client-b", &HashSet::new()));

    assert!(outcome.first_watch);
    assert_eq!(outcome.matched, keys(&[&a, &b]));
    assert_eq!(f.engine.get_matched_services("ns1>>g1>>svc*"), keys(&[&a, &b]));
    assert_eq!(f.engine.pattern_count(), 1);
    assert!(drain(&mut f.rx).contains(&NamingEvent::FuzzyWatchInit {
        client_id: "client-b".to_string(),
        pattern: "ns1>>g1>>svc*".to_string(),
        matched_service_keys: keys(&[&a, &b]),
    }));
}

/// 测试：匹配集为空的订阅，随后服务增删增量维护
#[tokio::test]
async fn test_empty_watch_then_incremental_updates() {
    let mut f = setup(FuzzyWatchConfig::default());
    let pattern = "ns1>>g1>>svc*";

    let outcome = assert_ok!(f.engine.watch(pattern, "client-b", &HashSet::new()));
    assert!(outcome.matched.is_empty());
    assert!(drain(&mut f.rx).contains(&NamingEvent::FuzzyWatchInit {
        client_id: "client-b".to_string(),
        pattern: pattern.to_string(),
        matched_service_keys: HashSet::new(),
    }));

    let svc = Service::new("ns1", "g1", "svcX");
    f.bus.publish(service_changed(&svc, ServiceChangedType::AddService));
    assert_eq!(f.engine.get_matched_services(pattern), keys(&[&svc]));
    let expected_clients: HashSet<String> = ["client-b".to_string()].into();
    assert!(drain(&mut f.rx).contains(&NamingEvent::FuzzyWatchChanged {
        service_key: svc.service_key(),
        changed_type: ServiceChangedType::AddService,
        client_ids: expected_clients.clone(),
    }));

    // 不匹配的服务不影响匹配集
    let other = Service::new("ns1", "g1", "order");
    f.bus.publish(service_changed(&other, ServiceChangedType::AddService));
    assert_eq!(f.engine.get_matched_services(pattern).len(), 1);

    f.bus.publish(service_changed(&svc, ServiceChangedType::DeleteService));
    assert!(f.engine.get_matched_services(pattern).is_empty());
    let events = drain(&mut f.rx);
    assert!(events.contains(&NamingEvent::FuzzyWatchChanged {
        service_key: svc.service_key(),
        changed_type: ServiceChangedType::DeleteService,
        client_ids: expected_clients,
    }));
}

/// 测试：初始扫描超过匹配上限时拒绝订阅且不留下部分匹配集
#[tokio::test]
async fn test_match_count_over_limit_rejected() {
    let f = setup(FuzzyWatchConfig {
        max_matched_service_count: 2,
        ..FuzzyWatchConfig::default()
    });
    for name in ["svc1", "svc2", "svc3"] {
        f.services.get_singleton(&Service::new("ns1", "g1", name));
    }

    let err = assert_err!(f.engine.watch("ns1>>g1>>svc*", "client-b", &HashSet::new()));

    assert!(err.is_capacity_exceeded());
    assert_eq!(err.code(), ErrorCode::FuzzyWatchPatternMatchCountOverLimit);
    assert!(f.engine.get_matched_services("ns1>>g1>>svc*").is_empty());
    assert!(f.engine.get_watchers_of_pattern("ns1>>g1>>svc*").is_empty());
    assert!(f.engine.patterns().is_empty());
    assert_eq!(f.engine.pattern_count(), 0);
    assert_eq!(f.metrics.snapshot().fuzzy_over_limit_rejections, 1);
}

/// 测试：表达式数量上限，已存在的表达式不占用新名额
#[tokio::test]
async fn test_pattern_count_limit() {
    let f = setup(FuzzyWatchConfig {
        max_pattern_count: 1,
        ..FuzzyWatchConfig::default()
    });

    assert_ok!(f.engine.watch("ns1>>g1>>a*", "client-a", &HashSet::new()));
    let err = assert_err!(f.engine.watch("ns1>>g1>>b*", "client-a", &HashSet::new()));
    assert_eq!(err.code(), ErrorCode::FuzzyWatchPatternOverLimit);
    assert!(err.is_capacity_exceeded());

    assert_ok!(f.engine.watch("ns1>>g1>>a*", "client-b", &HashSet::new()));
    assert_eq!(f.engine.pattern_count(), 1);
    assert_eq!(f.engine.get_watchers_of_pattern("ns1>>g1>>a*").len(), 2);
}

/// 测试：重复订阅按客户端已知集合计算差异
#[tokio::test]
async fn test_repeat_watch_returns_diff() {
    let mut f = setup(FuzzyWatchConfig::default());
    let pattern = "ns1>>g1>>*";
    let a = Service::new("ns1", "g1", "a");
    let b = Service::new("ns1", "g1", "b");
    f.services.get_singleton(&a);

    assert_ok!(f.engine.watch(pattern, "client-b", &HashSet::new()));
    f.engine.on_service_added(&b);
    drain(&mut f.rx);

    let known: HashSet<String> = [a.service_key(), "ns1##g1@@stale".to_string()].into();
    let outcome = assert_ok!(f.engine.watch(pattern, "client-b", &known));

    assert!(!outcome.first_watch);
    assert_eq!(outcome.added, keys(&[&b]));
    assert_eq!(outcome.removed, HashSet::from(["ns1##g1@@stale".to_string()]));
    let events = drain(&mut f.rx);
    assert!(events.contains(&NamingEvent::FuzzyWatchSync {
        client_id: "client-b".to_string(),
        pattern: pattern.to_string(),
        added: keys(&[&b]),
        removed: ["ns1##g1@@stale".to_string()].into(),
    }));
    assert!(!events.iter().any(|e| matches!(e, NamingEvent::FuzzyWatchInit { .. })));
}

/// 测试：取消订阅保留匹配集，由清理任务回收
#[tokio::test]
async fn test_cancel_then_sweep() {
    let f = setup(FuzzyWatchConfig::default());
    let abandoned = "ns1>>g1>>a*";
    let active = "ns1>>g1>>b*";

    assert_ok!(f.engine.watch(abandoned, "client-a", &HashSet::new()));
    assert_ok!(f.engine.watch(active, "client-b", &HashSet::new()));
    assert!(f.engine.cancel_watch(abandoned, "client-a"));
    assert!(!f.engine.cancel_watch(abandoned, "client-a"));
    assert!(!f.engine.cancel_watch("ns1>>never>>*", "client-a"));

    assert_eq!(f.engine.patterns().len(), 2);
    assert_eq!(f.engine.sweep(), 1);
    assert_eq!(f.engine.sweep(), 0);

    assert_eq!(f.engine.patterns(), vec![active.to_string()]);
    assert_eq!(f.engine.pattern_count(), 1);
    assert_eq!(f.metrics.snapshot().fuzzy_patterns_swept, 1);
}

/// 测试：客户端断开后从所有表达式中移除
#[tokio::test]
async fn test_client_released_removes_watchers() {
    let f = setup(FuzzyWatchConfig::default());
    assert_ok!(f.engine.watch("ns1>>g1>>a*", "client-a", &HashSet::new()));
    assert_ok!(f.engine.watch("ns1>>g1>>b*", "client-a", &HashSet::new()));
    assert_ok!(f.engine.watch("ns1>>g1>>b*", "client-b", &HashSet::new()));

    f.engine.on_client_released("client-a");

    assert!(f.engine.get_watchers_of_pattern("ns1>>g1>>a*").is_empty());
    assert_eq!(
        f.engine.get_watchers_of_pattern("ns1>>g1>>b*"),
        HashSet::from(["client-b".to_string()])
    );
    assert_eq!(
        f.engine.fuzzy_watched_clients(&Service::new("ns1", "g1", "bar")),
        HashSet::from(["client-b".to_string()])
    );
}

/// 测试：非法表达式返回参数错误而非容量错误
#[tokio::test]
async fn test_invalid_pattern_rejected() {
    let f = setup(FuzzyWatchConfig::default());

    let err = assert_err!(f.engine.watch("ns1>>g1", "client-a", &HashSet::new()));

    assert_eq!(err.code(), ErrorCode::InvalidFuzzyWatchPattern);
    assert!(!err.is_capacity_exceeded());
    assert_eq!(f.engine.pattern_count(), 0);
}

/// 测试：匹配集已满时增量新增被跳过
#[tokio::test]
async fn test_incremental_add_skipped_when_full() {
    let f = setup(FuzzyWatchConfig {
        max_matched_service_count: 1,
        ..FuzzyWatchConfig::default()
    });
    let first = Service::new("ns1", "g1", "svc1");
    f.services.get_singleton(&first);
    assert_ok!(f.engine.watch("ns1>>g1>>svc*", "client-a", &HashSet::new()));

    let changed = f.engine.on_service_added(&Service::new("ns1", "g1", "svc2"));

    assert!(changed.is_empty());
    assert_eq!(f.engine.get_matched_services("ns1>>g1>>svc*"), keys(&[&first]));
    assert_eq!(f.metrics.snapshot().fuzzy_incremental_skips, 1);
}

/// 测试：首次订阅与匹配服务的注册并发时，匹配集不丢失该服务
#[test]
fn test_first_watch_racing_service_registration() {
    let f = setup(FuzzyWatchConfig::default());
    for n in 0..2_000 {
        f.services.get_singleton(&Service::new("ns1", "g1", format!("other-{n}")));
    }

    for i in 0..200 {
        let pattern = format!("ns1>>g1>>svc{i}*");
        let service = Service::new("ns1", "g1", format!("svc{i}X"));
        let barrier = Arc::new(std::sync::Barrier::new(2));

        let watcher = {
            let engine = f.engine.clone();
            let barrier = barrier.clone();
            let pattern = pattern.clone();
            std::thread::spawn(move || {
                barrier.wait();
                engine.watch(&pattern, "client-b", &HashSet::new()).map(|_| ())
            })
        };
        let registrar = {
            let services = f.services.clone();
            let bus = f.bus.clone();
            let barrier = barrier.clone();
            let service = service.clone();
            std::thread::spawn(move || {
                barrier.wait();
                services.get_singleton(&service);
                bus.publish(service_changed(&service, ServiceChangedType::AddService));
            })
        };

        assert_ok!(watcher.join().expect("watcher thread panicked"));
        registrar.join().expect("registrar thread panicked");

        assert!(
            f.engine.get_matched_services(&pattern).contains(&service.service_key()),
            "run {i}: matched set is missing {}",
            service.service_key()
        );
    }
}

/// 测试：空命名空间与 public 写法是同一个表达式
#[tokio::test]
async fn test_default_namespace_aliases_share_pattern() {
    let f = setup(FuzzyWatchConfig {
        max_pattern_count: 1,
        ..FuzzyWatchConfig::default()
    });
    let svc = Service::new("public", "g", "svc1");
    f.services.get_singleton(&svc);

    assert_ok!(f.engine.watch(">>g>>svc*", "client-a", &HashSet::new()));
    let outcome = assert_ok!(f.engine.watch("public>>g>>svc*", "client-b", &HashSet::new()));

    assert!(outcome.first_watch);
    assert_eq!(outcome.matched, keys(&[&svc]));
    assert_eq!(f.engine.pattern_count(), 1);
    assert_eq!(f.engine.patterns(), vec!["public>>g>>svc*".to_string()]);
    assert_eq!(f.engine.get_watchers_of_pattern(">>g>>svc*").len(), 2);

    assert!(f.engine.cancel_watch(">>g>>svc*", "client-b"));
    assert_eq!(
        f.engine.get_watchers_of_pattern("public>>g>>svc*"),
        HashSet::from(["client-a".to_string()])
    );
}
