//! 健康探测测试
//!
//! 使用本地 `TcpListener` 驱动真实的 TCP / HTTP 探测，不依赖外部服务。

use std::net::SocketAddr;
use std::time::Duration;

use flare_naming_core::client::InstancePublishInfo;
use flare_naming_core::config::Config;
use flare_naming_core::event::NamingEvent;
use flare_naming_core::health::{HealthCheckType, HealthChecker, HealthState, ProbeContext, ProbeOutcome};
use flare_naming_core::metadata::ClusterMetadata;
use flare_naming_core::registry::NamingRegistry;
use flare_naming_core::types::Service;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio_test::assert_ok;

const CLIENT_ID: &str = "127.0.0.1:0#false";

fn probe_context() -> ProbeContext {
    ProbeContext::new(Duration::from_secs(2))
}

async fn bind_local() -> (TcpListener, SocketAddr) {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind local listener");
    let addr = listener.local_addr().expect("listener has an address");
    (listener, addr)
}

/// 启动只返回固定状态码的 HTTP 服务
async fn spawn_http_server(status_line: &'static str) -> SocketAddr {
    let (listener, addr) = bind_local().await;
    tokio::spawn(async move {
        while let Ok((mut stream, _)) = listener.accept().await {
            tokio::spawn(async move {
                let mut buf = vec![0u8; 4096];
                let mut read = 0;
                while let Ok(n) = stream.read(&mut buf[read..]).await {
                    if n == 0 {
                        break;
                    }
                    read += n;
                    if buf[..read].windows(4).any(|w| w == b"\r\n\r\n") || read == buf.len() {
                        break;
                    }
                }
                let response =
                    format!("HTTP/1.1 {status_line}\r\nContent-Length: 0\r\nConnection: close\r\n\r\n");
                let _ = stream.write_all(response.as_bytes()).await;
                let _ = stream.shutdown().await;
            });
        }
    });
    addr
}

fn http_checker() -> HealthChecker {
    HealthChecker::from_type(HealthCheckType::Http)
}

fn registry() -> NamingRegistry {
    NamingRegistry::new(Config::default()).expect("Failed to create registry")
}

/// 测试：TCP 端口可连接时探测成功
#[tokio::test]
async fn test_tcp_probe_healthy() {
    let (_listener, addr) = bind_local().await;

    let outcome = HealthChecker::Tcp.probe(addr, &probe_context()).await;

    assert_eq!(outcome, ProbeOutcome::Healthy);
}

/// 测试：连接被拒绝视为明确不可达
#[tokio::test]
async fn test_tcp_probe_refused_is_unreachable() {
    let (listener, addr) = bind_local().await;
    drop(listener);

    let outcome = HealthChecker::Tcp.probe(addr, &probe_context()).await;

    assert!(
        matches!(outcome, ProbeOutcome::Unreachable { .. }),
        "unexpected outcome: {outcome:?}"
    );
}

/// 测试：HTTP 状态码映射
#[tokio::test]
async fn test_http_probe_status_mapping() {
    let ok = spawn_http_server("200 OK").await;
    let unavailable = spawn_http_server("503 Service Unavailable").await;
    let not_found = spawn_http_server("404 Not Found").await;
    let ctx = probe_context();

    assert_eq!(http_checker().probe(ok, &ctx).await, ProbeOutcome::Healthy);
    assert!(matches!(
        http_checker().probe(unavailable, &ctx).await,
        ProbeOutcome::Unhealthy { .. }
    ));
    assert!(matches!(
        http_checker().probe(not_found, &ctx).await,
        ProbeOutcome::Unreachable { .. }
    ));
}

/// 测试：HTTP 连接失败视为明确不可达
#[tokio::test]
async fn test_http_probe_connect_error() {
    let (listener, addr) = bind_local().await;
    drop(listener);

    let outcome = http_checker().probe(addr, &probe_context()).await;

    assert!(
        matches!(outcome, ProbeOutcome::Unreachable { .. }),
        "unexpected outcome: {outcome:?}"
    );
}

/// 测试：None 检查器不探测
#[tokio::test]
async fn test_none_checker_skips() {
    let (_listener, addr) = bind_local().await;

    assert_eq!(
        HealthChecker::None.probe(addr, &probe_context()).await,
        ProbeOutcome::Skipped
    );
}

/// 测试：持久化实例的检查任务在端口关闭后立即置为不健康
#[tokio::test]
async fn test_check_task_marks_instance_unhealthy() {
    let registry = registry();
    let mut rx = registry.subscribe_events();
    let (listener, addr) = bind_local().await;
    let service = Service::new("ns1", "g1", "db");
    assert_ok!(registry.register_instance(CLIENT_ID, &service, InstancePublishInfo::new("127.0.0.1", addr.port()), false));

    let task = registry
        .health()
        .get_task(CLIENT_ID, &service)
        .expect("persistent instance has a check task");
    assert_eq!(task.check_now().await, Some(ProbeOutcome::Healthy));
    assert!(registry.get_discovery_view(&service).hosts[0].healthy);

    drop(listener);
    let outcome = task.check_now().await;

    assert!(matches!(outcome, Some(ProbeOutcome::Unreachable { .. })));
    assert_eq!(task.target().health.state(), HealthState::Unhealthy);
    assert!(!registry.get_discovery_view(&service).hosts[0].healthy);
    let metrics = registry.metrics().snapshot();
    assert_eq!(metrics.tcp_probes, 2);
    assert_eq!(metrics.probe_failures, 1);

    let mut saw_transition = false;
    while let Ok(event) = rx.try_recv() {
        if let NamingEvent::HealthStateChanged { old, new, .. } = event {
            assert_eq!(old, HealthState::Healthy);
            assert_eq!(new, HealthState::Unhealthy);
            saw_transition = true;
        }
    }
    assert!(saw_transition);
}

/// 测试：上一轮检查未结束时跳过本轮
#[tokio::test]
async fn test_check_skipped_while_in_flight() {
    let registry = registry();
    let (_listener, addr) = bind_local().await;
    let service = Service::new("ns1", "g1", "db");
    assert_ok!(registry.register_instance(CLIENT_ID, &service, InstancePublishInfo::new("127.0.0.1", addr.port()), false));
    let task = registry
        .health()
        .get_task(CLIENT_ID, &service)
        .expect("persistent instance has a check task");

    assert!(task.target().health.try_start_check());
    assert_eq!(task.check_now().await, None);
    assert_eq!(registry.metrics().snapshot().probes_skipped, 1);
    assert_eq!(registry.metrics().snapshot().tcp_probes, 0);

    task.target().health.finish_check();
    assert_eq!(task.check_now().await, Some(ProbeOutcome::Healthy));
}

/// 测试：任务取消后不再修改状态
#[tokio::test]
async fn test_cancelled_task_applies_nothing() {
    let registry = registry();
    let (listener, addr) = bind_local().await;
    drop(listener);
    let service = Service::new("ns1", "g1", "db");
    assert_ok!(registry.register_instance(CLIENT_ID, &service, InstancePublishInfo::new("127.0.0.1", addr.port()), false));
    let task = registry
        .health()
        .get_task(CLIENT_ID, &service)
        .expect("persistent instance has a check task");

    assert!(registry.deregister_instance(CLIENT_ID, &service));
    assert!(task.is_cancelled());
    assert_eq!(task.check_now().await, None);
    assert!(task.target().health.is_healthy());
    assert_eq!(registry.health().task_count(), 0);
}

/// 测试：集群配置 none 检查器时不探测
#[tokio::test]
async fn test_cluster_checker_none_disables_probe() {
    let registry = registry();
    let (_listener, addr) = bind_local().await;
    let service = Service::new("ns1", "g1", "db");
    registry.metadata().update_cluster_metadata(
        &service,
        "DEFAULT",
        ClusterMetadata::with_checker(HealthChecker::None),
    );
    assert_ok!(registry.register_instance(CLIENT_ID, &service, InstancePublishInfo::new("127.0.0.1", addr.port()), false));
    let task = registry
        .health()
        .get_task(CLIENT_ID, &service)
        .expect("persistent instance has a check task");

    assert_eq!(task.check_now().await, None);
    assert_eq!(registry.health().resolve_checker(task.target()), HealthChecker::None);
}

/// 测试：临时实例不调度检查任务
#[tokio::test]
async fn test_ephemeral_instance_not_checked() {
    let registry = registry();
    let service = Service::new("ns1", "g1", "svc");

    assert_ok!(registry.register_instance("conn-1", &service, InstancePublishInfo::new("10.0.0.1", 8080), true));

    assert!(registry.health().get_task("conn-1", &service).is_none());
    assert_eq!(registry.health().task_count(), 0);
}
