//! 健康状态机测试

use std::sync::Arc;

use async_broadcast::Receiver;
use flare_naming_core::client::InstancePublishInfo;
use flare_naming_core::event::{EventBus, NamingEvent};
use flare_naming_core::health::{
    HealthCheckTarget, HealthParams, HealthState, HealthStatusUpdater, InstanceHealth, ProbeOutcome,
    run_contained,
};
use flare_naming_core::metrics::MetricsMonitor;
use flare_naming_core::types::Service;

const THRESHOLD: u32 = 3;

fn drain(rx: &mut Receiver<NamingEvent>) -> Vec<NamingEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

fn target(healthy: bool) -> HealthCheckTarget {
    HealthCheckTarget {
        service: Service::new("ns1", "g1", "svc"),
        client_id: "10.0.0.1:8080#false".to_string(),
        instance: Arc::new(InstancePublishInfo::new("10.0.0.1", 8080)),
        health: Arc::new(InstanceHealth::with_initial_interval(healthy, 2_000)),
    }
}

/// 测试：fail,fail,ok,fail,fail,fail 只在第 6 次翻转
#[test]
fn test_hysteresis_interleaved_result_resets_counter() {
    let health = InstanceHealth::with_initial_interval(true, 2_000);

    let results = [
        health.check_fail(THRESHOLD),
        health.check_fail(THRESHOLD),
        health.check_ok(THRESHOLD),
        health.check_fail(THRESHOLD),
        health.check_fail(THRESHOLD),
        health.check_fail(THRESHOLD),
    ];

    let flipped: Vec<usize> = results
        .iter()
        .enumerate()
        .filter_map(|(i, t)| t.map(|_| i))
        .collect();
    assert_eq!(flipped, vec![5]);
    let transition = results[5].expect("transition at the 6th call");
    assert_eq!(transition.old, HealthState::Healthy);
    assert_eq!(transition.new, HealthState::Unhealthy);
    assert_eq!(health.state(), HealthState::Unhealthy);
    assert_eq!(health.fail_count(), 0);
    assert_eq!(health.ok_count(), 0);
}

/// 测试：恢复健康同样需要连续阈值次成功
#[test]
fn test_recovery_requires_consecutive_ok() {
    let health = InstanceHealth::with_initial_interval(false, 2_000);

    assert!(health.check_ok(THRESHOLD).is_none());
    assert!(health.check_ok(THRESHOLD).is_none());
    assert!(health.check_fail(THRESHOLD).is_none());
    assert_eq!(health.ok_count(), 0);
    assert!(health.check_ok(THRESHOLD).is_none());
    assert!(health.check_ok(THRESHOLD).is_none());
    let transition = health.check_ok(THRESHOLD).expect("third consecutive ok flips");

    assert_eq!(transition.old, HealthState::Unhealthy);
    assert_eq!(transition.new, HealthState::Healthy);
    assert!(health.is_healthy());
}

/// 测试：已健康实例上的成功不产生翻转事件
#[test]
fn test_no_double_transition() {
    let bus = Arc::new(EventBus::new(64));
    let mut rx = bus.subscribe();
    let metrics = Arc::new(MetricsMonitor::new());
    let updater = HealthStatusUpdater::new(bus, metrics.clone(), THRESHOLD);
    let target = target(true);

    for _ in 0..10 {
        assert!(updater.check_ok(&target, "probe ok").is_none());
    }

    assert!(drain(&mut rx).is_empty());
    assert_eq!(metrics.snapshot().health_transitions, 0);
}

/// 测试：明确失败跳过阈值立即翻转，且只翻转一次
#[test]
fn test_fail_now_bypasses_threshold() {
    let health = InstanceHealth::with_initial_interval(true, 2_000);
    health.check_fail(THRESHOLD);

    assert!(health.check_fail_now().is_some());
    assert!(health.check_fail_now().is_none());
    assert!(!health.is_healthy());
}

/// 测试：翻转时发布携带新旧状态的事件
#[test]
fn test_updater_emits_state_change() {
    let bus = Arc::new(EventBus::new(64));
    let mut rx = bus.subscribe();
    let metrics = Arc::new(MetricsMonitor::new());
    let updater = HealthStatusUpdater::new(bus, metrics.clone(), THRESHOLD);
    let target = target(true);

    let outcome = ProbeOutcome::Unreachable {
        reason: "tcp:refused 10.0.0.1:8080".to_string(),
    };
    assert!(updater.apply(&target, &outcome).is_some());
    assert!(updater.apply(&target, &ProbeOutcome::Skipped).is_none());

    let events = drain(&mut rx);
    assert_eq!(events.len(), 1);
    match &events[0] {
        NamingEvent::HealthStateChanged {
            instance_id,
            ip,
            port,
            old,
            new,
            reason,
            ..
        } => {
            assert_eq!(instance_id, "10.0.0.1#8080#DEFAULT#g1@@svc");
            assert_eq!(ip, "10.0.0.1");
            assert_eq!(*port, 8080);
            assert_eq!(*old, HealthState::Healthy);
            assert_eq!(*new, HealthState::Unhealthy);
            assert_eq!(reason, "tcp:refused 10.0.0.1:8080");
        }
        other => panic!("unexpected event: {other:?}"),
    }
    assert_eq!(metrics.snapshot().health_transitions, 1);
}

/// 测试：探测间隔指数平滑并钳制在 [min, max]
#[test]
fn test_re_evaluate_interval_smoothing_and_clamp() {
    let health = InstanceHealth::with_initial_interval(true, 2_000);
    let params = HealthParams::tcp();

    assert_eq!(health.re_evaluate_interval(0, &params), 1_500);
    assert_eq!(health.re_evaluate_interval(0, &params), 1_125);
    assert_eq!(health.re_evaluate_interval(0, &params), params.min);
    assert_eq!(health.re_evaluate_interval(100_000, &params), params.max);

    let rt = health.check_rt();
    assert_eq!(rt.best, 0);
    assert_eq!(rt.worst, 100_000);
    assert_eq!(rt.last, 100_000);
    assert_eq!(rt.normalized, health.normalized_interval());
}

/// 测试：上下限颠倒的参数不会 panic，结果落在上限
#[test]
fn test_re_evaluate_interval_with_inverted_bounds() {
    let health = InstanceHealth::with_initial_interval(true, 2_000);
    let params = HealthParams {
        max: 1_000,
        min: 3_000,
        factor: 0.5,
    };

    assert_eq!(params.smooth(2_000, 0), 1_000);
    assert_eq!(health.re_evaluate_interval(100_000, &params), 1_000);
    assert_eq!(health.re_evaluate_interval(0, &params), 1_000);
}

/// 测试：检查中标记阻止重叠探测，守卫析构后释放
#[test]
fn test_in_flight_guard() {
    let health = Arc::new(InstanceHealth::with_initial_interval(true, 2_000));

    let guard = health.begin_check().expect("first claim succeeds");
    assert!(health.is_being_checked());
    assert!(!health.try_start_check());
    assert!(health.begin_check().is_none());

    drop(guard);
    assert!(!health.is_being_checked());
    assert!(health.try_start_check());
    health.finish_check();
    assert!(!health.is_being_checked());
}

/// 测试：探测 panic 也会释放检查中标记
#[test]
fn test_guard_released_on_panic() {
    let health = Arc::new(InstanceHealth::with_initial_interval(true, 2_000));
    let cloned = health.clone();

    let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(move || {
        let _guard = cloned.begin_check().expect("claim succeeds");
        panic!("probe blew up");
    }));

    assert!(result.is_err());
    assert!(!health.is_being_checked());
}

/// 测试：初始探测间隔被打散在 [2000, 7000) 毫秒
#[test]
fn test_initial_interval_jitter() {
    for _ in 0..50 {
        let interval = InstanceHealth::new(true).normalized_interval();
        assert!((2_000..7_000).contains(&interval), "interval {interval} out of range");
    }
}

/// 测试：探测 panic 被限制在本轮，检查中标记随之释放
#[tokio::test]
async fn test_panicking_probe_is_contained() {
    let target = target(true);
    let health = target.health.clone();

    let completed = run_contained(&target, async move {
        let _guard = health.begin_check().expect("no check in flight");
        panic!("probe blew up");
    })
    .await;

    assert!(!completed);
    assert!(target.health.begin_check().is_some(), "in-flight flag released on panic");
    assert!(run_contained(&target, async {}).await);
}
