//! 实例健康状态机
//!
//! 每个实例一个 [`InstanceHealth`]，只有 `Healthy` / `Unhealthy` 两个状态，
//! 翻转必须经过连续 `threshold` 次同向结果（`check_fail_now` 除外）。
//! 状态与实例标识分离，独立加锁，实例本身保持不可变。

use parking_lot::Mutex;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use super::params::HealthParams;
use crate::utils::now_millis;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HealthState {
    Healthy,
    Unhealthy,
}

impl HealthState {
    pub fn from_healthy(healthy: bool) -> Self {
        if healthy {
            HealthState::Healthy
        } else {
            HealthState::Unhealthy
        }
    }

    pub fn is_healthy(&self) -> bool {
        matches!(self, HealthState::Healthy)
    }
}

impl fmt::Display for HealthState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HealthState::Healthy => write!(f, "HEALTHY"),
            HealthState::Unhealthy => write!(f, "UNHEALTHY"),
        }
    }
}

/// 一次状态翻转
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HealthTransition {
    pub old: HealthState,
    pub new: HealthState,
    pub timestamp: i64,
}

impl HealthTransition {
    fn new(old: HealthState, new: HealthState) -> Self {
        Self {
            old,
            new,
            timestamp: now_millis(),
        }
    }
}

#[derive(Debug)]
struct Counters {
    healthy: bool,
    ok_count: u32,
    fail_count: u32,
    last_transition: i64,
}

/// 探测耗时统计（毫秒）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CheckRt {
    pub normalized: u64,
    pub best: u64,
    pub worst: u64,
    pub last: u64,
}

/// 单个实例的健康状态
#[derive(Debug)]
pub struct InstanceHealth {
    counters: Mutex<Counters>,
    being_checked: AtomicBool,
    rt: Mutex<CheckRt>,
}

impl InstanceHealth {
    pub fn new(healthy: bool) -> Self {
        // 初始间隔打散，避免同一批实例同时被探测
        let normalized = 2_000 + rand::thread_rng().gen_range(0..5_000);
        Self::with_initial_interval(healthy, normalized)
    }

    pub fn with_initial_interval(healthy: bool, normalized_ms: u64) -> Self {
        Self {
            counters: Mutex::new(Counters {
                healthy,
                ok_count: 0,
                fail_count: 0,
                last_transition: now_millis(),
            }),
            being_checked: AtomicBool::new(false),
            rt: Mutex::new(CheckRt {
                normalized: normalized_ms,
                best: u64::MAX,
                worst: 0,
                last: 0,
            }),
        }
    }

    pub fn state(&self) -> HealthState {
        HealthState::from_healthy(self.counters.lock().healthy)
    }

    pub fn is_healthy(&self) -> bool {
        self.counters.lock().healthy
    }

    pub fn ok_count(&self) -> u32 {
        self.counters.lock().ok_count
    }

    pub fn fail_count(&self) -> u32 {
        self.counters.lock().fail_count
    }

    pub fn last_transition_millis(&self) -> i64 {
        self.counters.lock().last_transition
    }

    /// 抢占“检查中”标记；已有检查未结束时返回 false
    pub fn try_start_check(&self) -> bool {
        self.being_checked
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// 释放“检查中”标记
    pub fn finish_check(&self) {
        self.being_checked.store(false, Ordering::Release);
    }

    pub fn is_being_checked(&self) -> bool {
        self.being_checked.load(Ordering::Acquire)
    }

    /// 抢占检查标记并返回守卫，守卫析构时自动释放标记
    pub fn begin_check(self: &Arc<Self>) -> Option<CheckGuard> {
        if self.try_start_check() {
            Some(CheckGuard {
                health: Arc::clone(self),
            })
        } else {
            None
        }
    }

    /// 探测成功
    pub fn check_ok(&self, threshold: u32) -> Option<HealthTransition> {
        let threshold = threshold.max(1);
        let mut c = self.counters.lock();
        let mut transition = None;
        if !c.healthy {
            c.ok_count += 1;
            if c.ok_count >= threshold {
                c.healthy = true;
                c.ok_count = 0;
                c.last_transition = now_millis();
                transition = Some(HealthTransition::new(
                    HealthState::Unhealthy,
                    HealthState::Healthy,
                ));
            }
        }
        c.fail_count = 0;
        transition
    }

    /// 探测失败
    pub fn check_fail(&self, threshold: u32) -> Option<HealthTransition> {
        let threshold = threshold.max(1);
        let mut c = self.counters.lock();
        let mut transition = None;
        if c.healthy {
            c.fail_count += 1;
            if c.fail_count >= threshold {
                c.healthy = false;
                c.fail_count = 0;
                c.last_transition = now_millis();
                transition = Some(HealthTransition::new(
                    HealthState::Healthy,
                    HealthState::Unhealthy,
                ));
            }
        }
        c.ok_count = 0;
        transition
    }

    /// 明确失败（如连接被拒绝），跳过阈值直接置为不健康
    pub fn check_fail_now(&self) -> Option<HealthTransition> {
        let mut c = self.counters.lock();
        let transition = if c.healthy {
            c.healthy = false;
            c.fail_count = 0;
            c.last_transition = now_millis();
            Some(HealthTransition::new(
                HealthState::Healthy,
                HealthState::Unhealthy,
            ))
        } else {
            None
        };
        c.ok_count = 0;
        transition
    }

    /// 直接设置健康状态（管理端或注册时使用），不经过阈值
    pub fn set_healthy(&self, healthy: bool) -> Option<HealthTransition> {
        let mut c = self.counters.lock();
        c.ok_count = 0;
        c.fail_count = 0;
        if c.healthy == healthy {
            return None;
        }
        let old = HealthState::from_healthy(c.healthy);
        c.healthy = healthy;
        c.last_transition = now_millis();
        Some(HealthTransition::new(old, HealthState::from_healthy(healthy)))
    }

    /// 根据本次探测耗时重新计算探测间隔，返回新的间隔（毫秒）
    pub fn re_evaluate_interval(&self, measured_rt: u64, params: &HealthParams) -> u64 {
        let mut rt = self.rt.lock();
        rt.last = measured_rt;
        rt.worst = rt.worst.max(measured_rt);
        rt.best = rt.best.min(measured_rt);
        rt.normalized = params.smooth(rt.normalized, measured_rt);
        rt.normalized
    }

    pub fn check_rt(&self) -> CheckRt {
        *self.rt.lock()
    }

    pub fn normalized_interval(&self) -> u64 {
        self.rt.lock().normalized
    }
}

impl Default for InstanceHealth {
    fn default() -> Self {
        Self::new(true)
    }
}

/// 检查中标记的守卫，探测无论成功、失败还是 panic 都会释放标记
#[derive(Debug)]
pub struct CheckGuard {
    health: Arc<InstanceHealth>,
}

impl CheckGuard {
    pub fn health(&self) -> &Arc<InstanceHealth> {
        &self.health
    }
}

impl Drop for CheckGuard {
    fn drop(&mut self) {
        self.health.finish_check();
    }
}
