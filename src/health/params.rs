//! 自适应探测间隔参数

use serde::{Deserialize, Serialize};

/// 探测间隔的平滑参数
///
/// `normalized = factor * normalized + (1 - factor) * rt`，结果被钳制在 `[min, max]`（毫秒）。
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HealthParams {
    pub max: u64,
    pub min: u64,
    pub factor: f64,
}

impl HealthParams {
    pub fn tcp() -> Self {
        Self {
            max: 5_000,
            min: 1_000,
            factor: 0.75,
        }
    }

    pub fn http() -> Self {
        Self {
            max: 5_000,
            min: 500,
            factor: 0.85,
        }
    }

    pub fn mysql() -> Self {
        Self {
            max: 3_000,
            min: 2_000,
            factor: 0.65,
        }
    }

    pub(crate) fn validate(&self) -> Result<(), String> {
        if self.min > self.max {
            return Err(format!("min {} is greater than max {}", self.min, self.max));
        }
        if !(0.0..=1.0).contains(&self.factor) {
            return Err(format!("factor {} is outside [0, 1]", self.factor));
        }
        Ok(())
    }

    /// 平滑并钳制；`min > max` 时以 `max` 为准
    pub fn smooth(&self, normalized: u64, measured: u64) -> u64 {
        let value = self.factor * normalized as f64 + (1.0 - self.factor) * measured as f64;
        (value as u64).clamp(self.min.min(self.max), self.max)
    }
}

impl Default for HealthParams {
    fn default() -> Self {
        Self::tcp()
    }
}
