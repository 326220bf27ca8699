//! 错误代码和错误类别定义

use serde::{Deserialize, Serialize};
use std::fmt;

/// 注册中心错误代码
///
/// 错误代码按类别分组：
/// - 21000-21999: 参数相关错误
/// - 22000-22999: 模糊订阅容量相关错误
/// - 30000-30999: 系统相关错误
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[repr(u32)]
pub enum ErrorCode {
    // ============================================================
    // 参数相关错误 (21000-21999)
    // ============================================================
    InvalidParameter = 21000,
    InvalidServiceName = 21001,
    InvalidFuzzyWatchPattern = 21002,

    // ============================================================
    // 模糊订阅容量相关错误 (22000-22999)
    // ============================================================
    FuzzyWatchPatternOverLimit = 22000,
    FuzzyWatchPatternMatchCountOverLimit = 22001,

    // ============================================================
    // 系统相关错误 (30000-30999)
    // ============================================================
    InternalError = 30000,
    ConfigurationError = 30001,
    UnknownError = 30999,
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl ErrorCode {
    /// 获取错误代码的数字值
    #[inline]
    pub fn as_u32(&self) -> u32 {
        *self as u32
    }

    /// 从数字值创建错误代码
    pub fn from_u32(code: u32) -> Option<Self> {
        match code {
            21000 => Some(ErrorCode::InvalidParameter),
            21001 => Some(ErrorCode::InvalidServiceName),
            21002 => Some(ErrorCode::InvalidFuzzyWatchPattern),
            22000 => Some(ErrorCode::FuzzyWatchPatternOverLimit),
            22001 => Some(ErrorCode::FuzzyWatchPatternMatchCountOverLimit),
            30000 => Some(ErrorCode::InternalError),
            30001 => Some(ErrorCode::ConfigurationError),
            30999 => Some(ErrorCode::UnknownError),
            _ => None,
        }
    }

    /// 获取错误代码的英文标识符
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::InvalidParameter => "INVALID_PARAMETER",
            ErrorCode::InvalidServiceName => "INVALID_SERVICE_NAME",
            ErrorCode::InvalidFuzzyWatchPattern => "INVALID_FUZZY_WATCH_PATTERN",
            ErrorCode::FuzzyWatchPatternOverLimit => "FUZZY_WATCH_PATTERN_OVER_LIMIT",
            ErrorCode::FuzzyWatchPatternMatchCountOverLimit => {
                "FUZZY_WATCH_PATTERN_MATCH_COUNT_OVER_LIMIT"
            }
            ErrorCode::InternalError => "INTERNAL_ERROR",
            ErrorCode::ConfigurationError => "CONFIGURATION_ERROR",
            ErrorCode::UnknownError => "UNKNOWN_ERROR",
        }
    }

    /// 获取错误代码的类别
    pub fn category(&self) -> ErrorCategory {
        match self.as_u32() {
            21000..=21999 => ErrorCategory::Parameter,
            22000..=22999 => ErrorCategory::Capacity,
            _ => ErrorCategory::System,
        }
    }

    /// 是否为容量超限类错误（调用方可据此区分“被拒绝”与“匹配为空”）
    pub fn is_capacity_exceeded(&self) -> bool {
        self.category() == ErrorCategory::Capacity
    }
}

/// 错误类别
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCategory {
    Parameter,
    Capacity,
    System,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorCategory::Parameter => write!(f, "PARAMETER"),
            ErrorCategory::Capacity => write!(f, "CAPACITY"),
            ErrorCategory::System => write!(f, "SYSTEM"),
        }
    }
}
