//! 注册中心统一错误类型

use super::code::ErrorCode;
use thiserror::Error;

/// 注册中心统一错误类型
///
/// 只有调用方可以处理的失败（容量超限、参数非法）才会以 `Localized` 形式返回，
/// 探活失败、过期引用等都在内部被吸收。
#[derive(Error, Debug, Clone)]
pub enum NamingError {
    /// 可暴露给调用方的错误
    #[error("错误 [{code}] {reason}", code = .code.as_str())]
    Localized {
        code: ErrorCode,
        reason: String,
        details: Option<String>,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// 配置错误
    #[error("配置错误: {0}")]
    Config(String),

    /// 系统错误（内部错误，不暴露细节）
    #[error("系统错误: {0}")]
    System(String),
}

impl NamingError {
    /// 创建本地化错误
    pub fn localized(code: ErrorCode, reason: impl Into<String>) -> Self {
        NamingError::Localized {
            code,
            reason: reason.into(),
            details: None,
            timestamp: chrono::Utc::now(),
        }
    }

    /// 创建系统错误
    pub fn system(msg: impl Into<String>) -> Self {
        NamingError::System(msg.into())
    }

    /// 创建配置错误
    pub fn config(msg: impl Into<String>) -> Self {
        NamingError::Config(msg.into())
    }

    // ============================================================
    // 便捷方法：参数相关错误
    // ============================================================

    /// 创建参数错误
    pub fn invalid_parameter(reason: impl Into<String>) -> Self {
        Self::localized(ErrorCode::InvalidParameter, reason)
    }

    /// 创建非法模糊订阅表达式错误
    pub fn invalid_pattern(pattern: &str) -> Self {
        super::ErrorBuilder::new(ErrorCode::InvalidFuzzyWatchPattern, "模糊订阅表达式非法")
            .details(format!("pattern={pattern}"))
            .build_error()
    }

    // ============================================================
    // 便捷方法：容量相关错误
    // ============================================================

    /// 模糊订阅表达式数量超限
    pub fn pattern_over_limit(pattern: &str, limit: usize) -> Self {
        super::ErrorBuilder::new(
            ErrorCode::FuzzyWatchPatternOverLimit,
            "模糊订阅表达式数量超过上限",
        )
        .details(format!("pattern={pattern}, limit={limit}"))
        .build_error()
    }

    /// 模糊订阅表达式匹配的服务数量超限
    pub fn match_count_over_limit(pattern: &str, limit: usize) -> Self {
        super::ErrorBuilder::new(
            ErrorCode::FuzzyWatchPatternMatchCountOverLimit,
            "模糊订阅表达式匹配的服务数量超过上限",
        )
        .details(format!("pattern={pattern}, limit={limit}"))
        .build_error()
    }

    // ============================================================
    // 信息获取方法
    // ============================================================

    /// 获取错误代码
    pub fn code(&self) -> ErrorCode {
        match self {
            NamingError::Localized { code, .. } => *code,
            NamingError::Config(_) => ErrorCode::ConfigurationError,
            NamingError::System(_) => ErrorCode::InternalError,
        }
    }

    /// 获取错误原因
    pub fn reason(&self) -> &str {
        match self {
            NamingError::Localized { reason, .. } => reason,
            NamingError::Config(msg) => msg,
            NamingError::System(msg) => msg,
        }
    }

    /// 获取错误详情
    pub fn details(&self) -> Option<&str> {
        match self {
            NamingError::Localized { details, .. } => details.as_deref(),
            _ => None,
        }
    }

    /// 是否为容量超限
    pub fn is_capacity_exceeded(&self) -> bool {
        self.code().is_capacity_exceeded()
    }
}

impl From<toml::de::Error> for NamingError {
    fn from(err: toml::de::Error) -> Self {
        NamingError::Config(err.to_string())
    }
}

impl From<std::io::Error> for NamingError {
    fn from(err: std::io::Error) -> Self {
        NamingError::System(err.to_string())
    }
}

/// 结果类型别名
pub type Result<T> = std::result::Result<T, NamingError>;
