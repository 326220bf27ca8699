//! 注册中心错误处理模块
//!
//! 提供统一的错误类型与错误代码分类。只有容量超限和参数错误会返回给调用方，
//! 其余错误在组件内部记录日志后被吸收。

pub mod builder;
pub mod code;
pub mod naming_error;

// 重新导出公共类型
pub use builder::ErrorBuilder;
pub use code::{ErrorCategory, ErrorCode};
pub use naming_error::{NamingError, Result};

/// 后台任务默认使用的结果类型
pub type InfraResult<T> = anyhow::Result<T>;
