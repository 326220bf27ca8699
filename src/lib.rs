//! Flare Naming Core Library
//!
//! In-memory service registry core: client/service index, fuzzy watch engine,
//! discovery view cache and the health check state machine.

pub mod config;
pub mod error;
pub mod logging;
pub mod metrics;
pub mod types;
pub mod utils;

// 事件与客户端
pub mod client;
pub mod event;

// 注册中心核心
pub mod health;
pub mod index;
pub mod metadata;
pub mod registry;
pub mod service;
pub mod storage;

// 后台任务运行时
pub mod runtime;

// Re-exports
pub use config::{
    Config, EmptyServiceConfig, EventBusConfig, FuzzyWatchConfig, HealthConfig, LoggingConfig,
    RuntimeSection, ViewConfig,
};
pub use error::{ErrorBuilder, ErrorCategory, ErrorCode, InfraResult, NamingError, Result};
pub use logging::init_tracing;
pub use metrics::{Metrics, MetricsMonitor};
pub use types::{Instance, Service, ServiceInfo};

pub use client::{Client, ClientEventConsumer, ClientManager, InstancePublishInfo, PublishedInstance};
pub use event::{ClientEvent, EventBus, NamingEvent, NamingEventListener, ServiceChangedType};

pub use health::{
    HealthCheckReactor, HealthCheckType, HealthChecker, HealthParams, HealthState,
    HealthStatusUpdater, HealthTransition, InstanceHealth, ProbeOutcome,
};
pub use index::{ClientServiceIndex, FuzzyPattern, FuzzyWatchEngine, WatchOutcome};
pub use metadata::{ClusterMetadata, InstanceMetadata, NamingMetadataManager, ServiceMetadata};
pub use registry::{ClientOperationService, EmptyServiceCleaner, NamingRegistry};
pub use service::ServiceManager;
pub use storage::ServiceStorage;

// 运行时 re-exports
pub use runtime::{NamingRuntime, RuntimeHandle, Task};
