//! parley-core: Plugin runtime for Parley
//!
//! Layer2 - 플러그인 실행 레이어
//!
//! # 주요 모듈
//!
//! - `plugin`: 플러그인 계약, 레지스트리, 디스커버리, 매니저
//!
//! # 사용 예시
//!
//! ```ignore
//! use parley_core::{CommandInvocation, PluginContext, PluginEvent, PluginManager};
//! use parley_foundation::ParleyConfig;
//!
//! let config = ParleyConfig::load()?;
//! let manager = PluginManager::new(config.plugins, std::env::current_dir()?);
//! manager.initialize().await;
//!
//! // 커맨드 디스패치
//! let invocation = CommandInvocation::new(PluginContext::new("u1", "c1"), transport);
//! manager.execute_command("demo", invocation, vec!["hello".into()]).await;
//!
//! // 이벤트 브로드캐스트
//! manager
//!     .broadcast_event(PluginEvent::message_received("hi", PluginContext::new("u1", "c1")))
//!     .await;
//!
//! manager.shutdown().await;
//! ```

pub mod plugin;

// Re-exports: Plugin
pub use plugin::{
    handler_fn, AvailableCommand, ChatTransport, CommandEntry, CommandHandler, CommandInvocation,
    CommandParameter, EventType, HealthStatus, ManagerState, MemoryTransport, NullTransport,
    ParameterType, Plugin, PluginCatalog, PluginCommand, PluginConfig, PluginContext, PluginData,
    PluginEvent, PluginHealth, PluginManager, PluginManifest, PluginMetadata, PluginResult,
    PluginStats, PluginStatsSnapshot, COMMAND_FAILURE_MESSAGE,
};

// Re-exports: Foundation
pub use parley_foundation::{Error, PluginsConfig, Result};
