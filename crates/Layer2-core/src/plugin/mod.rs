//! # Plugin System
//!
//! Parley 챗봇의 플러그인 실행 및 이벤트 브로드캐스트 서브시스템
//!
//! ## 아키텍처
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      PluginManager                          │
//! │  execute_command ──► 첫 번째 활성 소유자 ──► race_timeout    │
//! │  broadcast_event ──► 모든 활성 플러그인 (join_all)           │
//! │  ┌───────────────────────────────────────────────────────┐ │
//! │  │                   PluginRegistry                       │ │
//! │  │  ┌────────────┬────────────┬────────────────────┐    │ │
//! │  │  │ demo       │ activity   │ ...                │    │ │
//! │  │  │ stats      │ stats      │                    │    │ │
//! │  │  └────────────┴────────────┴────────────────────┘    │ │
//! │  └───────────────────────────────────────────────────────┘ │
//! │                          ▲                                  │
//! │        PluginDiscovery (plugin.json + PluginCatalog)        │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## 예시
//!
//! ```ignore
//! let manager = PluginManager::new(PluginsConfig::default(), std::env::current_dir()?);
//! manager.initialize().await;
//!
//! let invocation = CommandInvocation::new(PluginContext::new("u1", "c1"), transport);
//! if !manager.execute_command("demo", invocation, vec!["hello".into()]).await {
//!     // 처리한 플러그인이 없거나 실패
//! }
//!
//! manager.broadcast_event(PluginEvent::message_received("hi", ctx)).await;
//! manager.shutdown().await;
//! ```

pub mod builtin;
mod command;
mod discovery;
mod events;
mod execution;
mod manager;
mod manifest;
mod registry;
mod traits;
mod transport;

// Traits & context
pub use traits::{
    ChatTransport, CommandInvocation, HealthStatus, Plugin, PluginContext, PluginData,
    PluginResult,
};

// Commands
pub use command::{
    handler_fn, CommandEntry, CommandHandler, CommandParameter, FnHandler, ParameterType,
    ParameterValidation, PluginCommand,
};

// Metadata & config
pub use manifest::{PluginConfig, PluginDependency, PluginMetadata, PluginVersion, RateLimit};

// Events
pub use events::{EventType, PluginEvent};

// Registry
pub use registry::{
    AvailableCommand, CommandTarget, LoadedPlugin, PluginHandle, PluginRegistry, PluginStats,
    PluginStatsSnapshot,
};

// Discovery
pub use discovery::{
    read_manifest, DiscoveredPlugin, Discovery, PluginCatalog, PluginDiscovery, PluginFactory,
    PluginManifest, PLUGIN_MANIFEST_FILE,
};

// Execution
pub use execution::{race_timeout, run_isolated, HookFailure};

// Manager
pub use manager::{ManagerState, PluginHealth, PluginManager, COMMAND_FAILURE_MESSAGE};

// Transports
pub use transport::{MemoryTransport, NullTransport};
