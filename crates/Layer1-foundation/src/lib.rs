//! # parley-foundation
//!
//! Foundation layer for Parley:
//! - Error: 공용 에러 타입 (`Error`, `Result`)
//! - Config: 통합 설정 (ParleyConfig, PluginsConfig)
//! - Storage: JsonStore (설정 파일 저장/로드)

pub mod config;
pub mod error;
pub mod storage;

// ============================================================================
// Error
// ============================================================================
pub use error::{Error, Result};

// ============================================================================
// Config (설정)
// ============================================================================
pub use config::{
    ParleyConfig,
    ParleyConfigFile,
    PluginsConfig,
    PluginsConfigLayer,
    DEFAULT_PLUGIN_DIR,
    DEFAULT_PLUGIN_TIMEOUT_MS,
    ENV_PLUGINS_ENABLED,
    ENV_PLUGIN_DIR,
    ENV_PLUGIN_TIMEOUT_MS,
    PARLEY_CONFIG_FILE,
};

// ============================================================================
// Storage (저장소)
// ============================================================================
pub use storage::JsonStore;
