//! Config - 통합 설정 관리
//!
//! - `plugins.rs` - 플러그인 서브시스템 설정
//! - `parley.rs` - ParleyConfig 통합 설정 (파일 + 환경 변수)

mod parley;
mod plugins;

pub use parley::{
    ParleyConfig, ParleyConfigFile, ENV_PLUGINS_ENABLED, ENV_PLUGIN_DIR, ENV_PLUGIN_TIMEOUT_MS,
    PARLEY_CONFIG_FILE,
};
pub use plugins::{PluginsConfig, PluginsConfigLayer, DEFAULT_PLUGIN_DIR, DEFAULT_PLUGIN_TIMEOUT_MS};
