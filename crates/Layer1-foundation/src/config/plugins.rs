//! Plugins Config - 플러그인 서브시스템 설정
//!
//! `{ enabled, timeoutMs, directory }` 세 가지 값만 매니저가 소비합니다.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// 기본 플러그인 디렉토리
pub const DEFAULT_PLUGIN_DIR: &str = "plugins";

/// 기본 플러그인 호출 타임아웃 (ms)
pub const DEFAULT_PLUGIN_TIMEOUT_MS: u64 = 30_000;

/// 플러그인 서브시스템 설정
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PluginsConfig {
    /// 플러그인 시스템 활성화 여부
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// 커맨드/이벤트 호출 타임아웃 (ms)
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// 플러그인 디렉토리 (상대 경로는 작업 디렉토리 기준)
    #[serde(default = "default_directory")]
    pub directory: PathBuf,
}

fn default_true() -> bool {
    true
}

fn default_timeout_ms() -> u64 {
    DEFAULT_PLUGIN_TIMEOUT_MS
}

fn default_directory() -> PathBuf {
    PathBuf::from(DEFAULT_PLUGIN_DIR)
}

impl Default for PluginsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            timeout_ms: DEFAULT_PLUGIN_TIMEOUT_MS,
            directory: default_directory(),
        }
    }
}

impl PluginsConfig {
    /// 비활성화된 설정
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::default()
        }
    }

    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }

    pub fn with_directory(mut self, directory: impl Into<PathBuf>) -> Self {
        self.directory = directory.into();
        self
    }

    /// 타임아웃을 Duration으로
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// 작업 디렉토리 기준으로 플러그인 디렉토리 해석
    pub fn resolve_directory(&self, working_dir: &Path) -> PathBuf {
        if self.directory.is_absolute() {
            self.directory.clone()
        } else {
            working_dir.join(&self.directory)
        }
    }
}

/// 설정 파일 레이어 (부분 지정 허용, 병합용)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PluginsConfigLayer {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub directory: Option<PathBuf>,
}

impl PluginsConfig {
    /// 레이어 적용 (지정된 값만 덮어씀)
    pub fn apply(&mut self, layer: PluginsConfigLayer) {
        if let Some(enabled) = layer.enabled {
            self.enabled = enabled;
        }
        if let Some(timeout_ms) = layer.timeout_ms {
            self.timeout_ms = timeout_ms;
        }
        if let Some(directory) = layer.directory {
            self.directory = directory;
        }
    }
}
