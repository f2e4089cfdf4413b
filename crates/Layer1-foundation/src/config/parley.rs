//! Parley Config - 통합 설정
//!
//! 글로벌(`~/.config/parley/parley.json`) → 프로젝트(`.parley/parley.json`) → 환경 변수 순으로 병합

use crate::storage::JsonStore;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::debug;

use super::plugins::{PluginsConfig, PluginsConfigLayer};

/// 설정 파일명
pub const PARLEY_CONFIG_FILE: &str = "parley.json";

/// 플러그인 활성화 환경 변수
pub const ENV_PLUGINS_ENABLED: &str = "PARLEY_PLUGINS_ENABLED";
/// 플러그인 타임아웃 환경 변수 (ms)
pub const ENV_PLUGIN_TIMEOUT_MS: &str = "PARLEY_PLUGIN_TIMEOUT_MS";
/// 플러그인 디렉토리 환경 변수
pub const ENV_PLUGIN_DIR: &str = "PARLEY_PLUGIN_DIR";

// ============================================================================
// ParleyConfig (해석된 설정)
// ============================================================================

/// Parley 통합 설정
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParleyConfig {
    /// 버전 (마이그레이션용)
    #[serde(default = "default_version")]
    pub version: u32,

    /// 플러그인 설정
    #[serde(default)]
    pub plugins: PluginsConfig,
}

fn default_version() -> u32 {
    1
}

/// 설정 파일 구조 (모든 값 선택적)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParleyConfigFile {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<u32>,

    #[serde(default)]
    pub plugins: PluginsConfigLayer,
}

impl Default for ParleyConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl ParleyConfig {
    pub fn new() -> Self {
        Self {
            version: default_version(),
            plugins: PluginsConfig::default(),
        }
    }

    // ========================================================================
    // Load
    // ========================================================================

    /// 글로벌 + 프로젝트 + 환경 변수 병합 로드
    pub fn load() -> Result<Self> {
        let mut config = Self::new();

        // 1. 글로벌 설정
        if let Ok(global) = JsonStore::global() {
            if let Some(file) = global.load_optional::<ParleyConfigFile>(PARLEY_CONFIG_FILE)? {
                debug!("Applying global config from {:?}", global.base_dir());
                config.merge(file);
            }
        }

        // 2. 프로젝트 설정
        if let Ok(project) = JsonStore::current_project() {
            if let Some(file) = project.load_optional::<ParleyConfigFile>(PARLEY_CONFIG_FILE)? {
                debug!("Applying project config from {:?}", project.base_dir());
                config.merge(file);
            }
        }

        // 3. 환경 변수
        config.apply_env(|key| std::env::var(key).ok())?;

        Ok(config)
    }

    /// 특정 파일에서 로드 (환경 변수 적용 포함)
    pub fn load_from(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let dir = path
            .parent()
            .map(|p| p.to_path_buf())
            .unwrap_or_else(|| PathBuf::from("."));
        let filename = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| Error::Config(format!("Invalid config path: {}", path.display())))?;

        let file: ParleyConfigFile = JsonStore::new(dir).load(filename)?;

        let mut config = Self::new();
        config.merge(file);
        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    // ========================================================================
    // Merge
    // ========================================================================

    /// 설정 파일 병합 (file이 우선)
    pub fn merge(&mut self, file: ParleyConfigFile) {
        if let Some(version) = file.version {
            self.version = version;
        }
        self.plugins.apply(file.plugins);
    }

    /// 환경 변수 적용
    ///
    /// 값 조회 함수를 받아 테스트에서 프로세스 환경을 건드리지 않도록 합니다.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(value) = lookup(ENV_PLUGINS_ENABLED) {
            self.plugins.enabled = parse_bool(&value).ok_or_else(|| {
                Error::Config(format!("{} must be a boolean, got '{}'", ENV_PLUGINS_ENABLED, value))
            })?;
        }

        if let Some(value) = lookup(ENV_PLUGIN_TIMEOUT_MS) {
            self.plugins.timeout_ms = value.trim().parse().map_err(|_| {
                Error::Config(format!(
                    "{} must be a number of milliseconds, got '{}'",
                    ENV_PLUGIN_TIMEOUT_MS, value
                ))
            })?;
        }

        if let Some(value) = lookup(ENV_PLUGIN_DIR) {
            if !value.trim().is_empty() {
                self.plugins.directory = PathBuf::from(value.trim());
            }
        }

        Ok(())
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
