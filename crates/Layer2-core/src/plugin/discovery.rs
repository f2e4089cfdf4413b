//! Plugin Discovery - 플러그인 디렉토리 스캔
//!
//! 플러그인 디렉토리의 각 하위 디렉토리가 후보입니다. 후보는 `plugin.json`으로
//! 자신을 설명하고, `entry` 키로 컴파일타임 카탈로그의 팩토리를 고릅니다.
//!
//! ```text
//! plugins/
//! ├── 10-demo/plugin.json       { "id": "demo", "entry": "demo", ... }
//! └── 20-activity/plugin.json   { "id": "activity", "enabled": false, ... }
//! ```

use super::builtin::{ActivityPlugin, DemoPlugin};
use super::traits::Plugin;
use parley_foundation::{Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use tracing::{debug, info, warn};

/// 매니페스트 파일 이름
pub const PLUGIN_MANIFEST_FILE: &str = "plugin.json";

// ============================================================================
// PluginManifest - plugin.json
// ============================================================================

/// plugin.json 내용
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PluginManifest {
    pub id: String,

    pub name: String,

    #[serde(default = "default_version")]
    pub version: String,

    /// 카탈로그 팩토리 키 (없으면 id)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entry: Option<String>,

    #[serde(default = "default_enabled")]
    pub enabled: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,

    /// 플러그인별 설정
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub settings: HashMap<String, Value>,
}

fn default_version() -> String {
    "0.0.0".to_string()
}

fn default_enabled() -> bool {
    true
}

impl PluginManifest {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            version: default_version(),
            entry: None,
            enabled: true,
            description: None,
            author: None,
            settings: HashMap::new(),
        }
    }

    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    pub fn with_entry(mut self, entry: impl Into<String>) -> Self {
        self.entry = Some(entry.into());
        self
    }

    pub fn with_setting(mut self, key: impl Into<String>, value: Value) -> Self {
        self.settings.insert(key.into(), value);
        self
    }

    /// 카탈로그 조회 키
    pub fn entry_key(&self) -> &str {
        self.entry.as_deref().unwrap_or(&self.id)
    }

    /// 문자열 설정 조회
    pub fn setting_str(&self, key: &str) -> Option<&str> {
        self.settings.get(key).and_then(Value::as_str)
    }
}

// ============================================================================
// PluginCatalog - 컴파일타임 플러그인 팩토리
// ============================================================================

/// 매니페스트로부터 플러그인 인스턴스를 만드는 팩토리
pub type PluginFactory = Arc<dyn Fn(&PluginManifest) -> Result<Arc<dyn Plugin>> + Send + Sync>;

/// 플러그인 카탈로그
#[derive(Clone, Default)]
pub struct PluginCatalog {
    factories: HashMap<String, PluginFactory>,
}

impl PluginCatalog {
    /// 빈 카탈로그
    pub fn new() -> Self {
        Self::default()
    }

    /// 기본 제공 플러그인(demo, activity)이 등록된 카탈로그
    pub fn with_builtins() -> Self {
        let mut catalog = Self::new();
        catalog.register(DemoPlugin::ENTRY, |manifest| {
            Ok(Arc::new(DemoPlugin::from_manifest(manifest)) as Arc<dyn Plugin>)
        });
        catalog.register(ActivityPlugin::ENTRY, |manifest| {
            Ok(Arc::new(ActivityPlugin::from_manifest(manifest)) as Arc<dyn Plugin>)
        });
        catalog
    }

    /// 팩토리 등록 (같은 키는 교체)
    pub fn register<F>(&mut self, entry: impl Into<String>, factory: F)
    where
        F: Fn(&PluginManifest) -> Result<Arc<dyn Plugin>> + Send + Sync + 'static,
    {
        self.factories.insert(entry.into(), Arc::new(factory));
    }

    pub fn contains(&self, entry: &str) -> bool {
        self.factories.contains_key(entry)
    }

    /// 등록된 키 목록 (정렬됨)
    pub fn entries(&self) -> Vec<&str> {
        let mut entries: Vec<_> = self.factories.keys().map(String::as_str).collect();
        entries.sort_unstable();
        entries
    }

    /// 매니페스트로 인스턴스 생성
    pub fn instantiate(&self, manifest: &PluginManifest) -> Result<Arc<dyn Plugin>> {
        let key = manifest.entry_key();
        let factory = self
            .factories
            .get(key)
            .ok_or_else(|| Error::NotFound(format!("No compiled-in plugin for entry '{}'", key)))?;
        factory(manifest)
    }

    /// 디렉토리가 비었을 때 쓰는 데모 플러그인
    pub fn demo_plugin(&self) -> Result<Arc<dyn Plugin>> {
        let manifest = DemoPlugin::default_manifest();
        match self.factories.get(DemoPlugin::ENTRY) {
            Some(factory) => factory(&manifest),
            None => Ok(Arc::new(DemoPlugin::from_manifest(&manifest))),
        }
    }
}

impl std::fmt::Debug for PluginCatalog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginCatalog")
            .field("entries", &self.entries())
            .finish()
    }
}

// ============================================================================
// PluginDiscovery - 디렉토리 스캔
// ============================================================================

/// 발견된 플러그인
#[derive(Clone)]
pub struct DiscoveredPlugin {
    pub manifest: PluginManifest,

    /// 플러그인 디렉토리 경로
    pub path: PathBuf,

    /// 생성된 인스턴스 (아직 초기화 전)
    pub plugin: Arc<dyn Plugin>,
}

impl std::fmt::Debug for DiscoveredPlugin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DiscoveredPlugin")
            .field("manifest", &self.manifest)
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

/// 스캔 결과
#[derive(Debug, Default)]
pub struct Discovery {
    /// 인스턴스 생성까지 성공한 플러그인 (파일 이름 순)
    pub plugins: Vec<DiscoveredPlugin>,

    /// 후보 하위 디렉토리 수 (건너뛴 것 포함)
    pub candidate_count: usize,
}

/// 플러그인 디렉토리 스캐너
pub struct PluginDiscovery<'a> {
    directory: PathBuf,
    catalog: &'a PluginCatalog,
}

impl<'a> PluginDiscovery<'a> {
    pub fn new(directory: impl Into<PathBuf>, catalog: &'a PluginCatalog) -> Self {
        Self {
            directory: directory.into(),
            catalog,
        }
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// 디렉토리 스캔
    ///
    /// 디렉토리가 없으면 빈 결과를 반환합니다. 디렉토리 자체를 열 수 없으면 에러이고,
    /// 읽을 수 없는 개별 항목은 경고 후 건너뜁니다.
    pub async fn discover(&self) -> Result<Discovery> {
        if !fs::try_exists(&self.directory).await.unwrap_or(false) {
            debug!("Plugin directory {:?} does not exist", self.directory);
            return Ok(Discovery::default());
        }

        let mut candidates = Vec::new();
        let mut entries = fs::read_dir(&self.directory).await?;
        loop {
            let entry = match entries.next_entry().await {
                Ok(Some(entry)) => entry,
                Ok(None) => break,
                Err(e) => {
                    warn!("Stopped reading plugin directory {:?}: {}", self.directory, e);
                    break;
                }
            };

            // symlink는 대상을 따라가서 판단
            match fs::metadata(entry.path()).await {
                Ok(meta) if meta.is_dir() => candidates.push(entry.path()),
                Ok(_) => {}
                Err(e) => warn!("Skipping unreadable entry {:?}: {}", entry.path(), e),
            }
        }
        candidates.sort();

        let mut discovery = Discovery {
            plugins: Vec::new(),
            candidate_count: candidates.len(),
        };

        for path in candidates {
            match self.inspect(&path).await {
                Ok(Some(found)) => {
                    debug!("Found plugin {} at {:?}", found.manifest.id, path);
                    discovery.plugins.push(found);
                }
                Ok(None) => {}
                Err(e) => warn!("Skipping plugin candidate {:?}: {}", path, e),
            }
        }

        info!(
            "Discovered {} plugin(s) in {:?}",
            discovery.plugins.len(),
            self.directory
        );
        Ok(discovery)
    }

    /// 후보 하나 검사. 비활성화된 경우 None.
    async fn inspect(&self, path: &Path) -> Result<Option<DiscoveredPlugin>> {
        let manifest = read_manifest(path).await?;

        if !manifest.enabled {
            info!("Plugin {} is disabled in its manifest", manifest.id);
            return Ok(None);
        }

        let plugin = self.catalog.instantiate(&manifest)?;
        Ok(Some(DiscoveredPlugin {
            manifest,
            path: path.to_path_buf(),
            plugin,
        }))
    }
}

/// plugin.json 읽기
pub async fn read_manifest(dir: &Path) -> Result<PluginManifest> {
    let manifest_path = dir.join(PLUGIN_MANIFEST_FILE);
    if !fs::try_exists(&manifest_path).await.unwrap_or(false) {
        return Err(Error::NotFound(format!(
            "{} not found in {:?}",
            PLUGIN_MANIFEST_FILE, dir
        )));
    }

    let content = fs::read_to_string(&manifest_path).await?;
    let manifest: PluginManifest = serde_json::from_str(&content)?;

    if manifest.id.trim().is_empty() {
        return Err(Error::Validation(format!(
            "{:?} has an empty plugin id",
            manifest_path
        )));
    }

    Ok(manifest)
}
