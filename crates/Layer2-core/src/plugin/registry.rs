//! Plugin Registry - 로드된 플러그인 저장소
//!
//! 플러그인 이름을 키로 하며, 로드 순서를 보존합니다.
//! 커맨드 해석과 브로드캐스트 순회 모두 이 순서를 따릅니다.

use super::command::{CommandEntry, CommandHandler, PluginCommand};
use super::traits::Plugin;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

/// 플러그인 실행 통계
///
/// 플러그인이 로드되어 있는 동안 단조 증가하며, 리로드 시에만 초기화됩니다.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PluginStats {
    /// 성공한 실행 수
    pub executions: u64,

    /// 실패한 실행 수 (타임아웃 포함)
    pub errors: u64,

    /// 누적 실행 시간
    pub total_execution_time: Duration,
}

impl PluginStats {
    /// 평균 실행 시간
    pub fn average_execution_time(&self) -> Option<Duration> {
        let attempts = self.executions.saturating_add(self.errors);
        if attempts == 0 {
            return None;
        }
        let nanos = self.total_execution_time.as_nanos() / u128::from(attempts);
        Some(Duration::from_nanos(u64::try_from(nanos).unwrap_or(u64::MAX)))
    }
}

/// 로드된 플러그인 (레지스트리 항목)
pub struct LoadedPlugin {
    /// 플러그인 이름 (키)
    pub name: String,

    /// 표시용 버전
    pub version: String,

    /// 플러그인 인스턴스
    pub plugin: Arc<dyn Plugin>,

    /// 커맨드 테이블 (선언 순서)
    pub commands: Vec<CommandEntry>,

    /// 활성화 여부
    pub active: bool,

    /// 마지막 성공 실행 시각
    pub last_used: Option<chrono::DateTime<chrono::Utc>>,

    /// 실행 통계
    pub stats: PluginStats,

    /// 이 플러그인에 적용되는 호출 타임아웃
    pub timeout: Duration,

    /// 로드 순서
    load_order: usize,
}

impl LoadedPlugin {
    pub fn new(plugin: Arc<dyn Plugin>, commands: Vec<CommandEntry>, timeout: Duration) -> Self {
        let metadata = plugin.metadata();
        Self {
            name: metadata.name,
            version: metadata.version,
            plugin,
            commands,
            active: true,
            last_used: None,
            stats: PluginStats::default(),
            timeout,
            load_order: 0,
        }
    }

    /// 커맨드 조회
    pub fn command(&self, name: &str) -> Option<&CommandEntry> {
        self.commands.iter().find(|entry| entry.name() == name)
    }
}

/// 커맨드 디스패치 대상
#[derive(Clone)]
pub struct CommandTarget {
    pub plugin_name: String,
    pub command: PluginCommand,
    pub handler: Arc<dyn CommandHandler>,
    pub timeout: Duration,
}

/// 브로드캐스트/정리 대상
#[derive(Clone)]
pub struct PluginHandle {
    pub name: String,
    pub plugin: Arc<dyn Plugin>,
    pub timeout: Duration,
}

/// 사용 가능한 커맨드 (플러그인 이름 + 디스크립터)
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AvailableCommand {
    pub plugin: String,
    pub command: PluginCommand,
}

/// 플러그인 통계 스냅샷
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PluginStatsSnapshot {
    pub name: String,
    pub version: String,
    pub active: bool,
    pub command_count: usize,
    pub stats: PluginStats,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_used: Option<chrono::DateTime<chrono::Utc>>,
}

/// 플러그인 레지스트리
pub struct PluginRegistry {
    /// 플러그인 저장소 (이름 -> LoadedPlugin)
    plugins: RwLock<HashMap<String, LoadedPlugin>>,

    /// 로드 카운터
    load_counter: RwLock<usize>,
}

impl PluginRegistry {
    /// 새 레지스트리 생성
    pub fn new() -> Self {
        Self {
            plugins: RwLock::new(HashMap::new()),
            load_counter: RwLock::new(0),
        }
    }

    /// 플러그인 등록
    pub async fn register(&self, mut entry: LoadedPlugin) -> bool {
        let mut plugins = self.plugins.write().await;

        if plugins.contains_key(&entry.name) {
            warn!("Plugin {} is already registered", entry.name);
            return false;
        }

        let mut counter = self.load_counter.write().await;
        *counter += 1;
        entry.load_order = *counter;

        info!(
            "Registered plugin: {} (v{}) with {} command(s)",
            entry.name,
            entry.version,
            entry.commands.len()
        );
        plugins.insert(entry.name.clone(), entry);
        true
    }

    /// 플러그인 등록 해제
    pub async fn unregister(&self, name: &str) -> Option<Arc<dyn Plugin>> {
        let mut plugins = self.plugins.write().await;

        if let Some(entry) = plugins.remove(name) {
            info!("Unregistered plugin: {}", name);
            Some(entry.plugin)
        } else {
            None
        }
    }

    /// 플러그인 조회
    pub async fn get(&self, name: &str) -> Option<Arc<dyn Plugin>> {
        let plugins = self.plugins.read().await;
        plugins.get(name).map(|entry| Arc::clone(&entry.plugin))
    }

    /// 플러그인 활성화/비활성화
    pub async fn set_active(&self, name: &str, active: bool) -> bool {
        let mut plugins = self.plugins.write().await;
        if let Some(entry) = plugins.get_mut(name) {
            entry.active = active;
            debug!("Set plugin {} active = {}", name, active);
            true
        } else {
            false
        }
    }

    /// 커맨드 이름으로 처리할 플러그인 찾기
    ///
    /// 로드 순서대로 활성 플러그인을 훑어 처음 일치하는 플러그인이 이깁니다.
    pub async fn find_command(&self, command: &str) -> Option<CommandTarget> {
        let plugins = self.plugins.read().await;
        Self::ordered(&plugins)
            .into_iter()
            .filter(|entry| entry.active)
            .find_map(|entry| {
                entry.command(command).map(|cmd| CommandTarget {
                    plugin_name: entry.name.clone(),
                    command: cmd.command.clone(),
                    handler: Arc::clone(&cmd.handler),
                    timeout: entry.timeout,
                })
            })
    }

    /// 활성 플러그인 중 커맨드 보유 여부
    pub async fn has_command(&self, command: &str) -> bool {
        let plugins = self.plugins.read().await;
        plugins
            .values()
            .any(|entry| entry.active && entry.command(command).is_some())
    }

    /// 활성 플러그인의 커맨드 목록 (로드 순서, 테이블 순서)
    pub async fn available_commands(&self) -> Vec<AvailableCommand> {
        let plugins = self.plugins.read().await;
        Self::ordered(&plugins)
            .into_iter()
            .filter(|entry| entry.active)
            .flat_map(|entry| {
                entry.commands.iter().map(|cmd| AvailableCommand {
                    plugin: entry.name.clone(),
                    command: cmd.command.clone(),
                })
            })
            .collect()
    }

    /// 활성 플러그인 목록 (로드 순서대로)
    pub async fn list_active(&self) -> Vec<PluginHandle> {
        let plugins = self.plugins.read().await;
        Self::ordered(&plugins)
            .into_iter()
            .filter(|entry| entry.active)
            .map(Self::handle)
            .collect()
    }

    /// 모든 플러그인 목록 (로드 순서대로, 비활성 포함)
    pub async fn list_all(&self) -> Vec<PluginHandle> {
        let plugins = self.plugins.read().await;
        Self::ordered(&plugins).into_iter().map(Self::handle).collect()
    }

    /// 통계 스냅샷 (로드된 모든 플러그인)
    pub async fn stats(&self) -> Vec<PluginStatsSnapshot> {
        let plugins = self.plugins.read().await;
        Self::ordered(&plugins)
            .into_iter()
            .map(|entry| PluginStatsSnapshot {
                name: entry.name.clone(),
                version: entry.version.clone(),
                active: entry.active,
                command_count: entry.commands.len(),
                stats: entry.stats,
                last_used: entry.last_used,
            })
            .collect()
    }

    /// 성공 실행 기록
    pub async fn record_success(&self, name: &str, elapsed: Duration) {
        let mut plugins = self.plugins.write().await;
        if let Some(entry) = plugins.get_mut(name) {
            entry.stats.executions += 1;
            entry.stats.total_execution_time += elapsed;
            entry.last_used = Some(chrono::Utc::now());
        } else {
            debug!("Plugin {} was unloaded before its stats were recorded", name);
        }
    }

    /// 실패 실행 기록
    pub async fn record_failure(&self, name: &str, elapsed: Duration) {
        let mut plugins = self.plugins.write().await;
        if let Some(entry) = plugins.get_mut(name) {
            entry.stats.errors += 1;
            entry.stats.total_execution_time += elapsed;
        } else {
            debug!("Plugin {} was unloaded before its stats were recorded", name);
        }
    }

    /// 리로드: 커맨드 테이블 교체, 통계 초기화, 로드 순서 유지
    pub async fn reset(&self, name: &str, commands: Vec<CommandEntry>, timeout: Duration) -> bool {
        let mut plugins = self.plugins.write().await;
        if let Some(entry) = plugins.get_mut(name) {
            entry.commands = commands;
            entry.timeout = timeout;
            entry.stats = PluginStats::default();
            entry.last_used = None;
            entry.active = true;
            true
        } else {
            false
        }
    }

    /// 플러그인 존재 여부 확인
    pub async fn contains(&self, name: &str) -> bool {
        let plugins = self.plugins.read().await;
        plugins.contains_key(name)
    }

    /// 플러그인 수
    pub async fn len(&self) -> usize {
        let plugins = self.plugins.read().await;
        plugins.len()
    }

    /// 비어있는지 확인
    pub async fn is_empty(&self) -> bool {
        let plugins = self.plugins.read().await;
        plugins.is_empty()
    }

    /// 모든 플러그인 클리어
    pub async fn clear(&self) {
        let mut plugins = self.plugins.write().await;
        plugins.clear();
        *self.load_counter.write().await = 0;
    }

    /// 로드 순서에 따라 정렬된 플러그인 이름 목록
    pub async fn load_order(&self) -> Vec<String> {
        let plugins = self.plugins.read().await;
        Self::ordered(&plugins)
            .into_iter()
            .map(|entry| entry.name.clone())
            .collect()
    }

    fn ordered(plugins: &HashMap<String, LoadedPlugin>) -> Vec<&LoadedPlugin> {
        let mut ordered: Vec<_> = plugins.values().collect();
        ordered.sort_by_key(|entry| entry.load_order);
        ordered
    }

    fn handle(entry: &LoadedPlugin) -> PluginHandle {
        PluginHandle {
            name: entry.name.clone(),
            plugin: Arc::clone(&entry.plugin),
            timeout: entry.timeout,
        }
    }
}

impl Default for PluginRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plugin::command::{handler_fn, PluginCommand};
    use crate::plugin::manifest::PluginMetadata;
    use crate::plugin::traits::PluginResult;
    use async_trait::async_trait;
    use futures::FutureExt;

    struct TestPlugin {
        name: String,
    }

    #[async_trait]
    impl Plugin for TestPlugin {
        fn metadata(&self) -> PluginMetadata {
            PluginMetadata::new(format!("test.{}", self.name), &self.name, "1.0.0")
        }
    }

    fn entry(name: &str, commands: &[&str]) -> LoadedPlugin {
        let plugin = Arc::new(TestPlugin { name: name.into() });
        let commands = commands
            .iter()
            .map(|cmd| {
                CommandEntry::new(
                    PluginCommand::new(*cmd, "test"),
                    handler_fn(|_, _| async { Ok(PluginResult::ok()) }.boxed()),
                )
            })
            .collect();
        LoadedPlugin::new(plugin, commands, Duration::from_secs(1))
    }

    #[tokio::test]
    async fn test_register_plugin() {
        let registry = PluginRegistry::new();

        assert!(registry.register(entry("alpha", &["a"])).await);
        assert_eq!(registry.len().await, 1);
        assert!(registry.contains("alpha").await);
    }

    #[tokio::test]
    async fn test_duplicate_registration() {
        let registry = PluginRegistry::new();

        assert!(registry.register(entry("alpha", &["a"])).await);
        assert!(!registry.register(entry("alpha", &["b"])).await); // Should fail
        assert_eq!(registry.len().await, 1);
    }

    #[tokio::test]
    async fn test_first_match_wins() {
        let registry = PluginRegistry::new();
        registry.register(entry("first", &["shared", "only-first"])).await;
        registry.register(entry("second", &["shared"])).await;

        for _ in 0..5 {
            let target = registry.find_command("shared").await.unwrap();
            assert_eq!(target.plugin_name, "first");
        }

        registry.set_active("first", false).await;
        let target = registry.find_command("shared").await.unwrap();
        assert_eq!(target.plugin_name, "second");
        assert!(registry.find_command("only-first").await.is_none());
        assert!(!registry.has_command("only-first").await);
    }

    #[tokio::test]
    async fn test_available_commands_order() {
        let registry = PluginRegistry::new();
        registry.register(entry("b-plugin", &["x", "y"])).await;
        registry.register(entry("a-plugin", &["z"])).await;

        let commands: Vec<_> = registry
            .available_commands()
            .await
            .into_iter()
            .map(|c| (c.plugin, c.command.name))
            .collect();

        assert_eq!(
            commands,
            vec![
                ("b-plugin".to_string(), "x".to_string()),
                ("b-plugin".to_string(), "y".to_string()),
                ("a-plugin".to_string(), "z".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn test_stats_recording() {
        let registry = PluginRegistry::new();
        registry.register(entry("alpha", &["a"])).await;

        registry.record_success("alpha", Duration::from_millis(10)).await;
        registry.record_success("alpha", Duration::from_millis(20)).await;
        registry.record_failure("alpha", Duration::from_millis(30)).await;

        let snapshots = registry.stats().await;
        let snapshot = &snapshots[0];
        assert_eq!(snapshot.stats.executions, 2);
        assert_eq!(snapshot.stats.errors, 1);
        assert_eq!(snapshot.stats.total_execution_time, Duration::from_millis(60));
        assert_eq!(
            snapshot.stats.average_execution_time(),
            Some(Duration::from_millis(20))
        );
        assert!(snapshot.last_used.is_some());

        assert!(registry.reset("alpha", vec![], Duration::from_secs(2)).await);
        let snapshots = registry.stats().await;
        let snapshot = &snapshots[0];
        assert_eq!(snapshot.stats, PluginStats::default());
        assert_eq!(snapshot.command_count, 0);
    }

    #[tokio::test]
    async fn test_inactive_listing() {
        let registry = PluginRegistry::new();
        registry.register(entry("alpha", &["a"])).await;
        registry.register(entry("beta", &["b"])).await;

        registry.set_active("alpha", false).await;
        assert_eq!(registry.list_active().await.len(), 1);
        assert_eq!(registry.list_all().await.len(), 2);
        assert_eq!(registry.stats().await.len(), 2);
        assert!(!registry.set_active("missing", true).await);

        registry.clear().await;
        assert!(registry.is_empty().await);
        assert!(registry.load_order().await.is_empty());
    }

    #[test]
    fn test_average_with_huge_attempt_count() {
        let stats = PluginStats {
            executions: 1 << 32,
            errors: 0,
            total_execution_time: Duration::from_secs(1 << 32),
        };
        assert_eq!(stats.average_execution_time(), Some(Duration::from_secs(1)));

        let stats = PluginStats {
            executions: u64::MAX,
            errors: 0,
            total_execution_time: Duration::from_millis(5),
        };
        assert_eq!(stats.average_execution_time(), Some(Duration::ZERO));
    }
}
