//! Plugin Manager - 플러그인 라이프사이클, 디스패치, 브로드캐스트
//!
//! ## 상태 전이
//!
//! ```text
//! Uninitialized → Initializing → Ready → ShuttingDown → Shutdown
//!                      └──────→ Disabled (설정에서 비활성화)
//! ```
//!
//! - 커맨드 디스패치: 단일 대상, 타임아웃 경주, 통계 갱신, 실패 시 사용자 알림
//! - 이벤트 브로드캐스트: 모든 활성 플러그인에 동시 전달, 플러그인별 실패 격리
//! - 종료: 모든 플러그인 cleanup을 동시에 실행한 뒤 레지스트리 비움

use super::command::CommandEntry;
use super::discovery::{PluginCatalog, PluginDiscovery};
use super::events::PluginEvent;
use super::execution::{race_timeout, run_isolated, HookFailure};
use super::registry::{AvailableCommand, LoadedPlugin, PluginRegistry, PluginStatsSnapshot};
use super::traits::{CommandInvocation, HealthStatus, Plugin, PluginData};
use futures::future::join_all;
use parking_lot::RwLock;
use parley_foundation::{Error, PluginsConfig, Result};
use serde::Serialize;
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

/// 커맨드 실패 시 사용자에게 보내는 메시지
pub const COMMAND_FAILURE_MESSAGE: &str =
    "Sorry, something went wrong while running that command. Please try again later.";

/// 매니저 상태
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ManagerState {
    Uninitialized,
    Initializing,
    Ready,
    /// 설정에서 비활성화됨 (모든 호출이 no-op)
    Disabled,
    ShuttingDown,
    Shutdown,
}

impl std::fmt::Display for ManagerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Uninitialized => write!(f, "uninitialized"),
            Self::Initializing => write!(f, "initializing"),
            Self::Ready => write!(f, "ready"),
            Self::Disabled => write!(f, "disabled"),
            Self::ShuttingDown => write!(f, "shutting_down"),
            Self::Shutdown => write!(f, "shutdown"),
        }
    }
}

/// 플러그인 헬스 체크 결과
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PluginHealth {
    pub name: String,
    pub active: bool,
    pub status: HealthStatus,
    pub elapsed: Duration,
}

/// 플러그인 매니저
///
/// 프로세스 최상위에서 소유하고 필요한 컴포넌트에 `Arc`로 전달합니다.
pub struct PluginManager {
    /// 플러그인 서브시스템 설정
    config: PluginsConfig,

    /// 작업 디렉토리 (플러그인 디렉토리 해석 기준)
    working_dir: PathBuf,

    /// 컴파일타임 플러그인 카탈로그
    catalog: PluginCatalog,

    /// 플러그인 레지스트리
    registry: Arc<PluginRegistry>,

    /// 현재 상태
    state: RwLock<ManagerState>,

    /// initialize/shutdown 직렬화
    lifecycle: Mutex<()>,
}

impl PluginManager {
    /// 새 매니저 생성 (기본 제공 카탈로그 사용)
    pub fn new(config: PluginsConfig, working_dir: impl Into<PathBuf>) -> Self {
        Self::with_catalog(config, working_dir, PluginCatalog::with_builtins())
    }

    /// 카탈로그 지정하여 생성
    pub fn with_catalog(
        config: PluginsConfig,
        working_dir: impl Into<PathBuf>,
        catalog: PluginCatalog,
    ) -> Self {
        Self {
            config,
            working_dir: working_dir.into(),
            catalog,
            registry: Arc::new(PluginRegistry::new()),
            state: RwLock::new(ManagerState::Uninitialized),
            lifecycle: Mutex::new(()),
        }
    }

    // ========================================================================
    // 상태
    // ========================================================================

    /// 현재 상태
    pub fn state(&self) -> ManagerState {
        *self.state.read()
    }

    /// 디스패치/브로드캐스트 가능 여부
    pub fn is_ready(&self) -> bool {
        self.state() == ManagerState::Ready
    }

    /// 설정상 활성화 여부
    pub fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    /// 기본 호출 타임아웃
    pub fn default_timeout(&self) -> Duration {
        self.config.timeout()
    }

    fn set_state(&self, state: ManagerState) {
        let mut current = self.state.write();
        debug!("Plugin manager state: {} -> {}", *current, state);
        *current = state;
    }

    /// 레지스트리 접근
    pub fn registry(&self) -> &Arc<PluginRegistry> {
        &self.registry
    }

    // ========================================================================
    // 초기화
    // ========================================================================

    /// 플러그인 디렉토리를 읽어 초기화
    ///
    /// 이미 Ready면 no-op입니다. 디렉토리가 없거나 후보가 없으면 데모 플러그인을 등록합니다.
    pub async fn initialize(&self) {
        let _guard = self.lifecycle.lock().await;
        if !self.begin_initialize() {
            return;
        }

        let directory = self.config.resolve_directory(&self.working_dir);
        let discovery = PluginDiscovery::new(&directory, &self.catalog);

        let candidates = match discovery.discover().await {
            Ok(found) => found,
            Err(e) => {
                warn!("Failed to read plugin directory {:?}: {}", directory, e);
                Default::default()
            }
        };

        let mut loaded = 0;
        if candidates.candidate_count == 0 {
            info!(
                "No plugins found in {:?}, registering built-in demo plugin",
                directory
            );
            match self.catalog.demo_plugin() {
                Ok(demo) => {
                    if self.load_unguarded(demo).await.is_ok() {
                        loaded += 1;
                    }
                }
                Err(e) => error!("Failed to create demo plugin: {}", e),
            }
        } else {
            for found in candidates.plugins {
                match self.load_unguarded(found.plugin).await {
                    Ok(()) => loaded += 1,
                    Err(e) => warn!("Skipping plugin at {:?}: {}", found.path, e),
                }
            }
        }

        self.set_state(ManagerState::Ready);
        info!(
            "Plugin manager ready: {} plugin(s) loaded, {} candidate(s) skipped",
            loaded,
            candidates.candidate_count.saturating_sub(loaded)
        );
    }

    /// 명시적 플러그인 목록으로 초기화 (엔트리 포인트 목록)
    pub async fn initialize_with(&self, plugins: Vec<Arc<dyn Plugin>>) {
        let _guard = self.lifecycle.lock().await;
        if !self.begin_initialize() {
            return;
        }

        let mut loaded = 0;
        for plugin in plugins {
            match self.load_unguarded(plugin).await {
                Ok(()) => loaded += 1,
                Err(e) => warn!("Skipping plugin: {}", e),
            }
        }

        self.set_state(ManagerState::Ready);
        info!("Plugin manager ready: {} plugin(s) loaded", loaded);
    }

    /// 초기화를 진행할지 결정하고 상태 전이
    fn begin_initialize(&self) -> bool {
        match self.state() {
            ManagerState::Ready | ManagerState::Disabled => {
                debug!("Plugin manager already initialized ({})", self.state());
                return false;
            }
            _ => {}
        }

        if !self.config.enabled {
            info!("Plugin system is disabled by configuration");
            self.set_state(ManagerState::Disabled);
            return false;
        }

        self.set_state(ManagerState::Initializing);
        true
    }

    // ========================================================================
    // 플러그인 로드/언로드
    // ========================================================================

    /// 플러그인 로드 (initialize → 커맨드 테이블 구성 → 등록)
    pub async fn load_plugin(&self, plugin: Arc<dyn Plugin>) -> Result<()> {
        match self.state() {
            ManagerState::Initializing | ManagerState::Ready => self.load_unguarded(plugin).await,
            ManagerState::Disabled => Err(Error::Plugin("Plugin system is disabled".into())),
            state => Err(Error::Plugin(format!(
                "Cannot load plugins while manager is {}",
                state
            ))),
        }
    }

    async fn load_unguarded(&self, plugin: Arc<dyn Plugin>) -> Result<()> {
        let metadata = plugin.metadata();
        let name = metadata.name.clone();

        if name.trim().is_empty() {
            return Err(Error::Plugin(format!(
                "Plugin {} has an empty name",
                metadata.id
            )));
        }

        if self.registry.contains(&name).await {
            return Err(Error::plugin(&name, "a plugin with this name is already loaded"));
        }

        info!("Loading plugin: {} (v{})", name, metadata.version);

        // 의존성 검사
        for dep in &metadata.dependencies {
            if dep.optional {
                continue;
            }
            match self.registry.get(&dep.name).await {
                None => warn!(
                    "Plugin {} missing dependency: {}. Continuing anyway.",
                    name, dep.name
                ),
                Some(loaded) => {
                    let satisfied = loaded
                        .metadata()
                        .parsed_version()
                        .is_some_and(|v| v.satisfies(&dep.min_version));
                    if !satisfied {
                        warn!(
                            "Plugin {} requires {} >= {}. Continuing anyway.",
                            name, dep.name, dep.min_version
                        );
                    }
                }
            }
        }

        let init_target = Arc::clone(&plugin);
        if let Err(failure) = run_isolated(async move { init_target.initialize().await }).await {
            error!("Plugin {} failed to initialize: {}", name, failure);
            return Err(Error::plugin(&name, format!("initialize failed: {}", failure)));
        }

        let commands = build_command_table(&name, plugin.commands());
        let timeout = self.effective_timeout(plugin.as_ref());

        if !self
            .registry
            .register(LoadedPlugin::new(Arc::clone(&plugin), commands, timeout))
            .await
        {
            // 동시 로드에서 진 인스턴스는 이미 initialize 되었으므로 정리
            cleanup_plugin(&name, plugin).await;
            return Err(Error::plugin(&name, "a plugin with this name is already loaded"));
        }

        info!("Plugin {} loaded successfully", name);
        Ok(())
    }

    /// 플러그인 언로드 (cleanup은 best-effort)
    pub async fn unload_plugin(&self, name: &str) -> Result<()> {
        let plugin = self
            .registry
            .unregister(name)
            .await
            .ok_or_else(|| Error::PluginNotFound(name.to_string()))?;

        cleanup_plugin(name, plugin).await;
        info!("Plugin {} unloaded", name);
        Ok(())
    }

    /// 플러그인 리로드
    ///
    /// cleanup → initialize → 커맨드 테이블 재구성, 통계 초기화. 로드 순서는 유지됩니다.
    /// 재초기화에 실패하면 플러그인은 언로드됩니다.
    pub async fn reload_plugin(&self, name: &str) -> Result<()> {
        let plugin = self
            .registry
            .get(name)
            .await
            .ok_or_else(|| Error::PluginNotFound(name.to_string()))?;

        info!("Reloading plugin: {}", name);
        cleanup_plugin(name, Arc::clone(&plugin)).await;

        let init_target = Arc::clone(&plugin);
        if let Err(failure) = run_isolated(async move { init_target.initialize().await }).await {
            error!("Plugin {} failed to re-initialize: {}", name, failure);
            self.registry.unregister(name).await;
            return Err(Error::plugin(name, format!("initialize failed: {}", failure)));
        }

        let commands = build_command_table(name, plugin.commands());
        let timeout = self.effective_timeout(plugin.as_ref());
        if !self.registry.reset(name, commands, timeout).await {
            return Err(Error::PluginNotFound(name.to_string()));
        }

        info!("Plugin {} reloaded", name);
        Ok(())
    }

    fn effective_timeout(&self, plugin: &dyn Plugin) -> Duration {
        plugin.config().timeout().unwrap_or_else(|| self.config.timeout())
    }

    // ========================================================================
    // 커맨드 디스패치
    // ========================================================================

    /// 커맨드 실행
    ///
    /// 어떤 플러그인이든 성공적으로 처리했으면 true.
    /// 준비되지 않았거나, 처리할 플러그인이 없거나, 실패/타임아웃이면 false.
    pub async fn execute_command(
        &self,
        command: &str,
        invocation: CommandInvocation,
        args: Vec<String>,
    ) -> bool {
        if !self.is_ready() {
            debug!(
                "Ignoring command /{}: plugin manager is {}",
                command,
                self.state()
            );
            return false;
        }

        let Some(target) = self.registry.find_command(command).await else {
            debug!("No active plugin handles /{}", command);
            return false;
        };

        debug!("Dispatching /{} to plugin {}", command, target.plugin_name);

        let handler = Arc::clone(&target.handler);
        let hook_invocation = invocation.clone();
        let start = Instant::now();
        let outcome = race_timeout(target.timeout, async move {
            handler.execute(hook_invocation, args).await
        })
        .await;
        let elapsed = start.elapsed();

        let failure = match outcome {
            Ok(result) if result.success => {
                self.registry.record_success(&target.plugin_name, elapsed).await;
                debug!(
                    "Command /{} handled by {} in {}ms",
                    command,
                    target.plugin_name,
                    elapsed.as_millis()
                );
                return true;
            }
            Ok(result) => HookFailure::Failed(Error::command(
                command,
                result.error.unwrap_or_else(|| "command reported failure".to_string()),
            )),
            Err(failure) => failure,
        };

        self.registry.record_failure(&target.plugin_name, elapsed).await;

        match &failure {
            HookFailure::TimedOut(timeout) => {
                // 협조적인 핸들러에게 알림. 강제 중단은 하지 않음.
                invocation.cancellation_token().cancel();
                warn!(
                    "Command /{} in plugin {} timed out after {}ms",
                    command,
                    target.plugin_name,
                    timeout.as_millis()
                );
            }
            HookFailure::Panicked(reason) => error!(
                "Command /{} in plugin {} panicked: {}",
                command, target.plugin_name, reason
            ),
            HookFailure::Failed(e) => warn!(
                "Command /{} in plugin {} failed: {}",
                command, target.plugin_name, e
            ),
        }

        let notify = invocation.reply(COMMAND_FAILURE_MESSAGE);
        match tokio::time::timeout(target.timeout, notify).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!(
                "Failed to notify chat {} about failed command /{}: {}",
                invocation.context.chat_id, command, e
            ),
            Err(_) => warn!(
                "Timed out notifying chat {} about failed command /{}",
                invocation.context.chat_id, command
            ),
        }

        false
    }

    // ========================================================================
    // 이벤트 브로드캐스트
    // ========================================================================

    /// 모든 활성 플러그인에 이벤트 전달
    ///
    /// 모든 전달을 동시에 시작하고 전부 끝날 때까지 기다립니다.
    /// 한 플러그인의 실패나 타임아웃은 로그로만 남습니다.
    pub async fn broadcast_event(&self, event: PluginEvent) {
        if !self.is_ready() {
            debug!(
                "Ignoring {} event: plugin manager is {}",
                event.event_type,
                self.state()
            );
            return;
        }

        let event = Arc::new(event);
        let targets = self.registry.list_active().await;
        debug!(
            "Broadcasting {} event to {} plugin(s)",
            event.event_type,
            targets.len()
        );

        let deliveries = targets.into_iter().map(|target| {
            let event = Arc::clone(&event);
            async move {
                let plugin = Arc::clone(&target.plugin);
                let hook_event = Arc::clone(&event);
                let outcome =
                    race_timeout(target.timeout, async move { plugin.on_event(&hook_event).await })
                        .await;

                if let Err(failure) = outcome {
                    if failure.is_timeout() {
                        warn!(
                            "Plugin {} timed out handling {} event",
                            target.name, event.event_type
                        );
                    } else {
                        warn!(
                            "Plugin {} failed to handle {} event: {}",
                            target.name, event.event_type, failure
                        );
                    }
                }
            }
        });

        join_all(deliveries).await;
    }

    /// 모든 활성 플러그인에 데이터 전달
    ///
    /// 브로드캐스트와 같은 격리 규칙을 따르며, 성공적으로 받은 플러그인 수를 반환합니다.
    pub async fn ingest_data(&self, data: PluginData) -> usize {
        if !self.is_ready() {
            return 0;
        }

        let data = Arc::new(data);
        let targets = self.registry.list_active().await;

        let deliveries = targets.into_iter().map(|target| {
            let data = Arc::clone(&data);
            async move {
                let plugin = Arc::clone(&target.plugin);
                let hook_data = Arc::clone(&data);
                match race_timeout(target.timeout, async move { plugin.on_data(&hook_data).await })
                    .await
                {
                    Ok(()) => true,
                    Err(failure) => {
                        warn!(
                            "Plugin {} failed to ingest {} data: {}",
                            target.name, data.kind, failure
                        );
                        false
                    }
                }
            }
        });

        join_all(deliveries)
            .await
            .into_iter()
            .filter(|accepted| *accepted)
            .count()
    }

    // ========================================================================
    // 조회
    // ========================================================================

    /// 활성 플러그인의 커맨드 목록
    pub async fn get_available_commands(&self) -> Vec<AvailableCommand> {
        self.registry.available_commands().await
    }

    /// 로드된 모든 플러그인의 통계
    pub async fn get_plugin_stats(&self) -> Vec<PluginStatsSnapshot> {
        self.registry.stats().await
    }

    /// 활성 플래그 변경 (라이프사이클 훅은 호출하지 않음)
    pub async fn set_plugin_active(&self, name: &str, active: bool) -> bool {
        let changed = self.registry.set_active(name, active).await;
        if changed {
            info!(
                "Plugin {} {}",
                name,
                if active { "activated" } else { "deactivated" }
            );
        }
        changed
    }

    /// 활성 플러그인 중 커맨드 보유 여부
    pub async fn has_command(&self, command: &str) -> bool {
        self.registry.has_command(command).await
    }

    /// 로드된 모든 플러그인 헬스 체크
    pub async fn health_report(&self) -> Vec<PluginHealth> {
        let active: HashSet<String> = self
            .registry
            .list_active()
            .await
            .into_iter()
            .map(|handle| handle.name)
            .collect();
        let targets = self.registry.list_all().await;

        let checks = targets.into_iter().map(|target| {
            let is_active = active.contains(&target.name);
            async move {
                let plugin = Arc::clone(&target.plugin);
                let start = Instant::now();
                let status =
                    match race_timeout(target.timeout, async move { plugin.health_check().await })
                        .await
                    {
                        Ok(status) => status,
                        Err(failure) => HealthStatus::Unhealthy(failure.to_string()),
                    };

                PluginHealth {
                    name: target.name,
                    active: is_active,
                    status,
                    elapsed: start.elapsed(),
                }
            }
        });

        join_all(checks).await
    }

    // ========================================================================
    // 종료
    // ========================================================================

    /// 종료
    ///
    /// 모든 플러그인(비활성 포함)의 cleanup을 동시에 실행하고 레지스트리를 비웁니다.
    /// 이후 initialize()는 새로운 발견 사이클입니다.
    pub async fn shutdown(&self) {
        let _guard = self.lifecycle.lock().await;

        match self.state() {
            ManagerState::Shutdown => return,
            ManagerState::Uninitialized | ManagerState::Disabled => {
                self.set_state(ManagerState::Shutdown);
                return;
            }
            _ => {}
        }

        info!("Shutting down plugin manager");
        self.set_state(ManagerState::ShuttingDown);

        let targets = self.registry.list_all().await;
        let cleanups = targets
            .into_iter()
            .map(|target| cleanup_plugin_owned(target.name, target.plugin));
        join_all(cleanups).await;

        self.registry.clear().await;
        self.set_state(ManagerState::Shutdown);
        info!("Plugin manager shut down");
    }
}

/// 커맨드 테이블 구성 (플러그인 내 중복 이름은 첫 항목 유지)
fn build_command_table(plugin: &str, entries: Vec<CommandEntry>) -> Vec<CommandEntry> {
    let mut seen = HashSet::new();
    entries
        .into_iter()
        .filter(|entry| {
            if entry.name().trim().is_empty() {
                warn!("Plugin {} declares a command with an empty name", plugin);
                return false;
            }
            if !seen.insert(entry.name().to_string()) {
                warn!(
                    "Plugin {} declares command /{} more than once; keeping the first",
                    plugin,
                    entry.name()
                );
                return false;
            }
            true
        })
        .collect()
}

async fn cleanup_plugin(name: &str, plugin: Arc<dyn Plugin>) {
    cleanup_plugin_owned(name.to_string(), plugin).await
}

async fn cleanup_plugin_owned(name: String, plugin: Arc<dyn Plugin>) {
    match run_isolated(async move { plugin.cleanup().await }).await {
        Ok(()) => debug!("Plugin {} cleaned up", name),
        Err(failure) => warn!("Plugin {} cleanup failed: {}", name, failure),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plugin::command::{handler_fn, PluginCommand};
    use crate::plugin::events::EventType;
    use crate::plugin::manifest::{PluginConfig, PluginMetadata};
    use crate::plugin::traits::{ChatTransport, PluginContext, PluginResult};
    use crate::plugin::transport::MemoryTransport;
    use async_trait::async_trait;
    use futures::FutureExt;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// 테스트용 플러그인
    struct StubPlugin {
        name: String,
        commands: Vec<&'static str>,
        delay: Duration,
        init_delay: Duration,
        fail_events: bool,
        fail_init: bool,
        timeout: Option<Duration>,
        calls: Arc<AtomicUsize>,
        events: Arc<AtomicUsize>,
        cleanups: Arc<AtomicUsize>,
    }

    impl StubPlugin {
        fn new(name: &str, commands: &[&'static str]) -> Self {
            Self {
                name: name.to_string(),
                commands: commands.to_vec(),
                delay: Duration::ZERO,
                init_delay: Duration::ZERO,
                fail_events: false,
                fail_init: false,
                timeout: None,
                calls: Arc::new(AtomicUsize::new(0)),
                events: Arc::new(AtomicUsize::new(0)),
                cleanups: Arc::new(AtomicUsize::new(0)),
            }
        }

        fn with_delay(mut self, delay: Duration) -> Self {
            self.delay = delay;
            self
        }

        fn with_init_delay(mut self, delay: Duration) -> Self {
            self.init_delay = delay;
            self
        }

        fn with_cleanups(mut self, cleanups: &Arc<AtomicUsize>) -> Self {
            self.cleanups = Arc::clone(cleanups);
            self
        }

        fn failing_events(mut self) -> Self {
            self.fail_events = true;
            self
        }

        fn failing_init(mut self) -> Self {
            self.fail_init = true;
            self
        }

        fn with_timeout(mut self, timeout: Duration) -> Self {
            self.timeout = Some(timeout);
            self
        }
    }

    #[async_trait]
    impl Plugin for StubPlugin {
        fn metadata(&self) -> PluginMetadata {
            PluginMetadata::new(format!("test.{}", self.name), &self.name, "1.0.0")
        }

        fn config(&self) -> PluginConfig {
            match self.timeout {
                Some(timeout) => PluginConfig::new().with_timeout(timeout),
                None => PluginConfig::new(),
            }
        }

        fn commands(&self) -> Vec<CommandEntry> {
            self.commands
                .iter()
                .map(|name| {
                    let calls = Arc::clone(&self.calls);
                    let delay = self.delay;
                    let fail = *name == "explode";
                    CommandEntry::new(
                        PluginCommand::new(*name, "test command"),
                        handler_fn(move |_, _| {
                            let calls = Arc::clone(&calls);
                            async move {
                                calls.fetch_add(1, Ordering::SeqCst);
                                tokio::time::sleep(delay).await;
                                if fail {
                                    return Err(Error::Plugin("exploded".into()));
                                }
                                Ok(PluginResult::ok())
                            }
                            .boxed()
                        }),
                    )
                })
                .collect()
        }

        async fn initialize(&self) -> Result<()> {
            tokio::time::sleep(self.init_delay).await;
            if self.fail_init {
                return Err(Error::Plugin("missing api key".into()));
            }
            Ok(())
        }

        async fn on_event(&self, _event: &PluginEvent) -> Result<()> {
            tokio::time::sleep(self.delay).await;
            if self.fail_events {
                return Err(Error::Plugin("event handler broke".into()));
            }
            self.events.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn cleanup(&self) -> Result<()> {
            self.cleanups.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    /// 에러를 반환하거나 멈춰 버리는 핸들러만 가진 플러그인
    struct Misbehaving;

    #[async_trait]
    impl Plugin for Misbehaving {
        fn metadata(&self) -> PluginMetadata {
            PluginMetadata::new("test.misbehaving", "misbehaving", "1.0.0")
        }

        fn commands(&self) -> Vec<CommandEntry> {
            vec![
                CommandEntry::new(
                    PluginCommand::new("boom", "Always fails"),
                    handler_fn(|_, _| async { Err(Error::Plugin("boom".into())) }.boxed()),
                ),
                CommandEntry::new(
                    PluginCommand::new("panic", "Panics without arguments"),
                    handler_fn(|_, args| {
                        async move {
                            if args.is_empty() {
                                panic!("handler blew up");
                            }
                            Ok(PluginResult::ok())
                        }
                        .boxed()
                    }),
                ),
                CommandEntry::new(
                    PluginCommand::new("never", "Never finishes"),
                    handler_fn(|_, _| futures::future::pending::<Result<PluginResult>>().boxed()),
                ),
            ]
        }
    }

    /// 전송이 항상 실패하거나 끝나지 않는 채널
    struct BrokenTransport {
        attempts: AtomicUsize,
        hang: bool,
    }

    impl BrokenTransport {
        fn failing() -> Self {
            Self {
                attempts: AtomicUsize::new(0),
                hang: false,
            }
        }

        fn hanging() -> Self {
            Self {
                attempts: AtomicUsize::new(0),
                hang: true,
            }
        }
    }

    #[async_trait]
    impl ChatTransport for BrokenTransport {
        async fn send_message(&self, _chat_id: &str, _text: &str) -> Result<()> {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            if self.hang {
                futures::future::pending::<()>().await;
            }
            Err(Error::Transport("connection reset".into()))
        }
    }

    fn manager(timeout_ms: u64) -> PluginManager {
        PluginManager::new(
            PluginsConfig::default().with_timeout_ms(timeout_ms),
            std::env::temp_dir(),
        )
    }

    fn invocation(transport: &Arc<MemoryTransport>) -> CommandInvocation {
        CommandInvocation::new(PluginContext::new("user-1", "chat-1"), transport.clone())
    }

    fn message_event() -> PluginEvent {
        PluginEvent::message_received("hi", PluginContext::new("user-1", "chat-1"))
    }

    #[tokio::test]
    async fn test_not_ready_is_noop() {
        let manager = manager(1000);
        let transport = Arc::new(MemoryTransport::new());

        assert_eq!(manager.state(), ManagerState::Uninitialized);
        assert!(!manager.execute_command("demo", invocation(&transport), vec![]).await);
        manager.broadcast_event(message_event()).await;
        assert!(transport.messages().is_empty());
    }

    #[tokio::test]
    async fn test_disabled_manager() {
        let manager = PluginManager::new(PluginsConfig::disabled(), std::env::temp_dir());
        let stub = StubPlugin::new("stub", &["ping"]);
        let calls = Arc::clone(&stub.calls);

        manager.initialize_with(vec![Arc::new(stub)]).await;
        assert_eq!(manager.state(), ManagerState::Disabled);

        let transport = Arc::new(MemoryTransport::new());
        assert!(!manager.execute_command("ping", invocation(&transport), vec![]).await);
        manager.broadcast_event(message_event()).await;
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert!(manager.get_plugin_stats().await.is_empty());
        assert!(manager
            .load_plugin(Arc::new(StubPlugin::new("late", &[])))
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_initialize_is_idempotent() {
        let manager = manager(1000);
        manager
            .initialize_with(vec![Arc::new(StubPlugin::new("one", &["a"]))])
            .await;
        manager
            .initialize_with(vec![Arc::new(StubPlugin::new("two", &["b"]))])
            .await;

        assert!(manager.is_ready());
        assert_eq!(manager.registry().load_order().await, vec!["one"]);
    }

    #[tokio::test]
    async fn test_load_failure_is_isolated() {
        let manager = manager(1000);
        manager
            .initialize_with(vec![
                Arc::new(StubPlugin::new("broken", &["x"]).failing_init()),
                Arc::new(StubPlugin::new("healthy", &["y"])),
                Arc::new(StubPlugin::new("healthy", &["z"])),
            ])
            .await;

        assert_eq!(manager.registry().load_order().await, vec!["healthy"]);
        assert!(manager.has_command("y").await);
        assert!(!manager.has_command("x").await);
        assert!(!manager.has_command("z").await);
    }

    #[tokio::test]
    async fn test_first_match_dispatch() {
        let manager = manager(1000);
        let first = StubPlugin::new("first", &["shared"]);
        let second = StubPlugin::new("second", &["shared"]);
        let first_calls = Arc::clone(&first.calls);
        let second_calls = Arc::clone(&second.calls);
        manager
            .initialize_with(vec![Arc::new(first), Arc::new(second)])
            .await;

        let transport = Arc::new(MemoryTransport::new());
        for _ in 0..3 {
            assert!(manager.execute_command("shared", invocation(&transport), vec![]).await);
        }

        assert_eq!(first_calls.load(Ordering::SeqCst), 3);
        assert_eq!(second_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_unknown_command() {
        let manager = manager(1000);
        manager
            .initialize_with(vec![Arc::new(StubPlugin::new("stub", &["ping"]))])
            .await;

        let transport = Arc::new(MemoryTransport::new());
        assert!(!manager.execute_command("nope", invocation(&transport), vec![]).await);
        assert!(transport.messages().is_empty());
        assert_eq!(manager.get_plugin_stats().await[0].stats.errors, 0);
    }

    #[tokio::test]
    async fn test_failed_command_notifies_user() {
        let manager = manager(1000);
        manager
            .initialize_with(vec![Arc::new(StubPlugin::new("stub", &["explode"]))])
            .await;

        let transport = Arc::new(MemoryTransport::new());
        assert!(!manager.execute_command("explode", invocation(&transport), vec![]).await);

        assert_eq!(transport.texts_for("chat-1"), vec![COMMAND_FAILURE_MESSAGE]);
        let stats = manager.get_plugin_stats().await;
        let stats = &stats[0];
        assert_eq!(stats.stats.errors, 1);
        assert_eq!(stats.stats.executions, 0);
        assert!(stats.last_used.is_none());
    }

    #[tokio::test]
    async fn test_failure_result_counts_as_error() {
        let manager = manager(1000);
        let plugin = StubPlugin::new("stub", &[]);
        manager.initialize_with(vec![Arc::new(plugin)]).await;

        struct Refuser;

        #[async_trait]
        impl Plugin for Refuser {
            fn metadata(&self) -> PluginMetadata {
                PluginMetadata::new("test.refuser", "refuser", "1.0.0")
            }

            fn commands(&self) -> Vec<CommandEntry> {
                vec![CommandEntry::new(
                    PluginCommand::new("describe", "Describe an image"),
                    handler_fn(|_, _| {
                        async { Ok(PluginResult::failure("no vision client configured")) }.boxed()
                    }),
                )]
            }
        }

        manager.load_plugin(Arc::new(Refuser)).await.unwrap();

        let transport = Arc::new(MemoryTransport::new());
        assert!(!manager.execute_command("describe", invocation(&transport), vec![]).await);
        let stats = manager.get_plugin_stats().await;
        assert_eq!(stats[1].name, "refuser");
        assert_eq!(stats[1].stats.errors, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_boundary() {
        let manager = manager(100);
        manager
            .initialize_with(vec![
                Arc::new(StubPlugin::new("fast", &["fast"]).with_delay(Duration::from_millis(90))),
                Arc::new(StubPlugin::new("slow", &["slow"]).with_delay(Duration::from_millis(110))),
            ])
            .await;

        let transport = Arc::new(MemoryTransport::new());
        assert!(manager.execute_command("fast", invocation(&transport), vec![]).await);

        let slow_invocation = invocation(&transport);
        let token = slow_invocation.cancellation_token().clone();
        assert!(!manager.execute_command("slow", slow_invocation, vec![]).await);
        assert!(token.is_cancelled());

        let stats = manager.get_plugin_stats().await;
        assert_eq!(stats[0].stats.executions, 1);
        assert!(stats[0].stats.total_execution_time > Duration::ZERO);
        assert_eq!(stats[1].stats.errors, 1);
        assert!(stats[1].stats.total_execution_time >= Duration::from_millis(100));
    }

    #[tokio::test(start_paused = true)]
    async fn test_plugin_timeout_override() {
        let manager = manager(100);
        manager
            .initialize_with(vec![Arc::new(
                StubPlugin::new("patient", &["wait"])
                    .with_delay(Duration::from_millis(300))
                    .with_timeout(Duration::from_millis(500)),
            )])
            .await;

        let transport = Arc::new(MemoryTransport::new());
        assert!(manager.execute_command("wait", invocation(&transport), vec![]).await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_misbehaving_handlers_with_broken_transport() {
        let manager = manager(100);
        manager.initialize_with(vec![Arc::new(Misbehaving)]).await;
        let transport = Arc::new(BrokenTransport::failing());

        let mut previous = Duration::ZERO;
        for (i, command) in ["boom", "panic", "never"].into_iter().enumerate() {
            let invocation =
                CommandInvocation::new(PluginContext::new("user-1", "chat-1"), transport.clone());
            assert!(!manager.execute_command(command, invocation, vec![]).await);

            let stats = manager.get_plugin_stats().await;
            let stats = stats[0].stats;
            assert_eq!(stats.errors, i as u64 + 1);
            assert_eq!(stats.executions, 0);
            assert!(stats.total_execution_time >= previous);
            previous = stats.total_execution_time;
        }

        // 알림 실패는 로그로만 남고 호출자에게 올라오지 않음
        assert_eq!(transport.attempts.load(Ordering::SeqCst), 3);
        assert!(previous >= Duration::from_millis(100));
    }

    #[tokio::test(start_paused = true)]
    async fn test_failure_notice_is_bounded_by_timeout() {
        let manager = manager(100);
        manager.initialize_with(vec![Arc::new(Misbehaving)]).await;
        let transport = Arc::new(BrokenTransport::hanging());

        let start = Instant::now();
        let invocation =
            CommandInvocation::new(PluginContext::new("user-1", "chat-1"), transport.clone());
        assert!(!manager.execute_command("never", invocation, vec![]).await);

        // 핸들러 100ms + 알림 100ms
        assert!(start.elapsed() < Duration::from_secs(1));
        assert_eq!(transport.attempts.load(Ordering::SeqCst), 1);
        assert_eq!(manager.get_plugin_stats().await[0].stats.errors, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_duplicate_load_cleans_up_loser() {
        let manager = manager(1000);
        manager.initialize_with(vec![]).await;

        let cleanups = Arc::new(AtomicUsize::new(0));
        let first = StubPlugin::new("twin", &["a"])
            .with_init_delay(Duration::from_millis(50))
            .with_cleanups(&cleanups);
        let second = StubPlugin::new("twin", &["b"])
            .with_init_delay(Duration::from_millis(50))
            .with_cleanups(&cleanups);

        let (a, b) = tokio::join!(
            manager.load_plugin(Arc::new(first)),
            manager.load_plugin(Arc::new(second))
        );

        assert!(a.is_ok() != b.is_ok());
        assert_eq!(cleanups.load(Ordering::SeqCst), 1);
        assert_eq!(manager.registry().load_order().await, vec!["twin"]);
    }

    #[tokio::test]
    async fn test_stats_monotonic() {
        let manager = manager(1000);
        manager
            .initialize_with(vec![Arc::new(StubPlugin::new("stub", &["ok", "explode"]))])
            .await;

        let transport = Arc::new(MemoryTransport::new());
        let mut previous = Duration::ZERO;
        for i in 0..6 {
            let command = if i % 3 == 0 { "explode" } else { "ok" };
            manager.execute_command(command, invocation(&transport), vec![]).await;
            let total = manager.get_plugin_stats().await[0].stats.total_execution_time;
            assert!(total >= previous);
            previous = total;
        }

        let stats = manager.get_plugin_stats().await[0].stats;
        assert_eq!(stats.executions, 4);
        assert_eq!(stats.errors, 2);
    }

    #[tokio::test]
    async fn test_broadcast_isolation() {
        let manager = manager(1000);
        let healthy: Vec<_> = (0..4)
            .map(|i| StubPlugin::new(&format!("p{}", i), &[]))
            .collect();
        let counters: Vec<_> = healthy.iter().map(|p| Arc::clone(&p.events)).collect();

        let mut plugins: Vec<Arc<dyn Plugin>> =
            vec![Arc::new(StubPlugin::new("bad", &[]).failing_events())];
        plugins.extend(healthy.into_iter().map(|p| Arc::new(p) as Arc<dyn Plugin>));
        manager.initialize_with(plugins).await;

        manager.broadcast_event(message_event()).await;

        for counter in counters {
            assert_eq!(counter.load(Ordering::SeqCst), 1);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_broadcast_runs_concurrently() {
        let manager = manager(1000);
        let a = StubPlugin::new("a", &[]).with_delay(Duration::from_millis(300));
        let b = StubPlugin::new("b", &[]).with_delay(Duration::from_millis(300));
        let stuck = StubPlugin::new("stuck", &[]).with_delay(Duration::from_secs(60));
        let a_events = Arc::clone(&a.events);
        let b_events = Arc::clone(&b.events);
        manager
            .initialize_with(vec![Arc::new(a), Arc::new(stuck), Arc::new(b)])
            .await;

        let start = Instant::now();
        manager.broadcast_event(message_event()).await;

        // 300ms 두 개가 동시에 실행되고, 멈춘 플러그인은 타임아웃에서 잘림
        assert!(start.elapsed() < Duration::from_millis(1100));
        assert_eq!(a_events.load(Ordering::SeqCst), 1);
        assert_eq!(b_events.load(Ordering::SeqCst), 1);
        assert_eq!(manager.get_plugin_stats().await[0].stats.executions, 0);
    }

    #[tokio::test]
    async fn test_inactive_exclusion() {
        let manager = manager(1000);
        let stub = StubPlugin::new("stub", &["ping"]);
        let calls = Arc::clone(&stub.calls);
        let events = Arc::clone(&stub.events);
        manager.initialize_with(vec![Arc::new(stub)]).await;

        assert!(manager.set_plugin_active("stub", false).await);
        let transport = Arc::new(MemoryTransport::new());
        assert!(!manager.execute_command("ping", invocation(&transport), vec![]).await);
        manager.broadcast_event(message_event()).await;
        assert!(manager.get_available_commands().await.is_empty());
        assert!(!manager.has_command("ping").await);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(events.load(Ordering::SeqCst), 0);

        // 비활성 플러그인도 통계에는 남음
        let stats = manager.get_plugin_stats().await;
        assert_eq!(stats.len(), 1);
        assert!(!stats[0].active);

        assert!(manager.set_plugin_active("stub", true).await);
        assert!(manager.execute_command("ping", invocation(&transport), vec![]).await);
        manager.broadcast_event(message_event()).await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(events.load(Ordering::SeqCst), 1);

        assert!(!manager.set_plugin_active("missing", true).await);
    }

    #[tokio::test]
    async fn test_reload_resets_stats() {
        let manager = manager(1000);
        manager
            .initialize_with(vec![
                Arc::new(StubPlugin::new("stub", &["ping"])),
                Arc::new(StubPlugin::new("other", &["pong"])),
            ])
            .await;

        let transport = Arc::new(MemoryTransport::new());
        manager.execute_command("ping", invocation(&transport), vec![]).await;
        manager.set_plugin_active("stub", false).await;

        manager.reload_plugin("stub").await.unwrap();

        let stats = manager.get_plugin_stats().await;
        assert_eq!(stats[0].name, "stub");
        assert_eq!(stats[0].stats.executions, 0);
        assert!(stats[0].active);
        assert!(manager.reload_plugin("missing").await.is_err());
    }

    #[tokio::test]
    async fn test_unload_plugin() {
        let manager = manager(1000);
        let stub = StubPlugin::new("stub", &["ping"]);
        let cleanups = Arc::clone(&stub.cleanups);
        manager.initialize_with(vec![Arc::new(stub)]).await;

        manager.unload_plugin("stub").await.unwrap();
        assert_eq!(cleanups.load(Ordering::SeqCst), 1);
        assert!(!manager.has_command("ping").await);
        assert!(matches!(
            manager.unload_plugin("stub").await,
            Err(Error::PluginNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_ingest_and_health() {
        let manager = manager(1000);
        manager
            .initialize_with(vec![
                Arc::new(StubPlugin::new("one", &[])),
                Arc::new(StubPlugin::new("two", &[])),
            ])
            .await;
        manager.set_plugin_active("two", false).await;

        let data = PluginData::new(
            "document",
            serde_json::json!({ "text": "quarterly plan" }),
            PluginContext::new("user-1", "chat-1"),
        );
        assert_eq!(manager.ingest_data(data).await, 1);

        let report = manager.health_report().await;
        assert_eq!(report.len(), 2);
        assert!(report.iter().all(|h| h.status.is_healthy()));
        assert!(report.iter().any(|h| h.name == "two" && !h.active));
    }

    #[tokio::test]
    async fn test_shutdown_completeness() {
        let manager = manager(1000);
        let active = StubPlugin::new("active", &["ping"]);
        let inactive = StubPlugin::new("inactive", &[]);
        let active_cleanups = Arc::clone(&active.cleanups);
        let inactive_cleanups = Arc::clone(&inactive.cleanups);
        manager
            .initialize_with(vec![Arc::new(active), Arc::new(inactive)])
            .await;
        manager.set_plugin_active("inactive", false).await;

        manager.shutdown().await;

        assert_eq!(manager.state(), ManagerState::Shutdown);
        assert!(manager.get_plugin_stats().await.is_empty());
        assert_eq!(active_cleanups.load(Ordering::SeqCst), 1);
        assert_eq!(inactive_cleanups.load(Ordering::SeqCst), 1);

        let transport = Arc::new(MemoryTransport::new());
        assert!(!manager.execute_command("ping", invocation(&transport), vec![]).await);

        // 재초기화는 새로운 사이클
        manager
            .initialize_with(vec![Arc::new(StubPlugin::new("fresh", &["ping"]))])
            .await;
        assert!(manager.is_ready());
        assert!(manager.execute_command("ping", invocation(&transport), vec![]).await);
    }

    #[tokio::test]
    async fn test_event_type_reaches_plugins() {
        let manager = manager(1000);
        let stub = StubPlugin::new("stub", &[]);
        let events = Arc::clone(&stub.events);
        manager.initialize_with(vec![Arc::new(stub)]).await;

        manager
            .broadcast_event(PluginEvent::simple(EventType::ScheduledTask, PluginContext::system()))
            .await;
        assert_eq!(events.load(Ordering::SeqCst), 1);
    }
}
