//! Plugin traits - 핵심 플러그인 인터페이스

use super::command::CommandEntry;
use super::events::PluginEvent;
use super::manifest::{PluginConfig, PluginMetadata};
use async_trait::async_trait;
use parley_foundation::Result;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

// ============================================================================
// PluginContext - 요청 단위 컨텍스트 (읽기 전용)
// ============================================================================

/// 플러그인 컨텍스트
///
/// 모든 라이프사이클/커맨드/이벤트 호출에 전달되는 값 객체입니다.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PluginContext {
    pub user_id: String,
    pub chat_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    pub timestamp: chrono::DateTime<chrono::Utc>,
    #[serde(default)]
    pub metadata: HashMap<String, Value>,
}

impl PluginContext {
    /// 새 컨텍스트 생성
    pub fn new(user_id: impl Into<String>, chat_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            chat_id: chat_id.into(),
            message_id: None,
            language: None,
            timestamp: chrono::Utc::now(),
            metadata: HashMap::new(),
        }
    }

    /// 시스템 발생 컨텍스트 (스케줄러 등)
    pub fn system() -> Self {
        Self::new("system", "system")
    }

    pub fn with_message_id(mut self, message_id: impl Into<String>) -> Self {
        self.message_id = Some(message_id.into());
        self
    }

    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = Some(language.into());
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }
}

// ============================================================================
// PluginResult - 커맨드 실행 결과
// ============================================================================

/// 커맨드 실행 결과
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PluginResult {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub metadata: HashMap<String, Value>,
}

impl PluginResult {
    /// 성공 결과
    pub fn ok() -> Self {
        Self {
            success: true,
            ..Default::default()
        }
    }

    /// 사용자 메시지를 포함한 성공 결과
    pub fn ok_with_message(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: Some(message.into()),
            ..Default::default()
        }
    }

    /// 데이터를 포함한 성공 결과
    pub fn ok_with_data(data: Value) -> Self {
        Self {
            success: true,
            data: Some(data),
            ..Default::default()
        }
    }

    /// 실패 결과
    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
            ..Default::default()
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }
}

// ============================================================================
// PluginData - 데이터 수집 훅 입력
// ============================================================================

/// 플러그인에 전달되는 수집 데이터 (파일 내용, 외부 피드 등)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PluginData {
    /// 데이터 종류 (예: "document", "history")
    pub kind: String,

    /// 데이터 본문
    pub payload: Value,

    /// 데이터를 보낸 요청 컨텍스트
    pub context: PluginContext,
}

impl PluginData {
    pub fn new(kind: impl Into<String>, payload: Value, context: PluginContext) -> Self {
        Self {
            kind: kind.into(),
            payload,
            context,
        }
    }
}

// ============================================================================
// HealthStatus - 헬스 체크 결과
// ============================================================================

/// 플러그인 헬스 상태
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "reason", rename_all = "snake_case")]
pub enum HealthStatus {
    Healthy,
    Degraded(String),
    Unhealthy(String),
}

impl HealthStatus {
    pub fn is_healthy(&self) -> bool {
        matches!(self, HealthStatus::Healthy)
    }
}

impl std::fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Healthy => write!(f, "healthy"),
            Self::Degraded(reason) => write!(f, "degraded ({})", reason),
            Self::Unhealthy(reason) => write!(f, "unhealthy ({})", reason),
        }
    }
}

// ============================================================================
// ChatTransport - 응답 채널
// ============================================================================

/// 채팅 전송 트레이트
///
/// 플러그인은 이 핸들로 사용자에게 직접 응답합니다.
#[async_trait]
pub trait ChatTransport: Send + Sync {
    async fn send_message(&self, chat_id: &str, text: &str) -> Result<()>;
}

// ============================================================================
// CommandInvocation - 커맨드 호출 캐리어
// ============================================================================

/// 커맨드 호출 캐리어
///
/// 컨텍스트, 응답 채널, 취소 토큰을 묶어 핸들러에 전달합니다.
/// 타임아웃이 나면 매니저가 토큰을 취소하지만 핸들러를 강제로 멈추지는 않습니다.
#[derive(Clone)]
pub struct CommandInvocation {
    pub context: PluginContext,
    transport: Arc<dyn ChatTransport>,
    cancellation: CancellationToken,
}

impl CommandInvocation {
    pub fn new(context: PluginContext, transport: Arc<dyn ChatTransport>) -> Self {
        Self {
            context,
            transport,
            cancellation: CancellationToken::new(),
        }
    }

    /// 외부 취소 토큰 연결
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = token;
        self
    }

    pub fn transport(&self) -> &Arc<dyn ChatTransport> {
        &self.transport
    }

    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancellation
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }

    /// 호출한 채팅으로 응답
    pub async fn reply(&self, text: &str) -> Result<()> {
        self.transport.send_message(&self.context.chat_id, text).await
    }
}

impl std::fmt::Debug for CommandInvocation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandInvocation")
            .field("context", &self.context)
            .field("cancelled", &self.is_cancelled())
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Plugin Trait - 모든 플러그인이 구현해야 하는 인터페이스
// ============================================================================

/// 플러그인 트레이트
///
/// 모든 Parley 플러그인은 이 트레이트를 구현해야 합니다.
/// 훅은 매니저가 별도 태스크에서 실행하므로 panic도 해당 플러그인의 실패로만 처리됩니다.
#[async_trait]
pub trait Plugin: Send + Sync {
    /// 플러그인 메타데이터 반환
    fn metadata(&self) -> PluginMetadata;

    /// 레지스트리 키로 쓰이는 이름
    fn name(&self) -> String {
        self.metadata().name
    }

    /// 표시용 버전
    fn version(&self) -> String {
        self.metadata().version
    }

    /// 플러그인 설정
    fn config(&self) -> PluginConfig {
        PluginConfig::default()
    }

    /// 커맨드 테이블 (로드 시 한 번 조회)
    fn commands(&self) -> Vec<CommandEntry> {
        vec![]
    }

    /// 등록 전 한 번 호출. 실패하면 로드가 중단됩니다.
    async fn initialize(&self) -> Result<()> {
        Ok(())
    }

    /// 브로드캐스트 이벤트 처리
    async fn on_event(&self, _event: &PluginEvent) -> Result<()> {
        Ok(())
    }

    /// 데이터 수집
    async fn on_data(&self, _data: &PluginData) -> Result<()> {
        Ok(())
    }

    /// 헬스 체크
    async fn health_check(&self) -> Result<HealthStatus> {
        Ok(HealthStatus::Healthy)
    }

    /// 종료 시 정리 (best-effort)
    async fn cleanup(&self) -> Result<()> {
        Ok(())
    }
}
