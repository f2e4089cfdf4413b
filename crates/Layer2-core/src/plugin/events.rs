//! Plugin Events - 브로드캐스트 이벤트 정의

use super::traits::PluginContext;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

// ============================================================================
// PluginEvent - 플러그인 이벤트 타입
// ============================================================================

/// 플러그인 이벤트
///
/// 활성화된 모든 플러그인에 전달되는 fire-and-forget 알림입니다.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PluginEvent {
    /// 이벤트 ID
    pub id: Uuid,

    /// 이벤트 타입
    pub event_type: EventType,

    /// 이벤트 데이터
    pub payload: Value,

    /// 이벤트를 발생시킨 요청 컨텍스트
    pub context: PluginContext,

    /// 타임스탬프
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

impl PluginEvent {
    /// 새 이벤트 생성
    pub fn new(event_type: EventType, payload: Value, context: PluginContext) -> Self {
        Self {
            id: Uuid::new_v4(),
            event_type,
            payload,
            context,
            timestamp: chrono::Utc::now(),
        }
    }

    /// 페이로드 없는 이벤트 생성
    pub fn simple(event_type: EventType, context: PluginContext) -> Self {
        Self::new(event_type, Value::Null, context)
    }

    /// 메시지 수신 이벤트
    pub fn message_received(text: impl Into<String>, context: PluginContext) -> Self {
        Self::new(
            EventType::MessageReceived,
            serde_json::json!({ "text": text.into() }),
            context,
        )
    }

    /// 커맨드 실행 완료 이벤트
    pub fn command_executed(command: &str, args: &[String], context: PluginContext) -> Self {
        Self::new(
            EventType::CommandExecuted,
            serde_json::json!({
                "command": command,
                "args": args,
            }),
            context,
        )
    }

    /// 플러그인 활성화/비활성화 이벤트
    pub fn plugin_toggled(plugin: &str, active: bool, context: PluginContext) -> Self {
        let event_type = if active {
            EventType::PluginActivated
        } else {
            EventType::PluginDeactivated
        };
        Self::new(event_type, serde_json::json!({ "plugin": plugin }), context)
    }

    /// 페이로드의 문자열 필드 조회
    pub fn payload_str(&self, key: &str) -> Option<&str> {
        self.payload.get(key).and_then(Value::as_str)
    }
}

/// 이벤트 타입 (닫힌 집합)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    // 메시지 이벤트
    MessageReceived,
    FileUploaded,
    CommandExecuted,

    // 사용자 이벤트
    UserJoined,
    UserLeft,

    // 플러그인 이벤트
    PluginActivated,
    PluginDeactivated,

    // 스케줄러 이벤트
    ScheduledTask,
}

impl std::fmt::Display for EventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MessageReceived => write!(f, "message_received"),
            Self::FileUploaded => write!(f, "file_uploaded"),
            Self::CommandExecuted => write!(f, "command_executed"),
            Self::UserJoined => write!(f, "user_joined"),
            Self::UserLeft => write!(f, "user_left"),
            Self::PluginActivated => write!(f, "plugin_activated"),
            Self::PluginDeactivated => write!(f, "plugin_deactivated"),
            Self::ScheduledTask => write!(f, "scheduled_task"),
        }
    }
}
