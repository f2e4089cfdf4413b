//! Chat transports - 기본 제공 응답 채널 구현

use super::traits::ChatTransport;
use async_trait::async_trait;
use parking_lot::Mutex;
use parley_foundation::Result;
use tracing::debug;

/// 메시지를 버리는 전송 (응답이 필요 없는 호출자용)
#[derive(Debug, Clone, Copy, Default)]
pub struct NullTransport;

#[async_trait]
impl ChatTransport for NullTransport {
    async fn send_message(&self, chat_id: &str, text: &str) -> Result<()> {
        debug!("Dropping message for chat {}: {}", chat_id, text);
        Ok(())
    }
}

/// 메모리에 메시지를 쌓는 전송 (임베딩/테스트용)
#[derive(Debug, Default)]
pub struct MemoryTransport {
    messages: Mutex<Vec<(String, String)>>,
}

impl MemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// 보낸 메시지 목록 (chat_id, text)
    pub fn messages(&self) -> Vec<(String, String)> {
        self.messages.lock().clone()
    }

    /// 특정 채팅의 메시지 본문
    pub fn texts_for(&self, chat_id: &str) -> Vec<String> {
        self.messages
            .lock()
            .iter()
            .filter(|(chat, _)| chat == chat_id)
            .map(|(_, text)| text.clone())
            .collect()
    }

    pub fn clear(&self) {
        self.messages.lock().clear();
    }
}

#[async_trait]
impl ChatTransport for MemoryTransport {
    async fn send_message(&self, chat_id: &str, text: &str) -> Result<()> {
        self.messages.lock().push((chat_id.to_string(), text.to_string()));
        Ok(())
    }
}
