//! Activity plugin - 채팅별 메시지 수 집계

use crate::plugin::command::{handler_fn, CommandEntry, PluginCommand};
use crate::plugin::discovery::PluginManifest;
use crate::plugin::events::{EventType, PluginEvent};
use crate::plugin::manifest::PluginMetadata;
use crate::plugin::traits::{HealthStatus, Plugin, PluginData, PluginResult};
use async_trait::async_trait;
use futures::FutureExt;
use parking_lot::Mutex;
use parley_foundation::{Error, Result};
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// 채팅별 메시지 수
type Counts = Arc<Mutex<HashMap<String, u64>>>;

/// 활동 집계 플러그인
///
/// `message_received` 이벤트를 채팅별로 세고, `/activity`로 현재 채팅의 수를 알려줍니다.
/// `history` 데이터(`{ "chatId": .., "count": .. }`)로 이전 기록을 합산할 수 있습니다.
#[derive(Debug, Clone)]
pub struct ActivityPlugin {
    name: String,
    version: String,
    counts: Counts,
}

impl ActivityPlugin {
    pub const ENTRY: &'static str = "activity";

    pub fn new() -> Self {
        let manifest = PluginManifest::new("builtin.activity", "activity").with_version("1.0.0");
        Self::from_manifest(&manifest)
    }

    pub fn from_manifest(manifest: &PluginManifest) -> Self {
        Self {
            name: manifest.name.clone(),
            version: manifest.version.clone(),
            counts: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// 채팅의 메시지 수
    pub fn count_for(&self, chat_id: &str) -> u64 {
        self.counts.lock().get(chat_id).copied().unwrap_or(0)
    }
}

impl Default for ActivityPlugin {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Plugin for ActivityPlugin {
    fn metadata(&self) -> PluginMetadata {
        PluginMetadata::new(format!("builtin.{}", self.name), &self.name, &self.version)
            .with_description("Counts messages seen in each chat")
            .with_tag("builtin")
    }

    fn commands(&self) -> Vec<CommandEntry> {
        let counts = Arc::clone(&self.counts);
        let handler = handler_fn(move |invocation, _args| {
            let counts = Arc::clone(&counts);
            async move {
                let chat_id = invocation.context.chat_id.clone();
                let count = counts.lock().get(&chat_id).copied().unwrap_or(0);

                invocation
                    .reply(&format!("Messages seen in this chat: {}", count))
                    .await?;
                Ok(PluginResult::ok_with_data(json!({ "chatId": chat_id, "count": count })))
            }
            .boxed()
        });

        vec![CommandEntry::new(
            PluginCommand::new("activity", "Show how many messages this chat has seen")
                .with_usage("/activity")
                .with_category("stats"),
            handler,
        )]
    }

    async fn on_event(&self, event: &PluginEvent) -> Result<()> {
        if event.event_type == EventType::MessageReceived {
            let mut counts = self.counts.lock();
            *counts.entry(event.context.chat_id.clone()).or_insert(0) += 1;
        }
        Ok(())
    }

    async fn on_data(&self, data: &PluginData) -> Result<()> {
        if data.kind != "history" {
            return Ok(());
        }

        let chat_id = data
            .payload
            .get("chatId")
            .and_then(|v| v.as_str())
            .unwrap_or(&data.context.chat_id)
            .to_string();
        let count = data
            .payload
            .get("count")
            .and_then(|v| v.as_u64())
            .ok_or_else(|| Error::InvalidInput("history data needs a numeric 'count'".into()))?;

        debug!("Merging {} historical message(s) for chat {}", count, chat_id);
        *self.counts.lock().entry(chat_id).or_insert(0) += count;
        Ok(())
    }

    async fn health_check(&self) -> Result<HealthStatus> {
        Ok(HealthStatus::Healthy)
    }

    async fn cleanup(&self) -> Result<()> {
        self.counts.lock().clear();
        Ok(())
    }
}
