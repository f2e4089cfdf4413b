//! Demo plugin - `/demo <text…>` 에코

use crate::plugin::command::{
    handler_fn, CommandEntry, CommandParameter, ParameterType, PluginCommand,
};
use crate::plugin::discovery::PluginManifest;
use crate::plugin::manifest::PluginMetadata;
use crate::plugin::traits::{Plugin, PluginResult};
use async_trait::async_trait;
use futures::FutureExt;
use serde_json::{json, Value};

const DEFAULT_REPLY: &str = "Demo plugin is working!";

/// 데모 플러그인
#[derive(Debug, Clone)]
pub struct DemoPlugin {
    name: String,
    version: String,
    description: String,
    prefix: String,
}

impl DemoPlugin {
    /// 카탈로그 키
    pub const ENTRY: &'static str = "demo";

    pub fn new() -> Self {
        Self::from_manifest(&Self::default_manifest())
    }

    /// 매니페스트로 생성 (`settings.prefix` 지원)
    pub fn from_manifest(manifest: &PluginManifest) -> Self {
        Self {
            name: manifest.name.clone(),
            version: manifest.version.clone(),
            description: manifest
                .description
                .clone()
                .unwrap_or_else(|| "Echoes its arguments back to the chat".to_string()),
            prefix: manifest.setting_str("prefix").unwrap_or_default().to_string(),
        }
    }

    pub fn default_manifest() -> PluginManifest {
        PluginManifest::new("builtin.demo", "demo")
            .with_version("1.0.0")
            .with_entry(Self::ENTRY)
    }

    fn command() -> PluginCommand {
        PluginCommand::new("demo", "Echo the given text")
            .with_usage("/demo [text...]")
            .with_example("/demo hello")
            .with_parameter(
                CommandParameter::new("text", ParameterType::Array).description("Text to echo"),
            )
    }
}

impl Default for DemoPlugin {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Plugin for DemoPlugin {
    fn metadata(&self) -> PluginMetadata {
        PluginMetadata::new(format!("builtin.{}", self.name), &self.name, &self.version)
            .with_description(&self.description)
            .with_tag("builtin")
    }

    fn commands(&self) -> Vec<CommandEntry> {
        let descriptor = Self::command();
        let prefix = self.prefix.clone();

        let parser = descriptor.clone();
        let handler = handler_fn(move |invocation, args| {
            let parser = parser.clone();
            let prefix = prefix.clone();
            async move {
                let parsed = parser.parse_args(&args)?;
                let text = parsed
                    .get("text")
                    .and_then(Value::as_array)
                    .map(|items| {
                        items
                            .iter()
                            .filter_map(Value::as_str)
                            .collect::<Vec<_>>()
                            .join(" ")
                    })
                    .unwrap_or_default();

                let reply = if text.is_empty() {
                    format!("{}{}", prefix, DEFAULT_REPLY)
                } else {
                    format!("{}{}", prefix, text)
                };
                invocation.reply(&reply).await?;

                Ok(PluginResult::ok_with_data(json!({ "echo": text })))
            }
            .boxed()
        });

        vec![CommandEntry::new(descriptor, handler)]
    }
}
