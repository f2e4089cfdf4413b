//! Line-based chat session
//!
//! - `/plugins` 플러그인/커맨드/통계 출력
//! - `/plugins enable|disable|reload <name>`, `/plugins health`
//! - `/<command> args…` 커맨드 디스패치
//! - 그 외 줄은 `message_received` 이벤트로 브로드캐스트

use crate::transport::StdoutTransport;
use parley_core::{
    ChatTransport, CommandInvocation, PluginContext, PluginEvent, PluginManager,
};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{debug, info};

/// 입력 한 줄의 해석 결과
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Input {
    /// 빈 줄
    Empty,
    /// `/plugins [sub args…]`
    Plugins(Vec<String>),
    /// `/name args…`
    Command { name: String, args: Vec<String> },
    /// 일반 메시지
    Message(String),
}

impl Input {
    pub fn parse(line: &str) -> Self {
        let line = line.trim();
        if line.is_empty() {
            return Input::Empty;
        }

        let Some(rest) = line.strip_prefix('/') else {
            return Input::Message(line.to_string());
        };

        let mut parts = rest.split_whitespace().map(str::to_string);
        match parts.next() {
            None => Input::Message(line.to_string()),
            Some(name) if name == "plugins" => Input::Plugins(parts.collect()),
            Some(name) => Input::Command {
                name,
                args: parts.collect(),
            },
        }
    }
}

/// 터미널 채팅 세션
pub struct Session {
    manager: Arc<PluginManager>,
    transport: Arc<dyn ChatTransport>,
    user_id: String,
    chat_id: String,
}

impl Session {
    pub fn new(manager: Arc<PluginManager>, user_id: String, chat_id: String) -> Self {
        Self::with_transport(manager, Arc::new(StdoutTransport::new()), user_id, chat_id)
    }

    pub fn with_transport(
        manager: Arc<PluginManager>,
        transport: Arc<dyn ChatTransport>,
        user_id: String,
        chat_id: String,
    ) -> Self {
        Self {
            manager,
            transport,
            user_id,
            chat_id,
        }
    }

    fn context(&self) -> PluginContext {
        PluginContext::new(&self.user_id, &self.chat_id)
    }

    /// stdin이 끝나거나 Ctrl-C가 올 때까지 실행
    pub async fn run(&self) -> anyhow::Result<()> {
        println!(
            "Parley - plugin manager is {}. Type /plugins for details, Ctrl-D to quit.",
            self.manager.state()
        );

        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        loop {
            tokio::select! {
                line = lines.next_line() => {
                    match line? {
                        Some(line) => self.handle_line(&line).await?,
                        None => {
                            debug!("stdin closed");
                            break;
                        }
                    }
                }
                _ = tokio::signal::ctrl_c() => {
                    info!("Interrupted, shutting down");
                    break;
                }
            }
        }

        Ok(())
    }

    /// 한 줄 처리
    pub async fn handle_line(&self, line: &str) -> anyhow::Result<()> {
        match Input::parse(line) {
            Input::Empty => {}
            Input::Plugins(args) => self.handle_plugins(&args).await?,
            Input::Command { name, args } => {
                let invocation =
                    CommandInvocation::new(self.context(), Arc::clone(&self.transport));
                let handled = self
                    .manager
                    .execute_command(&name, invocation, args.clone())
                    .await;

                if handled {
                    let event = PluginEvent::command_executed(&name, &args, self.context());
                    self.manager.broadcast_event(event).await;
                } else if !self.manager.has_command(&name).await {
                    self.say(&format!("Unknown command: /{}", name)).await?;
                }
            }
            Input::Message(text) => {
                self.manager
                    .broadcast_event(PluginEvent::message_received(text, self.context()))
                    .await;
            }
        }
        Ok(())
    }

    async fn handle_plugins(&self, args: &[String]) -> anyhow::Result<()> {
        match args {
            [] => self.say(&self.render_overview().await).await?,
            [sub] if sub == "health" => {
                let report = self.manager.health_report().await;
                let mut out = String::from("Plugin health:");
                for health in report {
                    out.push_str(&format!(
                        "\n  {:<16} {:<10} {}ms",
                        health.name,
                        health.status,
                        health.elapsed.as_millis()
                    ));
                }
                self.say(&out).await?;
            }
            [sub, name] if sub == "enable" || sub == "disable" => {
                let active = sub == "enable";
                if self.manager.set_plugin_active(name, active).await {
                    self.manager
                        .broadcast_event(PluginEvent::plugin_toggled(name, active, self.context()))
                        .await;
                    self.say(&format!("Plugin {} {}d", name, sub)).await?;
                } else {
                    self.say(&format!("Unknown plugin: {}", name)).await?;
                }
            }
            [sub, name] if sub == "reload" => match self.manager.reload_plugin(name).await {
                Ok(()) => self.say(&format!("Plugin {} reloaded", name)).await?,
                Err(e) => self.say(&format!("Reload failed: {}", e)).await?,
            },
            _ => {
                let usage = concat!(
                    "Usage: /plugins ",
                    "[health | enable <name> | disable <name> | reload <name>]"
                );
                self.say(usage).await?
            }
        }
        Ok(())
    }

    /// `/plugins` 출력
    async fn render_overview(&self) -> String {
        let mut out = format!("Plugin manager: {}", self.manager.state());

        let commands = self.manager.get_available_commands().await;
        out.push_str("\n\nCommands:");
        if commands.is_empty() {
            out.push_str("\n  (none)");
        }
        for available in commands {
            out.push_str(&format!(
                "\n  /{:<14} {:<12} {}",
                available.command.name, available.plugin, available.command.description
            ));
        }

        out.push_str(&format!(
            "\n\n{:<16} {:<10} {:<8} {:>6} {:>6} {:>10}",
            "Plugin", "Version", "Active", "Runs", "Errors", "Avg"
        ));
        for snapshot in self.manager.get_plugin_stats().await {
            let average = snapshot
                .stats
                .average_execution_time()
                .map(|d| format!("{}ms", d.as_millis()))
                .unwrap_or_else(|| "-".to_string());
            out.push_str(&format!(
                "\n{:<16} {:<10} {:<8} {:>6} {:>6} {:>10}",
                snapshot.name,
                snapshot.version,
                if snapshot.active { "yes" } else { "no" },
                snapshot.stats.executions,
                snapshot.stats.errors,
                average
            ));
        }

        out
    }

    async fn say(&self, text: &str) -> anyhow::Result<()> {
        self.transport.send_message(&self.chat_id, text).await?;
        Ok(())
    }
}
