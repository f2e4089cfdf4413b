//! Stdout transport - 플러그인 응답을 터미널로 출력

use async_trait::async_trait;
use parking_lot::Mutex;
use parley_core::{ChatTransport, Result};
use std::io::Write;

/// 표준 출력 전송
///
/// 동시에 도착한 응답이 섞이지 않도록 한 줄 단위로 잠그고 씁니다.
pub struct StdoutTransport<W: Write + Send = std::io::Stdout> {
    out: Mutex<W>,
}

impl StdoutTransport {
    pub fn new() -> Self {
        Self::with_writer(std::io::stdout())
    }
}

impl<W: Write + Send> StdoutTransport<W> {
    pub fn with_writer(writer: W) -> Self {
        Self {
            out: Mutex::new(writer),
        }
    }

    #[cfg(test)]
    pub fn into_inner(self) -> W {
        self.out.into_inner()
    }
}

#[async_trait]
impl<W: Write + Send> ChatTransport for StdoutTransport<W> {
    async fn send_message(&self, chat_id: &str, text: &str) -> Result<()> {
        let mut out = self.out.lock();
        for line in text.lines() {
            writeln!(out, "[{}] {}", chat_id, line)?;
        }
        out.flush()?;
        Ok(())
    }
}
