//! Hook execution - 플러그인 훅 실행 봉투
//!
//! 모든 훅은 별도 태스크로 spawn 되어 panic이 호출자에게 전파되지 않습니다.
//! 타임아웃은 권고적입니다: 시간이 지나면 기다리기를 멈추고 실패로 보고할 뿐,
//! spawn 된 태스크는 계속 실행될 수 있습니다.

use parley_foundation::{Error, Result};
use std::future::Future;
use std::time::Duration;
use tokio::task::JoinError;

/// 훅 실행 실패 종류 (로그 구분용)
#[derive(Debug)]
pub enum HookFailure {
    /// 훅이 에러를 반환
    Failed(Error),

    /// 훅 태스크가 panic 또는 중단됨
    Panicked(String),

    /// 타임아웃 내에 끝나지 않음
    TimedOut(Duration),
}

impl HookFailure {
    pub fn is_timeout(&self) -> bool {
        matches!(self, HookFailure::TimedOut(_))
    }

    fn from_join(err: JoinError) -> Self {
        if err.is_panic() {
            HookFailure::Panicked("hook panicked".to_string())
        } else {
            HookFailure::Panicked(err.to_string())
        }
    }
}

impl std::fmt::Display for HookFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Failed(e) => write!(f, "{}", e),
            Self::Panicked(reason) => write!(f, "{}", reason),
            Self::TimedOut(timeout) => write!(f, "timed out after {}ms", timeout.as_millis()),
        }
    }
}

impl From<HookFailure> for Error {
    fn from(failure: HookFailure) -> Self {
        match failure {
            HookFailure::Failed(e) => e,
            HookFailure::Panicked(reason) => Error::Plugin(reason),
            HookFailure::TimedOut(timeout) => {
                Error::Timeout(format!("hook did not finish within {}ms", timeout.as_millis()))
            }
        }
    }
}

/// 훅을 타임아웃과 경주
///
/// 먼저 끝나는 쪽이 결과를 결정합니다. 지면 태스크는 분리(detach)됩니다.
pub async fn race_timeout<F, T>(timeout: Duration, hook: F) -> std::result::Result<T, HookFailure>
where
    F: Future<Output = Result<T>> + Send + 'static,
    T: Send + 'static,
{
    let handle = tokio::spawn(hook);

    match tokio::time::timeout(timeout, handle).await {
        Ok(Ok(Ok(value))) => Ok(value),
        Ok(Ok(Err(e))) => Err(HookFailure::Failed(e)),
        Ok(Err(join_err)) => Err(HookFailure::from_join(join_err)),
        Err(_) => Err(HookFailure::TimedOut(timeout)),
    }
}

/// 타임아웃 없이 훅 실행 (panic 격리만)
pub async fn run_isolated<F, T>(hook: F) -> std::result::Result<T, HookFailure>
where
    F: Future<Output = Result<T>> + Send + 'static,
    T: Send + 'static,
{
    match tokio::spawn(hook).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(e)) => Err(HookFailure::Failed(e)),
        Err(join_err) => Err(HookFailure::from_join(join_err)),
    }
}
