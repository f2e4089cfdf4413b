//! Built-in plugins - 기본 제공 플러그인
//!
//! - `demo`: 인자를 그대로 돌려주는 플러그인 (플러그인이 하나도 없을 때 등록됨)
//! - `activity`: 채팅별 메시지 수 집계

mod activity;
mod demo;

pub use activity::ActivityPlugin;
pub use demo::DemoPlugin;
