//! Plugin Metadata & Config - 플러그인 식별 정보와 선언적 설정

use super::command::PluginCommand;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::time::Duration;

/// 플러그인 버전
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
pub struct PluginVersion {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
}

impl PluginVersion {
    pub fn new(major: u32, minor: u32, patch: u32) -> Self {
        Self { major, minor, patch }
    }

    /// 버전 문자열 파싱 (예: "1.2.3", "v1.2.3")
    pub fn parse(s: &str) -> Option<Self> {
        let s = s.trim().trim_start_matches(['v', '^', '=']);
        let parts: Vec<&str> = s.split('.').collect();
        if parts.len() != 3 {
            return None;
        }

        Some(Self {
            major: parts[0].parse().ok()?,
            minor: parts[1].parse().ok()?,
            patch: parts[2].parse().ok()?,
        })
    }

    /// 호환성 검사 (같은 메이저, 요구 버전 이상)
    pub fn satisfies(&self, required: &PluginVersion) -> bool {
        self.major == required.major && self >= required
    }
}

impl std::fmt::Display for PluginVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

impl Default for PluginVersion {
    fn default() -> Self {
        Self::new(1, 0, 0)
    }
}

/// 플러그인 의존성
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PluginDependency {
    /// 의존하는 플러그인 이름
    pub name: String,

    /// 최소 필요 버전
    pub min_version: PluginVersion,

    /// 선택적 의존성 여부
    #[serde(default)]
    pub optional: bool,
}

impl PluginDependency {
    pub fn new(name: impl Into<String>, min_version: PluginVersion) -> Self {
        Self {
            name: name.into(),
            min_version,
            optional: false,
        }
    }

    pub fn optional(mut self) -> Self {
        self.optional = true;
        self
    }
}

// ============================================================================
// PluginMetadata - 플러그인 식별 정보 (로드 후 불변)
// ============================================================================

/// 플러그인 메타데이터
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PluginMetadata {
    /// 고유 플러그인 ID (예: "parley.weather")
    pub id: String,

    /// 플러그인 이름 (레지스트리 키)
    pub name: String,

    /// 버전 문자열
    pub version: String,

    /// 설명
    pub description: String,

    /// 작성자
    pub author: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub homepage: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub license: Option<String>,

    #[serde(default)]
    pub tags: Vec<String>,

    #[serde(default)]
    pub dependencies: Vec<PluginDependency>,
}

impl PluginMetadata {
    /// 새 메타데이터 생성
    pub fn new(id: impl Into<String>, name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            version: version.into(),
            description: String::new(),
            author: String::new(),
            homepage: None,
            license: None,
            tags: vec![],
            dependencies: vec![],
        }
    }

    /// 빌더 패턴: 설명 설정
    pub fn with_description(mut self, desc: impl Into<String>) -> Self {
        self.description = desc.into();
        self
    }

    /// 빌더 패턴: 작성자 설정
    pub fn with_author(mut self, author: impl Into<String>) -> Self {
        self.author = author.into();
        self
    }

    pub fn with_homepage(mut self, homepage: impl Into<String>) -> Self {
        self.homepage = Some(homepage.into());
        self
    }

    pub fn with_license(mut self, license: impl Into<String>) -> Self {
        self.license = Some(license.into());
        self
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }

    /// 빌더 패턴: 의존성 추가
    pub fn with_dependency(mut self, dep: PluginDependency) -> Self {
        self.dependencies.push(dep);
        self
    }

    /// 파싱된 버전 (형식이 맞지 않으면 None)
    pub fn parsed_version(&self) -> Option<PluginVersion> {
        PluginVersion::parse(&self.version)
    }
}

// ============================================================================
// PluginConfig - 플러그인이 소유하는 선언적 설정
// ============================================================================

/// 요청 빈도 제한 정책
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RateLimit {
    /// 윈도우당 최대 요청 수
    pub requests: u32,

    /// 윈도우 길이 (ms)
    pub window_ms: u64,
}

impl RateLimit {
    pub fn new(requests: u32, window: Duration) -> Self {
        Self {
            requests,
            window_ms: window.as_millis() as u64,
        }
    }

    pub fn window(&self) -> Duration {
        Duration::from_millis(self.window_ms)
    }
}

/// 플러그인 설정
///
/// 매니저는 커맨드 이름 해석과 타임아웃 오버라이드에만 사용합니다.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PluginConfig {
    /// 커맨드 디스크립터 목록
    #[serde(default)]
    pub commands: Vec<PluginCommand>,

    /// 필요한 권한
    #[serde(default)]
    pub permissions: Vec<String>,

    /// 자유 형식 설정
    #[serde(default)]
    pub settings: HashMap<String, Value>,

    /// API 키 (이름 -> 키)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_keys: Option<HashMap<String, String>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rate_limit: Option<RateLimit>,

    /// 호출 타임아웃 오버라이드 (ms)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
}

impl PluginConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_permission(mut self, permission: impl Into<String>) -> Self {
        self.permissions.push(permission.into());
        self
    }

    pub fn with_setting(mut self, key: impl Into<String>, value: Value) -> Self {
        self.settings.insert(key.into(), value);
        self
    }

    pub fn with_rate_limit(mut self, rate_limit: RateLimit) -> Self {
        self.rate_limit = Some(rate_limit);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout_ms = Some(timeout.as_millis() as u64);
        self
    }

    /// 타임아웃 오버라이드
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_ms.map(Duration::from_millis)
    }

    /// 선언된 커맨드 이름 목록
    pub fn command_names(&self) -> Vec<&str> {
        self.commands.iter().map(|c| c.name.as_str()).collect()
    }
}
