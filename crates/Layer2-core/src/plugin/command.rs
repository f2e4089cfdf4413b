//! Plugin Command - 커맨드 디스크립터, 인자 검증, 핸들러

use super::traits::{CommandInvocation, PluginResult};
use async_trait::async_trait;
use futures::future::BoxFuture;
use parley_foundation::{Error, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::Arc;

// ============================================================================
// 파라미터 정의
// ============================================================================

/// 파라미터 타입
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParameterType {
    String,
    Number,
    Boolean,
    /// 남은 인자를 모두 소비
    Array,
    /// JSON 객체 문자열
    Object,
}

impl std::fmt::Display for ParameterType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::String => write!(f, "string"),
            Self::Number => write!(f, "number"),
            Self::Boolean => write!(f, "boolean"),
            Self::Array => write!(f, "array"),
            Self::Object => write!(f, "object"),
        }
    }
}

/// 파라미터 검증 규칙
///
/// `min`/`max`는 number에서는 값, string에서는 글자 수, array에서는 원소 수에 적용됩니다.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ParameterValidation {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min: Option<f64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub max: Option<f64>,

    #[serde(rename = "enum", skip_serializing_if = "Option::is_none")]
    pub allowed: Option<Vec<String>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub pattern: Option<String>,
}

/// 커맨드 파라미터
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandParameter {
    pub name: String,
    pub description: String,
    #[serde(rename = "type")]
    pub param_type: ParameterType,
    #[serde(default)]
    pub required: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub validation: Option<ParameterValidation>,
}

impl CommandParameter {
    pub fn new(name: impl Into<String>, param_type: ParameterType) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            param_type,
            required: false,
            default: None,
            validation: None,
        }
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn default_value(mut self, value: Value) -> Self {
        self.default = Some(value);
        self
    }

    pub fn validation(mut self, validation: ParameterValidation) -> Self {
        self.validation = Some(validation);
        self
    }

    /// 단일 인자를 타입에 맞게 변환
    fn parse_single(&self, raw: &str) -> Result<Value> {
        let value = match self.param_type {
            ParameterType::String => Value::String(raw.to_string()),
            ParameterType::Number => {
                let n: f64 = raw.trim().parse().map_err(|_| {
                    Error::Validation(format!("'{}' must be a number, got '{}'", self.name, raw))
                })?;
                serde_json::Number::from_f64(n).map(Value::Number).ok_or_else(|| {
                    Error::Validation(format!("'{}' must be a finite number", self.name))
                })?
            }
            ParameterType::Boolean => match raw.trim().to_ascii_lowercase().as_str() {
                "true" | "yes" | "on" | "1" => Value::Bool(true),
                "false" | "no" | "off" | "0" => Value::Bool(false),
                _ => {
                    return Err(Error::Validation(format!(
                        "'{}' must be a boolean, got '{}'",
                        self.name, raw
                    )))
                }
            },
            ParameterType::Object => {
                let parsed: Value = serde_json::from_str(raw).map_err(|_| {
                    Error::Validation(format!("'{}' must be a JSON object", self.name))
                })?;
                if !parsed.is_object() {
                    return Err(Error::Validation(format!(
                        "'{}' must be a JSON object",
                        self.name
                    )));
                }
                parsed
            }
            ParameterType::Array => Value::Array(vec![Value::String(raw.to_string())]),
        };

        self.check_rules(raw, &value)?;
        Ok(value)
    }

    /// 검증 규칙 확인
    fn check_rules(&self, raw: &str, value: &Value) -> Result<()> {
        let Some(rules) = &self.validation else {
            return Ok(());
        };

        let measured = match value {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => Some(s.chars().count() as f64),
            Value::Array(items) => Some(items.len() as f64),
            _ => None,
        };

        if let Some(measured) = measured {
            if let Some(min) = rules.min {
                if measured < min {
                    return Err(Error::Validation(format!(
                        "'{}' must be at least {}",
                        self.name, min
                    )));
                }
            }
            if let Some(max) = rules.max {
                if measured > max {
                    return Err(Error::Validation(format!(
                        "'{}' must be at most {}",
                        self.name, max
                    )));
                }
            }
        }

        // enum/pattern은 스칼라 값에만 적용
        if matches!(value, Value::Array(_)) {
            return Ok(());
        }

        if let Some(allowed) = &rules.allowed {
            if !allowed.iter().any(|a| a == raw) {
                return Err(Error::Validation(format!(
                    "'{}' must be one of: {}",
                    self.name,
                    allowed.join(", ")
                )));
            }
        }

        if let Some(pattern) = &rules.pattern {
            let re = Regex::new(&format!("^(?:{})$", pattern)).map_err(|e| {
                Error::Validation(format!("Invalid pattern for '{}': {}", self.name, e))
            })?;
            if !re.is_match(raw) {
                return Err(Error::Validation(format!(
                    "'{}' does not match pattern {}",
                    self.name, pattern
                )));
            }
        }

        Ok(())
    }
}

// ============================================================================
// PluginCommand - 커맨드 디스크립터
// ============================================================================

/// 플러그인 커맨드 디스크립터
///
/// 소유 플러그인 안에서 `name`으로 유일하게 식별됩니다.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PluginCommand {
    pub name: String,
    pub description: String,
    pub usage: String,
    #[serde(default)]
    pub examples: Vec<String>,
    #[serde(default)]
    pub parameters: Vec<CommandParameter>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
}

impl PluginCommand {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            usage: format!("/{}", name),
            name,
            description: description.into(),
            examples: vec![],
            parameters: vec![],
            category: None,
        }
    }

    pub fn with_usage(mut self, usage: impl Into<String>) -> Self {
        self.usage = usage.into();
        self
    }

    pub fn with_example(mut self, example: impl Into<String>) -> Self {
        self.examples.push(example.into());
        self
    }

    pub fn with_parameter(mut self, parameter: CommandParameter) -> Self {
        self.parameters.push(parameter);
        self
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    /// 위치 인자를 파라미터 정의에 맞춰 파싱
    ///
    /// `array` 파라미터는 남은 인자를 모두 소비하므로 마지막에 와야 합니다.
    /// 누락된 선택 파라미터는 기본값이 있을 때만 결과에 포함됩니다.
    pub fn parse_args(&self, args: &[String]) -> Result<Map<String, Value>> {
        let mut parsed = Map::new();
        let mut rest = args;

        for param in &self.parameters {
            if param.param_type == ParameterType::Array {
                let items: Vec<Value> = rest.iter().map(|a| Value::String(a.clone())).collect();
                rest = &[];

                if items.is_empty() {
                    if param.required {
                        return Err(Error::Validation(format!(
                            "Missing required argument '{}'. Usage: {}",
                            param.name, self.usage
                        )));
                    }
                    if let Some(default) = &param.default {
                        parsed.insert(param.name.clone(), default.clone());
                    }
                    continue;
                }

                let value = Value::Array(items);
                param.check_rules("", &value)?;
                parsed.insert(param.name.clone(), value);
                continue;
            }

            match rest.split_first() {
                Some((raw, tail)) => {
                    parsed.insert(param.name.clone(), param.parse_single(raw)?);
                    rest = tail;
                }
                None if param.required => {
                    return Err(Error::Validation(format!(
                        "Missing required argument '{}'. Usage: {}",
                        param.name, self.usage
                    )));
                }
                None => {
                    if let Some(default) = &param.default {
                        parsed.insert(param.name.clone(), default.clone());
                    }
                }
            }
        }

        if !rest.is_empty() {
            return Err(Error::Validation(format!(
                "Too many arguments for /{}. Usage: {}",
                self.name, self.usage
            )));
        }

        Ok(parsed)
    }

    /// 인자 검증만 수행
    pub fn validate_args(&self, args: &[String]) -> Result<()> {
        self.parse_args(args).map(|_| ())
    }
}

// ============================================================================
// CommandHandler - 커맨드 실행 핸들러
// ============================================================================

/// 커맨드 핸들러 트레이트
///
/// 응답 전송 같은 부수 효과는 `invocation`의 transport로 직접 수행합니다.
/// 매니저는 실행 봉투(타임아웃, 통계, 에러 변환)만 담당합니다.
#[async_trait]
pub trait CommandHandler: Send + Sync {
    async fn execute(
        &self,
        invocation: CommandInvocation,
        args: Vec<String>,
    ) -> Result<PluginResult>;
}

/// 클로저 기반 핸들러
pub struct FnHandler<F>(F);

#[async_trait]
impl<F> CommandHandler for FnHandler<F>
where
    F: Fn(CommandInvocation, Vec<String>) -> BoxFuture<'static, Result<PluginResult>>
        + Send
        + Sync,
{
    async fn execute(
        &self,
        invocation: CommandInvocation,
        args: Vec<String>,
    ) -> Result<PluginResult> {
        (self.0)(invocation, args).await
    }
}

/// 클로저로 핸들러 생성
///
/// ```ignore
/// let handler = handler_fn(|inv, args| {
///     async move {
///         inv.reply(&args.join(" ")).await?;
///         Ok(PluginResult::ok())
///     }
///     .boxed()
/// });
/// ```
pub fn handler_fn<F>(f: F) -> Arc<dyn CommandHandler>
where
    F: Fn(CommandInvocation, Vec<String>) -> BoxFuture<'static, Result<PluginResult>>
        + Send
        + Sync
        + 'static,
{
    Arc::new(FnHandler(f))
}

/// 커맨드 테이블 항목 (디스크립터 + 핸들러)
#[derive(Clone)]
pub struct CommandEntry {
    pub command: PluginCommand,
    pub handler: Arc<dyn CommandHandler>,
}

impl CommandEntry {
    pub fn new(command: PluginCommand, handler: Arc<dyn CommandHandler>) -> Self {
        Self { command, handler }
    }

    pub fn name(&self) -> &str {
        &self.command.name
    }
}

impl std::fmt::Debug for CommandEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandEntry")
            .field("command", &self.command.name)
            .finish_non_exhaustive()
    }
}
