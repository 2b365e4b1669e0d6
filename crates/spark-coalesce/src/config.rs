//! 声明式节律配置。
//!
//! # 设计背景（Why）
//! - 防抖窗口、节流间隔、重试退避通常随部署环境调整，写死在代码里会迫使重新发布；
//!   这里提供可从 TOML 加载的配置结构，再映射到各策略的选项。
//!
//! # 契约说明（What）
//! - 所有时长以毫秒表达；缺失字段取缺省值，未知字段拒绝解析；
//! - [`PacingConfig::validate`] 拒绝 `max_calls = 0`、`max_attempts = 0` 与空退避表；
//!   [`PacingConfig::from_toml_str`] 在解析后自动校验。
//!
//! # 使用指引（How）
//! ```toml
//! [debounce]
//! delay_ms = 30
//! max_delay_ms = 200
//!
//! [retry]
//! backoff_ms = [100, 500, 2000]
//! max_attempts = 5
//! ```

use std::num::NonZeroUsize;
use std::time::Duration;

use crate::policy::{Backoff, DEFAULT_BACKOFF, DEFAULT_DELAY, DEFAULT_MAX_ATTEMPTS};
use crate::policy::{DebounceOptions, Stop, ThrottleOptions};

/// 配置解析或校验失败。
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// TOML 语法或结构不合法。
    #[error("failed to parse pacing configuration: {0}")]
    Parse(#[from] toml::de::Error),
    /// 字段取值不合法。
    #[error("invalid `{field}`: {reason}")]
    Invalid {
        /// 出错字段。
        field: &'static str,
        /// 原因。
        reason: &'static str,
    },
}

fn default_delay_ms() -> u64 {
    DEFAULT_DELAY.as_millis() as u64
}

fn default_backoff_ms() -> Vec<u64> {
    DEFAULT_BACKOFF
        .iter()
        .map(|delay| delay.as_millis() as u64)
        .collect()
}

fn default_max_attempts() -> u32 {
    DEFAULT_MAX_ATTEMPTS
}

/// 防抖配置。
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DebounceConfig {
    /// 安静期。
    #[serde(default = "default_delay_ms")]
    pub delay_ms: u64,
    /// 最长等待；0 表示不设上限。
    #[serde(default)]
    pub max_delay_ms: u64,
    /// 批量上限。
    #[serde(default)]
    pub max_calls: Option<usize>,
}

impl Default for DebounceConfig {
    fn default() -> Self {
        Self {
            delay_ms: default_delay_ms(),
            max_delay_ms: 0,
            max_calls: None,
        }
    }
}

impl DebounceConfig {
    /// 安静期。
    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }

    /// 把上限类字段写入既有选项，归并器、钩子与时钟保持不变；`max_calls = 0` 视为不设上限。
    pub fn apply<C, A>(&self, options: DebounceOptions<C, A>) -> DebounceOptions<C, A> {
        let options = options.with_max_delay(Duration::from_millis(self.max_delay_ms));
        match self.max_calls.and_then(NonZeroUsize::new) {
            Some(max_calls) => options.with_max_calls(max_calls),
            None => options,
        }
    }
}

/// 节流配置。
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ThrottleConfig {
    /// 最小执行间隔。
    #[serde(default = "default_delay_ms")]
    pub delay_ms: u64,
    /// 批量上限。
    #[serde(default)]
    pub max_calls: Option<usize>,
}

impl Default for ThrottleConfig {
    fn default() -> Self {
        Self {
            delay_ms: default_delay_ms(),
            max_calls: None,
        }
    }
}

impl ThrottleConfig {
    /// 最小执行间隔。
    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }

    /// 把批量上限写入既有选项；`max_calls = 0` 视为不设上限。
    pub fn apply<C, A>(&self, options: ThrottleOptions<C, A>) -> ThrottleOptions<C, A> {
        match self.max_calls.and_then(NonZeroUsize::new) {
            Some(max_calls) => options.with_max_calls(max_calls),
            None => options,
        }
    }
}

/// 重试配置。
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RetryConfig {
    /// 退避时间表。
    #[serde(default = "default_backoff_ms")]
    pub backoff_ms: Vec<u64>,
    /// 最大尝试次数。
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            backoff_ms: default_backoff_ms(),
            max_attempts: default_max_attempts(),
        }
    }
}

impl RetryConfig {
    /// 转换为时间表退避。
    pub fn backoff<E>(&self) -> Backoff<E> {
        Backoff::Sequence(
            self.backoff_ms
                .iter()
                .copied()
                .map(Duration::from_millis)
                .collect(),
        )
    }

    /// 转换为最大尝试次数停止判定。
    pub fn stop<E>(&self) -> Stop<E> {
        Stop::MaxAttempts(self.max_attempts)
    }
}

/// 全部节律策略的配置根。
#[derive(Clone, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PacingConfig {
    /// 防抖。
    pub debounce: DebounceConfig,
    /// 节流。
    pub throttle: ThrottleConfig,
    /// 重试。
    pub retry: RetryConfig,
}

impl PacingConfig {
    /// 从 TOML 文本解析并校验。
    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// 校验字段取值。
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.debounce.max_calls == Some(0) {
            return Err(ConfigError::Invalid {
                field: "debounce.max_calls",
                reason: "must be at least 1",
            });
        }
        if self.throttle.max_calls == Some(0) {
            return Err(ConfigError::Invalid {
                field: "throttle.max_calls",
                reason: "must be at least 1",
            });
        }
        if self.retry.max_attempts == 0 {
            return Err(ConfigError::Invalid {
                field: "retry.max_attempts",
                reason: "must be at least 1",
            });
        }
        if self.retry.backoff_ms.is_empty() {
            return Err(ConfigError::Invalid {
                field: "retry.backoff_ms",
                reason: "must list at least one delay",
            });
        }
        Ok(())
    }
}
