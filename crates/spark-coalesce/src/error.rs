//! 错误与拒绝值定义。
//!
//! # 设计背景（Why）
//! - 合并原语存在两类失败：一类是调用方的同步误用（重复结算、重复取消），另一类是
//!   通过 Future 异步交付给等待者的拒绝值（目标失败、被取消、重试被终止）。
//! - 两类错误的受众不同：前者面向当前调用点，后者面向所有共享同一结算的等待者，
//!   因此拆分为 [`SettleError`] 与 [`Rejection`] 两个类型。
//!
//! # 契约说明（What）
//! - [`SettleError`] 通过 `Result` 同步返回，不会进入任何 Future；
//! - [`Rejection`] 必须可 `Clone`，因为同一结算会被多个等待者共享；
//! - [`CancelReason`] 使用 `Arc<str>` 承载，克隆成本为一次原子计数递增。

use std::fmt;
use std::sync::Arc;

/// 同步误用错误：对已经结算或已经取消的对象再次发起结算/取消。
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, thiserror::Error)]
pub enum SettleError {
    /// 结算已完成（成功或拒绝），再次结算被拒绝。
    #[error("settlement already completed or rejected")]
    AlreadySettled,
    /// 取消已被受理，重复取消被拒绝。
    #[error("cancellation already requested")]
    AlreadyCancelled,
}

/// 取消原因。
///
/// # 契约说明（What）
/// - 比较语义基于文本内容：两个以相同文本构造的原因视为相等；
/// - 预置原因：[`CancelReason::cancelled`]（取消默认值）、[`CancelReason::reset`]
///   （合并器重置默认值）、[`CancelReason::abandoned`]（结算箱被丢弃而未结算）。
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct CancelReason(Arc<str>);

impl CancelReason {
    /// 以任意文本构造取消原因。
    pub fn new(message: impl Into<Arc<str>>) -> Self {
        Self(message.into())
    }

    /// 取消操作未显式给出原因时使用的默认值。
    pub fn cancelled() -> Self {
        Self::new("cancelled")
    }

    /// 合并器 `reset` 未显式给出原因时使用的默认值。
    pub fn reset() -> Self {
        Self::new("reset")
    }

    /// 结算箱在未结算的情况下被释放（所有者被丢弃或执行任务被中止）。
    pub fn abandoned() -> Self {
        Self::new("abandoned")
    }

    /// 返回原因文本。
    pub fn message(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for CancelReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("CancelReason").field(&self.message()).finish()
    }
}

impl fmt::Display for CancelReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.message())
    }
}

impl std::error::Error for CancelReason {}

impl From<&str> for CancelReason {
    fn from(message: &str) -> Self {
        Self::new(message)
    }
}

impl From<String> for CancelReason {
    fn from(message: String) -> Self {
        Self::new(message)
    }
}

/// 经由 Future 交付给等待者的拒绝值。
///
/// # 设计背景（Why）
/// - 目标函数的失败需要原样传递（`Failed`），而取消与重试终止是原语自身产生的拒绝，
///   必须与业务错误区分开，避免调用方把“被取消”误判为“目标失败”。
///
/// # 契约说明（What）
/// - `Failed(E)`：目标函数返回的错误，原样传递；
/// - `Cancelled { reason, last_error }`：被取消；若取消发生前已有失败（如重试过程中），
///   `last_error` 携带最后一次失败；
/// - `Stopped { attempts, error }`：重试的停止判定生效，`attempts` 为已执行的尝试次数，
///   `error` 为触发停止的那次失败。
#[derive(Clone, Debug, PartialEq, thiserror::Error)]
pub enum Rejection<E> {
    /// 目标函数失败。
    #[error("{0}")]
    Failed(E),
    /// 被取消。
    #[error("cancelled: {reason}")]
    Cancelled {
        /// 取消原因。
        reason: CancelReason,
        /// 取消前观察到的最后一次失败。
        last_error: Option<E>,
    },
    /// 重试被停止判定终止。
    #[error("stopped after {attempts} attempts: {error}")]
    Stopped {
        /// 已执行的尝试次数。
        attempts: u32,
        /// 触发停止的失败。
        error: E,
    },
}

impl<E> Rejection<E> {
    /// 构造不携带历史失败的取消拒绝。
    pub fn cancelled(reason: CancelReason) -> Self {
        Self::Cancelled {
            reason,
            last_error: None,
        }
    }

    /// 是否为取消类拒绝。
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled { .. })
    }

    /// 取消原因；非取消拒绝返回 `None`。
    pub fn reason(&self) -> Option<&CancelReason> {
        match self {
            Self::Cancelled { reason, .. } => Some(reason),
            _ => None,
        }
    }

    /// 拒绝所关联的业务错误（`Failed`、`Stopped` 或取消前的最后一次失败）。
    pub fn failure(&self) -> Option<&E> {
        match self {
            Self::Failed(error) | Self::Stopped { error, .. } => Some(error),
            Self::Cancelled { last_error, .. } => last_error.as_ref(),
        }
    }
}
