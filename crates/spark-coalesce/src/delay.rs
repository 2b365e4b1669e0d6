//! 可取消、可提前触发的延迟。
//!
//! # 设计背景（Why）
//! - 重试的退避睡眠需要被取消；测试与优雅关闭需要“立即结束等待”。
//!   普通的 `sleep` 只能被丢弃，因此这里在 [`RescheduleTimer`] 与 [`SettlementBox`]
//!   之上构造一个带 `cancel`/`stop` 的延迟。
//!
//! # 契约说明（What）
//! - [`wait_with`] 在 `delay` 之后以给定值完成；值可以是现成的 [`WaitValue::Value`]，
//!   也可以是到期时才求值的 [`WaitValue::Producer`]；
//! - `cancel(reason)` 立即以原因拒绝并撤销定时器；已完成返回
//!   [`SettleError::AlreadySettled`]，已取消返回 [`SettleError::AlreadyCancelled`]；
//! - `stop()` 让定时器在下一轮调度触发；已触发或已取消时无副作用，重复调用幂等。

use std::convert::Infallible;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Weak};
use std::task::{Context, Poll};
use std::time::Duration;

use parking_lot::Mutex;

use crate::error::{CancelReason, Rejection, SettleError};
use crate::settlement::{Settlement, SettlementBox};
use crate::time::{Clock, RescheduleTimer, default_clock};

/// 延迟到期时产出的值。
pub enum WaitValue<T> {
    /// 现成的值。
    Value(T),
    /// 到期时调用的生产函数。
    Producer(Box<dyn FnOnce() -> T + Send + 'static>),
}

impl<T> WaitValue<T> {
    /// 以闭包构造生产函数。
    pub fn producer(produce: impl FnOnce() -> T + Send + 'static) -> Self {
        Self::Producer(Box::new(produce))
    }

    fn resolve(self) -> T {
        match self {
            Self::Value(value) => value,
            Self::Producer(produce) => produce(),
        }
    }
}

impl<T> fmt::Debug for WaitValue<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Value(_) => f.write_str("WaitValue::Value(..)"),
            Self::Producer(_) => f.write_str("WaitValue::Producer(..)"),
        }
    }
}

enum DelayPhase<T> {
    Waiting(WaitValue<T>),
    Fired,
    Cancelled,
}

struct DelayShared<T> {
    phase: Mutex<DelayPhase<T>>,
    result: SettlementBox<T, Infallible>,
    timer: RescheduleTimer,
}

/// 延迟 Future：到期时产出值，被取消时产出取消原因。
pub struct Delay<T> {
    settlement: Settlement<T, Infallible>,
    handle: DelayHandle<T>,
}

/// [`Delay`] 的可克隆控制句柄。
pub struct DelayHandle<T> {
    shared: Arc<DelayShared<T>>,
}

impl<T> Delay<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// 使用指定时钟构造延迟，构造即开始计时。
    pub fn with_clock(clock: Arc<dyn Clock>, delay: Duration, value: WaitValue<T>) -> Self {
        let shared = Arc::new_cyclic(|weak: &Weak<DelayShared<T>>| {
            let weak = weak.clone();
            DelayShared {
                phase: Mutex::new(DelayPhase::Waiting(value)),
                result: SettlementBox::new(),
                timer: RescheduleTimer::new(clock, move || {
                    if let Some(shared) = weak.upgrade() {
                        shared.fire();
                    }
                }),
            }
        });
        shared.timer.defer(delay);
        Self {
            settlement: shared.result.settlement(),
            handle: DelayHandle { shared },
        }
    }

    /// 返回可克隆的控制句柄。
    pub fn handle(&self) -> DelayHandle<T> {
        DelayHandle {
            shared: Arc::clone(&self.handle.shared),
        }
    }

    /// 取消延迟；`reason` 缺省为 `"cancelled"`。
    pub fn cancel(&self, reason: Option<CancelReason>) -> Result<(), SettleError> {
        self.handle.cancel(reason)
    }

    /// 让延迟在下一轮调度触发。
    pub fn stop(&self) {
        self.handle.stop();
    }
}

impl<T> DelayShared<T>
where
    T: Clone,
{
    fn fire(&self) {
        let value = {
            let mut phase = self.phase.lock();
            match std::mem::replace(&mut *phase, DelayPhase::Fired) {
                DelayPhase::Waiting(value) => value,
                settled => {
                    *phase = settled;
                    return;
                }
            }
        };
        let _ = self.result.complete(value.resolve());
    }
}

impl<T> DelayHandle<T>
where
    T: Clone,
{
    /// 取消延迟；`reason` 缺省为 `"cancelled"`。
    pub fn cancel(&self, reason: Option<CancelReason>) -> Result<(), SettleError> {
        {
            let mut phase = self.shared.phase.lock();
            match &*phase {
                DelayPhase::Fired => return Err(SettleError::AlreadySettled),
                DelayPhase::Cancelled => return Err(SettleError::AlreadyCancelled),
                DelayPhase::Waiting(_) => *phase = DelayPhase::Cancelled,
            }
        }
        self.shared.timer.cancel();
        self.shared.result.error(Rejection::cancelled(
            reason.unwrap_or_else(CancelReason::cancelled),
        ))
    }

    /// 让延迟在下一轮调度触发；已触发或已取消时无副作用。
    pub fn stop(&self) {
        if !matches!(&*self.shared.phase.lock(), DelayPhase::Waiting(_)) {
            return;
        }
        if self.shared.timer.is_armed() {
            self.shared.timer.defer(Duration::ZERO);
        }
    }
}

impl<T> Clone for DelayHandle<T> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T> Future for Delay<T>
where
    T: Clone,
{
    type Output = Result<T, CancelReason>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.settlement)
            .poll(cx)
            .map(|outcome| match outcome {
                Ok(value) => Ok(value),
                Err(Rejection::Cancelled { reason, .. }) => Err(reason),
                Err(Rejection::Failed(never)) => match never {},
                Err(Rejection::Stopped { error, .. }) => match error {},
            })
    }
}

impl<T> fmt::Debug for Delay<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Delay")
            .field("timer", &self.handle.shared.timer)
            .finish_non_exhaustive()
    }
}

impl<T> fmt::Debug for DelayHandle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DelayHandle")
            .field("timer", &self.shared.timer)
            .finish_non_exhaustive()
    }
}

/// 在 `delay` 之后以 `()` 完成。
///
/// # Panics
/// 不在 Tokio 运行时上下文中调用时 panic。
pub fn wait(delay: Duration) -> Delay<()> {
    wait_with(delay, WaitValue::Value(()))
}

/// 在 `delay` 之后以 `value` 完成。
///
/// # Panics
/// 不在 Tokio 运行时上下文中调用时 panic。
pub fn wait_with<T>(delay: Duration, value: WaitValue<T>) -> Delay<T>
where
    T: Clone + Send + Sync + 'static,
{
    Delay::with_clock(default_clock(), delay, value)
}

/// [`wait_with`] 的参数倒置形式：先给值，再给延迟。
///
/// # Panics
/// 不在 Tokio 运行时上下文中调用时 panic。
pub fn delay<T>(value: WaitValue<T>, wait: Duration) -> Delay<T>
where
    T: Clone + Send + Sync + 'static,
{
    wait_with(wait, value)
}
