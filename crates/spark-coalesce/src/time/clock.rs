// 教案级说明：调度基座。
//
// - **意图 (Why)**：防抖、节流、延迟与重试都依赖“当前时间”“延迟执行”“驱动后台 Future”三项能力；
//   若直接调用运行时 API，测试将无法在虚拟时间上复现，也无法替换为其他执行器。
// - **契约 (What)**：导出 [`Clock`] 抽象、可取消的 [`TimerHandle`] 以及基于 Tokio 的
//   [`TokioClock`] 实现；[`default_clock`] 为各策略的缺省时钟。
// - **实现提示 (How)**：`TokioClock` 全部走 `tokio::time`，因此 `tokio::time::pause` 或
//   `#[tokio::test(start_paused = true)]` 可直接驱动虚拟时间。
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::future::BoxFuture;
use tokio::runtime::{Handle, TryCurrentError};

/// 定时器到期时执行的回调。
pub type TimerTask = Box<dyn FnOnce() + Send + 'static>;

/// 抽象可注入的时钟，统一“获取当前时间”“延迟执行回调”“驱动后台 Future”三项能力。
///
/// # 设计背景（Why）
/// - 合并策略的计时语义全部依赖时钟；通过 trait 注入即可在生产环境使用真实时间，
///   在测试中使用可控的虚拟时间。
///
/// # 接口约束（What）
/// - `now`：返回单调时间点；
/// - `schedule`：在 `delay` 之后执行 `task`，返回可取消句柄；实现**不得**在 `schedule`
///   内同步执行 `task`，调用方可能在持锁状态下登记定时器；`delay` 为零时 `task`
///   在下一轮调度执行；
/// - `spawn`：在后台驱动一个 Future 直至完成，返回可中止该任务的句柄；
///   丢弃句柄不会中止任务。
///
/// # 使用指引（How）
/// - 推荐以 `Arc<dyn Clock>` 形式在组件间共享；
/// - 生产环境使用 [`TokioClock`]。
pub trait Clock: Send + Sync + 'static {
    /// 返回当前的单调时间点。
    fn now(&self) -> Instant;

    /// 在 `delay` 之后执行 `task`。
    fn schedule(&self, delay: Duration, task: TimerTask) -> TimerHandle;

    /// 在后台驱动 `future` 直至完成。
    fn spawn(&self, future: BoxFuture<'static, ()>) -> TimerHandle;
}

/// 已登记定时器或后台任务的取消句柄。
///
/// 丢弃句柄不会取消定时器，必须显式调用 [`TimerHandle::cancel`]。
pub struct TimerHandle {
    cancel: Option<Box<dyn FnOnce() + Send + 'static>>,
}

impl TimerHandle {
    /// 以取消动作构造句柄。
    pub fn new(cancel: impl FnOnce() + Send + 'static) -> Self {
        Self {
            cancel: Some(Box::new(cancel)),
        }
    }

    /// 取消尚未执行的定时器；已执行的定时器不受影响。
    pub fn cancel(mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl fmt::Debug for TimerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TimerHandle")
            .field("cancellable", &self.cancel.is_some())
            .finish()
    }
}

/// 基于 Tokio 运行时的时钟。
///
/// # 契约说明（What）
/// - `now` 读取 `tokio::time::Instant`，暂停时钟下返回虚拟时间；
/// - `schedule` 在登记时确定截止时间，派生任务睡眠至截止时间后执行回调，取消即中止该任务；
/// - `spawn` 通过捕获的运行时句柄派生任务，句柄的取消动作为 `abort`。
#[derive(Clone, Debug)]
pub struct TokioClock {
    handle: Handle,
}

impl TokioClock {
    /// 捕获当前上下文的 Tokio 运行时。
    ///
    /// # Panics
    /// 不在 Tokio 运行时上下文中调用时 panic，与 `tokio::spawn` 一致。
    pub fn current() -> Self {
        Self {
            handle: Handle::current(),
        }
    }

    /// 捕获当前上下文的 Tokio 运行时；不在运行时内时返回错误。
    pub fn try_current() -> Result<Self, TryCurrentError> {
        Handle::try_current().map(|handle| Self { handle })
    }

    /// 使用显式的运行时句柄。
    pub fn with_handle(handle: Handle) -> Self {
        Self { handle }
    }
}

impl Clock for TokioClock {
    fn now(&self) -> Instant {
        tokio::time::Instant::now().into_std()
    }

    fn schedule(&self, delay: Duration, task: TimerTask) -> TimerHandle {
        // 截止时间在登记时确定，调度线程随后的忙碌不计入延迟。
        let deadline = tokio::time::Instant::now() + delay;
        let join = self.handle.spawn(async move {
            if !delay.is_zero() {
                tokio::time::sleep_until(deadline).await;
            }
            task();
        });
        let abort = join.abort_handle();
        TimerHandle::new(move || abort.abort())
    }

    fn spawn(&self, future: BoxFuture<'static, ()>) -> TimerHandle {
        let abort = self.handle.spawn(future).abort_handle();
        TimerHandle::new(move || abort.abort())
    }
}

/// 各策略未注入时钟时使用的缺省时钟。
///
/// # Panics
/// 不在 Tokio 运行时上下文中调用时 panic。
pub fn default_clock() -> Arc<dyn Clock> {
    Arc::new(TokioClock::current())
}
