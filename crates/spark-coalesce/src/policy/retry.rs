//! 重试：失败后按退避等待再次执行，直到成功、停止判定生效或被取消。
//!
//! # 设计背景（Why）
//! - 远端依赖的瞬时失败应当被吸收，但无限重试会放大故障；因此退避时间与停止条件
//!   都由调用方声明，并且整个重试过程可以带原因取消。
//!
//! # 契约说明（What）
//! - 尝试计数从 0 开始；第 `n` 次失败后以 `attempt = n - 1` 计算退避，随后计数加一，
//!   再以新计数、退避时间与错误询问停止判定；
//! - [`Backoff`]：固定时间、时间表（超出末尾按最后一项）或自定义函数，缺省时间表为
//!   10 秒、1 分钟、5 分钟、10 分钟；
//! - [`Stop`]：最大尝试次数（`attempt >= n` 时停止，缺省 10）或自定义判定；
//! - 停止时以 [`Rejection::Stopped`] 拒绝，携带尝试次数与最后一次错误；
//! - 取消检查点：每次调用前、每次失败后、计算退避后、停止判定后、睡眠结束后；
//!   取消会中止进行中的睡眠，结果为携带最后一次错误的 [`Rejection::Cancelled`]；
//! - 成功结束后再取消不产生任何效果。

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use crate::cancellable::CancellableFuture;
use crate::delay::{Delay, DelayHandle, WaitValue};
use crate::error::{CancelReason, Rejection};
use crate::time::{Clock, default_clock};

/// 缺省退避时间表：10 秒、1 分钟、5 分钟、10 分钟。
pub const DEFAULT_BACKOFF: [Duration; 4] = [
    Duration::from_secs(10),
    Duration::from_secs(60),
    Duration::from_secs(300),
    Duration::from_secs(600),
];

/// 缺省最大尝试次数。
pub const DEFAULT_MAX_ATTEMPTS: u32 = 10;

type BackoffFn<E> = dyn Fn(u32, Duration, &E) -> Duration + Send + Sync + 'static;
type StopFn<E> = dyn Fn(u32, Duration, &E) -> bool + Send + Sync + 'static;

/// 退避策略。
pub enum Backoff<E> {
    /// 每次失败后等待相同时间。
    Fixed(Duration),
    /// 按尝试序号查表，超出末尾按最后一项；空表等待零。
    Sequence(Vec<Duration>),
    /// 自定义：`(attempt, previous_delay, error) -> delay`。
    Custom(Arc<BackoffFn<E>>),
}

impl<E> Backoff<E> {
    /// 以闭包构造自定义退避。
    pub fn custom(f: impl Fn(u32, Duration, &E) -> Duration + Send + Sync + 'static) -> Self {
        Self::Custom(Arc::new(f))
    }

    /// 计算第 `attempt` 次失败（从 0 计）之后的等待时间。
    pub fn delay_for(&self, attempt: u32, previous: Duration, error: &E) -> Duration {
        match self {
            Self::Fixed(delay) => *delay,
            Self::Sequence(delays) => {
                let index = usize::try_from(attempt).unwrap_or(usize::MAX);
                delays
                    .get(index)
                    .or_else(|| delays.last())
                    .copied()
                    .unwrap_or(Duration::ZERO)
            }
            Self::Custom(f) => f(attempt, previous, error),
        }
    }
}

impl<E> Default for Backoff<E> {
    fn default() -> Self {
        Self::Sequence(DEFAULT_BACKOFF.to_vec())
    }
}

impl<E> Clone for Backoff<E> {
    fn clone(&self) -> Self {
        match self {
            Self::Fixed(delay) => Self::Fixed(*delay),
            Self::Sequence(delays) => Self::Sequence(delays.clone()),
            Self::Custom(f) => Self::Custom(Arc::clone(f)),
        }
    }
}

impl<E> fmt::Debug for Backoff<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Fixed(delay) => f.debug_tuple("Fixed").field(delay).finish(),
            Self::Sequence(delays) => f.debug_tuple("Sequence").field(delays).finish(),
            Self::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

/// 停止判定。
pub enum Stop<E> {
    /// 尝试次数达到该值时停止。
    MaxAttempts(u32),
    /// 自定义：`(attempt, delay, error) -> stop?`，`attempt` 为已执行的尝试次数。
    Custom(Arc<StopFn<E>>),
}

impl<E> Stop<E> {
    /// 以闭包构造自定义停止判定。
    pub fn custom(f: impl Fn(u32, Duration, &E) -> bool + Send + Sync + 'static) -> Self {
        Self::Custom(Arc::new(f))
    }

    /// 是否停止。
    pub fn should_stop(&self, attempt: u32, delay: Duration, error: &E) -> bool {
        match self {
            Self::MaxAttempts(max) => attempt >= *max,
            Self::Custom(f) => f(attempt, delay, error),
        }
    }
}

impl<E> Default for Stop<E> {
    fn default() -> Self {
        Self::MaxAttempts(DEFAULT_MAX_ATTEMPTS)
    }
}

impl<E> Clone for Stop<E> {
    fn clone(&self) -> Self {
        match self {
            Self::MaxAttempts(max) => Self::MaxAttempts(*max),
            Self::Custom(f) => Self::Custom(Arc::clone(f)),
        }
    }
}

impl<E> fmt::Debug for Stop<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MaxAttempts(max) => f.debug_tuple("MaxAttempts").field(max).finish(),
            Self::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

/// 重试过程的可取消 Future。
pub type Retrying<T, E> = CancellableFuture<T, E>;

/// 重试构造器。
///
/// # 使用指引（How）
/// ```ignore
/// let retrying = Retry::new(Backoff::Fixed(Duration::from_millis(100)), Stop::MaxAttempts(3))
///     .run(|id| fetch(id), 42);
/// ```
#[derive(Clone)]
pub struct Retry<E> {
    backoff: Backoff<E>,
    stop: Stop<E>,
    clock: Option<Arc<dyn Clock>>,
}

impl<E> Retry<E>
where
    E: Clone + Send + Sync + 'static,
{
    /// 以退避与停止策略构造。
    pub fn new(backoff: Backoff<E>, stop: Stop<E>) -> Self {
        Self {
            backoff,
            stop,
            clock: None,
        }
    }

    /// 注入时钟；缺省使用 [`default_clock`]。
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// 立即开始重试 `target(args)`。
    ///
    /// # Panics
    /// 未注入时钟且不在 Tokio 运行时上下文中调用时 panic。
    pub fn run<A, T, F, Fut>(self, target: F, args: A) -> Retrying<T, E>
    where
        F: FnMut(A) -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
        A: Clone + Send + 'static,
        T: Clone + Send + Sync + 'static,
    {
        let clock = self.clock.unwrap_or_else(default_clock);
        let control = Arc::new(RetryControl::default());
        let attempts = RetryLoop {
            target,
            args,
            backoff: self.backoff,
            stop: self.stop,
            clock: Arc::clone(&clock),
            control: Arc::clone(&control),
        };
        CancellableFuture::with_canceller(clock.as_ref(), attempts.drive(), move |reason| {
            control.cancel(reason)
        })
    }
}

impl<E> Default for Retry<E>
where
    E: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new(Backoff::default(), Stop::default())
    }
}

impl<E> fmt::Debug for Retry<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Retry")
            .field("backoff", &self.backoff)
            .field("stop", &self.stop)
            .finish_non_exhaustive()
    }
}

/// 以缺省时钟立即开始重试。
///
/// # Panics
/// 不在 Tokio 运行时上下文中调用时 panic。
pub fn retry<A, T, E, F, Fut>(target: F, args: A, backoff: Backoff<E>, stop: Stop<E>) -> Retrying<T, E>
where
    F: FnMut(A) -> Fut + Send + 'static,
    Fut: Future<Output = Result<T, E>> + Send + 'static,
    A: Clone + Send + 'static,
    T: Clone + Send + Sync + 'static,
    E: Clone + Send + Sync + 'static,
{
    Retry::new(backoff, stop).run(target, args)
}

#[derive(Default)]
struct RetryControl {
    state: Mutex<ControlState>,
}

#[derive(Default)]
struct ControlState {
    cancelled: Option<CancelReason>,
    sleeping: Option<DelayHandle<()>>,
    finished: bool,
}

impl RetryControl {
    fn cancel(&self, reason: CancelReason) {
        let sleeping = {
            let mut state = self.state.lock();
            if state.finished || state.cancelled.is_some() {
                return;
            }
            tracing::debug!(reason = %reason, "retry cancelled");
            state.cancelled = Some(reason);
            state.sleeping.take()
        };
        if let Some(sleeping) = sleeping {
            // 睡眠恰好已到期时取消失败，循环会在睡眠结束后的检查点观察到取消。
            let _ = sleeping.cancel(None);
        }
    }

    /// 已被取消时结束循环并返回携带最后一次错误的取消拒绝。
    fn checkpoint<E>(&self, last_error: &mut Option<E>) -> Result<(), Rejection<E>> {
        let mut state = self.state.lock();
        match state.cancelled.clone() {
            Some(reason) => {
                state.finished = true;
                Err(Rejection::Cancelled {
                    reason,
                    last_error: last_error.take(),
                })
            }
            None => Ok(()),
        }
    }

    /// 登记进行中的睡眠；已被取消时返回 `false`。
    fn begin_sleep(&self, sleeping: DelayHandle<()>) -> bool {
        let mut state = self.state.lock();
        if state.cancelled.is_some() {
            return false;
        }
        state.sleeping = Some(sleeping);
        true
    }

    fn end_sleep(&self) {
        self.state.lock().sleeping = None;
    }

    fn finish(&self) {
        self.state.lock().finished = true;
    }
}

struct RetryLoop<F, A, E> {
    target: F,
    args: A,
    backoff: Backoff<E>,
    stop: Stop<E>,
    clock: Arc<dyn Clock>,
    control: Arc<RetryControl>,
}

impl<F, A, E> RetryLoop<F, A, E>
where
    A: Clone,
    E: Clone,
{
    async fn drive<T, Fut>(mut self) -> Result<T, Rejection<E>>
    where
        F: FnMut(A) -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let mut attempt: u32 = 0;
        let mut previous = Duration::ZERO;
        let mut last_error: Option<E> = None;

        loop {
            self.control.checkpoint(&mut last_error)?;
            let error = match (self.target)(self.args.clone()).await {
                Ok(value) => {
                    self.control.checkpoint(&mut last_error)?;
                    self.control.finish();
                    return Ok(value);
                }
                Err(error) => error,
            };
            last_error = Some(error.clone());
            self.control.checkpoint(&mut last_error)?;

            let delay = self.backoff.delay_for(attempt, previous, &error);
            self.control.checkpoint(&mut last_error)?;

            attempt = attempt.saturating_add(1);
            if self.stop.should_stop(attempt, delay, &error) {
                self.control.finish();
                tracing::debug!(attempts = attempt, "retry stopped");
                return Err(Rejection::Stopped {
                    attempts: attempt,
                    error,
                });
            }
            self.control.checkpoint(&mut last_error)?;

            tracing::trace!(
                attempt,
                delay_ms = delay.as_millis() as u64,
                "retry attempt failed, backing off"
            );
            let sleeping = Delay::with_clock(Arc::clone(&self.clock), delay, WaitValue::Value(()));
            if self.control.begin_sleep(sleeping.handle()) {
                // 取消由下一轮循环开头的检查点处理。
                let _ = sleeping.await;
                self.control.end_sleep();
            }
            previous = delay;
        }
    }
}
