//! 防抖：一段安静期之后才执行，安静期内的调用合并为一次。
//!
//! # 设计背景（Why）
//! - 高频触发（输入联想、配置热更新、批量加载）只关心“最后一次”或“这一批”，
//!   逐次执行会浪费下游资源；
//! - 纯防抖在持续活跃时永远不执行，因此提供 `max_delay` 上限与 `max_calls` 批量上限。
//!
//! # 契约说明（What）
//! - 每次调用先撤销定时器，再归并参数，然后按下列规则重新布防：
//!   - `max_calls` 达到时立即同步冲刷；
//!   - `max_delay` 启用时，等待 `min(delay, max_delay - 距批次首个调用的时间)`，
//!     已超过上限则等待零；
//!   - 否则等待 `delay`；
//! - 触发与冲刷都会重置批次（首个调用时间与调用计数）；
//! - `cancel(reason)` 撤销定时器、执行 `on_cancel` 钩子并以原因（缺省 `"cancelled"`）拒绝
//!   当前批次，目标函数不会被调用。
//!
//! # 风险提示（Trade-offs）
//! - 定时器与钩子只持有弱引用；最后一个 [`Debounced`] 句柄被丢弃时，待执行批次随之释放，
//!   其等待者收到 `Cancelled("abandoned")`。

use std::fmt;
use std::future::Future;
use std::num::NonZeroUsize;
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use crate::coalesce::{ArgumentReducer, CallCoalescer, Hook, LatestArguments};
use crate::error::CancelReason;
use crate::settlement::Settlement;
use crate::time::{Clock, RescheduleTimer, default_clock};

/// 防抖与节流的缺省延迟。
pub const DEFAULT_DELAY: Duration = Duration::from_millis(50);

/// 防抖选项。
pub struct DebounceOptions<C, A = C> {
    reducer: Arc<dyn ArgumentReducer<A, C>>,
    max_delay: Duration,
    max_calls: Option<NonZeroUsize>,
    on_cancel: Option<Hook>,
    clock: Option<Arc<dyn Clock>>,
}

impl<A> DebounceOptions<A, A> {
    /// “后者覆盖”归并、无上限的缺省选项。
    pub fn new() -> Self {
        Self::with_reducer(LatestArguments)
    }
}

impl<A> Default for DebounceOptions<A, A> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C, A> DebounceOptions<C, A> {
    /// 以自定义归并器构造选项。
    pub fn with_reducer(reducer: impl ArgumentReducer<A, C>) -> Self {
        Self {
            reducer: Arc::new(reducer),
            max_delay: Duration::ZERO,
            max_calls: None,
            on_cancel: None,
            clock: None,
        }
    }

    /// 自批次首个调用起的最长等待；零表示不设上限。
    #[must_use]
    pub fn with_max_delay(mut self, max_delay: Duration) -> Self {
        self.max_delay = max_delay;
        self
    }

    /// 批次内调用数达到该值时，达到上限的那次调用同步冲刷整批。
    #[must_use]
    pub fn with_max_calls(mut self, max_calls: NonZeroUsize) -> Self {
        self.max_calls = Some(max_calls);
        self
    }

    /// 取消时执行的钩子。
    #[must_use]
    pub fn with_on_cancel(mut self, on_cancel: impl Fn() + Send + Sync + 'static) -> Self {
        self.on_cancel = Some(Arc::new(on_cancel));
        self
    }

    /// 注入时钟；缺省使用 [`default_clock`]。
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }
}

impl<C, A> fmt::Debug for DebounceOptions<C, A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DebounceOptions")
            .field("max_delay", &self.max_delay)
            .field("max_calls", &self.max_calls)
            .field("on_cancel", &self.on_cancel.is_some())
            .finish_non_exhaustive()
    }
}

#[derive(Default)]
struct Batch {
    first_call: Option<Instant>,
    calls: usize,
}

struct DebounceInner<C, A, T, E> {
    delay: Duration,
    max_delay: Duration,
    max_calls: Option<NonZeroUsize>,
    on_cancel: Option<Hook>,
    clock: Arc<dyn Clock>,
    coalescer: CallCoalescer<C, A, T, E>,
    timer: RescheduleTimer,
    batch: Mutex<Batch>,
}

/// 防抖后的函数句柄，可克隆，克隆体共享同一状态。
pub struct Debounced<C, T, E, A = C> {
    inner: Arc<DebounceInner<C, A, T, E>>,
}

/// 构造防抖函数。
///
/// # Panics
/// 未注入时钟且不在 Tokio 运行时上下文中调用时 panic。
pub fn debounce<C, A, T, E, F, Fut>(
    target: F,
    delay: Duration,
    options: DebounceOptions<C, A>,
) -> Debounced<C, T, E, A>
where
    F: Fn(A) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<T, E>> + Send + 'static,
    C: 'static,
    A: Send + 'static,
    T: Clone + Send + Sync + 'static,
    E: Clone + Send + Sync + 'static,
{
    let DebounceOptions {
        reducer,
        max_delay,
        max_calls,
        on_cancel,
        clock,
    } = options;
    let clock = clock.unwrap_or_else(default_clock);

    let inner = Arc::new_cyclic(|weak: &Weak<DebounceInner<C, A, T, E>>| {
        let before = weak.clone();
        let after = weak.clone();
        let fire = weak.clone();
        DebounceInner {
            delay,
            max_delay,
            max_calls,
            on_cancel,
            clock: Arc::clone(&clock),
            coalescer: CallCoalescer::from_parts(Arc::clone(&clock), target, reducer)
                .before_reduce(move || {
                    if let Some(inner) = before.upgrade() {
                        inner.timer.cancel();
                    }
                })
                .after_reduce(move || {
                    if let Some(inner) = after.upgrade() {
                        inner.after_call();
                    }
                }),
            timer: RescheduleTimer::new(clock, move || {
                if let Some(inner) = fire.upgrade() {
                    inner.run();
                }
            }),
            batch: Mutex::new(Batch::default()),
        }
    });
    Debounced { inner }
}

impl<C, A, T, E> DebounceInner<C, A, T, E>
where
    C: 'static,
    A: Send + 'static,
    T: Clone + Send + Sync + 'static,
    E: Clone + Send + Sync + 'static,
{
    fn after_call(&self) {
        let now = self.clock.now();
        let wait = {
            let mut batch = self.batch.lock();
            batch.calls += 1;
            let first_call = *batch.first_call.get_or_insert(now);
            if self.max_calls.is_some_and(|max| batch.calls >= max.get()) {
                None
            } else {
                Some(self.wait_after(now.saturating_duration_since(first_call)))
            }
        };
        match wait {
            Some(wait) => self.timer.defer(wait),
            None => self.flush(),
        }
    }

    fn wait_after(&self, elapsed: Duration) -> Duration {
        if self.max_delay.is_zero() {
            self.delay
        } else if elapsed >= self.max_delay {
            Duration::ZERO
        } else {
            self.delay.min(self.max_delay - elapsed)
        }
    }

    fn run(&self) {
        *self.batch.lock() = Batch::default();
        self.coalescer.prepare().run();
    }

    fn flush(&self) {
        self.timer.cancel();
        tracing::debug!(delay_ms = self.delay.as_millis() as u64, "debounce flushed");
        self.run();
    }

    fn cancel(&self, reason: CancelReason) {
        self.timer.cancel();
        if let Some(on_cancel) = &self.on_cancel {
            on_cancel();
        }
        *self.batch.lock() = Batch::default();
        tracing::debug!(reason = %reason, "debounce cancelled");
        self.coalescer.reset(Some(reason));
    }
}

impl<C, T, E, A> Debounced<C, T, E, A>
where
    C: 'static,
    A: Send + 'static,
    T: Clone + Send + Sync + 'static,
    E: Clone + Send + Sync + 'static,
{
    /// 登记一次调用，返回所在批次的共享结果。
    pub fn call(&self, args: C) -> Settlement<T, E> {
        self.inner.coalescer.call(args)
    }

    /// 撤销定时器并立即执行当前批次；没有待执行批次时无副作用。
    pub fn flush(&self) {
        self.inner.flush();
    }

    /// 取消当前批次；`reason` 缺省为 `"cancelled"`。
    pub fn cancel(&self, reason: Option<CancelReason>) {
        self.inner
            .cancel(reason.unwrap_or_else(CancelReason::cancelled));
    }

    /// 是否存在待执行批次。
    pub fn is_pending(&self) -> bool {
        self.inner.coalescer.has_pending()
    }
}

impl<C, T, E, A> Clone for Debounced<C, T, E, A> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<C, T, E, A> fmt::Debug for Debounced<C, T, E, A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Debounced")
            .field("delay", &self.inner.delay)
            .field("max_delay", &self.inner.max_delay)
            .field("max_calls", &self.inner.max_calls)
            .field("timer", &self.inner.timer)
            .finish()
    }
}
