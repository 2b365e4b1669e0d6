//! 节流：相邻两次执行至少间隔 `delay`，间隔内的调用合并到下一次执行。
//!
//! # 契约说明（What）
//! - 首次调用在下一轮调度立即执行；
//! - 之后每次调用仅在定时器空闲时布防，等待 `delay - 距上次执行的时间`（不足零按零）；
//!   定时器已布防时只归并参数；
//! - `max_calls`、`flush()` 与 `cancel(reason)` 的语义与防抖一致；取消不会重置“上次执行时间”。

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

/// 节流选项。
pub struct ThrottleOptions<C, A = C> {
    reducer: Arc<dyn ArgumentReducer<A, C>>,
    max_calls: Option<NonZeroUsize>,
    on_cancel: Option<Hook>,
    clock: Option<Arc<dyn Clock>>,
}

impl<A> ThrottleOptions<A, A> {
    /// “后者覆盖”归并、无批量上限的缺省选项。
    pub fn new() -> Self {
        Self::with_reducer(LatestArguments)
    }
}

impl<A> Default for ThrottleOptions<A, A> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C, A> ThrottleOptions<C, A> {
    /// 以自定义归并器构造选项。
    pub fn with_reducer(reducer: impl ArgumentReducer<A, C>) -> Self {
        Self {
            reducer: Arc::new(reducer),
            max_calls: None,
            on_cancel: None,
            clock: None,
        }
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

impl<C, A> fmt::Debug for ThrottleOptions<C, A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ThrottleOptions")
            .field("max_calls", &self.max_calls)
            .field("on_cancel", &self.on_cancel.is_some())
            .finish_non_exhaustive()
    }
}

#[derive(Default)]
struct Pace {
    last_run: Option<Instant>,
    calls: usize,
}

struct ThrottleInner<C, A, T, E> {
    delay: Duration,
    max_calls: Option<NonZeroUsize>,
    on_cancel: Option<Hook>,
    clock: Arc<dyn Clock>,
    coalescer: CallCoalescer<C, A, T, E>,
    timer: RescheduleTimer,
    pace: Mutex<Pace>,
}

/// 节流后的函数句柄，可克隆，克隆体共享同一状态。
pub struct Throttled<C, T, E, A = C> {
    inner: Arc<ThrottleInner<C, A, T, E>>,
}

/// 构造节流函数。
///
/// # Panics
/// 未注入时钟且不在 Tokio 运行时上下文中调用时 panic。
pub fn throttle<C, A, T, E, F, Fut>(
    target: F,
    delay: Duration,
    options: ThrottleOptions<C, A>,
) -> Throttled<C, T, E, A>
where
    F: Fn(A) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<T, E>> + Send + 'static,
    C: 'static,
    A: Send + 'static,
    T: Clone + Send + Sync + 'static,
    E: Clone + Send + Sync + 'static,
{
    let ThrottleOptions {
        reducer,
        max_calls,
        on_cancel,
        clock,
    } = options;
    let clock = clock.unwrap_or_else(default_clock);

    let inner = Arc::new_cyclic(|weak: &Weak<ThrottleInner<C, A, T, E>>| {
        let after = weak.clone();
        let fire = weak.clone();
        ThrottleInner {
            delay,
            max_calls,
            on_cancel,
            clock: Arc::clone(&clock),
            coalescer: CallCoalescer::from_parts(Arc::clone(&clock), target, reducer)
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
            pace: Mutex::new(Pace::default()),
        }
    });
    Throttled { inner }
}

impl<C, A, T, E> ThrottleInner<C, A, T, E>
where
    C: 'static,
    A: Send + 'static,
    T: Clone + Send + Sync + 'static,
    E: Clone + Send + Sync + 'static,
{
    fn after_call(&self) {
        let now = self.clock.now();
        let wait = {
            let mut pace = self.pace.lock();
            pace.calls += 1;
            if self.max_calls.is_some_and(|max| pace.calls >= max.get()) {
                None
            } else {
                let last_run = pace.last_run;
                Some(match last_run {
                    Some(last_run) => self
                        .delay
                        .saturating_sub(now.saturating_duration_since(last_run)),
                    None => {
                        pace.last_run = Some(now);
                        Duration::ZERO
                    }
                })
            }
        };
        match wait {
            Some(_) if self.timer.is_armed() => {}
            Some(wait) => self.timer.defer(wait),
            None => self.flush(),
        }
    }

    fn run(&self) {
        let runner = self.coalescer.prepare();
        if runner.is_empty() {
            return;
        }
        {
            let mut pace = self.pace.lock();
            pace.last_run = Some(self.clock.now());
            pace.calls = 0;
        }
        runner.run();
    }

    fn flush(&self) {
        self.timer.cancel();
        tracing::debug!(delay_ms = self.delay.as_millis() as u64, "throttle flushed");
        self.run();
    }

    fn cancel(&self, reason: CancelReason) {
        self.timer.cancel();
        if let Some(on_cancel) = &self.on_cancel {
            on_cancel();
        }
        self.pace.lock().calls = 0;
        tracing::debug!(reason = %reason, "throttle cancelled");
        self.coalescer.reset(Some(reason));
    }
}

impl<C, T, E, A> Throttled<C, T, E, A>
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

impl<C, T, E, A> Clone for Throttled<C, T, E, A> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<C, T, E, A> fmt::Debug for Throttled<C, T, E, A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Throttled")
            .field("delay", &self.inner.delay)
            .field("max_calls", &self.inner.max_calls)
            .field("timer", &self.inner.timer)
            .finish()
    }
}
