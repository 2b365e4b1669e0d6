//! 可重排定时器：单一回调、可反复推迟、可取消。
//!
//! # 设计背景（Why）
//! - 防抖需要“每次调用都把触发时间往后推”，节流需要“空闲时才布防”，延迟需要“提前触发”；
//!   三者共享同一个最小语义：重新布防即撤销上一次布防。
//!
//! # 逻辑解析（How）
//! - 每次布防递增代数 `generation`，到期任务携带布防时的代数；
//!   触发时代数不一致说明已被重排或取消，直接忽略，从而保证过期触发不会生效；
//! - 回调在锁外执行，回调内部可以再次调用 [`RescheduleTimer::defer`]。
//!
//! # 风险提示（Trade-offs）
//! - 到期任务只持有弱引用；定时器被释放后到期任务自动失效，释放时同时撤销已登记的任务。

use std::fmt;
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use super::clock::{Clock, TimerHandle};

type Callback = Arc<dyn Fn() + Send + Sync + 'static>;

/// 可重排的单回调定时器。
pub struct RescheduleTimer {
    shared: Arc<TimerShared>,
}

struct TimerShared {
    clock: Arc<dyn Clock>,
    callback: Callback,
    state: Mutex<TimerState>,
}

#[derive(Default)]
struct TimerState {
    /// `None` 表示空闲（从未布防、已触发或已取消）。
    delay: Option<Duration>,
    armed_at: Option<Instant>,
    fired_at: Option<Instant>,
    generation: u64,
    pending: Option<TimerHandle>,
}

impl RescheduleTimer {
    /// 以时钟与回调构造空闲定时器。
    pub fn new(clock: Arc<dyn Clock>, callback: impl Fn() + Send + Sync + 'static) -> Self {
        Self {
            shared: Arc::new(TimerShared {
                clock,
                callback: Arc::new(callback),
                state: Mutex::new(TimerState::default()),
            }),
        }
    }

    /// 在 `delay` 之后触发回调，撤销此前的布防。
    ///
    /// # 契约说明（What）
    /// - 无论是否真正重排，都会把 `armed_at` 更新为当前时间；
    /// - 已以零延迟布防时再次以零延迟布防不做任何事，保持原有的触发时机。
    pub fn defer(&self, delay: Duration) {
        let mut state = self.shared.state.lock();
        state.armed_at = Some(self.shared.clock.now());
        if delay.is_zero() && state.delay == Some(Duration::ZERO) {
            return;
        }
        if let Some(pending) = state.pending.take() {
            pending.cancel();
        }
        state.generation = state.generation.wrapping_add(1);
        state.delay = Some(delay);

        let generation = state.generation;
        let weak: Weak<TimerShared> = Arc::downgrade(&self.shared);
        state.pending = Some(self.shared.clock.schedule(
            delay,
            Box::new(move || {
                if let Some(shared) = weak.upgrade() {
                    shared.fire(generation);
                }
            }),
        ));
        tracing::trace!(delay_ms = delay.as_millis() as u64, generation, "timer armed");
    }

    /// 撤销已布防的触发并回到空闲状态；空闲时调用无副作用。
    pub fn cancel(&self) {
        self.shared.state.lock().disarm();
    }

    /// 当前布防的延迟；空闲时为 `None`。
    pub fn delay(&self) -> Option<Duration> {
        self.shared.state.lock().delay
    }

    /// 是否处于布防状态。
    pub fn is_armed(&self) -> bool {
        self.delay().is_some()
    }

    /// 最近一次调用 [`RescheduleTimer::defer`] 的时间。
    pub fn armed_at(&self) -> Option<Instant> {
        self.shared.state.lock().armed_at
    }

    /// 最近一次触发的时间。
    pub fn fired_at(&self) -> Option<Instant> {
        self.shared.state.lock().fired_at
    }

    /// 距离最近一次触发经过的时间；从未触发时为 `None`。
    pub fn since_fired(&self) -> Option<Duration> {
        let fired_at = self.fired_at()?;
        Some(self.shared.clock.now().saturating_duration_since(fired_at))
    }
}

impl TimerState {
    fn disarm(&mut self) {
        if let Some(pending) = self.pending.take() {
            pending.cancel();
        }
        if self.delay.take().is_some() {
            self.generation = self.generation.wrapping_add(1);
        }
    }
}

impl TimerShared {
    fn fire(&self, generation: u64) {
        {
            let mut state = self.state.lock();
            if state.generation != generation || state.delay.is_none() {
                return;
            }
            state.delay = None;
            state.pending = None;
            state.fired_at = Some(self.clock.now());
        }
        tracing::trace!(generation, "timer fired");
        (self.callback)();
    }
}

impl Drop for RescheduleTimer {
    fn drop(&mut self) {
        self.shared.state.lock().disarm();
    }
}

impl fmt::Debug for RescheduleTimer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.shared.state.lock();
        f.debug_struct("RescheduleTimer")
            .field("delay", &state.delay)
            .field("armed_at", &state.armed_at)
            .field("fired_at", &state.fired_at)
            .finish()
    }
}
