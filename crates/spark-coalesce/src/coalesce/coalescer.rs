//! 调用合并器：把多次调用的参数归并为一次待执行调用，所有调用方共享同一结果。
//!
//! # 设计背景（Why）
//! - 防抖与节流的共同点是“多次调用，一次执行，一份结果”，差异只在何时执行；
//!   合并器只负责前者，执行时机由外部策略通过 [`CallCoalescer::prepare`] 决定。
//!
//! # 契约说明（What）
//! - `call`：依次执行 `before_reduce` 钩子、参数归并、（必要时）创建待执行调用、
//!   `after_reduce` 钩子，返回待执行调用的共享结果；
//! - `prepare`：把当前待执行调用整体摘下，返回一个运行器；此后的 `call` 开始新一批次；
//!   没有待执行调用时返回空运行器；
//! - `reset`：以取消原因拒绝当前待执行调用（缺省 `"reset"`）并清空。
//!
//! # 逻辑解析（How）
//! - 待执行调用（累积参数 + 结算箱）放在一把锁里，归并在锁内完成，钩子在锁外执行，
//!   钩子内部因此可以重入 `prepare`/`reset`；
//! - 运行器在调用线程上同步调用目标函数，返回的 Future 交给时钟在后台驱动。

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use futures::future::{BoxFuture, FutureExt};
use parking_lot::Mutex;

use super::reducer::{ArgumentReducer, LatestArguments};
use crate::error::{CancelReason, Rejection};
use crate::settlement::{Settlement, SettlementBox};
use crate::time::Clock;

/// 合并器钩子。
pub type Hook = Arc<dyn Fn() + Send + Sync + 'static>;

type Target<A, T, E> = Arc<dyn Fn(A) -> BoxFuture<'static, Result<T, E>> + Send + Sync + 'static>;

struct PendingInvocation<A, T, E> {
    args: A,
    result: SettlementBox<T, E>,
}

/// 调用合并器。
///
/// `C` 为单次调用参数，`A` 为归并后传给目标函数的参数，`T`/`E` 为目标函数的成功值与错误。
pub struct CallCoalescer<C, A, T, E> {
    target: Target<A, T, E>,
    reducer: Arc<dyn ArgumentReducer<A, C>>,
    before_reduce: Option<Hook>,
    after_reduce: Option<Hook>,
    clock: Arc<dyn Clock>,
    pending: Mutex<Option<PendingInvocation<A, T, E>>>,
}

impl<A, T, E> CallCoalescer<A, A, T, E>
where
    A: Send + 'static,
    T: Clone + Send + Sync + 'static,
    E: Clone + Send + Sync + 'static,
{
    /// 以“后者覆盖”归并器构造合并器。
    pub fn new<F, Fut>(clock: Arc<dyn Clock>, target: F) -> Self
    where
        F: Fn(A) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
    {
        Self::with_reducer(clock, target, LatestArguments)
    }
}

impl<C, A, T, E> CallCoalescer<C, A, T, E>
where
    C: 'static,
    A: Send + 'static,
    T: Clone + Send + Sync + 'static,
    E: Clone + Send + Sync + 'static,
{
    /// 以自定义归并器构造合并器。
    pub fn with_reducer<F, Fut, R>(clock: Arc<dyn Clock>, target: F, reducer: R) -> Self
    where
        F: Fn(A) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
        R: ArgumentReducer<A, C>,
    {
        Self::from_parts(clock, target, Arc::new(reducer))
    }

    pub(crate) fn from_parts<F, Fut>(
        clock: Arc<dyn Clock>,
        target: F,
        reducer: Arc<dyn ArgumentReducer<A, C>>,
    ) -> Self
    where
        F: Fn(A) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
    {
        Self {
            target: Arc::new(move |args| target(args).boxed()),
            reducer,
            before_reduce: None,
            after_reduce: None,
            clock,
            pending: Mutex::new(None),
        }
    }

    /// 设置归并前钩子。
    #[must_use]
    pub fn before_reduce(mut self, hook: impl Fn() + Send + Sync + 'static) -> Self {
        self.before_reduce = Some(Arc::new(hook));
        self
    }

    /// 设置归并后钩子。
    #[must_use]
    pub fn after_reduce(mut self, hook: impl Fn() + Send + Sync + 'static) -> Self {
        self.after_reduce = Some(Arc::new(hook));
        self
    }

    /// 登记一次调用，返回所在批次的共享结果。
    pub fn call(&self, args: C) -> Settlement<T, E> {
        run_hook(self.before_reduce.as_ref());
        let settlement = {
            let mut slot = self.pending.lock();
            let (accumulated, result) = match slot.take() {
                Some(PendingInvocation { args, result }) => (Some(args), result),
                None => (None, SettlementBox::new()),
            };
            let args = self.reducer.reduce(accumulated, args);
            let settlement = result.settlement();
            *slot = Some(PendingInvocation { args, result });
            settlement
        };
        run_hook(self.after_reduce.as_ref());
        settlement
    }

    /// 摘下当前待执行调用并返回其运行器。
    pub fn prepare(&self) -> Runner {
        let Some(PendingInvocation { args, result }) = self.pending.lock().take() else {
            return Runner::empty();
        };
        let target = Arc::clone(&self.target);
        let clock = Arc::clone(&self.clock);
        Runner {
            task: Some(Box::new(move || {
                let invocation = target(args);
                clock.spawn(Box::pin(async move {
                    let outcome = invocation.await.map_err(Rejection::Failed);
                    if result.settle(outcome).is_err() {
                        tracing::debug!("coalesced invocation settled twice");
                    }
                }));
            })),
        }
    }

    /// 以取消原因拒绝当前待执行调用并清空；没有待执行调用时无副作用。
    pub fn reset(&self, reason: Option<CancelReason>) {
        let Some(pending) = self.pending.lock().take() else {
            return;
        };
        let reason = reason.unwrap_or_else(CancelReason::reset);
        let _ = pending.result.error(Rejection::cancelled(reason));
    }

    /// 是否存在待执行调用。
    pub fn has_pending(&self) -> bool {
        self.pending.lock().is_some()
    }
}

fn run_hook(hook: Option<&Hook>) {
    if let Some(hook) = hook {
        hook();
    }
}

impl<C, A, T, E> fmt::Debug for CallCoalescer<C, A, T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallCoalescer")
            .field("pending", &self.pending.lock().is_some())
            .finish_non_exhaustive()
    }
}

/// 由 [`CallCoalescer::prepare`] 产出的运行器，`run` 以归并后的参数调用目标函数。
#[must_use = "运行器不执行就会丢弃已摘下的调用，等待者将收到 abandoned 拒绝"]
pub struct Runner {
    task: Option<Box<dyn FnOnce() + Send + 'static>>,
}

impl Runner {
    fn empty() -> Self {
        Self { task: None }
    }

    /// 是否为空运行器。
    pub fn is_empty(&self) -> bool {
        self.task.is_none()
    }

    /// 同步调用目标函数，结果异步交付给批次内的全部等待者。
    pub fn run(self) {
        if let Some(task) = self.task {
            task();
        }
    }
}

impl fmt::Debug for Runner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Runner")
            .field("empty", &self.is_empty())
            .finish()
    }
}
