//! 可取消的 Future。
//!
//! # 设计背景（Why）
//! - 重试、延迟等长耗时操作需要在外部被中止，而 Rust 的 Future 只能通过丢弃来取消，
//!   丢弃无法携带原因，也无法让其他共享等待者得知；
//! - 这里把内部 Future 交给后台驱动，外部只持有结算端，从而支持“带原因的取消”
//!   与“可选的自定义取消器”。
//!
//! # 契约说明（What）
//! - 构造即开始驱动内部 Future（与 Promise 一样是急切的）；
//! - 状态机：`Active` → `Settled`（内部 Future 完成）或 `Active` → `Cancelled`（取消被受理），
//!   两个终态互斥且不可逆；
//! - 取消已结算的 Future 返回 [`SettleError::AlreadySettled`]，重复取消返回
//!   [`SettleError::AlreadyCancelled`]；
//! - 未提供取消器时，取消立即以原因拒绝并中止驱动内部 Future 的后台任务；
//!   提供取消器时调用取消器，并在内部 Future 结束后以取消原因拒绝，取消优先于内部结果。
//!
//! # 风险提示（Trade-offs）
//! - 自定义取消器若无法让内部 Future 结束，外部结果会一直等待内部 Future。

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use parking_lot::Mutex;

use crate::error::{CancelReason, Rejection, SettleError};
use crate::settlement::{Outcome, Settlement, SettlementBox};
use crate::time::{Clock, TimerHandle, default_clock};

/// 自定义取消器：接收取消原因，负责让内部 Future 尽快结束。
pub type Canceller = Box<dyn FnOnce(CancelReason) + Send + 'static>;

#[derive(Debug)]
enum CancelState {
    Active,
    Settled,
    Cancelled(CancelReason),
}

struct CancelShared<T, E> {
    state: Mutex<CancelState>,
    canceller: Mutex<Option<Canceller>>,
    driver: Mutex<Option<TimerHandle>>,
    result: SettlementBox<T, E>,
}

/// 带 `cancel` 能力的 Future。
pub struct CancellableFuture<T, E> {
    settlement: Settlement<T, E>,
    handle: CancelHandle<T, E>,
}

/// [`CancellableFuture`] 的可克隆取消句柄，可在 Future 被 `await` 时从别处取消。
pub struct CancelHandle<T, E> {
    shared: Arc<CancelShared<T, E>>,
}

impl<T, E> CancellableFuture<T, E>
where
    T: Clone + Send + Sync + 'static,
    E: Clone + Send + Sync + 'static,
{
    /// 以缺省取消行为包装 `inner`：取消时立即拒绝。
    pub fn new<F>(clock: &dyn Clock, inner: F) -> Self
    where
        F: Future<Output = Outcome<T, E>> + Send + 'static,
    {
        Self::spawn_inner(clock, inner, None)
    }

    /// 以自定义取消器包装 `inner`。
    pub fn with_canceller<F, K>(clock: &dyn Clock, inner: F, canceller: K) -> Self
    where
        F: Future<Output = Outcome<T, E>> + Send + 'static,
        K: FnOnce(CancelReason) + Send + 'static,
    {
        Self::spawn_inner(clock, inner, Some(Box::new(canceller)))
    }

    fn spawn_inner<F>(clock: &dyn Clock, inner: F, canceller: Option<Canceller>) -> Self
    where
        F: Future<Output = Outcome<T, E>> + Send + 'static,
    {
        let shared = Arc::new(CancelShared {
            state: Mutex::new(CancelState::Active),
            canceller: Mutex::new(canceller),
            driver: Mutex::new(None),
            result: SettlementBox::new(),
        });
        let settlement = shared.result.settlement();

        let driver = Arc::clone(&shared);
        let abort = clock.spawn(Box::pin(async move {
            let outcome = inner.await;
            driver.finish(outcome);
        }));
        *shared.driver.lock() = Some(abort);

        Self {
            settlement,
            handle: CancelHandle { shared },
        }
    }
}

impl<T, E> CancellableFuture<T, E> {
    /// 取消；`reason` 缺省为 `"cancelled"`。
    pub fn cancel(&self, reason: Option<CancelReason>) -> Result<(), SettleError>
    where
        T: Clone,
        E: Clone,
    {
        self.handle.cancel(reason)
    }

    /// 返回可克隆的取消句柄。
    pub fn handle(&self) -> CancelHandle<T, E> {
        self.handle.clone()
    }
}

impl<T, E> CancelShared<T, E>
where
    T: Clone,
    E: Clone,
{
    fn finish(&self, outcome: Outcome<T, E>) {
        let mut state = self.state.lock();
        match &*state {
            CancelState::Active => {
                *state = CancelState::Settled;
                drop(state);
                let _ = self.result.settle(outcome);
            }
            CancelState::Cancelled(reason) => {
                let rejection = cancelled_outcome(reason.clone(), outcome);
                drop(state);
                // 缺省取消器已经拒绝过时这里返回 AlreadySettled，忽略即可。
                let _ = self.result.error(rejection);
            }
            CancelState::Settled => {}
        }
    }
}

/// 取消后内部 Future 才结束：保留内部以同一原因产生的取消拒绝（其中可能带有最后一次失败）。
fn cancelled_outcome<T, E>(reason: CancelReason, outcome: Outcome<T, E>) -> Rejection<E> {
    match outcome {
        Err(Rejection::Cancelled {
            reason: inner,
            last_error,
        }) if inner == reason => Rejection::Cancelled { reason, last_error },
        _ => Rejection::cancelled(reason),
    }
}

impl<T, E> CancelHandle<T, E>
where
    T: Clone,
    E: Clone,
{
    /// 取消；`reason` 缺省为 `"cancelled"`。
    pub fn cancel(&self, reason: Option<CancelReason>) -> Result<(), SettleError> {
        let reason = reason.unwrap_or_else(CancelReason::cancelled);
        {
            let mut state = self.shared.state.lock();
            match &*state {
                CancelState::Settled => return Err(SettleError::AlreadySettled),
                CancelState::Cancelled(_) => return Err(SettleError::AlreadyCancelled),
                CancelState::Active => *state = CancelState::Cancelled(reason.clone()),
            }
        }

        let canceller = self.shared.canceller.lock().take();
        match canceller {
            Some(canceller) => canceller(reason),
            None => {
                let _ = self.shared.result.error(Rejection::cancelled(reason));
                if let Some(driver) = self.shared.driver.lock().take() {
                    driver.cancel();
                }
            }
        }
        Ok(())
    }
}

impl<T, E> CancelHandle<T, E> {
    /// 取消是否已被受理。
    pub fn is_cancelled(&self) -> bool {
        matches!(&*self.shared.state.lock(), CancelState::Cancelled(_))
    }

    /// 内部 Future 是否已在未被取消的情况下完成。
    pub fn is_settled(&self) -> bool {
        matches!(&*self.shared.state.lock(), CancelState::Settled)
    }
}

impl<T, E> Clone for CancelHandle<T, E> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T, E> Future for CancellableFuture<T, E>
where
    T: Clone,
    E: Clone,
{
    type Output = Outcome<T, E>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.settlement).poll(cx)
    }
}

impl<T, E> fmt::Debug for CancellableFuture<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CancellableFuture")
            .field("state", &*self.handle.shared.state.lock())
            .finish()
    }
}

impl<T, E> fmt::Debug for CancelHandle<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CancelHandle")
            .field("state", &*self.shared.state.lock())
            .finish()
    }
}

/// 使用缺省时钟包装一个普通的 `Result` Future，错误映射为 [`Rejection::Failed`]。
///
/// # Panics
/// 不在 Tokio 运行时上下文中调用时 panic。
pub fn cancellable<F, T, E>(inner: F) -> CancellableFuture<T, E>
where
    F: Future<Output = Result<T, E>> + Send + 'static,
    T: Clone + Send + Sync + 'static,
    E: Clone + Send + Sync + 'static,
{
    let clock = default_clock();
    CancellableFuture::new(clock.as_ref(), async move {
        inner.await.map_err(Rejection::Failed)
    })
}
