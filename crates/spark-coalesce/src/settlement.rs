//! 单次结算箱：把“完成 / 拒绝”的能力与“等待结果”的 Future 分离。
//!
//! # 设计背景（Why）
//! - 合并原语需要先把 Future 交给调用方，稍后由定时器或运行器决定结果；
//!   [`SettlementBox`] 持有结算端，[`Settlement`] 是可任意克隆的等待端。
//! - 同一批次的所有调用方共享一个 [`Settlement`]，因此等待端基于
//!   [`futures::future::Shared`]，输出值需要 `Clone`。
//!
//! # 契约说明（What）
//! - 结算至多生效一次：第二次 `complete`/`error` 同步返回 [`SettleError::AlreadySettled`]；
//! - 结算端被丢弃而未结算时，等待者收到 `Rejection::Cancelled { reason: "abandoned" }`；
//! - 结算本身是同步的，等待者在下一次被轮询时观察到结果。

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use futures::channel::oneshot;
use futures::future::{FutureExt, Shared};
use parking_lot::Mutex;

use crate::error::{CancelReason, Rejection, SettleError};

/// 结算结果：成功值或拒绝值。
pub type Outcome<T, E> = Result<T, Rejection<E>>;

/// 可由外部结算一次的结果容器。
///
/// # 逻辑解析（How）
/// - 发送端放在 `Mutex<Option<_>>` 中，`take` 成功者即获得唯一的结算权；
/// - 锁内只做 `take`，发送与唤醒在锁外完成。
pub struct SettlementBox<T, E> {
    sender: Mutex<Option<oneshot::Sender<Outcome<T, E>>>>,
    settlement: Settlement<T, E>,
}

impl<T, E> SettlementBox<T, E>
where
    T: Clone,
    E: Clone,
{
    /// 创建一个尚未结算的结算箱。
    pub fn new() -> Self {
        let (sender, receiver) = oneshot::channel();
        Self {
            sender: Mutex::new(Some(sender)),
            settlement: Settlement {
                inner: receiver.shared(),
            },
        }
    }

    /// 返回等待端；可多次调用，所有等待端观察到同一结果。
    pub fn settlement(&self) -> Settlement<T, E> {
        self.settlement.clone()
    }

    /// 以成功值结算。
    pub fn complete(&self, value: T) -> Result<(), SettleError> {
        self.settle(Ok(value))
    }

    /// 以拒绝值结算。
    pub fn error(&self, rejection: Rejection<E>) -> Result<(), SettleError> {
        self.settle(Err(rejection))
    }

    /// 以任意结果结算。
    pub fn settle(&self, outcome: Outcome<T, E>) -> Result<(), SettleError> {
        let sender = self
            .sender
            .lock()
            .take()
            .ok_or(SettleError::AlreadySettled)?;
        // 所有等待端都已释放时发送失败，此时结果无人关心，直接丢弃。
        let _ = sender.send(outcome);
        Ok(())
    }

    /// 是否已经结算。
    pub fn is_settled(&self) -> bool {
        self.sender.lock().is_none()
    }
}

impl<T, E> Default for SettlementBox<T, E>
where
    T: Clone,
    E: Clone,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<T, E> fmt::Debug for SettlementBox<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SettlementBox")
            .field("settled", &self.sender.lock().is_none())
            .finish()
    }
}

/// [`SettlementBox`] 的等待端。
///
/// 实现 `Future<Output = Result<T, Rejection<E>>>`，可克隆，克隆体共享同一结果。
pub struct Settlement<T, E> {
    inner: Shared<oneshot::Receiver<Outcome<T, E>>>,
}

impl<T, E> Settlement<T, E>
where
    T: Clone,
    E: Clone,
{
    /// 若已结算且至少被轮询过一次，返回结果的副本。
    pub fn peek(&self) -> Option<Outcome<T, E>> {
        self.inner.peek().map(|received| flatten(received.clone()))
    }
}

fn flatten<T, E>(received: Result<Outcome<T, E>, oneshot::Canceled>) -> Outcome<T, E> {
    match received {
        Ok(outcome) => outcome,
        Err(oneshot::Canceled) => Err(Rejection::cancelled(CancelReason::abandoned())),
    }
}

impl<T, E> Clone for Settlement<T, E> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T, E> Future for Settlement<T, E>
where
    T: Clone,
    E: Clone,
{
    type Output = Outcome<T, E>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.inner).poll(cx).map(flatten)
    }
}

impl<T, E> fmt::Debug for Settlement<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Settlement").finish_non_exhaustive()
    }
}
