#![deny(unsafe_code)]
#![doc = "spark-coalesce: 基于 Future 的调用合并、防抖、节流、延迟与重试原语。"]
#![doc = ""]
#![doc = "== 分层结构 =="]
#![doc = "1. 基础层：`SettlementBox`（单次结算）、`CancellableFuture`（带原因取消）、`RescheduleTimer`（可重排定时器）。"]
#![doc = "2. 合并层：`CallCoalescer` 把多次调用归并为一次执行，所有调用方共享同一结果。"]
#![doc = "3. 策略层：`debounce`、`throttle`、`retry` 与可取消延迟 `wait`。"]
#![doc = ""]
#![doc = "== 运行时依赖 =="]
#![doc = "所有计时与后台驱动经由 `time::Clock` 完成；缺省实现 `TokioClock` 要求调用点位于 Tokio 运行时上下文内。"]

pub mod cancellable;
pub mod coalesce;
pub mod config;
pub mod delay;
pub mod error;
pub mod policy;
pub mod prelude;
pub mod settlement;
pub mod time;

pub use cancellable::{CancelHandle, CancellableFuture, Canceller, cancellable};
pub use coalesce::{
    ArgumentReducer, CallArguments, CallCoalescer, CombineArguments, LatestArguments, Runner,
};
pub use config::{ConfigError, DebounceConfig, PacingConfig, RetryConfig, ThrottleConfig};
pub use delay::{Delay, DelayHandle, WaitValue, delay, wait, wait_with};
pub use error::{CancelReason, Rejection, SettleError};
pub use policy::{
    Backoff, DebounceOptions, Debounced, Retry, Retrying, Stop, ThrottleOptions, Throttled,
    debounce, retry, throttle,
};
pub use settlement::{Outcome, Settlement, SettlementBox};
pub use time::{Clock, RescheduleTimer, TimerHandle, TokioClock};
