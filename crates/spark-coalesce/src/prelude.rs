//! # spark-coalesce Prelude
//!
//! ## 教案级说明（Why）
//! - 业务代码通常只需要“构造策略 + 等待结果 + 处理拒绝”三件事；
//!   `use spark_coalesce::prelude::*;` 即可获得这三件事涉及的全部类型与函数。
//!
//! ## 契约定义（What）
//! - 仅收录稳定的入口函数、选项与错误类型；`CallCoalescer`、`RescheduleTimer`
//!   等构件仍需从各自模块显式导入。

pub use crate::cancellable::{CancellableFuture, cancellable};
pub use crate::delay::{WaitValue, delay, wait, wait_with};
pub use crate::error::{CancelReason, Rejection, SettleError};
pub use crate::policy::{
    Backoff, DebounceOptions, Retry, Stop, ThrottleOptions, debounce, retry, throttle,
};
pub use crate::time::{Clock, TokioClock};
