//! 调用节律策略：防抖、节流与重试。
//!
//! # 结构概览（What）
//! - [`debounce`]：安静期后执行，可设最长等待与批量上限；
//! - [`throttle`]：相邻执行之间保持最小间隔；
//! - [`retry`]：失败后退避重试，可取消。
//!
//! 防抖与节流都是 [`crate::coalesce::CallCoalescer`] 加上一个
//! [`crate::time::RescheduleTimer`]，差异只在布防规则。

pub mod debounce;
pub mod retry;
pub mod throttle;

pub use debounce::{DEFAULT_DELAY, DebounceOptions, Debounced, debounce};
pub use retry::{
    Backoff, DEFAULT_BACKOFF, DEFAULT_MAX_ATTEMPTS, Retry, Retrying, Stop, retry,
};
pub use throttle::{ThrottleOptions, Throttled, throttle};
