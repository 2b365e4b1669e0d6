//! 时间与调度子系统。
//!
//! # 模块目的（Why）
//! - [`clock`]：可注入的时钟抽象与 Tokio 实现，所有计时语义都经由它落地；
//! - [`timer`]：建立在时钟之上的可重排定时器，是防抖、节流与延迟的共同底座。

pub mod clock;
pub mod timer;

pub use clock::{Clock, TimerHandle, TimerTask, TokioClock, default_clock};
pub use timer::RescheduleTimer;
