//! 节律策略集成测试入口，覆盖防抖与节流在虚拟时间下的合并、冲刷与取消语义。
//!
//! # 模块目的（Why）
//! - 防抖与节流共享同一个合并器与定时器，集中存放便于对照两者的布防差异；
//! - 所有用例运行在 `#[tokio::test(start_paused = true)]` 上，时间推进完全确定。
//!
//! # 结构概览（What）
//! - [`tests::policy::debounce`]：安静期、最长等待、批量上限、冲刷与取消；
//! - [`tests::policy::throttle`]：首次立即执行、固定间隔、批量上限与取消。
//!
//! # 维护提示（How）
//! - 测试唤醒时刻请避开定时器到期时刻（例如以 30ms 为步长搭配 50ms 延迟），
//!   同一虚拟时刻的多个到期事件在 Tokio 中没有确定顺序。

pub mod tests {
    //! 集成测试命名空间。
    pub mod policy {
        //! 防抖与节流。
        include!("debounce.rs");
        include!("throttle.rs");
    }
}
