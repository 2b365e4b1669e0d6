//! 重试集成测试入口。
//!
//! # 结构概览（What）
//! - [`tests::retry::backoff_stop`]：退避时间表、自定义退避与停止判定的调用次数；
//! - [`tests::retry::cancellation`]：各检查点上的取消语义。
//!
//! # 维护提示（How）
//! - 缺省退避时间表累计超过一小时，依赖 Tokio 暂停时钟的自动推进，切勿改为真实时钟。

pub mod tests {
    //! 集成测试命名空间。
    pub mod retry {
        //! 重试策略测试集合。
        include!("backoff_stop.rs");
        include!("cancellation.rs");
    }
}
