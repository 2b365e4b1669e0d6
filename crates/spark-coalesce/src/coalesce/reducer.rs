//! 参数归并器。
//!
//! # 契约说明（What）
//! - 归并器把“已累积的参数”（首个调用时为 `None`）与“本次调用的参数”合成为新的累积值；
//! - 任何 `Fn(Option<A>, C) -> A` 闭包都是归并器；
//! - 预置三种归并器：[`LatestArguments`]（后者覆盖，缺省）、[`CombineArguments`]
//!   （逐次展开拼接为一个 `Vec`）、[`CallArguments`]（每次调用作为 `Vec` 的一项）。

/// 参数归并器。`A` 为累积参数类型，`C` 为单次调用的参数类型。
pub trait ArgumentReducer<A, C>: Send + Sync + 'static {
    /// 合并一次调用的参数。
    fn reduce(&self, accumulated: Option<A>, call: C) -> A;
}

impl<A, C, F> ArgumentReducer<A, C> for F
where
    F: Fn(Option<A>, C) -> A + Send + Sync + 'static,
{
    fn reduce(&self, accumulated: Option<A>, call: C) -> A {
        self(accumulated, call)
    }
}

/// 后者覆盖：只保留最后一次调用的参数。
#[derive(Clone, Copy, Debug, Default)]
pub struct LatestArguments;

impl<A> ArgumentReducer<A, A> for LatestArguments {
    fn reduce(&self, _accumulated: Option<A>, call: A) -> A {
        call
    }
}

/// 展开拼接：把每次调用的元素依次追加到同一个 `Vec`。
#[derive(Clone, Copy, Debug, Default)]
pub struct CombineArguments;

impl<C> ArgumentReducer<Vec<C::Item>, C> for CombineArguments
where
    C: IntoIterator,
{
    fn reduce(&self, accumulated: Option<Vec<C::Item>>, call: C) -> Vec<C::Item> {
        let mut combined = accumulated.unwrap_or_default();
        combined.extend(call);
        combined
    }
}

/// 逐次收集：每次调用的参数作为 `Vec` 的一项。
#[derive(Clone, Copy, Debug, Default)]
pub struct CallArguments;

impl<C> ArgumentReducer<Vec<C>, C> for CallArguments {
    fn reduce(&self, accumulated: Option<Vec<C>>, call: C) -> Vec<C> {
        let mut calls = accumulated.unwrap_or_default();
        calls.push(call);
        calls
    }
}
