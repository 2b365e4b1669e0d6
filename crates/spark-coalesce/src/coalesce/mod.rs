//! 调用合并：参数归并器与合并器。
//!
//! - [`reducer`]：把多次调用的参数合成一次调用的参数；
//! - [`coalescer`]：持有待执行调用，提供 `call`/`prepare`/`reset` 三个操作。

pub mod coalescer;
pub mod reducer;

pub use coalescer::{CallCoalescer, Hook, Runner};
pub use reducer::{ArgumentReducer, CallArguments, CombineArguments, LatestArguments};
