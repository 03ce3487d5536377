//! 性能分析
//!
//! 对 `tracy_client` 的薄封装：只有在 tracy client 已经启动时才创建 span，
//! 单元测试等没有启动 client 的进程中什么也不做。

pub use tracy_client;

/// 创建一个 tracy span，返回 `Option<Span>`，离开作用域时结束
#[macro_export]
macro_rules! profile_span {
    ($name:literal) => {
        $crate::profile::tracy_client::Client::running()
            .map(|client| client.span($crate::profile::tracy_client::span_location!($name), 0))
    };
}
