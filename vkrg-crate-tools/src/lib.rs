//! vkrg 工具集
//!
//! 提供日志初始化、断言策略、性能分析 span 等在各个 crate 之间共享的工具。
//!
//! # 断言策略
//! `rg_assert!` / `rg_verify!` 的行为由进程启动时注入的 [`check::CheckPolicy`] 决定，
//! 而不是由编译期的宏分支决定。

pub mod check;
pub mod init_log;
pub mod profile;
