//! 断言策略
//!
//! 程序错误（重复编译只允许编译一次的资源、未知 UUID 查询、不支持的 shader stage 等）
//! 通过 `rg_assert!` / `rg_verify!` 报告。出错后是立即中止还是记录日志后继续，
//! 由进程启动时注入的 [`CheckPolicy`] 决定，整个进程只使用一种策略。
//!
//! `rg_error!` 用于可降级的错误（例如 descriptor 没有可写入的数据），只记录日志，从不中止。

use std::sync::OnceLock;

/// 断言失败时的处理方式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckPolicy {
    /// 立即 panic，便于在调试器中定位
    Panic,
    /// 使用 `log::error!` 记录，然后继续执行
    Log,
}

impl Default for CheckPolicy {
    fn default() -> Self {
        if cfg!(debug_assertions) { Self::Panic } else { Self::Log }
    }
}

static CHECK_POLICY: OnceLock<CheckPolicy> = OnceLock::new();

/// 在进程启动时安装断言策略
///
/// 只有第一次调用生效；如果策略已经被安装（或已经被读取过），返回 false
pub fn install_check_policy(policy: CheckPolicy) -> bool {
    let installed = CHECK_POLICY.set(policy).is_ok();
    if !installed {
        log::warn!("check policy is already installed as {:?}, ignore {:?}", check_policy(), policy);
    }
    installed
}

/// 当前生效的断言策略，未安装时使用 [`CheckPolicy::default`]
#[inline]
pub fn check_policy() -> CheckPolicy {
    *CHECK_POLICY.get_or_init(CheckPolicy::default)
}

/// 宏的实现细节，不要直接调用
#[doc(hidden)]
#[track_caller]
pub fn report_check_failure(title: &str, condition: &str, message: Option<std::fmt::Arguments<'_>>) {
    let location = std::panic::Location::caller();
    let message = message.map(|m| m.to_string()).unwrap_or_default();
    match check_policy() {
        CheckPolicy::Panic => {
            panic!("{title}: `{condition}` {message} at {}:{}", location.file(), location.line());
        }
        CheckPolicy::Log => {
            log::error!("{title}: `{condition}` {message} at {}:{}", location.file(), location.line());
        }
    }
}

/// 宏的实现细节，不要直接调用
#[doc(hidden)]
#[track_caller]
pub fn report_soft_error(condition: &str) {
    let location = std::panic::Location::caller();
    log::error!("Check Failed: `{condition}` at {}:{}", location.file(), location.line());
}

/// 条件必须为 true，否则按照断言策略报告
#[macro_export]
macro_rules! rg_assert {
    ($cond:expr $(,)?) => {
        if !($cond) {
            $crate::check::report_check_failure("Assertion Failed", stringify!($cond), None);
        }
    };
    ($cond:expr, $($arg:tt)+) => {
        if !($cond) {
            $crate::check::report_check_failure("Assertion Failed", stringify!($cond), Some(format_args!($($arg)+)));
        }
    };
}

/// 与 `rg_assert!` 相同，但是返回条件的值，便于在 `if` 中使用
#[macro_export]
macro_rules! rg_verify {
    ($cond:expr $(,)?) => {{
        let cond: bool = $cond;
        if !cond {
            $crate::check::report_check_failure("Verify Failed", stringify!($cond), None);
        }
        cond
    }};
    ($cond:expr, $($arg:tt)+) => {{
        let cond: bool = $cond;
        if !cond {
            $crate::check::report_check_failure("Verify Failed", stringify!($cond), Some(format_args!($($arg)+)));
        }
        cond
    }};
}

/// 条件为 true 表示出现了可降级的错误：记录日志并返回条件的值，从不 panic
#[macro_export]
macro_rules! rg_error {
    ($cond:expr $(,)?) => {{
        let cond: bool = $cond;
        if cond {
            $crate::check::report_soft_error(stringify!($cond));
        }
        cond
    }};
}

/// 不可达的分支，按照断言策略报告
#[macro_export]
macro_rules! rg_break {
    ($($arg:tt)+) => {
        $crate::check::report_check_failure("Debug Break", "", Some(format_args!($($arg)+)))
    };
}
