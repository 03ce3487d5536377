use std::io::Write;

/// 使用默认的过滤级别 `Info` 初始化日志，`RUST_LOG` 存在时以其为准
pub fn init_log() {
    init_log_with_filter(log::LevelFilter::Info);
}

/// 初始化全局 logger
///
/// 重复调用时不会 panic，只有第一次调用生效（测试中会被多次调用）
pub fn init_log_with_filter(default_filter: log::LevelFilter) {
    let _ = env_logger::Builder::new()
        .format(|buf, record| {
            let info_style = buf
                .default_level_style(log::Level::Info)
                .fg_color(Some(anstyle::Color::Ansi(anstyle::AnsiColor::Green)));
            let warn_style = buf
                .default_level_style(log::Level::Warn)
                .fg_color(Some(anstyle::Color::Ansi(anstyle::AnsiColor::Yellow)));
            let error_style = buf
                .default_level_style(log::Level::Error)
                .fg_color(Some(anstyle::Color::Ansi(anstyle::AnsiColor::Red)));

            let level_style = match record.level() {
                log::Level::Info => info_style,
                log::Level::Warn => warn_style,
                log::Level::Error => error_style,
                _ => buf.default_level_style(record.level()),
            };
            let grey_style = info_style.fg_color(Some(anstyle::Color::Rgb(anstyle::RgbColor(110, 110, 110))));

            let line = record.line().unwrap_or(!0);
            let file = record.file().unwrap_or("").rsplit(['\\', '/']).next().unwrap_or("");
            let time = chrono::Local::now().format("%H:%M:%S");
            let level = record.level();
            let target = record.target();

            writeln!(
                buf,
                "{level_style}[{time}] {level:<5}{level_style:#} {grey_style}[{target}][{file}:{line}]{grey_style:#} {}",
                record.args()
            )
        })
        .filter(None, default_filter)
        .parse_default_env()
        .try_init();
}
