//! 日志系统模块
//!
//! 基于 `tracing` 提供结构化的日志记录功能。
//! RHI 内部直接使用 `tracing` 宏；设备生命周期等关键事件使用带固定 target 的
//! `rhi_info!` / `rhi_warn!` / `rhi_error!`，方便用 `EnvFilter` 单独过滤。
//!
//! # 使用示例
//!
//! ```no_run
//! use dist_rhi::core::{config::LogLevel, log};
//!
//! // 仅控制台输出
//! log::init_logger(LogLevel::Info, false, None);
//!
//! // 结构化日志
//! tracing::info!(width = 800, height = 600, "Surface created");
//! ```

use tracing::Level;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};
use std::path::Path;

use super::config::LogLevel;

/// 初始化日志系统
///
/// 必须在程序开始时调用一次。重复调用时保留第一次安装的订阅者。
///
/// # 参数
///
/// * `level` - 日志级别（`RUST_LOG` 环境变量优先）
/// * `file_output` - 是否同时输出到文件
/// * `log_file_path` - 日志文件路径（可选，默认为 "dist_rhi.log"）
pub fn init_logger(level: LogLevel, file_output: bool, log_file_path: Option<&str>) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(filter_directive(level)));

    let console_layer = fmt::layer()
        .with_target(true)
        .with_thread_ids(false)
        .with_thread_names(true)
        .with_ansi(true);

    if file_output {
        let log_path = log_file_path.unwrap_or("dist_rhi.log");
        let path = Path::new(log_path);
        let directory = path.parent().unwrap_or(Path::new("."));
        let filename = path
            .file_name()
            .and_then(|s| s.to_str())
            .unwrap_or("dist_rhi.log");

        // 每天滚动
        let file_appender = RollingFileAppender::new(Rotation::DAILY, directory, filename);

        let file_layer = fmt::layer()
            .with_target(true)
            .with_thread_names(true)
            .with_ansi(false)
            .with_writer(file_appender);

        let _ = tracing_subscriber::registry()
            .with(filter)
            .with(console_layer)
            .with(file_layer)
            .try_init();
    } else {
        let _ = tracing_subscriber::registry()
            .with(filter)
            .with(console_layer)
            .try_init();
    }
}

fn filter_directive(level: LogLevel) -> &'static str {
    match level {
        LogLevel::Trace => "trace",
        LogLevel::Debug => "debug",
        LogLevel::Info => "info",
        LogLevel::Warn => "warn",
        LogLevel::Error => "error",
    }
}

/// 设备生命周期日志 - Info 级别
#[macro_export]
macro_rules! rhi_info {
    ($($arg:tt)*) => {
        tracing::info!(target: "dist_rhi::device", $($arg)*)
    };
}

/// 设备生命周期日志 - Warn 级别
#[macro_export]
macro_rules! rhi_warn {
    ($($arg:tt)*) => {
        tracing::warn!(target: "dist_rhi::device", $($arg)*)
    };
}

/// 设备生命周期日志 - Error 级别
#[macro_export]
macro_rules! rhi_error {
    ($($arg:tt)*) => {
        tracing::error!(target: "dist_rhi::device", $($arg)*)
    };
}

/// 日志级别转换
impl From<LogLevel> for Level {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Trace => Level::TRACE,
            LogLevel::Debug => Level::DEBUG,
            LogLevel::Info => Level::INFO,
            LogLevel::Warn => Level::WARN,
            LogLevel::Error => Level::ERROR,
        }
    }
}
