//! 核心功能模块
//!
//! 与具体图形 API 无关的基础设施：错误处理、配置管理、日志系统和颜色值。
//!
//! # 模块组织
//!
//! - `error`：统一的错误类型
//! - `config`：配置管理，支持从 TOML 文件加载
//! - `log`：基于 `tracing` 的日志系统
//! - `color`：8 位 RGBA 颜色

pub mod color;
pub mod config;
pub mod error;
pub mod log;

// 重新导出常用类型，方便使用
pub use color::ColorRgba;
pub use config::{BackendKind, Config, GraphicsConfig};
pub use error::{ConfigError, Result, RhiError};
