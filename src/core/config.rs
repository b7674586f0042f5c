//! 配置管理模块
//!
//! 提供 RHI 配置的加载、解析和管理功能。
//! 支持从 TOML 配置文件加载，也支持命令行参数覆盖。
//!
//! # 配置文件格式 (rhi.toml)
//!
//! ```toml
//! [graphics]
//! backend = "headless"   # 或 "dx12"
//! adapter_id = 9860      # 可选，找不到时回退到首选适配器
//! vsync = true
//! allow_tearing = false
//! validation = true
//! buffer_count = 3
//! format = "r8g8b8a8_unorm"
//!
//! [sync]
//! wait_timeout_ms = 2000
//!
//! [headless]
//! execution_latency_us = 0
//! tearing_supported = true
//!
//! [[headless.adapters]]
//! id = 1
//! label = "Headless Discrete GPU"
//! dedicated_video_memory = 8589934592
//! software = false
//!
//! [logging]
//! level = "info"
//! file_output = false
//! ```

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use super::error::{ConfigError, Result};
use crate::rhi::types::PixelFormat;

/// RHI 配置
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// 图形配置
    #[serde(default)]
    pub graphics: GraphicsConfig,

    /// 同步配置
    #[serde(default)]
    pub sync: SyncConfig,

    /// headless 后端的模拟参数
    #[serde(default)]
    pub headless: HeadlessConfig,

    /// 演示程序的窗口配置
    #[serde(default)]
    pub window: WindowConfig,

    /// 日志配置
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// 图形配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphicsConfig {
    /// 图形后端选择
    #[serde(default = "default_backend")]
    pub backend: BackendKind,

    /// 期望的适配器 ID（None 表示首选适配器）
    #[serde(default)]
    pub adapter_id: Option<u64>,

    /// 垂直同步
    #[serde(default = "default_vsync")]
    pub vsync: bool,

    /// 关闭垂直同步时是否允许撕裂
    #[serde(default)]
    pub allow_tearing: bool,

    /// 验证模式：启用调试层并跟踪资源屏障声明的状态
    #[serde(default = "default_validation")]
    pub validation: bool,

    /// 交换链缓冲数量
    #[serde(default = "default_buffer_count")]
    pub buffer_count: u32,

    /// 交换链像素格式
    #[serde(default = "default_format")]
    pub format: PixelFormat,
}

/// 图形后端类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// DirectX 12 后端（仅 Windows）
    Dx12,
    /// 软件模拟的 GPU 时间线，不需要显卡
    Headless,
}

/// 同步配置
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Fence 等待的截止时间（毫秒），None 表示无限等待
    #[serde(default)]
    pub wait_timeout_ms: Option<u64>,
}

/// headless 后端配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeadlessConfig {
    /// 每个命令列表在 GPU 时间线上的模拟执行耗时（微秒）
    #[serde(default)]
    pub execution_latency_us: u64,

    /// 是否报告支持撕裂
    #[serde(default = "default_tearing_supported")]
    pub tearing_supported: bool,

    /// 模拟的适配器列表
    #[serde(default = "default_headless_adapters")]
    pub adapters: Vec<HeadlessAdapterConfig>,
}

/// 模拟的适配器
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeadlessAdapterConfig {
    pub id: u64,
    pub label: String,
    #[serde(default)]
    pub dedicated_video_memory: u64,
    #[serde(default)]
    pub software: bool,
}

/// 窗口配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WindowConfig {
    /// 窗口宽度
    #[serde(default = "default_width")]
    pub width: u32,

    /// 窗口高度
    #[serde(default = "default_height")]
    pub height: u32,

    /// 窗口标题
    #[serde(default = "default_title")]
    pub title: String,

    /// 演示程序渲染的帧数
    #[serde(default = "default_frames")]
    pub frames: u64,
}

/// 日志配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// 日志级别
    #[serde(default = "default_log_level")]
    pub level: LogLevel,

    /// 是否输出到文件
    #[serde(default)]
    pub file_output: bool,

    /// 日志文件路径
    #[serde(default = "default_log_file")]
    pub log_file: String,
}

/// 日志级别
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

// 默认值函数
fn default_backend() -> BackendKind {
    if cfg!(target_os = "windows") {
        BackendKind::Dx12
    } else {
        BackendKind::Headless
    }
}
fn default_vsync() -> bool { true }
fn default_validation() -> bool { cfg!(debug_assertions) }
fn default_buffer_count() -> u32 { 3 }
fn default_format() -> PixelFormat { PixelFormat::R8G8B8A8Unorm }
fn default_tearing_supported() -> bool { true }
fn default_width() -> u32 { 1280 }
fn default_height() -> u32 { 720 }
fn default_title() -> String { "DistRHI".to_string() }
fn default_frames() -> u64 { 3 }
fn default_log_level() -> LogLevel { LogLevel::Info }
fn default_log_file() -> String { "dist_rhi.log".to_string() }

fn default_headless_adapters() -> Vec<HeadlessAdapterConfig> {
    vec![
        HeadlessAdapterConfig {
            id: 0x1001,
            label: "Headless Integrated GPU".to_string(),
            dedicated_video_memory: 512 << 20,
            software: false,
        },
        HeadlessAdapterConfig {
            id: 0x2002,
            label: "Headless Discrete GPU".to_string(),
            dedicated_video_memory: 8 << 30,
            software: false,
        },
        HeadlessAdapterConfig {
            id: 0x8c,
            label: "Headless Basic Render Driver".to_string(),
            dedicated_video_memory: 0,
            software: true,
        },
    ]
}

impl Default for GraphicsConfig {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            adapter_id: None,
            vsync: default_vsync(),
            allow_tearing: false,
            validation: default_validation(),
            buffer_count: default_buffer_count(),
            format: default_format(),
        }
    }
}

impl Default for HeadlessConfig {
    fn default() -> Self {
        Self {
            execution_latency_us: 0,
            tearing_supported: default_tearing_supported(),
            adapters: default_headless_adapters(),
        }
    }
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            width: default_width(),
            height: default_height(),
            title: default_title(),
            frames: default_frames(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file_output: false,
            log_file: default_log_file(),
        }
    }
}

impl Config {
    /// 从配置文件加载
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path_str = path.as_ref().to_string_lossy().to_string();

        let contents = std::fs::read_to_string(path)
            .map_err(|_| ConfigError::FileNotFound(path_str.clone()))?;

        Self::from_toml(&contents)
    }

    /// 从 TOML 字符串解析
    pub fn from_toml(contents: &str) -> Result<Self> {
        toml::from_str(contents).map_err(|e| ConfigError::ParseError(e.to_string()).into())
    }

    /// 从配置文件加载，如果文件不存在或无法解析则使用默认配置
    pub fn from_file_or_default<P: AsRef<Path>>(path: P) -> Self {
        Self::from_file(path).unwrap_or_default()
    }

    /// 保存配置到文件
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let contents = toml::to_string_pretty(self)
            .map_err(|e| ConfigError::ParseError(e.to_string()))?;

        std::fs::write(path, contents)?;
        Ok(())
    }

    /// 从命令行参数覆盖配置
    ///
    /// 支持的参数：
    /// - `--dx12` / `--headless`: 选择后端
    /// - `--adapter <id>`: 指定适配器 ID（支持 0x 前缀的十六进制）
    /// - `--no-vsync`: 关闭垂直同步
    /// - `--tearing`: 允许撕裂
    /// - `--validation`: 启用验证模式
    /// - `--frames <n>`: 演示程序渲染的帧数
    /// - `--width <value>` / `--height <value>`: 表面尺寸
    pub fn apply_args<I>(&mut self, args: I)
    where
        I: IntoIterator,
        I::Item: AsRef<str>,
    {
        let args: Vec<String> = args.into_iter().map(|s| s.as_ref().to_string()).collect();
        let value_of = |flag: &str| {
            args.iter()
                .position(|a| a == flag)
                .and_then(|idx| args.get(idx + 1))
                .map(String::as_str)
        };

        if args.iter().any(|a| a == "--dx12") {
            self.graphics.backend = BackendKind::Dx12;
        }
        if args.iter().any(|a| a == "--headless") {
            self.graphics.backend = BackendKind::Headless;
        }
        if args.iter().any(|a| a == "--no-vsync") {
            self.graphics.vsync = false;
        }
        if args.iter().any(|a| a == "--tearing") {
            self.graphics.allow_tearing = true;
        }
        if args.iter().any(|a| a == "--validation") {
            self.graphics.validation = true;
        }

        if let Some(id) = value_of("--adapter").and_then(parse_adapter_id) {
            self.graphics.adapter_id = Some(id);
        }
        if let Some(frames) = value_of("--frames").and_then(|v| v.parse().ok()) {
            self.window.frames = frames;
        }
        if let Some(width) = value_of("--width").and_then(|v| v.parse().ok()) {
            self.window.width = width;
        }
        if let Some(height) = value_of("--height").and_then(|v| v.parse().ok()) {
            self.window.height = height;
        }
    }

    /// 验证配置的有效性
    pub fn validate(&self) -> Result<()> {
        if self.window.width == 0 || self.window.height == 0 {
            return Err(invalid("window.width/height", "Surface dimensions must be greater than 0"));
        }

        if self.graphics.buffer_count == 0 {
            return Err(invalid("graphics.buffer_count", "A swap chain needs at least one buffer"));
        }

        if !self.graphics.format.is_presentable() {
            return Err(invalid(
                "graphics.format",
                &format!("{:?} cannot be used for a flip-model swap chain", self.graphics.format),
            ));
        }

        if self.graphics.backend == BackendKind::Headless
            && !self.headless.adapters.iter().any(|a| !a.software)
        {
            return Err(invalid(
                "headless.adapters",
                "At least one non-software adapter is required",
            ));
        }

        Ok(())
    }

    /// Fence 等待的截止时间
    pub fn wait_timeout(&self) -> Option<Duration> {
        self.sync.wait_timeout_ms.map(Duration::from_millis)
    }
}

fn invalid(field: &str, reason: &str) -> super::error::RhiError {
    ConfigError::InvalidValue {
        field: field.to_string(),
        reason: reason.to_string(),
    }
    .into()
}

fn parse_adapter_id(value: &str) -> Option<u64> {
    match value.strip_prefix("0x").or_else(|| value.strip_prefix("0X")) {
        Some(hex) => u64::from_str_radix(hex, 16).ok(),
        None => value.parse().ok(),
    }
}

impl BackendKind {
    /// 获取后端名称
    pub fn name(&self) -> &'static str {
        match self {
            BackendKind::Dx12 => "DirectX 12",
            BackendKind::Headless => "Headless",
        }
    }
}
