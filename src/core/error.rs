//! 错误处理模块
//!
//! 定义了 RHI 层统一的错误类型。每个可能失败的调用都只返回一个结果，
//! 核心层内部从不 panic，也不做任何自动重试，由调用者决定重试、回退还是退出。
//!
//! # 错误分类
//!
//! - `AdapterNotFound`：没有可用的硬件适配器
//! - `DeviceLost`：设备被移除、挂起或重置
//! - `OutOfMemory`：显存/描述符槽位不足
//! - `InvalidState`：对象处于不允许该调用的状态（例如向已关闭的命令列表录制）
//! - `InvalidParameter`：参数本身不合法
//! - `StateMismatch`：验证模式下资源屏障声明的前置状态与跟踪状态不一致
//! - `Timeout` / `Cancelled`：带截止时间或取消令牌的 Fence 等待
//! - `Backend`：其他原生 API 错误

use std::fmt;

use crate::rhi::types::ResourceState;

/// RHI 统一的 Result 类型
pub type Result<T> = std::result::Result<T, RhiError>;

/// RHI 层的错误类型
#[derive(Debug)]
pub enum RhiError {
    /// 过滤软件适配器之后没有剩余的适配器
    AdapterNotFound(String),

    /// 设备丢失（移除、挂起、重置）
    DeviceLost(String),

    /// 内存或描述符槽位耗尽
    OutOfMemory(String),

    /// 对象状态不允许该操作
    InvalidState(String),

    /// 参数无效
    InvalidParameter(String),

    /// 资源屏障声明的前置状态与跟踪到的最近一次声明不一致
    StateMismatch {
        tracked: ResourceState,
        declared: ResourceState,
    },

    /// 等待 Fence 超时
    Timeout { value: u64, completed: u64 },

    /// 等待 Fence 被取消
    Cancelled { value: u64 },

    /// 当前平台不支持所选后端
    Unsupported(String),

    /// 其他原生 API 错误
    Backend(String),

    /// 配置错误
    Config(ConfigError),

    /// IO 错误
    Io(std::io::Error),
}

/// 配置相关的错误
#[derive(Debug)]
pub enum ConfigError {
    /// 配置文件未找到
    FileNotFound(String),

    /// 配置文件解析失败
    ParseError(String),

    /// 配置值无效
    InvalidValue { field: String, reason: String },
}

impl RhiError {
    /// 是否为设备丢失，调用者通常需要重建整个设备
    pub fn is_device_lost(&self) -> bool {
        matches!(self, RhiError::DeviceLost(_))
    }

    pub(crate) fn invalid_state(msg: impl Into<String>) -> Self {
        RhiError::InvalidState(msg.into())
    }

    pub(crate) fn invalid_parameter(msg: impl Into<String>) -> Self {
        RhiError::InvalidParameter(msg.into())
    }
}

impl fmt::Display for RhiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RhiError::AdapterNotFound(msg) => write!(f, "No usable adapter: {}", msg),
            RhiError::DeviceLost(msg) => write!(f, "Device lost: {}", msg),
            RhiError::OutOfMemory(msg) => write!(f, "Out of memory: {}", msg),
            RhiError::InvalidState(msg) => write!(f, "Invalid state: {}", msg),
            RhiError::InvalidParameter(msg) => write!(f, "Invalid parameter: {}", msg),
            RhiError::StateMismatch { tracked, declared } => write!(
                f,
                "Resource state mismatch: barrier declares {:?} but the last declared state is {:?}",
                declared, tracked
            ),
            RhiError::Timeout { value, completed } => write!(
                f,
                "Timed out waiting for fence value {} (completed {})",
                value, completed
            ),
            RhiError::Cancelled { value } => write!(f, "Wait for fence value {} was cancelled", value),
            RhiError::Unsupported(msg) => write!(f, "Unsupported: {}", msg),
            RhiError::Backend(msg) => write!(f, "Backend error: {}", msg),
            RhiError::Config(e) => write!(f, "Configuration error: {}", e),
            RhiError::Io(e) => write!(f, "IO error: {}", e),
        }
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::FileNotFound(path) => write!(f, "Config file not found: {}", path),
            ConfigError::ParseError(msg) => write!(f, "Failed to parse config: {}", msg),
            ConfigError::InvalidValue { field, reason } => {
                write!(f, "Invalid value for '{}': {}", field, reason)
            }
        }
    }
}

impl std::error::Error for RhiError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            RhiError::Io(e) => Some(e),
            RhiError::Config(e) => Some(e),
            _ => None,
        }
    }
}

impl std::error::Error for ConfigError {}

impl From<std::io::Error> for RhiError {
    fn from(err: std::io::Error) -> Self {
        RhiError::Io(err)
    }
}

impl From<ConfigError> for RhiError {
    fn from(err: ConfigError) -> Self {
        RhiError::Config(err)
    }
}
