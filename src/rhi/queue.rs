//! 命令队列
//!
//! 提交、呈现和 signal 都是异步的：调用立即返回，GPU 按提交顺序执行。
//! CPU 通过 `wait` / `flush` 与 GPU 时间线同步。

use tracing::trace;

use crate::core::config::GraphicsConfig;
use crate::core::error::{Result, RhiError};
use crate::rhi::backend::QueueBackend;
use crate::rhi::command::CommandList;
use crate::rhi::swapchain::SwapChain;
use crate::rhi::sync::{Fence, WaitOptions};
use crate::rhi::types::CommandType;

/// 呈现参数
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PresentConfig {
    /// 等待垂直同步
    pub vsync: bool,
    /// 关闭垂直同步时允许撕裂
    pub allow_tearing: bool,
}

impl Default for PresentConfig {
    fn default() -> Self {
        Self {
            vsync: true,
            allow_tearing: false,
        }
    }
}

impl PresentConfig {
    /// 根据交换链能力决定实际的呈现方式
    ///
    /// 只有关闭垂直同步、请求撕裂并且交换链支持时才使用撕裂标志。
    pub fn resolve(&self, tearing_supported: bool) -> PresentMode {
        PresentMode {
            sync_interval: if self.vsync { 1 } else { 0 },
            allow_tearing: self.allow_tearing && !self.vsync && tearing_supported,
        }
    }
}

impl From<&GraphicsConfig> for PresentConfig {
    fn from(config: &GraphicsConfig) -> Self {
        Self {
            vsync: config.vsync,
            allow_tearing: config.allow_tearing,
        }
    }
}

/// 传给后端的呈现方式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PresentMode {
    pub sync_interval: u32,
    pub allow_tearing: bool,
}

/// 命令队列
pub struct CommandQueue {
    backend: Box<dyn QueueBackend>,
    command_type: CommandType,
    present_config: PresentConfig,
}

impl CommandQueue {
    pub(crate) fn new(backend: Box<dyn QueueBackend>, command_type: CommandType, present_config: PresentConfig) -> Self {
        Self {
            backend,
            command_type,
            present_config,
        }
    }

    pub fn command_type(&self) -> CommandType {
        self.command_type
    }

    pub fn present_config(&self) -> PresentConfig {
        self.present_config
    }

    pub fn set_present_config(&mut self, config: PresentConfig) {
        self.present_config = config;
    }

    /// 提交一个已关闭的命令列表
    pub fn execute(&self, list: &CommandList) -> Result<()> {
        if list.is_recording() {
            return Err(RhiError::invalid_state("Cannot execute a command list that is still recording"));
        }
        if list.command_type() != self.command_type {
            return Err(RhiError::invalid_parameter(format!(
                "{} command list submitted to a {} queue",
                list.command_type().name(),
                self.command_type.name()
            )));
        }
        trace!(queue = self.command_type.name(), "Execute command list");
        self.backend.execute(list.backend())
    }

    /// 使用队列当前的呈现参数呈现
    pub fn present(&self, swapchain: &SwapChain) -> Result<()> {
        self.present_with(swapchain, self.present_config)
    }

    pub fn present_with(&self, swapchain: &SwapChain, config: PresentConfig) -> Result<()> {
        let mode = config.resolve(swapchain.tearing_supported());
        trace!(sync_interval = mode.sync_interval, tearing = mode.allow_tearing, "Present");
        self.backend.present(swapchain.backend(), mode)
    }

    /// 队列之前的工作完成后把 fence 设置为 `value`
    pub fn signal(&self, fence: &Fence, value: u64) -> Result<()> {
        fence.check_signal(value)?;
        self.backend.signal(fence.backend(), value)?;
        fence.record_signal(value);
        trace!(value, "Signal fence");
        Ok(())
    }

    /// 阻塞 CPU 直到 fence 达到 `value`，没有截止时间
    pub fn wait(&self, fence: &Fence, value: u64) -> Result<()> {
        fence.wait_for(value, &WaitOptions::infinite())
    }

    /// 带超时或取消令牌的等待
    pub fn wait_with(&self, fence: &Fence, value: u64, options: &WaitOptions) -> Result<()> {
        fence.wait_for(value, options)
    }

    /// signal 之后立即等待，返回时队列上之前提交的工作已全部完成
    pub fn flush(&self, fence: &Fence, value: u64) -> Result<()> {
        self.flush_with(fence, value, &WaitOptions::infinite())
    }

    pub fn flush_with(&self, fence: &Fence, value: u64, options: &WaitOptions) -> Result<()> {
        self.signal(fence, value)?;
        self.wait_with(fence, value, options)
    }

    /// 让队列在 GPU 侧等待 fence，用于跨队列排序；CPU 立即返回
    pub fn gpu_wait(&self, fence: &Fence, value: u64) -> Result<()> {
        trace!(value, queue = self.command_type.name(), "GPU wait");
        self.backend.gpu_wait(fence.backend(), value)
    }

    pub(crate) fn backend(&self) -> &dyn QueueBackend {
        self.backend.as_ref()
    }
}

impl std::fmt::Debug for CommandQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandQueue")
            .field("command_type", &self.command_type)
            .field("present_config", &self.present_config)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vsync_ignores_tearing() {
        let config = PresentConfig { vsync: true, allow_tearing: true };
        assert_eq!(config.resolve(true), PresentMode { sync_interval: 1, allow_tearing: false });
    }

    #[test]
    fn test_tearing_requires_support() {
        let config = PresentConfig { vsync: false, allow_tearing: true };
        assert_eq!(config.resolve(true), PresentMode { sync_interval: 0, allow_tearing: true });
        assert_eq!(config.resolve(false), PresentMode { sync_interval: 0, allow_tearing: false });
    }

    #[test]
    fn test_no_vsync_without_tearing() {
        let config = PresentConfig { vsync: false, allow_tearing: false };
        assert_eq!(config.resolve(true), PresentMode { sync_interval: 0, allow_tearing: false });
    }

    #[test]
    fn test_from_graphics_config() {
        let mut graphics = GraphicsConfig::default();
        graphics.vsync = false;
        graphics.allow_tearing = true;
        let config = PresentConfig::from(&graphics);
        assert!(!config.vsync);
        assert!(config.allow_tearing);
    }
}
