//! 图形后端的能力接口
//!
//! RHI 的每个组件都对应一个后端 trait，由各图形 API（DirectX 12、headless）分别实现。
//! 核心层只通过这些 trait 访问后端对象，不直接接触任何原生类型。
//!
//! 后端对象之间需要互相引用时（例如命令队列提交命令列表），
//! 实现方通过 `as_any` 向下转型到自己的具体类型。

use std::any::Any;
use std::time::Instant;

use raw_window_handle::RawWindowHandle;

use crate::core::config::{BackendKind, Config};
use crate::core::error::{Result, RhiError};
use crate::rhi::queue::PresentMode;
use crate::rhi::sync::CancelToken;
use crate::rhi::types::{CommandType, DescriptorType, DeviceInfo, PixelFormat, ResourceState};

/// 枚举得到的适配器
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdapterDesc {
    pub info: DeviceInfo,
    /// 软件光栅化适配器（例如 Microsoft Basic Render Driver）
    pub software: bool,
}

/// 交换链创建参数
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SwapChainDesc {
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
    pub buffer_count: u32,
    /// 创建时带上允许撕裂的标志，之后才能以撕裂模式呈现
    pub allow_tearing: bool,
}

/// 后端实例：枚举适配器并打开逻辑设备
pub trait AdapterFactory: Send + Sync {
    fn kind(&self) -> BackendKind;

    /// 按高性能优先的顺序枚举所有适配器，包括软件适配器
    fn enumerate_adapters(&self) -> Result<Vec<AdapterDesc>>;

    /// 在指定适配器上创建逻辑设备
    ///
    /// `debug` 为 true 时启用调试层，并在错误和数据损坏消息上中断。
    fn open_device(&self, adapter: &DeviceInfo, debug: bool) -> Result<Box<dyn DeviceBackend>>;
}

/// 逻辑设备
pub trait DeviceBackend: Send + Sync {
    fn create_command_queue(&self, ty: CommandType) -> Result<Box<dyn QueueBackend>>;

    fn create_command_allocator(&self, ty: CommandType) -> Result<Box<dyn CommandAllocatorBackend>>;

    /// 创建命令列表，返回时已处于关闭状态
    fn create_command_list(
        &self,
        allocator: &dyn CommandAllocatorBackend,
        ty: CommandType,
    ) -> Result<Box<dyn CommandListBackend>>;

    fn create_fence(&self, initial_value: u64) -> Result<Box<dyn FenceBackend>>;

    fn create_descriptor_heap(
        &self,
        ty: DescriptorType,
        capacity: u32,
    ) -> Result<Box<dyn DescriptorHeapBackend>>;

    /// 同一个堆中相邻两个描述符之间的字节跨度
    fn descriptor_stride(&self, ty: DescriptorType) -> u64;

    /// 显示子系统是否支持撕裂呈现（可变刷新率）
    fn tearing_supported(&self) -> bool;

    fn create_swapchain(
        &self,
        queue: &dyn QueueBackend,
        surface: &dyn Surface,
        desc: &SwapChainDesc,
    ) -> Result<Box<dyn SwapChainBackend>>;

    /// 在 `offset` 处写入纹理的渲染目标视图
    fn create_render_target_view(
        &self,
        texture: &dyn TextureBackend,
        heap: &dyn DescriptorHeapBackend,
        offset: u64,
        format: PixelFormat,
    ) -> Result<()>;
}

/// 命令队列
pub trait QueueBackend: Send + Sync {
    fn as_any(&self) -> &dyn Any;

    /// 提交一个已关闭的命令列表，不等待执行完成
    fn execute(&self, list: &dyn CommandListBackend) -> Result<()>;

    fn present(&self, swapchain: &dyn SwapChainBackend, mode: PresentMode) -> Result<()>;

    /// 队列上之前的工作全部完成后，由 GPU 把 fence 设置为 `value`
    fn signal(&self, fence: &dyn FenceBackend, value: u64) -> Result<()>;

    /// 队列在 GPU 侧等待 fence 达到 `value`，CPU 立即返回
    fn gpu_wait(&self, fence: &dyn FenceBackend, value: u64) -> Result<()>;
}

pub trait CommandAllocatorBackend: Send + Sync {
    fn as_any(&self) -> &dyn Any;

    /// 回收分配器的存储。调用者保证 GPU 不再使用其中的命令。
    fn reset(&self) -> Result<()>;
}

/// 命令列表的录制接口
///
/// 状态检查由核心层完成，后端只负责把命令写入原生列表。
pub trait CommandListBackend: Send {
    fn as_any(&self) -> &dyn Any;

    /// 在分配器上重新打开列表
    fn reset(&mut self, allocator: &dyn CommandAllocatorBackend) -> Result<()>;

    /// 录制一个覆盖全部子资源的状态转换屏障
    fn resource_barrier(
        &mut self,
        texture: &dyn TextureBackend,
        before: ResourceState,
        after: ResourceState,
    ) -> Result<()>;

    /// 用归一化颜色清除 `view_offset` 处的渲染目标视图
    fn clear(&mut self, view_offset: u64, color: [f32; 4]) -> Result<()>;

    fn close(&mut self) -> Result<()>;
}

pub trait FenceBackend: Send + Sync {
    fn as_any(&self) -> &dyn Any;

    /// GPU 已经完成的值
    fn completed_value(&self) -> u64;

    /// 阻塞直到完成值不小于 `value`
    ///
    /// 到达 `deadline` 时返回 `Timeout`，`cancel` 被触发时返回 `Cancelled`。
    fn wait(&self, value: u64, deadline: Option<Instant>, cancel: Option<&CancelToken>) -> Result<()>;
}

pub trait DescriptorHeapBackend: Send + Sync {
    fn as_any(&self) -> &dyn Any;

    /// 第一个描述符的 CPU 地址
    fn cpu_start(&self) -> u64;
}

pub trait TextureBackend: Send + Sync {
    fn as_any(&self) -> &dyn Any;
}

pub trait SwapChainBackend: Send + Sync {
    fn as_any(&self) -> &dyn Any;

    /// 获取第 `index` 个缓冲
    fn buffer(&self, index: u32) -> Result<Box<dyn TextureBackend>>;

    /// 原生交换链当前的后台缓冲索引
    fn current_back_buffer_index(&self) -> u32;
}

/// 可以在上面创建交换链的表面
///
/// 窗口管理不属于 RHI，调用者只需要提供原生句柄和尺寸。
pub trait Surface {
    /// 原生窗口句柄；离屏表面返回 None
    fn window_handle(&self) -> Option<RawWindowHandle>;

    /// 物理像素尺寸
    fn size(&self) -> (u32, u32);
}

/// 不对应任何窗口的离屏表面
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeadlessSurface {
    pub width: u32,
    pub height: u32,
}

impl HeadlessSurface {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

impl Surface for HeadlessSurface {
    fn window_handle(&self) -> Option<RawWindowHandle> {
        None
    }

    fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }
}

impl Surface for winit::window::Window {
    fn window_handle(&self) -> Option<RawWindowHandle> {
        use raw_window_handle::HasWindowHandle;
        HasWindowHandle::window_handle(self)
            .ok()
            .map(|handle| handle.as_raw())
    }

    fn size(&self) -> (u32, u32) {
        let size = self.inner_size();
        (size.width, size.height)
    }
}

/// 根据配置创建后端实例
pub fn create_factory(config: &Config) -> Result<Box<dyn AdapterFactory>> {
    match config.graphics.backend {
        BackendKind::Headless => Ok(Box::new(crate::gfx::headless::HeadlessFactory::new(
            &config.headless,
        ))),
        #[cfg(target_os = "windows")]
        BackendKind::Dx12 => Ok(Box::new(crate::gfx::dx12::Dx12Factory::new(
            config.graphics.validation,
        )?)),
        #[cfg(not(target_os = "windows"))]
        BackendKind::Dx12 => Err(RhiError::Unsupported(format!(
            "{} backend is only available on Windows",
            BackendKind::Dx12.name()
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_headless_surface() {
        let surface = HeadlessSurface::new(640, 480);
        assert_eq!(surface.size(), (640, 480));
        assert!(surface.window_handle().is_none());
    }

    #[test]
    fn test_create_headless_factory() {
        let mut config = Config::default();
        config.graphics.backend = BackendKind::Headless;
        let factory = create_factory(&config).unwrap();
        assert_eq!(factory.kind(), BackendKind::Headless);
    }

    #[cfg(not(target_os = "windows"))]
    #[test]
    fn test_dx12_unsupported_off_windows() {
        let mut config = Config::default();
        config.graphics.backend = BackendKind::Dx12;
        assert!(matches!(create_factory(&config), Err(RhiError::Unsupported(_))));
    }
}
