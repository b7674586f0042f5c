//! DistRHI - 多后端命令提交与同步层
//!
//! 在 DirectX 12 风格的显式 API 之上提供一层薄封装：
//! 适配器枚举、设备生命周期、命令列表录制、队列提交、Fence 同步和交换链呈现。
//!
//! # 模块结构
//!
//! - `core`: 核心功能模块（错误处理、配置、日志、颜色）
//! - `rhi`: 与图形 API 无关的对象模型和状态机
//! - `gfx`: 图形后端（DirectX 12、headless）
//!
//! # 使用示例
//!
//! ```no_run
//! use dist_rhi::core::Config;
//! use dist_rhi::rhi::{CommandType, DescriptorType, Device, HeadlessSurface};
//!
//! # fn main() -> dist_rhi::core::Result<()> {
//! let config = Config::default();
//! let mut device = Device::new(&config)?;
//! device.initialize(None)?;
//!
//! let queue = device.create_command_queue(CommandType::Direct)?;
//! let heap = device.create_descriptor_heap(DescriptorType::RenderTarget, 3)?;
//! let surface = HeadlessSurface::new(1280, 720);
//! let swapchain = device.create_swapchain(&queue, &heap, &surface, config.graphics.format, 3)?;
//! # let _ = swapchain;
//! # Ok(())
//! # }
//! ```

pub mod core;
pub mod gfx;
pub mod rhi;
