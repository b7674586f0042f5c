//! 渲染硬件接口 (RHI)
//!
//! 与具体图形 API 无关的命令提交和 CPU/GPU 同步层。
//!
//! # 模块组织
//!
//! - `types`：命令类型、描述符类型、资源状态、像素格式、适配器信息
//! - `backend`：各组件的后端 trait 和后端选择
//! - `device`：适配器枚举、设备生命周期和对象工厂
//! - `command`：命令分配器和命令列表状态机
//! - `queue`：提交、呈现、signal 和等待
//! - `sync`：Fence、等待选项和取消令牌
//! - `descriptor`：描述符堆
//! - `resource`：纹理和资源视图
//! - `swapchain`：交换链
//!
//! # 一帧的典型流程
//!
//! ```no_run
//! # use dist_rhi::rhi::*;
//! # use dist_rhi::core::{ColorRgba, Result};
//! # fn frame(queue: &CommandQueue, allocator: &CommandAllocator, list: &mut CommandList,
//! #          heap: &DescriptorHeap, chain: &SwapChain, fence: &Fence, frame: u64) -> Result<()> {
//! let buffer = chain.buffer_for_frame(frame)?;
//! list.reset(allocator)?;
//! list.resource_barrier(allocator, Some(heap), buffer, ResourceState::Present, ResourceState::RenderTarget)?;
//! list.clear(buffer, ColorRgba::new(30, 30, 40, 255))?;
//! list.resource_barrier(allocator, Some(heap), buffer, ResourceState::RenderTarget, ResourceState::Present)?;
//! list.close()?;
//! queue.execute(list)?;
//! queue.present(chain)?;
//! queue.flush(fence, frame + 1)?;
//! # Ok(())
//! # }
//! ```

pub mod backend;
pub mod command;
pub mod descriptor;
pub mod device;
pub mod queue;
pub mod resource;
pub mod swapchain;
pub mod sync;
pub mod types;

pub use backend::{HeadlessSurface, Surface};
pub use command::{CommandAllocator, CommandList, CommandListState};
pub use descriptor::DescriptorHeap;
pub use device::Device;
pub use queue::{CommandQueue, PresentConfig, PresentMode};
pub use resource::{ResourceView, Texture2D};
pub use swapchain::SwapChain;
pub use sync::{CancelToken, Fence, WaitOptions};
pub use types::{CommandType, DescriptorType, DeviceInfo, PixelFormat, ResourceState};
