//! DirectX 12 后端
//!
//! 基于 DXGI 和 Direct3D 12 实现 `rhi::backend` 中的各个 trait，仅在 Windows 上编译。
//!
//! # 初始化流程
//!
//! 1. 创建 DXGI 工厂（验证模式下带调试标志）
//! 2. 按高性能优先的顺序枚举适配器
//! 3. 启用调试层（验证模式）并创建 D3D12 设备
//! 4. 在信息队列上设置错误和数据损坏时中断
//!
//! COM 接口本身是引用计数的，D3D12 的对象可以跨线程使用，
//! 这里的包装类型因此都标记为 `Send + Sync`。

mod command;
mod convert;
mod descriptor;
mod device;
mod error;
mod queue;
mod resource;

pub use command::{Dx12CommandAllocator, Dx12CommandList};
pub use descriptor::Dx12DescriptorHeap;
pub use device::{Dx12Device, Dx12Factory};
pub use queue::{Dx12Fence, Dx12Queue};
pub use resource::{Dx12SwapChain, Dx12Texture};
