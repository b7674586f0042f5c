//! headless 后端
//!
//! 不需要显卡的软件后端。每个命令队列有一个工作线程充当 GPU 时间线，
//! 按提交顺序执行资源屏障、清屏、signal、GPU 侧等待和呈现，
//! 因此 CPU/GPU 同步的行为和真实后端一致。用于测试和非 Windows 平台。
//!
//! 纹理只记录实际资源状态和最近一次清屏颜色；
//! 通过 `Texture2D::backend()` 向下转型到 `HeadlessTexture` 可以读取它们。

mod command;
mod device;
mod queue;
mod resource;
mod sync;

pub use command::{HeadlessCommandAllocator, HeadlessCommandList};
pub use device::{HeadlessDevice, HeadlessFactory};
pub use queue::HeadlessQueue;
pub use resource::{HeadlessDescriptorHeap, HeadlessSwapChain, HeadlessTexture};
pub use sync::HeadlessFence;
