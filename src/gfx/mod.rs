//! 图形后端模块
//!
//! 本模块封装了不同图形 API 的底层实现，包括：
//! - DirectX 12：Windows 平台的原生后端
//! - headless：不需要显卡的软件后端，用于测试和其他平台
//!
//! 所有后端都实现了 `rhi::backend` 中的 trait，
//! 由 `rhi::backend::create_factory` 按配置选择。

pub mod headless;
#[cfg(target_os = "windows")]
pub mod dx12;

pub use headless::HeadlessFactory;
#[cfg(target_os = "windows")]
pub use dx12::Dx12Factory;
