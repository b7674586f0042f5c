//! DirectX 12 纹理和交换链

use std::any::Any;

use windows::Win32::Graphics::Direct3D12::ID3D12Resource;
use windows::Win32::Graphics::Dxgi::IDXGISwapChain3;

use super::error::HResultExt;
use crate::core::error::{Result, RhiError};
use crate::rhi::backend::{SwapChainBackend, TextureBackend};

/// 包装一个 ID3D12Resource
pub struct Dx12Texture {
    resource: ID3D12Resource,
}

impl Dx12Texture {
    pub(crate) fn new(resource: ID3D12Resource) -> Self {
        Self { resource }
    }

    pub fn resource(&self) -> &ID3D12Resource {
        &self.resource
    }
}

unsafe impl Send for Dx12Texture {}
unsafe impl Sync for Dx12Texture {}

impl TextureBackend for Dx12Texture {
    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// flip 模型交换链
pub struct Dx12SwapChain {
    swap_chain: IDXGISwapChain3,
    buffer_count: u32,
    allow_tearing: bool,
}

impl Dx12SwapChain {
    pub(crate) fn new(swap_chain: IDXGISwapChain3, buffer_count: u32, allow_tearing: bool) -> Self {
        Self {
            swap_chain,
            buffer_count,
            allow_tearing,
        }
    }

    pub fn swap_chain(&self) -> &IDXGISwapChain3 {
        &self.swap_chain
    }

    /// 创建时是否带上了允许撕裂的标志
    pub fn allow_tearing(&self) -> bool {
        self.allow_tearing
    }
}

unsafe impl Send for Dx12SwapChain {}
unsafe impl Sync for Dx12SwapChain {}

impl SwapChainBackend for Dx12SwapChain {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn buffer(&self, index: u32) -> Result<Box<dyn TextureBackend>> {
        if index >= self.buffer_count {
            return Err(RhiError::invalid_parameter(format!("Swap chain has no buffer {}", index)));
        }
        let resource: ID3D12Resource =
            unsafe { self.swap_chain.GetBuffer(index) }.rhi("IDXGISwapChain::GetBuffer")?;
        Ok(Box::new(Dx12Texture::new(resource)))
    }

    fn current_back_buffer_index(&self) -> u32 {
        unsafe { self.swap_chain.GetCurrentBackBufferIndex() }
    }
}
