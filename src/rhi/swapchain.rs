//! 交换链
//!
//! 交换链拥有固定数量的可呈现缓冲，每个缓冲在创建时得到一个渲染目标视图。
//! 帧循环通常用 `buffer_for_frame(frame)` 轮流取缓冲。

use crate::core::error::{Result, RhiError};
use crate::rhi::backend::SwapChainBackend;
use crate::rhi::resource::Texture2D;
use crate::rhi::types::PixelFormat;

pub struct SwapChain {
    backend: Box<dyn SwapChainBackend>,
    buffers: Vec<Texture2D>,
    format: PixelFormat,
    width: u32,
    height: u32,
    tearing_supported: bool,
}

impl SwapChain {
    pub(crate) fn new(
        backend: Box<dyn SwapChainBackend>,
        buffers: Vec<Texture2D>,
        format: PixelFormat,
        (width, height): (u32, u32),
        tearing_supported: bool,
    ) -> Self {
        Self {
            backend,
            buffers,
            format,
            width,
            height,
            tearing_supported,
        }
    }

    pub fn buffer_count(&self) -> u32 {
        self.buffers.len() as u32
    }

    pub fn buffer(&self, index: u32) -> Result<&Texture2D> {
        self.buffers.get(index as usize).ok_or_else(|| {
            RhiError::invalid_parameter(format!(
                "Swap chain buffer index {} out of range ({} buffers)",
                index,
                self.buffers.len()
            ))
        })
    }

    /// 第 `frame_counter` 帧使用的缓冲
    pub fn buffer_for_frame(&self, frame_counter: u64) -> Result<&Texture2D> {
        let count = self.buffers.len() as u64;
        if count == 0 {
            return Err(RhiError::invalid_state("Swap chain has no buffers"));
        }
        self.buffer((frame_counter % count) as u32)
    }

    pub fn buffers(&self) -> &[Texture2D] {
        &self.buffers
    }

    pub fn format(&self) -> PixelFormat {
        self.format
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// 创建时是否带了允许撕裂的标志
    pub fn tearing_supported(&self) -> bool {
        self.tearing_supported
    }

    /// 原生交换链当前的后台缓冲索引
    pub fn current_back_buffer_index(&self) -> u32 {
        self.backend.current_back_buffer_index()
    }

    /// 后端对象，供诊断和测试向下转型
    pub fn backend(&self) -> &dyn SwapChainBackend {
        self.backend.as_ref()
    }
}

impl std::fmt::Debug for SwapChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SwapChain")
            .field("buffers", &self.buffers.len())
            .field("format", &self.format)
            .field("size", &(self.width, self.height))
            .field("tearing_supported", &self.tearing_supported)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rhi::backend::TextureBackend;
    use crate::rhi::types::ResourceState;
    use std::any::Any;

    struct Fixed;

    impl TextureBackend for Fixed {
        fn as_any(&self) -> &dyn Any {
            self
        }
    }

    impl SwapChainBackend for Fixed {
        fn as_any(&self) -> &dyn Any {
            self
        }

        fn buffer(&self, _index: u32) -> Result<Box<dyn TextureBackend>> {
            Ok(Box::new(Fixed))
        }

        fn current_back_buffer_index(&self) -> u32 {
            0
        }
    }

    fn swapchain(count: u32) -> SwapChain {
        let buffers = (0..count)
            .map(|i| Texture2D::new(Box::new(Fixed), 16 + i, 16, PixelFormat::B8G8R8A8Unorm, ResourceState::Present))
            .collect();
        SwapChain::new(Box::new(Fixed), buffers, PixelFormat::B8G8R8A8Unorm, (16, 16), false)
    }

    #[test]
    fn test_buffer_index_checked() {
        let chain = swapchain(2);
        assert_eq!(chain.buffer_count(), 2);
        assert!(chain.buffer(1).is_ok());
        assert!(matches!(chain.buffer(2), Err(RhiError::InvalidParameter(_))));
    }

    #[test]
    fn test_buffer_for_frame_wraps() {
        let chain = swapchain(3);
        assert_eq!(chain.buffer_for_frame(0).unwrap().width(), 16);
        assert_eq!(chain.buffer_for_frame(4).unwrap().width(), 17);
        assert_eq!(chain.buffer_for_frame(5).unwrap().width(), 18);
    }
}
