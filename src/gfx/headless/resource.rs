//! headless 资源：纹理、描述符堆和交换链
//!
//! 纹理不保存像素，只记录 GPU 时间线上的实际资源状态和最近一次清屏的颜色，
//! 足够让测试观察到命令确实按顺序执行了。

use std::any::Any;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use crate::core::error::{Result, RhiError};
use crate::rhi::backend::{DescriptorHeapBackend, SwapChainBackend, TextureBackend};
use crate::rhi::queue::PresentMode;
use crate::rhi::types::{DescriptorType, PixelFormat, ResourceState};

/// GPU 侧的纹理内容
pub(crate) struct TextureStorage {
    pub(crate) width: u32,
    pub(crate) height: u32,
    pub(crate) format: PixelFormat,
    state: Mutex<ResourceState>,
    clear_color: Mutex<Option<[f32; 4]>>,
    clear_count: AtomicU64,
}

impl TextureStorage {
    pub(crate) fn new(width: u32, height: u32, format: PixelFormat, state: ResourceState) -> Arc<Self> {
        Arc::new(Self {
            width,
            height,
            format,
            state: Mutex::new(state),
            clear_color: Mutex::new(None),
            clear_count: AtomicU64::new(0),
        })
    }

    pub(crate) fn state(&self) -> ResourceState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// 执行状态转换，返回转换前的实际状态
    pub(crate) fn transition(&self, after: ResourceState) -> ResourceState {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        std::mem::replace(&mut *state, after)
    }

    pub(crate) fn fill(&self, color: [f32; 4]) {
        *self.clear_color.lock().unwrap_or_else(PoisonError::into_inner) = Some(color);
        self.clear_count.fetch_add(1, Ordering::AcqRel);
    }
}

/// 渲染目标视图表：描述符地址 -> 纹理
///
/// 同一个设备上所有堆的地址互不重叠，整个设备共用一张表。
pub(crate) type ViewTable = Arc<Mutex<HashMap<u64, Arc<TextureStorage>>>>;

/// headless 纹理
pub struct HeadlessTexture {
    storage: Arc<TextureStorage>,
}

impl HeadlessTexture {
    pub(crate) fn new(storage: Arc<TextureStorage>) -> Self {
        Self { storage }
    }

    pub(crate) fn storage(&self) -> &Arc<TextureStorage> {
        &self.storage
    }

    /// 最近一次清屏写入的归一化颜色
    pub fn last_clear_color(&self) -> Option<[f32; 4]> {
        *self.storage.clear_color.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// GPU 时间线上执行过的清屏次数
    pub fn clear_count(&self) -> u64 {
        self.storage.clear_count.load(Ordering::Acquire)
    }

    /// GPU 时间线上的实际资源状态
    pub fn gpu_state(&self) -> ResourceState {
        self.storage.state()
    }

    pub fn size(&self) -> (u32, u32) {
        (self.storage.width, self.storage.height)
    }

    pub fn format(&self) -> PixelFormat {
        self.storage.format
    }

    /// 两个句柄是否指向同一块纹理存储
    pub fn same_storage(&self, other: &HeadlessTexture) -> bool {
        Arc::ptr_eq(&self.storage, &other.storage)
    }
}

impl TextureBackend for HeadlessTexture {
    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// headless 描述符堆，只有一段合成的地址范围
pub struct HeadlessDescriptorHeap {
    descriptor_type: DescriptorType,
    cpu_start: u64,
    capacity: u32,
    stride: u64,
}

impl HeadlessDescriptorHeap {
    pub(crate) fn new(descriptor_type: DescriptorType, cpu_start: u64, capacity: u32, stride: u64) -> Self {
        Self {
            descriptor_type,
            cpu_start,
            capacity,
            stride,
        }
    }

    pub fn descriptor_type(&self) -> DescriptorType {
        self.descriptor_type
    }

    /// 地址是否落在本堆的某个槽位上
    pub(crate) fn contains(&self, offset: u64) -> bool {
        let end = self.cpu_start + self.capacity as u64 * self.stride;
        offset >= self.cpu_start && offset < end && (offset - self.cpu_start) % self.stride == 0
    }
}

impl DescriptorHeapBackend for HeadlessDescriptorHeap {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn cpu_start(&self) -> u64 {
        self.cpu_start
    }
}

pub(crate) struct SwapChainState {
    pub(crate) buffers: Vec<Arc<TextureStorage>>,
    pub(crate) allow_tearing: bool,
    current: AtomicU32,
    presents: AtomicU64,
    last_mode: Mutex<Option<PresentMode>>,
}

impl SwapChainState {
    pub(crate) fn current(&self) -> u32 {
        self.current.load(Ordering::Acquire)
    }

    /// 呈现当前后台缓冲并轮换到下一个
    pub(crate) fn flip(&self, mode: PresentMode) {
        let count = self.buffers.len() as u32;
        let next = (self.current() + 1) % count.max(1);
        self.current.store(next, Ordering::Release);
        self.presents.fetch_add(1, Ordering::AcqRel);
        *self.last_mode.lock().unwrap_or_else(PoisonError::into_inner) = Some(mode);
    }
}

/// headless 交换链
pub struct HeadlessSwapChain {
    state: Arc<SwapChainState>,
}

impl HeadlessSwapChain {
    pub(crate) fn new(buffers: Vec<Arc<TextureStorage>>, allow_tearing: bool) -> Self {
        Self {
            state: Arc::new(SwapChainState {
                buffers,
                allow_tearing,
                current: AtomicU32::new(0),
                presents: AtomicU64::new(0),
                last_mode: Mutex::new(None),
            }),
        }
    }

    pub(crate) fn state(&self) -> &Arc<SwapChainState> {
        &self.state
    }

    /// GPU 时间线上完成的呈现次数
    pub fn present_count(&self) -> u64 {
        self.state.presents.load(Ordering::Acquire)
    }

    /// 最近一次呈现使用的参数
    pub fn last_present_mode(&self) -> Option<PresentMode> {
        *self.state.last_mode.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl SwapChainBackend for HeadlessSwapChain {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn buffer(&self, index: u32) -> Result<Box<dyn TextureBackend>> {
        let storage = self.state.buffers.get(index as usize).ok_or_else(|| {
            RhiError::invalid_parameter(format!("Swap chain has no buffer {}", index))
        })?;
        Ok(Box::new(HeadlessTexture::new(storage.clone())))
    }

    fn current_back_buffer_index(&self) -> u32 {
        self.state.current()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_heap_address_range() {
        let heap = HeadlessDescriptorHeap::new(DescriptorType::RenderTarget, 0x10000, 3, 32);
        assert!(heap.contains(0x10000));
        assert!(heap.contains(0x10040));
        assert!(!heap.contains(0x10060));
        assert!(!heap.contains(0x10010));
        assert!(!heap.contains(0xffe0));
    }

    #[test]
    fn test_flip_rotates_back_buffer() {
        let buffers = (0..3)
            .map(|_| TextureStorage::new(4, 4, PixelFormat::R8G8B8A8Unorm, ResourceState::Present))
            .collect();
        let chain = HeadlessSwapChain::new(buffers, false);
        let mode = PresentMode { sync_interval: 1, allow_tearing: false };
        for expected in [1, 2, 0, 1] {
            chain.state().flip(mode);
            assert_eq!(chain.current_back_buffer_index(), expected);
        }
        assert_eq!(chain.present_count(), 4);
        assert_eq!(chain.last_present_mode(), Some(mode));
    }

    #[test]
    fn test_texture_transition_and_fill() {
        let texture = HeadlessTexture::new(TextureStorage::new(2, 2, PixelFormat::R8G8B8A8Unorm, ResourceState::Present));
        assert_eq!(texture.storage().transition(ResourceState::RenderTarget), ResourceState::Present);
        texture.storage().fill([0.0, 1.0, 0.0, 1.0]);
        assert_eq!(texture.gpu_state(), ResourceState::RenderTarget);
        assert_eq!(texture.last_clear_color(), Some([0.0, 1.0, 0.0, 1.0]));
        assert_eq!(texture.clear_count(), 1);
    }
}
