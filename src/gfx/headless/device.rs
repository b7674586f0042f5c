//! headless 后端实例和逻辑设备
//!
//! 适配器列表来自配置，描述符堆的地址由设备在一段合成的地址空间里顺序分配。

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tracing::debug;

use super::command::{HeadlessCommandAllocator, HeadlessCommandList};
use super::queue::HeadlessQueue;
use super::resource::{HeadlessDescriptorHeap, HeadlessSwapChain, HeadlessTexture, TextureStorage, ViewTable};
use super::sync::HeadlessFence;
use crate::core::config::{BackendKind, HeadlessAdapterConfig, HeadlessConfig};
use crate::core::error::{Result, RhiError};
use crate::rhi::backend::{
    AdapterDesc, AdapterFactory, CommandAllocatorBackend, CommandListBackend, DescriptorHeapBackend,
    DeviceBackend, FenceBackend, QueueBackend, Surface, SwapChainBackend, SwapChainDesc, TextureBackend,
};
use crate::rhi::types::{CommandType, DescriptorType, DeviceInfo, PixelFormat, ResourceState};

/// 第一个描述符堆的起始地址
const HEAP_ADDRESS_BASE: u64 = 0x1000_0000;
/// 相邻两个堆之间的对齐
const HEAP_ADDRESS_ALIGN: u64 = 0x1000;
/// DXGI 允许的最大交换链缓冲数
const MAX_SWAP_CHAIN_BUFFERS: u32 = 16;

/// headless 后端实例
pub struct HeadlessFactory {
    adapters: Vec<HeadlessAdapterConfig>,
    tearing_supported: bool,
    execution_latency: Duration,
}

impl HeadlessFactory {
    pub fn new(config: &HeadlessConfig) -> Self {
        Self {
            adapters: config.adapters.clone(),
            tearing_supported: config.tearing_supported,
            execution_latency: Duration::from_micros(config.execution_latency_us),
        }
    }
}

impl AdapterFactory for HeadlessFactory {
    fn kind(&self) -> BackendKind {
        BackendKind::Headless
    }

    fn enumerate_adapters(&self) -> Result<Vec<AdapterDesc>> {
        // 高性能优先：专用显存多的排在前面，相同时保持配置顺序
        let mut adapters = self.adapters.clone();
        adapters.sort_by(|a, b| b.dedicated_video_memory.cmp(&a.dedicated_video_memory));

        Ok(adapters
            .into_iter()
            .map(|adapter| AdapterDesc {
                info: DeviceInfo::new(adapter.id, adapter.label, adapter.dedicated_video_memory),
                software: adapter.software,
            })
            .collect())
    }

    fn open_device(&self, adapter: &DeviceInfo, debug: bool) -> Result<Box<dyn DeviceBackend>> {
        if !self.adapters.iter().any(|a| a.id == adapter.id()) {
            return Err(RhiError::AdapterNotFound(format!(
                "No headless adapter with id {:#x}",
                adapter.id()
            )));
        }
        if debug {
            debug!("Headless validation enabled: GPU timeline errors are reported at error level");
        }

        Ok(Box::new(HeadlessDevice {
            adapter: adapter.clone(),
            debug,
            tearing_supported: self.tearing_supported,
            execution_latency: self.execution_latency,
            views: Arc::new(Mutex::new(HashMap::new())),
            next_heap_address: AtomicU64::new(HEAP_ADDRESS_BASE),
        }))
    }
}

/// headless 逻辑设备
pub struct HeadlessDevice {
    adapter: DeviceInfo,
    debug: bool,
    tearing_supported: bool,
    execution_latency: Duration,
    views: ViewTable,
    next_heap_address: AtomicU64,
}

impl HeadlessDevice {
    pub fn adapter(&self) -> &DeviceInfo {
        &self.adapter
    }
}

fn descriptor_stride(ty: DescriptorType) -> u64 {
    match ty {
        DescriptorType::RenderTarget => 32,
        DescriptorType::DepthStencil => 8,
        DescriptorType::ConstantBuffer
        | DescriptorType::ShaderResource
        | DescriptorType::UnorderedAccess => 32,
        DescriptorType::Sampler => 32,
    }
}

impl DeviceBackend for HeadlessDevice {
    fn create_command_queue(&self, ty: CommandType) -> Result<Box<dyn QueueBackend>> {
        let queue = HeadlessQueue::new(ty, self.views.clone(), self.execution_latency, self.debug)?;
        Ok(Box::new(queue))
    }

    fn create_command_allocator(&self, ty: CommandType) -> Result<Box<dyn CommandAllocatorBackend>> {
        Ok(Box::new(HeadlessCommandAllocator::new(ty)))
    }

    fn create_command_list(
        &self,
        allocator: &dyn CommandAllocatorBackend,
        ty: CommandType,
    ) -> Result<Box<dyn CommandListBackend>> {
        if allocator.as_any().downcast_ref::<HeadlessCommandAllocator>().is_none() {
            return Err(RhiError::invalid_parameter("Allocator belongs to another backend"));
        }
        Ok(Box::new(HeadlessCommandList::new(ty)))
    }

    fn create_fence(&self, initial_value: u64) -> Result<Box<dyn FenceBackend>> {
        Ok(Box::new(HeadlessFence::new(initial_value)))
    }

    fn create_descriptor_heap(&self, ty: DescriptorType, capacity: u32) -> Result<Box<dyn DescriptorHeapBackend>> {
        let stride = descriptor_stride(ty);
        let size = (capacity as u64 * stride + HEAP_ADDRESS_ALIGN - 1) / HEAP_ADDRESS_ALIGN * HEAP_ADDRESS_ALIGN;
        let cpu_start = self.next_heap_address.fetch_add(size, Ordering::AcqRel);
        Ok(Box::new(HeadlessDescriptorHeap::new(ty, cpu_start, capacity, stride)))
    }

    fn descriptor_stride(&self, ty: DescriptorType) -> u64 {
        descriptor_stride(ty)
    }

    fn tearing_supported(&self) -> bool {
        self.tearing_supported
    }

    fn create_swapchain(
        &self,
        _queue: &dyn QueueBackend,
        surface: &dyn Surface,
        desc: &SwapChainDesc,
    ) -> Result<Box<dyn SwapChainBackend>> {
        if desc.buffer_count > MAX_SWAP_CHAIN_BUFFERS {
            return Err(RhiError::invalid_parameter(format!(
                "At most {} swap chain buffers are supported",
                MAX_SWAP_CHAIN_BUFFERS
            )));
        }
        debug!(
            windowed = surface.window_handle().is_some(),
            width = desc.width,
            height = desc.height,
            "Creating headless swap chain"
        );

        let buffers = (0..desc.buffer_count)
            .map(|_| TextureStorage::new(desc.width, desc.height, desc.format, ResourceState::Present))
            .collect();
        Ok(Box::new(HeadlessSwapChain::new(buffers, desc.allow_tearing)))
    }

    fn create_render_target_view(
        &self,
        texture: &dyn TextureBackend,
        heap: &dyn DescriptorHeapBackend,
        offset: u64,
        format: PixelFormat,
    ) -> Result<()> {
        let texture = texture
            .as_any()
            .downcast_ref::<HeadlessTexture>()
            .ok_or_else(|| RhiError::invalid_parameter("Texture belongs to another backend"))?;
        let heap = heap
            .as_any()
            .downcast_ref::<HeadlessDescriptorHeap>()
            .ok_or_else(|| RhiError::invalid_parameter("Descriptor heap belongs to another backend"))?;

        if heap.descriptor_type() != DescriptorType::RenderTarget {
            return Err(RhiError::invalid_parameter("Render target views need an RTV heap"));
        }
        if !heap.contains(offset) {
            return Err(RhiError::invalid_parameter(format!(
                "Descriptor address {:#x} is outside the heap",
                offset
            )));
        }
        if format != texture.format() {
            return Err(RhiError::invalid_parameter(format!(
                "View format {:?} does not match texture format {:?}",
                format,
                texture.format()
            )));
        }

        self.views
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(offset, texture.storage().clone());
        Ok(())
    }
}
