//! 逻辑设备
//!
//! `Device` 持有后端实例（用于枚举适配器）和一个可选的逻辑设备。
//!
//! ```text
//! 未初始化 --initialize(id)--> 已初始化 --release()--> 未初始化
//! ```
//!
//! 所有工厂方法都要求设备已初始化，否则返回 `InvalidState`。
//! 创建出来的对象由调用者拥有，不依赖 `Device` 的生命周期。

use tracing::debug;

use crate::core::config::{BackendKind, Config, GraphicsConfig};
use crate::core::error::{Result, RhiError};
use crate::rhi::backend::{self, AdapterFactory, DeviceBackend, Surface, SwapChainDesc};
use crate::rhi::command::{CommandAllocator, CommandList};
use crate::rhi::descriptor::DescriptorHeap;
use crate::rhi::queue::{CommandQueue, PresentConfig};
use crate::rhi::resource::{ResourceView, Texture2D};
use crate::rhi::swapchain::SwapChain;
use crate::rhi::sync::Fence;
use crate::rhi::types::{CommandType, DescriptorType, DeviceInfo, PixelFormat, ResourceState};
use crate::{rhi_info, rhi_warn};

struct DeviceContext {
    backend: Box<dyn DeviceBackend>,
    adapter: DeviceInfo,
}

/// 逻辑设备
pub struct Device {
    config: GraphicsConfig,
    factory: Box<dyn AdapterFactory>,
    context: Option<DeviceContext>,
}

impl Device {
    /// 创建配置指定的后端实例，设备处于未初始化状态
    pub fn new(config: &Config) -> Result<Self> {
        let factory = backend::create_factory(config)?;
        Ok(Self::with_factory(config.graphics.clone(), factory))
    }

    /// 使用已有的后端实例
    pub fn with_factory(config: GraphicsConfig, factory: Box<dyn AdapterFactory>) -> Self {
        Self {
            config,
            factory,
            context: None,
        }
    }

    /// 列出可用的硬件适配器，按高性能优先排序
    ///
    /// 软件适配器会被过滤掉；过滤后为空时返回 `AdapterNotFound`。
    pub fn list(config: &Config) -> Result<Vec<DeviceInfo>> {
        let factory = backend::create_factory(config)?;
        hardware_adapters(factory.as_ref())
    }

    /// 使用本设备的后端实例列出硬件适配器
    pub fn adapters(&self) -> Result<Vec<DeviceInfo>> {
        hardware_adapters(self.factory.as_ref())
    }

    pub fn backend_kind(&self) -> BackendKind {
        self.factory.kind()
    }

    pub fn config(&self) -> &GraphicsConfig {
        &self.config
    }

    /// 在指定适配器上打开逻辑设备
    ///
    /// 找不到 `device_id` 时回退到首选适配器。失败时设备保持未初始化。
    pub fn initialize(&mut self, device_id: Option<u64>) -> Result<()> {
        if self.context.is_some() {
            return Err(RhiError::invalid_state("Device is already initialized"));
        }

        let adapters = self.adapters()?;
        let adapter = match device_id {
            Some(id) => match adapters.iter().find(|a| a.id() == id) {
                Some(adapter) => adapter.clone(),
                None => {
                    rhi_warn!(
                        requested = id,
                        fallback = adapters[0].label(),
                        "Requested adapter not found, falling back to the preferred adapter"
                    );
                    adapters[0].clone()
                }
            },
            None => adapters[0].clone(),
        };

        let backend = self.factory.open_device(&adapter, self.config.validation)?;
        rhi_info!(
            backend = self.factory.kind().name(),
            adapter = adapter.label(),
            id = adapter.id(),
            vram_mb = adapter.dedicated_video_memory() >> 20,
            validation = self.config.validation,
            "Device opened"
        );
        self.context = Some(DeviceContext { backend, adapter });
        Ok(())
    }

    /// 释放逻辑设备，可以重复调用
    pub fn release(&mut self) {
        if let Some(context) = self.context.take() {
            rhi_info!(adapter = context.adapter.label(), "Device released");
        }
    }

    pub fn is_initialized(&self) -> bool {
        self.context.is_some()
    }

    /// 当前打开的适配器
    pub fn adapter(&self) -> Option<&DeviceInfo> {
        self.context.as_ref().map(|context| &context.adapter)
    }

    fn backend(&self) -> Result<&dyn DeviceBackend> {
        self.context
            .as_ref()
            .map(|context| context.backend.as_ref())
            .ok_or_else(|| RhiError::invalid_state("Device is not initialized"))
    }

    pub fn create_command_queue(&self, ty: CommandType) -> Result<CommandQueue> {
        let queue = self.backend()?.create_command_queue(ty)?;
        debug!(command_type = ty.name(), "Command queue created");
        Ok(CommandQueue::new(queue, ty, PresentConfig::from(&self.config)))
    }

    pub fn create_descriptor_heap(&self, ty: DescriptorType, count: u32) -> Result<DescriptorHeap> {
        let backend = self.backend()?;
        if count == 0 {
            return Err(RhiError::invalid_parameter("Descriptor heap needs at least one slot"));
        }
        let heap = backend.create_descriptor_heap(ty, count)?;
        Ok(DescriptorHeap::new(heap, ty, count, backend.descriptor_stride(ty)))
    }

    pub fn create_command_allocator(&self, ty: CommandType) -> Result<CommandAllocator> {
        let allocator = self.backend()?.create_command_allocator(ty)?;
        debug!(command_type = ty.name(), "Command allocator created");
        Ok(CommandAllocator::new(allocator, ty))
    }

    /// 在分配器上创建命令列表，返回时处于 Closed 状态
    pub fn create_command_list(&self, allocator: &CommandAllocator) -> Result<CommandList> {
        let ty = allocator.command_type();
        let list = self.backend()?.create_command_list(allocator.backend(), ty)?;
        debug!(command_type = ty.name(), "Command list created");
        Ok(CommandList::new(list, ty, self.config.validation))
    }

    pub fn create_fence(&self, initial_value: u64) -> Result<Fence> {
        let fence = self.backend()?.create_fence(initial_value)?;
        debug!(initial_value, "Fence created");
        Ok(Fence::new(fence, initial_value))
    }

    /// 创建交换链，并在 `heap` 中为每个缓冲分配一个渲染目标视图
    ///
    /// 缓冲的初始状态为 `Present`。
    pub fn create_swapchain(
        &self,
        queue: &CommandQueue,
        heap: &DescriptorHeap,
        surface: &dyn Surface,
        format: PixelFormat,
        buffer_count: u32,
    ) -> Result<SwapChain> {
        let backend = self.backend()?;

        if buffer_count == 0 {
            return Err(RhiError::invalid_parameter("Swap chain needs at least one buffer"));
        }
        if heap.descriptor_type() != DescriptorType::RenderTarget {
            return Err(RhiError::invalid_parameter(format!(
                "Swap chain views need an RTV heap, got {}",
                heap.descriptor_type().name()
            )));
        }
        if !format.is_presentable() {
            return Err(RhiError::invalid_parameter(format!(
                "{:?} is not a presentable format",
                format
            )));
        }
        let (width, height) = surface.size();
        if width == 0 || height == 0 {
            return Err(RhiError::invalid_parameter(format!(
                "Surface size {}x{} is empty",
                width, height
            )));
        }
        if heap.remaining() < buffer_count {
            return Err(RhiError::OutOfMemory(format!(
                "RTV heap has {} free slots, swap chain needs {}",
                heap.remaining(),
                buffer_count
            )));
        }

        let tearing_supported = backend.tearing_supported();
        let desc = SwapChainDesc {
            width,
            height,
            format,
            buffer_count,
            allow_tearing: tearing_supported,
        };
        let chain = backend.create_swapchain(queue.backend(), surface, &desc)?;

        // 视图全部写入成功后才占用槽位，失败时堆游标不动
        let first_slot = heap.allocated();
        let mut buffers = Vec::with_capacity(buffer_count as usize);
        for index in 0..buffer_count {
            let mut texture = Texture2D::new(chain.buffer(index)?, width, height, format, ResourceState::Present);
            let view = ResourceView::new(heap.clone(), first_slot + index);
            backend.create_render_target_view(texture.backend(), heap.backend(), view.offset(), format)?;
            texture.push_view(view);
            buffers.push(texture);
        }
        heap.reserve_at(first_slot, buffer_count)?;

        debug!(
            width,
            height,
            buffers = buffer_count,
            format = ?format,
            tearing_supported,
            "Swap chain created"
        );
        Ok(SwapChain::new(chain, buffers, format, (width, height), tearing_supported))
    }
}

impl Drop for Device {
    fn drop(&mut self) {
        self.release();
    }
}

impl std::fmt::Debug for Device {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Device")
            .field("backend", &self.factory.kind())
            .field("adapter", &self.adapter())
            .finish()
    }
}

fn hardware_adapters(factory: &dyn AdapterFactory) -> Result<Vec<DeviceInfo>> {
    let adapters: Vec<DeviceInfo> = factory
        .enumerate_adapters()?
        .into_iter()
        .filter(|adapter| !adapter.software)
        .map(|adapter| adapter.info)
        .collect();

    if adapters.is_empty() {
        return Err(RhiError::AdapterNotFound(format!(
            "{} backend reported no hardware adapters",
            factory.kind().name()
        )));
    }
    Ok(adapters)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::HeadlessAdapterConfig;
    use crate::rhi::backend::{AdapterDesc, HeadlessSurface};

    fn headless_config() -> Config {
        let mut config = Config::default();
        config.graphics.backend = BackendKind::Headless;
        config.graphics.validation = true;
        config
    }

    fn open_device() -> Device {
        let mut device = Device::new(&headless_config()).unwrap();
        device.initialize(None).unwrap();
        device
    }

    #[test]
    fn test_list_filters_software_and_orders_by_preference() {
        let adapters = Device::list(&headless_config()).unwrap();
        let ids: Vec<u64> = adapters.iter().map(DeviceInfo::id).collect();
        assert_eq!(ids, vec![0x2002, 0x1001]);
    }

    #[test]
    fn test_list_without_hardware_adapters() {
        let mut config = headless_config();
        config.headless.adapters = vec![HeadlessAdapterConfig {
            id: 0x8c,
            label: "Basic Render Driver".into(),
            dedicated_video_memory: 0,
            software: true,
        }];
        assert!(matches!(Device::list(&config), Err(RhiError::AdapterNotFound(_))));
    }

    #[test]
    fn test_list_propagates_factory_failure() {
        struct Broken;

        impl AdapterFactory for Broken {
            fn kind(&self) -> BackendKind {
                BackendKind::Headless
            }

            fn enumerate_adapters(&self) -> Result<Vec<AdapterDesc>> {
                Err(RhiError::Backend("DXGI_ERROR_NOT_CURRENTLY_AVAILABLE".into()))
            }

            fn open_device(&self, _adapter: &DeviceInfo, _debug: bool) -> Result<Box<dyn DeviceBackend>> {
                Err(RhiError::Backend("unreachable".into()))
            }
        }

        let mut device = Device::with_factory(GraphicsConfig::default(), Box::new(Broken));
        assert!(matches!(device.adapters(), Err(RhiError::Backend(_))));
        assert!(device.initialize(None).is_err());
        assert!(!device.is_initialized());
    }

    #[test]
    fn test_initialize_selects_requested_adapter() {
        let mut device = Device::new(&headless_config()).unwrap();
        device.initialize(Some(0x1001)).unwrap();
        assert_eq!(device.adapter().unwrap().id(), 0x1001);
    }

    #[test]
    fn test_initialize_falls_back_to_first_adapter() {
        let mut device = Device::new(&headless_config()).unwrap();
        device.initialize(Some(0xdead)).unwrap();
        assert_eq!(device.adapter().unwrap().id(), 0x2002);
    }

    #[test]
    fn test_software_adapter_is_never_selected() {
        let mut device = Device::new(&headless_config()).unwrap();
        device.initialize(Some(0x8c)).unwrap();
        assert_eq!(device.adapter().unwrap().id(), 0x2002);
    }

    #[test]
    fn test_double_initialize_keeps_device() {
        let mut device = Device::new(&headless_config()).unwrap();
        device.initialize(Some(0x1001)).unwrap();
        assert!(matches!(device.initialize(Some(0x2002)), Err(RhiError::InvalidState(_))));
        assert_eq!(device.adapter().unwrap().id(), 0x1001);
    }

    #[test]
    fn test_release_is_idempotent() {
        let mut device = open_device();
        device.release();
        device.release();
        assert!(!device.is_initialized());
        assert!(device.adapter().is_none());
        device.initialize(None).unwrap();
        assert!(device.is_initialized());
    }

    #[test]
    fn test_factories_require_initialization() {
        let device = Device::new(&headless_config()).unwrap();
        assert!(matches!(device.create_command_queue(CommandType::Direct), Err(RhiError::InvalidState(_))));
        assert!(matches!(device.create_fence(0), Err(RhiError::InvalidState(_))));
        assert!(matches!(
            device.create_descriptor_heap(DescriptorType::RenderTarget, 2),
            Err(RhiError::InvalidState(_))
        ));
        assert!(matches!(
            device.create_command_allocator(CommandType::Direct),
            Err(RhiError::InvalidState(_))
        ));
    }

    #[test]
    fn test_empty_descriptor_heap_rejected() {
        let device = open_device();
        assert!(matches!(
            device.create_descriptor_heap(DescriptorType::RenderTarget, 0),
            Err(RhiError::InvalidParameter(_))
        ));
    }

    #[test]
    fn test_command_list_created_closed() {
        let device = open_device();
        let allocator = device.create_command_allocator(CommandType::Compute).unwrap();
        let list = device.create_command_list(&allocator).unwrap();
        assert!(!list.is_recording());
        assert_eq!(list.command_type(), CommandType::Compute);
        assert!(list.validation_enabled());
    }

    #[test]
    fn test_swapchain_views_at_sequential_slots() {
        let device = open_device();
        let queue = device.create_command_queue(CommandType::Direct).unwrap();
        let heap = device.create_descriptor_heap(DescriptorType::RenderTarget, 4).unwrap();
        let surface = HeadlessSurface::new(320, 200);
        let chain = device
            .create_swapchain(&queue, &heap, &surface, PixelFormat::R8G8B8A8Unorm, 3)
            .unwrap();

        assert_eq!(chain.buffer_count(), 3);
        assert_eq!((chain.width(), chain.height()), (320, 200));
        for (i, buffer) in chain.buffers().iter().enumerate() {
            assert_eq!(buffer.view_count(), 1);
            assert_eq!(buffer.declared_state(), ResourceState::Present);
            let view = buffer.view(0).unwrap();
            assert_eq!(view.slot(), i as u32);
            assert_eq!(view.offset(), heap.cpu_start() + i as u64 * heap.stride());
            assert!(view.heap().same_heap(&heap));
        }
        assert_eq!(heap.remaining(), 1);
    }

    #[test]
    fn test_swapchain_argument_checks() {
        let device = open_device();
        let queue = device.create_command_queue(CommandType::Direct).unwrap();
        let rtv = device.create_descriptor_heap(DescriptorType::RenderTarget, 2).unwrap();
        let dsv = device.create_descriptor_heap(DescriptorType::DepthStencil, 2).unwrap();
        let surface = HeadlessSurface::new(64, 64);
        let format = PixelFormat::R8G8B8A8Unorm;

        assert!(matches!(
            device.create_swapchain(&queue, &rtv, &surface, format, 0),
            Err(RhiError::InvalidParameter(_))
        ));
        assert!(matches!(
            device.create_swapchain(&queue, &dsv, &surface, format, 2),
            Err(RhiError::InvalidParameter(_))
        ));
        assert!(matches!(
            device.create_swapchain(&queue, &rtv, &surface, PixelFormat::D32Float, 2),
            Err(RhiError::InvalidParameter(_))
        ));
        assert!(matches!(
            device.create_swapchain(&queue, &rtv, &HeadlessSurface::new(0, 64), format, 2),
            Err(RhiError::InvalidParameter(_))
        ));
        assert!(matches!(
            device.create_swapchain(&queue, &rtv, &surface, format, 3),
            Err(RhiError::OutOfMemory(_))
        ));
        // 失败的创建不消耗槽位
        assert_eq!(rtv.remaining(), 2);
    }

    #[test]
    fn test_swapchain_view_failure_keeps_heap_slots() {
        use crate::gfx::HeadlessFactory;
        use crate::rhi::backend::{
            CommandAllocatorBackend, CommandListBackend, DescriptorHeapBackend, FenceBackend, QueueBackend,
            SwapChainBackend, TextureBackend,
        };
        use std::sync::atomic::{AtomicU32, Ordering};

        // 第二个 RTV 写入失败，其余调用转给 headless 设备
        struct FlakyRtv {
            inner: Box<dyn DeviceBackend>,
            views: AtomicU32,
        }

        impl DeviceBackend for FlakyRtv {
            fn create_command_queue(&self, ty: CommandType) -> Result<Box<dyn QueueBackend>> {
                self.inner.create_command_queue(ty)
            }

            fn create_command_allocator(&self, ty: CommandType) -> Result<Box<dyn CommandAllocatorBackend>> {
                self.inner.create_command_allocator(ty)
            }

            fn create_command_list(
                &self,
                allocator: &dyn CommandAllocatorBackend,
                ty: CommandType,
            ) -> Result<Box<dyn CommandListBackend>> {
                self.inner.create_command_list(allocator, ty)
            }

            fn create_fence(&self, initial_value: u64) -> Result<Box<dyn FenceBackend>> {
                self.inner.create_fence(initial_value)
            }

            fn create_descriptor_heap(
                &self,
                ty: DescriptorType,
                capacity: u32,
            ) -> Result<Box<dyn DescriptorHeapBackend>> {
                self.inner.create_descriptor_heap(ty, capacity)
            }

            fn descriptor_stride(&self, ty: DescriptorType) -> u64 {
                self.inner.descriptor_stride(ty)
            }

            fn tearing_supported(&self) -> bool {
                self.inner.tearing_supported()
            }

            fn create_swapchain(
                &self,
                queue: &dyn QueueBackend,
                surface: &dyn Surface,
                desc: &SwapChainDesc,
            ) -> Result<Box<dyn SwapChainBackend>> {
                self.inner.create_swapchain(queue, surface, desc)
            }

            fn create_render_target_view(
                &self,
                texture: &dyn TextureBackend,
                heap: &dyn DescriptorHeapBackend,
                offset: u64,
                format: PixelFormat,
            ) -> Result<()> {
                if self.views.fetch_add(1, Ordering::SeqCst) == 1 {
                    return Err(RhiError::Backend("E_OUTOFMEMORY".into()));
                }
                self.inner.create_render_target_view(texture, heap, offset, format)
            }
        }

        struct FlakyFactory(HeadlessFactory);

        impl AdapterFactory for FlakyFactory {
            fn kind(&self) -> BackendKind {
                BackendKind::Headless
            }

            fn enumerate_adapters(&self) -> Result<Vec<AdapterDesc>> {
                self.0.enumerate_adapters()
            }

            fn open_device(&self, adapter: &DeviceInfo, debug: bool) -> Result<Box<dyn DeviceBackend>> {
                Ok(Box::new(FlakyRtv {
                    inner: self.0.open_device(adapter, debug)?,
                    views: AtomicU32::new(0),
                }))
            }
        }

        let config = headless_config();
        let factory = FlakyFactory(HeadlessFactory::new(&config.headless));
        let mut device = Device::with_factory(config.graphics.clone(), Box::new(factory));
        device.initialize(None).unwrap();
        let queue = device.create_command_queue(CommandType::Direct).unwrap();
        let heap = device.create_descriptor_heap(DescriptorType::RenderTarget, 3).unwrap();
        let surface = HeadlessSurface::new(64, 64);

        assert!(matches!(
            device.create_swapchain(&queue, &heap, &surface, PixelFormat::R8G8B8A8Unorm, 3),
            Err(RhiError::Backend(_))
        ));
        // 中途失败不泄漏槽位，整堆仍可用于下一次创建
        assert_eq!(heap.allocated(), 0);
        let chain = device
            .create_swapchain(&queue, &heap, &surface, PixelFormat::R8G8B8A8Unorm, 3)
            .unwrap();
        assert_eq!(chain.buffers()[0].view(0).unwrap().slot(), 0);
        assert_eq!(heap.remaining(), 0);
    }
}
