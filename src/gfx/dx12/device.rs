//! DirectX 12 后端实例和逻辑设备

use std::ffi::c_void;

use raw_window_handle::RawWindowHandle;
use tracing::{debug, info, warn};
use windows::core::Interface;
use windows::Win32::Foundation::HWND;
use windows::Win32::Graphics::Direct3D::D3D_FEATURE_LEVEL_11_0;
use windows::Win32::Graphics::Direct3D12::*;
use windows::Win32::Graphics::Dxgi::Common::*;
use windows::Win32::Graphics::Dxgi::*;

use super::command::{Dx12CommandAllocator, Dx12CommandList};
use super::convert;
use super::descriptor::Dx12DescriptorHeap;
use super::error::{map_error, HResultExt};
use super::queue::{Dx12Fence, Dx12Queue};
use super::resource::{Dx12SwapChain, Dx12Texture};
use crate::core::config::BackendKind;
use crate::core::error::{Result, RhiError};
use crate::rhi::backend::{
    AdapterDesc, AdapterFactory, CommandAllocatorBackend, CommandListBackend, DescriptorHeapBackend,
    DeviceBackend, FenceBackend, QueueBackend, Surface, SwapChainBackend, SwapChainDesc, TextureBackend,
};
use crate::rhi::types::{CommandType, DescriptorType, DeviceInfo, PixelFormat};

/// DXGI 工厂
pub struct Dx12Factory {
    factory: IDXGIFactory6,
}

impl Dx12Factory {
    /// 创建 DXGI 工厂
    ///
    /// 验证模式下优先创建调试工厂；系统没有安装图形工具时回退到普通工厂。
    pub fn new(validation: bool) -> Result<Self> {
        let factory = if validation {
            match unsafe { CreateDXGIFactory2::<IDXGIFactory6>(DXGI_CREATE_FACTORY_DEBUG) } {
                Ok(factory) => factory,
                Err(err) => {
                    warn!("DXGI debug factory unavailable, falling back to the release factory: {}", err);
                    unsafe { CreateDXGIFactory2::<IDXGIFactory6>(DXGI_CREATE_FACTORY_FLAGS(0)) }
                        .rhi("CreateDXGIFactory2")?
                }
            }
        } else {
            unsafe { CreateDXGIFactory2::<IDXGIFactory6>(DXGI_CREATE_FACTORY_FLAGS(0)) }
                .rhi("CreateDXGIFactory2")?
        };

        debug!("Created DXGI factory");
        Ok(Self { factory })
    }

    /// 按高性能优先的顺序列出原生适配器
    fn adapters(&self) -> Result<Vec<(IDXGIAdapter1, DXGI_ADAPTER_DESC1)>> {
        let mut adapters = Vec::new();
        for index in 0u32.. {
            let adapter: IDXGIAdapter1 = match unsafe {
                self.factory
                    .EnumAdapterByGpuPreference(index, DXGI_GPU_PREFERENCE_HIGH_PERFORMANCE)
            } {
                Ok(adapter) => adapter,
                Err(err) if err.code() == DXGI_ERROR_NOT_FOUND => break,
                Err(err) => return Err(map_error("IDXGIFactory6::EnumAdapterByGpuPreference", err)),
            };
            let desc = unsafe { adapter.GetDesc1() }.rhi("IDXGIAdapter1::GetDesc1")?;
            adapters.push((adapter, desc));
        }
        Ok(adapters)
    }

    /// 查询显示子系统是否支持撕裂呈现
    fn tearing_supported(&self) -> bool {
        let Ok(factory) = self.factory.cast::<IDXGIFactory5>() else {
            return false;
        };
        let mut allow_tearing: i32 = 0;
        let result = unsafe {
            factory.CheckFeatureSupport(
                DXGI_FEATURE_PRESENT_ALLOW_TEARING,
                &mut allow_tearing as *mut i32 as *mut c_void,
                std::mem::size_of::<i32>() as u32,
            )
        };
        result.is_ok() && allow_tearing != 0
    }
}

unsafe impl Send for Dx12Factory {}
unsafe impl Sync for Dx12Factory {}

/// 适配器描述里的名字是以 0 结尾的 UTF-16
fn adapter_label(description: &[u16]) -> String {
    let len = description.iter().position(|&c| c == 0).unwrap_or(description.len());
    String::from_utf16_lossy(&description[..len])
}

fn is_software(desc: &DXGI_ADAPTER_DESC1) -> bool {
    desc.Flags & DXGI_ADAPTER_FLAG_SOFTWARE.0 as u32 != 0
}

/// 启用 D3D12 调试层，失败时只记录警告
fn enable_debug_layer() {
    let mut controller: Option<ID3D12Debug> = None;
    match unsafe { D3D12GetDebugInterface(&mut controller) } {
        Ok(()) => {
            if let Some(controller) = controller {
                unsafe { controller.EnableDebugLayer() };
                debug!("D3D12 debug layer enabled");
            }
        }
        Err(err) => warn!("D3D12 debug layer unavailable: {}", err),
    }
}

/// 调试层需要中断的消息级别
const BREAK_SEVERITIES: [(D3D12_MESSAGE_SEVERITY, &str); 2] = [
    (D3D12_MESSAGE_SEVERITY_CORRUPTION, "corruption"),
    (D3D12_MESSAGE_SEVERITY_ERROR, "error"),
];

/// 在错误和数据损坏消息上中断
fn break_on_errors(device: &ID3D12Device) {
    let Ok(info_queue) = device.cast::<ID3D12InfoQueue>() else {
        warn!("ID3D12InfoQueue unavailable, validation messages will not break");
        return;
    };
    for (severity, name) in BREAK_SEVERITIES {
        if let Err(err) = unsafe { info_queue.SetBreakOnSeverity(severity, true) } {
            warn!("Failed to break on D3D12 {} messages: {}", name, err);
        }
    }
}

impl AdapterFactory for Dx12Factory {
    fn kind(&self) -> BackendKind {
        BackendKind::Dx12
    }

    fn enumerate_adapters(&self) -> Result<Vec<AdapterDesc>> {
        Ok(self
            .adapters()?
            .iter()
            .map(|(_, desc)| AdapterDesc {
                info: DeviceInfo::new(
                    desc.DeviceId as u64,
                    adapter_label(&desc.Description),
                    desc.DedicatedVideoMemory as u64,
                ),
                software: is_software(desc),
            })
            .collect())
    }

    fn open_device(&self, adapter: &DeviceInfo, debug: bool) -> Result<Box<dyn DeviceBackend>> {
        let (native, _) = self
            .adapters()?
            .into_iter()
            .find(|(_, desc)| desc.DeviceId as u64 == adapter.id())
            .ok_or_else(|| RhiError::AdapterNotFound(format!("No DXGI adapter with id {:#x}", adapter.id())))?;

        // 调试层必须在创建设备之前启用
        if debug {
            enable_debug_layer();
        }

        let mut device: Option<ID3D12Device> = None;
        unsafe { D3D12CreateDevice(&native, D3D_FEATURE_LEVEL_11_0, &mut device) }.rhi("D3D12CreateDevice")?;
        let device = device.ok_or_else(|| RhiError::Backend("D3D12CreateDevice returned no device".to_string()))?;

        if debug {
            break_on_errors(&device);
        }

        let tearing_supported = self.tearing_supported();
        info!(
            adapter = adapter.label(),
            tearing_supported, "Created D3D12 device"
        );

        Ok(Box::new(Dx12Device {
            device,
            factory: self.factory.clone(),
            tearing_supported,
        }))
    }
}

/// D3D12 逻辑设备
pub struct Dx12Device {
    device: ID3D12Device,
    factory: IDXGIFactory6,
    tearing_supported: bool,
}

impl Dx12Device {
    pub fn device(&self) -> &ID3D12Device {
        &self.device
    }
}

unsafe impl Send for Dx12Device {}
unsafe impl Sync for Dx12Device {}

impl DeviceBackend for Dx12Device {
    fn create_command_queue(&self, ty: CommandType) -> Result<Box<dyn QueueBackend>> {
        Ok(Box::new(Dx12Queue::new(&self.device, ty)?))
    }

    fn create_command_allocator(&self, ty: CommandType) -> Result<Box<dyn CommandAllocatorBackend>> {
        Ok(Box::new(Dx12CommandAllocator::new(&self.device, ty)?))
    }

    fn create_command_list(
        &self,
        allocator: &dyn CommandAllocatorBackend,
        ty: CommandType,
    ) -> Result<Box<dyn CommandListBackend>> {
        let allocator = allocator
            .as_any()
            .downcast_ref::<Dx12CommandAllocator>()
            .ok_or_else(|| RhiError::invalid_parameter("Allocator belongs to another backend"))?;
        Ok(Box::new(Dx12CommandList::new(&self.device, allocator, ty)?))
    }

    fn create_fence(&self, initial_value: u64) -> Result<Box<dyn FenceBackend>> {
        Ok(Box::new(Dx12Fence::new(&self.device, initial_value)?))
    }

    fn create_descriptor_heap(&self, ty: DescriptorType, capacity: u32) -> Result<Box<dyn DescriptorHeapBackend>> {
        Ok(Box::new(Dx12DescriptorHeap::new(&self.device, ty, capacity)?))
    }

    fn descriptor_stride(&self, ty: DescriptorType) -> u64 {
        unsafe {
            self.device
                .GetDescriptorHandleIncrementSize(convert::descriptor_heap_type(ty)) as u64
        }
    }

    fn tearing_supported(&self) -> bool {
        self.tearing_supported
    }

    fn create_swapchain(
        &self,
        queue: &dyn QueueBackend,
        surface: &dyn Surface,
        desc: &SwapChainDesc,
    ) -> Result<Box<dyn SwapChainBackend>> {
        let queue = queue
            .as_any()
            .downcast_ref::<Dx12Queue>()
            .ok_or_else(|| RhiError::invalid_parameter("Queue belongs to another backend"))?;
        if queue.command_type() != CommandType::Direct {
            return Err(RhiError::invalid_parameter("Swap chains must be created on a direct queue"));
        }

        let hwnd = match surface.window_handle() {
            Some(RawWindowHandle::Win32(handle)) => HWND(handle.hwnd.get() as *mut c_void),
            Some(_) => return Err(RhiError::Unsupported("Only Win32 windows can present".to_string())),
            None => {
                return Err(RhiError::Unsupported(
                    "DirectX 12 swap chains need a native window".to_string(),
                ))
            }
        };

        let flags = if desc.allow_tearing {
            DXGI_SWAP_CHAIN_FLAG_ALLOW_TEARING.0 as u32
        } else {
            0
        };
        let swap_chain_desc = DXGI_SWAP_CHAIN_DESC1 {
            Width: desc.width,
            Height: desc.height,
            Format: convert::dxgi_format(desc.format),
            Stereo: Default::default(),
            SampleDesc: DXGI_SAMPLE_DESC { Count: 1, Quality: 0 },
            BufferUsage: DXGI_USAGE_RENDER_TARGET_OUTPUT,
            BufferCount: desc.buffer_count,
            Scaling: DXGI_SCALING_STRETCH,
            SwapEffect: DXGI_SWAP_EFFECT_FLIP_DISCARD,
            AlphaMode: DXGI_ALPHA_MODE_UNSPECIFIED,
            Flags: flags,
        };

        let swap_chain: IDXGISwapChain1 = unsafe {
            self.factory
                .CreateSwapChainForHwnd(queue.queue(), hwnd, &swap_chain_desc, None, None::<&IDXGIOutput>)
        }
        .rhi("IDXGIFactory2::CreateSwapChainForHwnd")?;
        let swap_chain: IDXGISwapChain3 = swap_chain.cast().rhi("IDXGISwapChain1::cast")?;

        debug!(
            width = desc.width,
            height = desc.height,
            buffers = desc.buffer_count,
            "Created DXGI swap chain"
        );
        Ok(Box::new(Dx12SwapChain::new(swap_chain, desc.buffer_count, desc.allow_tearing)))
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
            .downcast_ref::<Dx12Texture>()
            .ok_or_else(|| RhiError::invalid_parameter("Texture belongs to another backend"))?;
        let heap = heap
            .as_any()
            .downcast_ref::<Dx12DescriptorHeap>()
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

        let dxgi_format = convert::dxgi_format(format);
        let resource_desc = unsafe { texture.resource().GetDesc() };
        if resource_desc.Format != dxgi_format {
            return Err(RhiError::invalid_parameter(format!(
                "View format {:?} does not match the resource format",
                format
            )));
        }

        let rtv_desc = D3D12_RENDER_TARGET_VIEW_DESC {
            Format: dxgi_format,
            ViewDimension: D3D12_RTV_DIMENSION_TEXTURE2D,
            Anonymous: D3D12_RENDER_TARGET_VIEW_DESC_0 {
                Texture2D: D3D12_TEX2D_RTV {
                    MipSlice: 0,
                    PlaneSlice: 0,
                },
            },
        };
        unsafe {
            self.device.CreateRenderTargetView(
                texture.resource(),
                Some(&rtv_desc),
                D3D12_CPU_DESCRIPTOR_HANDLE { ptr: offset as usize },
            );
        }
        Ok(())
    }
}
