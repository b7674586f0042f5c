//! DirectX 12 命令分配器和命令列表

use std::any::Any;
use std::mem::ManuallyDrop;

use windows::Win32::Graphics::Direct3D12::*;

use super::convert;
use super::error::HResultExt;
use super::resource::Dx12Texture;
use crate::core::error::{Result, RhiError};
use crate::rhi::backend::{CommandAllocatorBackend, CommandListBackend, TextureBackend};
use crate::rhi::types::{CommandType, ResourceState};

pub struct Dx12CommandAllocator {
    allocator: ID3D12CommandAllocator,
    command_type: CommandType,
}

impl Dx12CommandAllocator {
    pub(crate) fn new(device: &ID3D12Device, command_type: CommandType) -> Result<Self> {
        let allocator: ID3D12CommandAllocator =
            unsafe { device.CreateCommandAllocator(convert::command_list_type(command_type)) }
                .rhi("ID3D12Device::CreateCommandAllocator")?;
        Ok(Self {
            allocator,
            command_type,
        })
    }

    pub fn allocator(&self) -> &ID3D12CommandAllocator {
        &self.allocator
    }

    pub fn command_type(&self) -> CommandType {
        self.command_type
    }
}

unsafe impl Send for Dx12CommandAllocator {}
unsafe impl Sync for Dx12CommandAllocator {}

impl CommandAllocatorBackend for Dx12CommandAllocator {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn reset(&self) -> Result<()> {
        unsafe { self.allocator.Reset() }.rhi("ID3D12CommandAllocator::Reset")
    }
}

/// 图形命令列表
///
/// 视频编解码的列表是另一套接口，这里只支持 Direct、Compute 和 Copy。
pub struct Dx12CommandList {
    list: ID3D12GraphicsCommandList,
}

impl Dx12CommandList {
    /// 创建命令列表并立即关闭，和核心层的初始状态保持一致
    pub(crate) fn new(device: &ID3D12Device, allocator: &Dx12CommandAllocator, command_type: CommandType) -> Result<Self> {
        if matches!(command_type, CommandType::VideoDecode | CommandType::VideoEncode) {
            return Err(RhiError::Unsupported(format!(
                "{} command lists are not supported by the DirectX 12 backend",
                command_type.name()
            )));
        }

        unsafe {
            let list: ID3D12GraphicsCommandList = device
                .CreateCommandList(
                    0,
                    convert::command_list_type(command_type),
                    allocator.allocator(),
                    None::<&ID3D12PipelineState>,
                )
                .rhi("ID3D12Device::CreateCommandList")?;
            list.Close().rhi("ID3D12GraphicsCommandList::Close")?;
            Ok(Self { list })
        }
    }

    pub fn list(&self) -> &ID3D12GraphicsCommandList {
        &self.list
    }
}

unsafe impl Send for Dx12CommandList {}

impl CommandListBackend for Dx12CommandList {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn reset(&mut self, allocator: &dyn CommandAllocatorBackend) -> Result<()> {
        let allocator = allocator
            .as_any()
            .downcast_ref::<Dx12CommandAllocator>()
            .ok_or_else(|| RhiError::invalid_parameter("Allocator belongs to another backend"))?;
        unsafe { self.list.Reset(allocator.allocator(), None::<&ID3D12PipelineState>) }
            .rhi("ID3D12GraphicsCommandList::Reset")
    }

    fn resource_barrier(
        &mut self,
        texture: &dyn TextureBackend,
        before: ResourceState,
        after: ResourceState,
    ) -> Result<()> {
        let texture = texture
            .as_any()
            .downcast_ref::<Dx12Texture>()
            .ok_or_else(|| RhiError::invalid_parameter("Texture belongs to another backend"))?;

        let barrier = D3D12_RESOURCE_BARRIER {
            Type: D3D12_RESOURCE_BARRIER_TYPE_TRANSITION,
            Flags: D3D12_RESOURCE_BARRIER_FLAG_NONE,
            Anonymous: D3D12_RESOURCE_BARRIER_0 {
                Transition: ManuallyDrop::new(D3D12_RESOURCE_TRANSITION_BARRIER {
                    pResource: ManuallyDrop::new(Some(texture.resource().clone())),
                    Subresource: D3D12_RESOURCE_BARRIER_ALL_SUBRESOURCES,
                    StateBefore: convert::resource_state(before),
                    StateAfter: convert::resource_state(after),
                }),
            },
        };

        let barriers = [barrier];
        unsafe {
            self.list.ResourceBarrier(&barriers);
            // 归还 clone 时增加的引用计数
            let [barrier] = barriers;
            let transition = ManuallyDrop::into_inner(barrier.Anonymous.Transition);
            drop(ManuallyDrop::into_inner(transition.pResource));
        }
        Ok(())
    }

    fn clear(&mut self, view_offset: u64, color: [f32; 4]) -> Result<()> {
        let handle = D3D12_CPU_DESCRIPTOR_HANDLE {
            ptr: view_offset as usize,
        };
        unsafe { self.list.ClearRenderTargetView(handle, &color, None) };
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        unsafe { self.list.Close() }.rhi("ID3D12GraphicsCommandList::Close")
    }
}
