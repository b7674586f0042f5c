//! DirectX 12 命令队列和 Fence

use std::any::Any;
use std::time::Instant;

use tracing::trace;
use windows::core::Interface;
use windows::Win32::Foundation::{CloseHandle, HANDLE};
use windows::Win32::Graphics::Direct3D12::*;
use windows::Win32::Graphics::Dxgi::{DXGI_PRESENT, DXGI_PRESENT_ALLOW_TEARING};
use windows::Win32::System::Threading::{CreateEventA, WaitForSingleObject, INFINITE};

use super::command::Dx12CommandList;
use super::convert;
use super::error::HResultExt;
use super::resource::Dx12SwapChain;
use crate::core::error::{Result, RhiError};
use crate::rhi::backend::{CommandListBackend, FenceBackend, QueueBackend, SwapChainBackend};
use crate::rhi::queue::PresentMode;
use crate::rhi::sync::CancelToken;
use crate::rhi::types::CommandType;

/// 带取消令牌等待时，每隔多久检查一次令牌
const CANCEL_POLL_MS: u32 = 2;

pub struct Dx12Queue {
    queue: ID3D12CommandQueue,
    command_type: CommandType,
}

impl Dx12Queue {
    pub(crate) fn new(device: &ID3D12Device, command_type: CommandType) -> Result<Self> {
        let desc = D3D12_COMMAND_QUEUE_DESC {
            Type: convert::command_list_type(command_type),
            Priority: D3D12_COMMAND_QUEUE_PRIORITY_NORMAL.0,
            Flags: D3D12_COMMAND_QUEUE_FLAG_NONE,
            NodeMask: 0,
        };
        let queue: ID3D12CommandQueue =
            unsafe { device.CreateCommandQueue(&desc) }.rhi("ID3D12Device::CreateCommandQueue")?;
        Ok(Self { queue, command_type })
    }

    pub fn queue(&self) -> &ID3D12CommandQueue {
        &self.queue
    }

    pub fn command_type(&self) -> CommandType {
        self.command_type
    }
}

unsafe impl Send for Dx12Queue {}
unsafe impl Sync for Dx12Queue {}

fn dx12_fence(fence: &dyn FenceBackend) -> Result<&ID3D12Fence> {
    fence
        .as_any()
        .downcast_ref::<Dx12Fence>()
        .map(|fence| fence.fence())
        .ok_or_else(|| RhiError::invalid_parameter("Fence belongs to another backend"))
}

impl QueueBackend for Dx12Queue {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn execute(&self, list: &dyn CommandListBackend) -> Result<()> {
        let list = list
            .as_any()
            .downcast_ref::<Dx12CommandList>()
            .ok_or_else(|| RhiError::invalid_parameter("Command list belongs to another backend"))?;
        let list: ID3D12CommandList = list.list().cast().rhi("ID3D12GraphicsCommandList::cast")?;
        unsafe { self.queue.ExecuteCommandLists(&[Some(list)]) };
        Ok(())
    }

    fn present(&self, swapchain: &dyn SwapChainBackend, mode: PresentMode) -> Result<()> {
        let swapchain = swapchain
            .as_any()
            .downcast_ref::<Dx12SwapChain>()
            .ok_or_else(|| RhiError::invalid_parameter("Swap chain belongs to another backend"))?;
        if mode.allow_tearing && !swapchain.allow_tearing() {
            return Err(RhiError::invalid_parameter(
                "Tearing present on a swap chain created without the allow-tearing flag",
            ));
        }

        let flags = if mode.allow_tearing {
            DXGI_PRESENT_ALLOW_TEARING
        } else {
            DXGI_PRESENT(0)
        };
        trace!(sync_interval = mode.sync_interval, allow_tearing = mode.allow_tearing, "Present");
        unsafe { swapchain.swap_chain().Present(mode.sync_interval, flags) }
            .ok()
            .rhi("IDXGISwapChain::Present")
    }

    fn signal(&self, fence: &dyn FenceBackend, value: u64) -> Result<()> {
        unsafe { self.queue.Signal(dx12_fence(fence)?, value) }.rhi("ID3D12CommandQueue::Signal")
    }

    fn gpu_wait(&self, fence: &dyn FenceBackend, value: u64) -> Result<()> {
        unsafe { self.queue.Wait(dx12_fence(fence)?, value) }.rhi("ID3D12CommandQueue::Wait")
    }
}

pub struct Dx12Fence {
    fence: ID3D12Fence,
}

impl Dx12Fence {
    pub(crate) fn new(device: &ID3D12Device, initial_value: u64) -> Result<Self> {
        let fence: ID3D12Fence = unsafe { device.CreateFence(initial_value, D3D12_FENCE_FLAG_NONE) }
            .rhi("ID3D12Device::CreateFence")?;
        Ok(Self { fence })
    }

    pub fn fence(&self) -> &ID3D12Fence {
        &self.fence
    }

    /// 在事件上分段等待，期间检查截止时间和取消令牌
    fn wait_on_event(
        &self,
        event: HANDLE,
        value: u64,
        deadline: Option<Instant>,
        cancel: Option<&CancelToken>,
    ) -> Result<()> {
        unsafe { self.fence.SetEventOnCompletion(value, event) }.rhi("ID3D12Fence::SetEventOnCompletion")?;

        loop {
            let completed = self.completed_value();
            // 设备被移除后完成值变成 u64::MAX
            if completed == u64::MAX {
                return Err(RhiError::DeviceLost(
                    "Fence completed value reads UINT64_MAX".to_string(),
                ));
            }
            if completed >= value {
                return Ok(());
            }
            if cancel.is_some_and(|token| token.is_cancelled()) {
                return Err(RhiError::Cancelled { value });
            }

            let mut slice = if cancel.is_some() { CANCEL_POLL_MS } else { INFINITE };
            if let Some(deadline) = deadline {
                let now = Instant::now();
                if now >= deadline {
                    return Err(RhiError::Timeout { value, completed });
                }
                let remaining = (deadline - now).as_millis().max(1);
                slice = slice.min(u32::try_from(remaining).unwrap_or(INFINITE - 1));
            }
            unsafe { WaitForSingleObject(event, slice) };
        }
    }
}

unsafe impl Send for Dx12Fence {}
unsafe impl Sync for Dx12Fence {}

impl FenceBackend for Dx12Fence {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn completed_value(&self) -> u64 {
        unsafe { self.fence.GetCompletedValue() }
    }

    fn wait(&self, value: u64, deadline: Option<Instant>, cancel: Option<&CancelToken>) -> Result<()> {
        if self.completed_value() >= value {
            return Ok(());
        }

        // 每次等待使用自己的事件，多个线程可以同时等待同一个 fence
        let event = unsafe { CreateEventA(None, false, false, None) }.rhi("CreateEventA")?;
        let result = self.wait_on_event(event, value, deadline, cancel);
        unsafe {
            let _ = CloseHandle(event);
        }
        result
    }
}
