//! DirectX 12 描述符堆
//!
//! 封装 ID3D12DescriptorHeap。槽位分配由核心层的 `DescriptorHeap` 负责，
//! 这里只提供起始地址和描述符写入所需的原生对象。

use std::any::Any;

use windows::Win32::Graphics::Direct3D12::*;

use super::convert;
use super::error::HResultExt;
use crate::core::error::Result;
use crate::rhi::backend::DescriptorHeapBackend;
use crate::rhi::types::DescriptorType;

pub struct Dx12DescriptorHeap {
    heap: ID3D12DescriptorHeap,
    descriptor_type: DescriptorType,
    /// CPU 句柄基址
    cpu_start: usize,
    /// 描述符增量大小
    increment_size: u32,
    capacity: u32,
}

impl Dx12DescriptorHeap {
    /// 创建 CPU 可见的描述符堆
    ///
    /// 渲染目标和深度模板视图只能放在 CPU 可见的堆里，其他类型的着色器可见堆目前用不到。
    pub(crate) fn new(device: &ID3D12Device, descriptor_type: DescriptorType, capacity: u32) -> Result<Self> {
        let heap_type = convert::descriptor_heap_type(descriptor_type);
        let heap_desc = D3D12_DESCRIPTOR_HEAP_DESC {
            Type: heap_type,
            NumDescriptors: capacity,
            Flags: D3D12_DESCRIPTOR_HEAP_FLAG_NONE,
            NodeMask: 0,
        };

        unsafe {
            let heap: ID3D12DescriptorHeap = device
                .CreateDescriptorHeap(&heap_desc)
                .rhi("ID3D12Device::CreateDescriptorHeap")?;

            // 设置调试名称，方便在 PIX 里辨认
            let name: Vec<u16> = format!("{} heap", descriptor_type.name())
                .encode_utf16()
                .chain(Some(0))
                .collect();
            let _ = heap.SetName(windows::core::PCWSTR(name.as_ptr()));

            let increment_size = device.GetDescriptorHandleIncrementSize(heap_type);
            let cpu_start = heap.GetCPUDescriptorHandleForHeapStart().ptr;

            Ok(Self {
                heap,
                descriptor_type,
                cpu_start,
                increment_size,
                capacity,
            })
        }
    }

    pub fn heap(&self) -> &ID3D12DescriptorHeap {
        &self.heap
    }

    pub fn descriptor_type(&self) -> DescriptorType {
        self.descriptor_type
    }

    pub fn increment_size(&self) -> u32 {
        self.increment_size
    }

    /// 地址是否落在本堆的某个槽位上
    pub(crate) fn contains(&self, offset: u64) -> bool {
        let start = self.cpu_start as u64;
        let stride = self.increment_size as u64;
        let end = start + self.capacity as u64 * stride;
        offset >= start && offset < end && (offset - start) % stride == 0
    }
}

// DX12 堆是线程安全的
unsafe impl Send for Dx12DescriptorHeap {}
unsafe impl Sync for Dx12DescriptorHeap {}

impl DescriptorHeapBackend for Dx12DescriptorHeap {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn cpu_start(&self) -> u64 {
        self.cpu_start as u64
    }
}
