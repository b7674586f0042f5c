//! 描述符堆
//!
//! 一个堆只存放一种类型的描述符，槽位从头开始单调分配，不会回收。
//! `DescriptorHeap` 是共享句柄，克隆只增加引用计数；
//! 资源视图持有所在堆的句柄，因此堆一定比视图活得长。

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use tracing::debug;

use crate::core::error::{Result, RhiError};
use crate::rhi::backend::DescriptorHeapBackend;
use crate::rhi::types::DescriptorType;

struct HeapInner {
    backend: Box<dyn DescriptorHeapBackend>,
    descriptor_type: DescriptorType,
    capacity: u32,
    stride: u64,
    cpu_start: u64,
    cursor: AtomicU32,
}

/// 描述符堆句柄
#[derive(Clone)]
pub struct DescriptorHeap {
    inner: Arc<HeapInner>,
}

impl DescriptorHeap {
    pub(crate) fn new(
        backend: Box<dyn DescriptorHeapBackend>,
        descriptor_type: DescriptorType,
        capacity: u32,
        stride: u64,
    ) -> Self {
        let cpu_start = backend.cpu_start();
        debug!(
            kind = descriptor_type.name(),
            capacity,
            stride,
            "Descriptor heap created"
        );
        Self {
            inner: Arc::new(HeapInner {
                backend,
                descriptor_type,
                capacity,
                stride,
                cpu_start,
                cursor: AtomicU32::new(0),
            }),
        }
    }

    pub fn descriptor_type(&self) -> DescriptorType {
        self.inner.descriptor_type
    }

    /// 槽位总数
    pub fn capacity(&self) -> u32 {
        self.inner.capacity
    }

    /// 已分配的槽位数
    pub fn allocated(&self) -> u32 {
        self.inner.cursor.load(Ordering::Acquire)
    }

    /// 剩余可分配的槽位数
    pub fn remaining(&self) -> u32 {
        self.capacity() - self.allocated()
    }

    /// 相邻描述符之间的字节跨度
    pub fn stride(&self) -> u64 {
        self.inner.stride
    }

    /// 第一个描述符的 CPU 地址
    pub fn cpu_start(&self) -> u64 {
        self.inner.cpu_start
    }

    /// 槽位对应的 CPU 地址
    pub fn offset_of(&self, slot: u32) -> u64 {
        self.inner.cpu_start + slot as u64 * self.inner.stride
    }

    /// 分配 `count` 个连续槽位，返回第一个槽位的索引
    pub fn allocate(&self, count: u32) -> Result<u32> {
        let capacity = self.inner.capacity;
        self.inner
            .cursor
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |cursor| {
                cursor.checked_add(count).filter(|end| *end <= capacity)
            })
            .map_err(|cursor| {
                RhiError::OutOfMemory(format!(
                    "{} heap has {} free slots, {} requested",
                    self.inner.descriptor_type.name(),
                    capacity - cursor,
                    count
                ))
            })
    }

    /// 仅当游标仍停在 `first` 时占用 `[first, first + count)`
    ///
    /// 视图先写入、成功后再占位时使用；期间有别的分配则返回 `InvalidState`。
    pub(crate) fn reserve_at(&self, first: u32, count: u32) -> Result<()> {
        let end = first
            .checked_add(count)
            .filter(|end| *end <= self.inner.capacity)
            .ok_or_else(|| {
                RhiError::OutOfMemory(format!(
                    "{} heap cannot hold slots {}..{}",
                    self.inner.descriptor_type.name(),
                    first,
                    first as u64 + count as u64
                ))
            })?;
        self.inner
            .cursor
            .compare_exchange(first, end, Ordering::AcqRel, Ordering::Acquire)
            .map(|_| ())
            .map_err(|cursor| {
                RhiError::invalid_state(format!(
                    "{} heap cursor moved from {} to {} during reservation",
                    self.inner.descriptor_type.name(),
                    first,
                    cursor
                ))
            })
    }

    /// 两个句柄是否指向同一个堆
    pub fn same_heap(&self, other: &DescriptorHeap) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    pub(crate) fn backend(&self) -> &dyn DescriptorHeapBackend {
        self.inner.backend.as_ref()
    }
}

impl std::fmt::Debug for DescriptorHeap {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DescriptorHeap")
            .field("type", &self.inner.descriptor_type)
            .field("capacity", &self.inner.capacity)
            .field("allocated", &self.allocated())
            .field("cpu_start", &format_args!("{:#x}", self.inner.cpu_start))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::any::Any;

    struct FixedHeap(u64);

    impl DescriptorHeapBackend for FixedHeap {
        fn as_any(&self) -> &dyn Any {
            self
        }

        fn cpu_start(&self) -> u64 {
            self.0
        }
    }

    fn rtv_heap(capacity: u32) -> DescriptorHeap {
        DescriptorHeap::new(Box::new(FixedHeap(0x1000)), DescriptorType::RenderTarget, capacity, 32)
    }

    #[test]
    fn test_sequential_allocation() {
        let heap = rtv_heap(4);
        assert_eq!(heap.allocate(3).unwrap(), 0);
        assert_eq!(heap.allocate(1).unwrap(), 3);
        assert_eq!(heap.remaining(), 0);
        assert_eq!(heap.offset_of(2), 0x1000 + 2 * 32);
    }

    #[test]
    fn test_exhausted_heap() {
        let heap = rtv_heap(2);
        heap.allocate(1).unwrap();
        assert!(matches!(heap.allocate(2), Err(RhiError::OutOfMemory(_))));
        // 失败的分配不消耗槽位
        assert_eq!(heap.allocated(), 1);
        assert_eq!(heap.allocate(1).unwrap(), 1);
    }

    #[test]
    fn test_shared_handle_identity() {
        let heap = rtv_heap(2);
        let clone = heap.clone();
        clone.allocate(1).unwrap();
        assert!(heap.same_heap(&clone));
        assert_eq!(heap.allocated(), 1);
        assert!(!heap.same_heap(&rtv_heap(2)));
    }

    #[test]
    fn test_reserve_at_requires_unmoved_cursor() {
        let heap = rtv_heap(4);
        let first = heap.allocated();
        heap.allocate(1).unwrap();
        // 游标已移动，不能再占用旧位置
        assert!(matches!(heap.reserve_at(first, 2), Err(RhiError::InvalidState(_))));
        assert_eq!(heap.allocated(), 1);

        heap.reserve_at(1, 3).unwrap();
        assert_eq!(heap.remaining(), 0);
        assert!(matches!(heap.reserve_at(4, 1), Err(RhiError::OutOfMemory(_))));
    }
}
