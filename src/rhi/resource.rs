//! GPU 资源和资源视图

use std::sync::{Mutex, PoisonError};

use crate::core::error::{Result, RhiError};
use crate::rhi::backend::TextureBackend;
use crate::rhi::descriptor::DescriptorHeap;
use crate::rhi::types::{PixelFormat, ResourceState};

/// 描述符堆中的一个视图
#[derive(Debug, Clone)]
pub struct ResourceView {
    heap: DescriptorHeap,
    slot: u32,
    offset: u64,
}

impl ResourceView {
    pub(crate) fn new(heap: DescriptorHeap, slot: u32) -> Self {
        let offset = heap.offset_of(slot);
        Self { heap, slot, offset }
    }

    /// 视图所在的堆
    pub fn heap(&self) -> &DescriptorHeap {
        &self.heap
    }

    pub fn slot(&self) -> u32 {
        self.slot
    }

    /// 描述符的 CPU 地址
    pub fn offset(&self) -> u64 {
        self.offset
    }
}

/// 二维纹理
///
/// 视图只增不减。`declared_state` 记录最近一次资源屏障声明的目标状态，
/// 验证模式下用它检查下一次屏障的前置状态。
pub struct Texture2D {
    backend: Box<dyn TextureBackend>,
    width: u32,
    height: u32,
    format: PixelFormat,
    views: Vec<ResourceView>,
    declared_state: Mutex<ResourceState>,
}

impl Texture2D {
    pub(crate) fn new(
        backend: Box<dyn TextureBackend>,
        width: u32,
        height: u32,
        format: PixelFormat,
        initial_state: ResourceState,
    ) -> Self {
        Self {
            backend,
            width,
            height,
            format,
            views: Vec::new(),
            declared_state: Mutex::new(initial_state),
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn format(&self) -> PixelFormat {
        self.format
    }

    pub fn view_count(&self) -> usize {
        self.views.len()
    }

    pub fn view(&self, index: usize) -> Result<&ResourceView> {
        self.views.get(index).ok_or_else(|| {
            RhiError::invalid_parameter(format!(
                "View index {} out of range ({} views)",
                index,
                self.views.len()
            ))
        })
    }

    pub fn views(&self) -> &[ResourceView] {
        &self.views
    }

    /// 最近一次声明的资源状态
    pub fn declared_state(&self) -> ResourceState {
        *self.declared_state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// 后端对象，供诊断和测试向下转型
    pub fn backend(&self) -> &dyn TextureBackend {
        self.backend.as_ref()
    }

    /// 纹理在给定堆中是否有视图
    pub fn has_view_in(&self, heap: &DescriptorHeap) -> bool {
        self.views.iter().any(|view| view.heap.same_heap(heap))
    }

    pub(crate) fn push_view(&mut self, view: ResourceView) {
        self.views.push(view);
    }

    pub(crate) fn declare_state(&self, state: ResourceState) {
        *self.declared_state.lock().unwrap_or_else(PoisonError::into_inner) = state;
    }
}

impl std::fmt::Debug for Texture2D {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Texture2D")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("format", &self.format)
            .field("views", &self.views.len())
            .field("declared_state", &self.declared_state())
            .finish()
    }
}
