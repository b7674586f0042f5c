//! 命令分配器和命令列表
//!
//! 命令列表是一个两状态的状态机：
//!
//! ```text
//! Closed --reset(allocator)--> Recording --close()--> Closed
//! ```
//!
//! 创建时处于 Closed 状态。只有 Recording 状态可以录制命令，只有 Closed 状态可以提交。
//! 录制期间列表绑定在一个分配器上，同一个分配器同时只能被一个列表用来录制。

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use tracing::debug;

use crate::core::color::ColorRgba;
use crate::core::error::{Result, RhiError};
use crate::rhi::backend::{CommandAllocatorBackend, CommandListBackend};
use crate::rhi::descriptor::DescriptorHeap;
use crate::rhi::resource::Texture2D;
use crate::rhi::types::{CommandType, ResourceState};

static NEXT_ALLOCATOR_ID: AtomicU64 = AtomicU64::new(1);

/// 命令分配器
///
/// 命令列表录制时的后备存储。只能通过 `CommandList::reset` 隐式重置，
/// 调用者需要保证 GPU 已经执行完之前从这个分配器录制的命令。
pub struct CommandAllocator {
    backend: Box<dyn CommandAllocatorBackend>,
    command_type: CommandType,
    id: u64,
    bound: Arc<AtomicBool>,
}

impl CommandAllocator {
    pub(crate) fn new(backend: Box<dyn CommandAllocatorBackend>, command_type: CommandType) -> Self {
        Self {
            backend,
            command_type,
            id: NEXT_ALLOCATOR_ID.fetch_add(1, Ordering::Relaxed),
            bound: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn command_type(&self) -> CommandType {
        self.command_type
    }

    /// 是否有列表正在这个分配器上录制
    pub fn is_bound(&self) -> bool {
        self.bound.load(Ordering::Acquire)
    }

    pub(crate) fn backend(&self) -> &dyn CommandAllocatorBackend {
        self.backend.as_ref()
    }
}

impl std::fmt::Debug for CommandAllocator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandAllocator")
            .field("id", &self.id)
            .field("command_type", &self.command_type)
            .field("bound", &self.is_bound())
            .finish()
    }
}

/// 命令列表状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandListState {
    /// 已关闭，可以提交或重置
    Closed,
    /// 正在录制
    Recording,
}

/// 录制期间持有的分配器绑定
struct Binding {
    allocator_id: u64,
    flag: Arc<AtomicBool>,
}

impl Drop for Binding {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

/// 命令列表
pub struct CommandList {
    backend: Box<dyn CommandListBackend>,
    command_type: CommandType,
    state: CommandListState,
    binding: Option<Binding>,
    validation: bool,
}

impl CommandList {
    pub(crate) fn new(backend: Box<dyn CommandListBackend>, command_type: CommandType, validation: bool) -> Self {
        Self {
            backend,
            command_type,
            state: CommandListState::Closed,
            binding: None,
            validation,
        }
    }

    pub fn state(&self) -> CommandListState {
        self.state
    }

    pub fn command_type(&self) -> CommandType {
        self.command_type
    }

    pub fn is_recording(&self) -> bool {
        self.state == CommandListState::Recording
    }

    /// 验证模式下会检查资源屏障声明的状态
    pub fn validation_enabled(&self) -> bool {
        self.validation
    }

    /// 重置分配器并重新打开列表
    ///
    /// 失败时列表保持 Closed 状态。
    pub fn reset(&mut self, allocator: &CommandAllocator) -> Result<()> {
        if self.is_recording() {
            return Err(RhiError::invalid_state("Command list is already recording; close it first"));
        }
        if allocator.command_type != self.command_type {
            return Err(RhiError::invalid_parameter(format!(
                "{} command list cannot record on a {} allocator",
                self.command_type.name(),
                allocator.command_type.name()
            )));
        }
        if allocator
            .bound
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(RhiError::invalid_state(
                "Command allocator is bound to another recording command list",
            ));
        }
        let binding = Binding {
            allocator_id: allocator.id,
            flag: allocator.bound.clone(),
        };

        // 出错时 binding 被丢弃，分配器随之解绑
        allocator.backend.reset()?;
        self.backend.reset(allocator.backend())?;

        self.binding = Some(binding);
        self.state = CommandListState::Recording;
        Ok(())
    }

    /// 录制一个状态转换屏障
    ///
    /// 提供 `heap` 时，纹理必须在该堆中有视图。
    pub fn resource_barrier(
        &mut self,
        allocator: &CommandAllocator,
        heap: Option<&DescriptorHeap>,
        texture: &Texture2D,
        from: ResourceState,
        to: ResourceState,
    ) -> Result<()> {
        match &self.binding {
            Some(binding) if self.is_recording() && binding.allocator_id == allocator.id => {}
            _ => {
                return Err(RhiError::invalid_state(
                    "Resource barrier requires a list recording against the given allocator",
                ))
            }
        }
        if let Some(heap) = heap {
            if !texture.has_view_in(heap) {
                return Err(RhiError::invalid_parameter(format!(
                    "Texture has no view in the given {} heap",
                    heap.descriptor_type().name()
                )));
            }
        }
        if self.validation {
            let tracked = texture.declared_state();
            if tracked != from {
                return Err(RhiError::StateMismatch { tracked, declared: from });
            }
        }

        self.backend.resource_barrier(texture.backend(), from, to)?;
        texture.declare_state(to);
        Ok(())
    }

    /// 清除纹理的第一个视图
    pub fn clear(&mut self, texture: &Texture2D, color: ColorRgba) -> Result<()> {
        if !self.is_recording() {
            return Err(RhiError::invalid_state("Cannot record a clear into a closed command list"));
        }
        let view = texture
            .views()
            .first()
            .ok_or_else(|| RhiError::invalid_parameter("Texture has no views to clear"))?;
        if self.validation {
            let tracked = texture.declared_state();
            if tracked != ResourceState::RenderTarget {
                return Err(RhiError::StateMismatch {
                    tracked,
                    declared: ResourceState::RenderTarget,
                });
            }
        }

        self.backend.clear(view.offset(), color.to_normalized())
    }

    /// 结束录制
    ///
    /// 即使后端关闭失败，列表也视为 Closed，分配器绑定同时解除。
    pub fn close(&mut self) -> Result<()> {
        if !self.is_recording() {
            return Err(RhiError::invalid_state("Command list is not recording"));
        }
        self.state = CommandListState::Closed;
        self.binding = None;
        self.backend.close()
    }

    pub(crate) fn backend(&self) -> &dyn CommandListBackend {
        self.backend.as_ref()
    }
}

impl Drop for CommandList {
    fn drop(&mut self) {
        if self.is_recording() {
            debug!(command_type = self.command_type.name(), "Command list dropped while recording");
        }
    }
}

impl std::fmt::Debug for CommandList {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandList")
            .field("command_type", &self.command_type)
            .field("state", &self.state)
            .field("validation", &self.validation)
            .finish()
    }
}
