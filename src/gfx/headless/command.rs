//! headless 命令分配器和命令列表
//!
//! 命令列表把录制的命令保存在内存里，提交时整体交给队列的工作线程。

use std::any::Any;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use super::resource::{HeadlessTexture, TextureStorage};
use crate::core::error::{Result, RhiError};
use crate::rhi::backend::{CommandAllocatorBackend, CommandListBackend, TextureBackend};
use crate::rhi::types::{CommandType, ResourceState};

/// 录制下来的一条 GPU 命令
#[derive(Clone)]
pub(crate) enum Command {
    Barrier {
        texture: Arc<TextureStorage>,
        before: ResourceState,
        after: ResourceState,
    },
    Clear {
        view: u64,
        color: [f32; 4],
    },
}

pub struct HeadlessCommandAllocator {
    command_type: CommandType,
    resets: AtomicU64,
}

impl HeadlessCommandAllocator {
    pub(crate) fn new(command_type: CommandType) -> Self {
        Self {
            command_type,
            resets: AtomicU64::new(0),
        }
    }

    /// 被重置的次数
    pub fn reset_count(&self) -> u64 {
        self.resets.load(Ordering::Acquire)
    }
}

impl CommandAllocatorBackend for HeadlessCommandAllocator {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn reset(&self) -> Result<()> {
        self.resets.fetch_add(1, Ordering::AcqRel);
        Ok(())
    }
}

pub struct HeadlessCommandList {
    command_type: CommandType,
    commands: Vec<Command>,
    open: bool,
}

impl HeadlessCommandList {
    pub(crate) fn new(command_type: CommandType) -> Self {
        Self {
            command_type,
            commands: Vec::new(),
            open: false,
        }
    }

    pub(crate) fn is_open(&self) -> bool {
        self.open
    }

    pub(crate) fn commands(&self) -> &[Command] {
        &self.commands
    }

    /// 已录制的命令数
    pub fn command_count(&self) -> usize {
        self.commands.len()
    }

    fn ensure_open(&self) -> Result<()> {
        if self.open {
            Ok(())
        } else {
            Err(RhiError::Backend("Command list is closed".to_string()))
        }
    }
}

impl CommandListBackend for HeadlessCommandList {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn reset(&mut self, allocator: &dyn CommandAllocatorBackend) -> Result<()> {
        let allocator = allocator
            .as_any()
            .downcast_ref::<HeadlessCommandAllocator>()
            .ok_or_else(|| RhiError::invalid_parameter("Allocator belongs to another backend"))?;
        if allocator.command_type != self.command_type {
            return Err(RhiError::invalid_parameter("Allocator type does not match the command list"));
        }
        self.commands.clear();
        self.open = true;
        Ok(())
    }

    fn resource_barrier(
        &mut self,
        texture: &dyn TextureBackend,
        before: ResourceState,
        after: ResourceState,
    ) -> Result<()> {
        self.ensure_open()?;
        let texture = texture
            .as_any()
            .downcast_ref::<HeadlessTexture>()
            .ok_or_else(|| RhiError::invalid_parameter("Texture belongs to another backend"))?;
        self.commands.push(Command::Barrier {
            texture: texture.storage().clone(),
            before,
            after,
        });
        Ok(())
    }

    fn clear(&mut self, view_offset: u64, color: [f32; 4]) -> Result<()> {
        self.ensure_open()?;
        self.commands.push(Command::Clear {
            view: view_offset,
            color,
        });
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        self.ensure_open()?;
        self.open = false;
        Ok(())
    }
}
