//! headless 命令队列
//!
//! 每个队列对应一个工作线程，模拟该队列的 GPU 时间线：
//! 队列把操作按提交顺序发到 channel 里，工作线程依次执行。
//! 提交调用本身不等待，和真实 GPU 一样是异步的。

use std::any::Any;
use std::sync::{Arc, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{Receiver, Sender};
use tracing::{debug, error, trace, warn};

use super::command::{Command, HeadlessCommandList};
use super::resource::{HeadlessSwapChain, SwapChainState, ViewTable};
use super::sync::{FenceState, HeadlessFence};
use crate::core::error::{Result, RhiError};
use crate::rhi::backend::{CommandListBackend, FenceBackend, QueueBackend, SwapChainBackend};
use crate::rhi::queue::PresentMode;
use crate::rhi::sync::CancelToken;
use crate::rhi::types::{CommandType, ResourceState};
use crate::rhi_error;

/// 工作线程上执行的操作
enum GpuOp {
    Execute(Vec<Command>),
    Signal(Arc<FenceState>, u64),
    Wait(Arc<FenceState>, u64),
    Present(Arc<SwapChainState>, PresentMode),
}

/// 一个队列的 GPU 时间线
struct Timeline {
    command_type: CommandType,
    views: ViewTable,
    execution_latency: Duration,
    debug: bool,
    shutdown: CancelToken,
}

impl Timeline {
    fn run(self, receiver: Receiver<GpuOp>) {
        debug!(queue = self.command_type.name(), "GPU timeline started");
        for op in receiver.iter() {
            match op {
                GpuOp::Execute(commands) => self.execute(&commands),
                GpuOp::Signal(fence, value) => fence.signal(value),
                GpuOp::Wait(fence, value) => {
                    if fence.wait(value, None, Some(&self.shutdown)).is_err() {
                        debug!(queue = self.command_type.name(), value, "GPU wait abandoned on shutdown");
                        break;
                    }
                }
                GpuOp::Present(swapchain, mode) => self.present(&swapchain, mode),
            }
        }
        debug!(queue = self.command_type.name(), "GPU timeline stopped");
    }

    fn execute(&self, commands: &[Command]) {
        if !self.execution_latency.is_zero() {
            thread::sleep(self.execution_latency);
        }

        for command in commands {
            match command {
                Command::Barrier { texture, before, after } => {
                    let actual = texture.transition(*after);
                    if actual != *before {
                        self.report(format_args!(
                            "Resource barrier before state {:?} does not match the actual state {:?}",
                            before, actual
                        ));
                    }
                }
                Command::Clear { view, color } => {
                    let target = self
                        .views
                        .lock()
                        .unwrap_or_else(PoisonError::into_inner)
                        .get(view)
                        .cloned();
                    match target {
                        Some(texture) => {
                            if texture.state() != ResourceState::RenderTarget {
                                self.report(format_args!(
                                    "Clearing a render target in state {:?}",
                                    texture.state()
                                ));
                            }
                            texture.fill(*color);
                        }
                        None => self.report(format_args!("Clear of unknown view {:#x}", view)),
                    }
                }
            }
        }
    }

    fn present(&self, swapchain: &SwapChainState, mode: PresentMode) {
        if let Some(back_buffer) = swapchain.buffers.get(swapchain.current() as usize) {
            if back_buffer.state() != ResourceState::Present {
                self.report(format_args!(
                    "Presenting a back buffer in state {:?}",
                    back_buffer.state()
                ));
            }
        }
        swapchain.flip(mode);
    }

    /// 模拟调试层：启用时按错误报告，否则只是警告
    fn report(&self, message: std::fmt::Arguments<'_>) {
        if self.debug {
            error!(queue = self.command_type.name(), "{}", message);
        } else {
            warn!(queue = self.command_type.name(), "{}", message);
        }
    }
}

/// headless 命令队列
pub struct HeadlessQueue {
    command_type: CommandType,
    sender: Option<Sender<GpuOp>>,
    worker: Option<JoinHandle<()>>,
    shutdown: CancelToken,
}

impl HeadlessQueue {
    pub(crate) fn new(
        command_type: CommandType,
        views: ViewTable,
        execution_latency: Duration,
        debug: bool,
    ) -> Result<Self> {
        let (sender, receiver) = crossbeam_channel::unbounded::<GpuOp>();
        let shutdown = CancelToken::new();
        let timeline = Timeline {
            command_type,
            views,
            execution_latency,
            debug,
            shutdown: shutdown.clone(),
        };

        let worker = thread::Builder::new()
            .name(format!("headless-{}-queue", command_type.name().to_lowercase()))
            .spawn(move || timeline.run(receiver))?;

        Ok(Self {
            command_type,
            sender: Some(sender),
            worker: Some(worker),
            shutdown,
        })
    }

    fn submit(&self, op: GpuOp) -> Result<()> {
        let sender = self
            .sender
            .as_ref()
            .ok_or_else(|| RhiError::DeviceLost("Queue has been shut down".to_string()))?;
        sender
            .send(op)
            .map_err(|_| RhiError::DeviceLost(format!("{} queue timeline stopped", self.command_type.name())))
    }
}

fn headless_fence(fence: &dyn FenceBackend) -> Result<Arc<FenceState>> {
    fence
        .as_any()
        .downcast_ref::<HeadlessFence>()
        .map(|fence| fence.state().clone())
        .ok_or_else(|| RhiError::invalid_parameter("Fence belongs to another backend"))
}

impl QueueBackend for HeadlessQueue {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn execute(&self, list: &dyn CommandListBackend) -> Result<()> {
        let list = list
            .as_any()
            .downcast_ref::<HeadlessCommandList>()
            .ok_or_else(|| RhiError::invalid_parameter("Command list belongs to another backend"))?;
        if list.is_open() {
            return Err(RhiError::invalid_state("Command list is still open"));
        }
        trace!(commands = list.command_count(), "Submitting to headless timeline");
        self.submit(GpuOp::Execute(list.commands().to_vec()))
    }

    fn present(&self, swapchain: &dyn SwapChainBackend, mode: PresentMode) -> Result<()> {
        let swapchain = swapchain
            .as_any()
            .downcast_ref::<HeadlessSwapChain>()
            .ok_or_else(|| RhiError::invalid_parameter("Swap chain belongs to another backend"))?;
        if mode.allow_tearing && !swapchain.state().allow_tearing {
            return Err(RhiError::invalid_parameter(
                "Tearing present on a swap chain created without the allow-tearing flag",
            ));
        }
        self.submit(GpuOp::Present(swapchain.state().clone(), mode))
    }

    fn signal(&self, fence: &dyn FenceBackend, value: u64) -> Result<()> {
        self.submit(GpuOp::Signal(headless_fence(fence)?, value))
    }

    fn gpu_wait(&self, fence: &dyn FenceBackend, value: u64) -> Result<()> {
        self.submit(GpuOp::Wait(headless_fence(fence)?, value))
    }
}

impl Drop for HeadlessQueue {
    fn drop(&mut self) {
        // 关闭 channel 让工作线程在执行完剩余操作后退出，
        // 取消令牌用于打断永远等不到的 GPU 侧等待
        self.sender.take();
        self.shutdown.cancel();
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                rhi_error!(queue = self.command_type.name(), "GPU timeline thread panicked");
            }
        }
    }
}
