//! DistRHI 演示程序
//!
//! 打开一个设备，按固定流程渲染若干帧：每帧把后台缓冲转到渲染目标状态、
//! 清屏、转回呈现状态，提交、呈现并等待 GPU 完成。
//!
//! # 使用方法
//!
//! ```bash
//! # 使用配置文件
//! cargo run
//!
//! # 不需要显卡的 headless 后端，渲染 10 帧
//! cargo run -- --headless --frames 10
//!
//! # DirectX 12，关闭垂直同步并允许撕裂
//! cargo run -- --dx12 --no-vsync --tearing
//! ```
//!
//! headless 后端使用离屏表面；DirectX 12 后端会打开一个 winit 窗口。

use anyhow::Context;
use tracing::{debug, error, info};

use dist_rhi::core::{log, BackendKind, ColorRgba, Config};
use dist_rhi::rhi::{
    CommandAllocator, CommandList, CommandQueue, CommandType, DescriptorHeap, DescriptorType, Device,
    Fence, HeadlessSurface, ResourceState, Surface, SwapChain, WaitOptions,
};

/// 依次使用的清屏颜色
const CLEAR_COLORS: [ColorRgba; 3] = [ColorRgba::RED, ColorRgba::GREEN, ColorRgba::BLUE];

/// 一帧所需的全部对象
struct FrameLoop {
    queue: CommandQueue,
    heap: DescriptorHeap,
    swapchain: SwapChain,
    allocator: CommandAllocator,
    list: CommandList,
    fence: Fence,
    wait: WaitOptions,
    frame: u64,
}

impl FrameLoop {
    fn new(device: &Device, surface: &dyn Surface, config: &Config) -> dist_rhi::core::Result<Self> {
        let buffer_count = config.graphics.buffer_count;
        let queue = device.create_command_queue(CommandType::Direct)?;
        let heap = device.create_descriptor_heap(DescriptorType::RenderTarget, buffer_count)?;
        let swapchain = device.create_swapchain(&queue, &heap, surface, config.graphics.format, buffer_count)?;
        let allocator = device.create_command_allocator(CommandType::Direct)?;
        let list = device.create_command_list(&allocator)?;
        let fence = device.create_fence(0)?;

        let wait = match config.wait_timeout() {
            Some(timeout) => WaitOptions::with_timeout(timeout),
            None => WaitOptions::infinite(),
        };

        Ok(Self {
            queue,
            heap,
            swapchain,
            allocator,
            list,
            fence,
            wait,
            frame: 0,
        })
    }

    /// 录制、提交并呈现一帧，然后等待 GPU 完成
    fn render(&mut self) -> dist_rhi::core::Result<()> {
        let buffer = self.swapchain.buffer_for_frame(self.frame)?;
        let color = CLEAR_COLORS[(self.frame % CLEAR_COLORS.len() as u64) as usize];

        self.list.reset(&self.allocator)?;
        self.list.resource_barrier(
            &self.allocator,
            Some(&self.heap),
            buffer,
            ResourceState::Present,
            ResourceState::RenderTarget,
        )?;
        self.list.clear(buffer, color)?;
        self.list.resource_barrier(
            &self.allocator,
            Some(&self.heap),
            buffer,
            ResourceState::RenderTarget,
            ResourceState::Present,
        )?;
        self.list.close()?;

        self.queue.execute(&self.list)?;
        self.queue.present(&self.swapchain)?;
        self.queue.flush_with(&self.fence, self.frame + 1, &self.wait)?;

        debug!(frame = self.frame, fence = self.fence.completed_value(), "Frame complete");
        self.frame += 1;
        Ok(())
    }
}

/// 在离屏表面上渲染
fn run_headless(device: &Device, config: &Config) -> anyhow::Result<u64> {
    let surface = HeadlessSurface::new(config.window.width, config.window.height);
    let mut frame_loop = FrameLoop::new(device, &surface, config).context("Failed to create frame resources")?;
    for _ in 0..config.window.frames {
        frame_loop.render()?;
    }
    Ok(frame_loop.fence.completed_value())
}

/// 打开 winit 窗口并在上面渲染，直到渲染完指定帧数或窗口被关闭
fn run_windowed(device: &Device, config: &Config) -> anyhow::Result<u64> {
    use winit::dpi::LogicalSize;
    use winit::event::{Event, WindowEvent};
    use winit::event_loop::{ControlFlow, EventLoop};
    use winit::window::WindowBuilder;

    let event_loop = EventLoop::new().context("Failed to create event loop")?;
    let window = WindowBuilder::new()
        .with_title(config.window.title.as_str())
        .with_inner_size(LogicalSize::new(config.window.width, config.window.height))
        .build(&event_loop)
        .context("Failed to create window")?;

    let mut frame_loop = FrameLoop::new(device, &window, config).context("Failed to create frame resources")?;
    let frames = config.window.frames;
    let mut failure = None;

    event_loop.set_control_flow(ControlFlow::Poll);
    event_loop.run(|event, target| match event {
        Event::WindowEvent {
            event: WindowEvent::CloseRequested,
            ..
        } => {
            info!("Close requested, shutting down...");
            target.exit();
        }
        Event::AboutToWait => {
            if frame_loop.frame >= frames {
                target.exit();
            } else if let Err(e) = frame_loop.render() {
                error!("Frame failed: {}", e);
                failure = Some(e);
                target.exit();
            }
        }
        _ => (),
    })?;

    if let Some(e) = failure {
        return Err(e.into());
    }
    Ok(frame_loop.fence.completed_value())
}

fn main() -> anyhow::Result<()> {
    let mut config = Config::from_file_or_default("rhi.toml");
    config.apply_args(std::env::args());
    config.validate().context("Invalid configuration")?;

    let log_file = if config.logging.file_output {
        Some(config.logging.log_file.as_str())
    } else {
        None
    };
    log::init_logger(config.logging.level, config.logging.file_output, log_file);
    info!(version = env!("CARGO_PKG_VERSION"), backend = config.graphics.backend.name(), "DistRHI starting...");

    let adapters = Device::list(&config).context("No usable adapter")?;
    for adapter in &adapters {
        info!(
            id = adapter.id(),
            label = adapter.label(),
            dedicated_video_memory = adapter.dedicated_video_memory(),
            "Adapter"
        );
    }

    let mut device = Device::new(&config)?;
    device.initialize(config.graphics.adapter_id)?;

    let final_fence = match config.graphics.backend {
        BackendKind::Headless => run_headless(&device, &config)?,
        BackendKind::Dx12 => run_windowed(&device, &config)?,
    };

    info!(fence = final_fence, "Rendering finished");
    println!("Final fence value: {}", final_fence);

    device.release();
    Ok(())
}
