//! headless 后端上的端到端测试：完整的帧循环和跨线程同步

use std::thread;
use std::time::Duration;

use dist_rhi::core::{BackendKind, ColorRgba, Config, RhiError};
use dist_rhi::gfx::headless::{HeadlessSwapChain, HeadlessTexture};
use dist_rhi::rhi::backend::{SwapChainBackend, TextureBackend};
use dist_rhi::rhi::{
    CancelToken, CommandType, DescriptorType, Device, HeadlessSurface, PixelFormat, PresentConfig, ResourceState,
    WaitOptions,
};

fn headless_config() -> Config {
    let mut config = Config::default();
    config.graphics.backend = BackendKind::Headless;
    config.graphics.validation = true;
    // 让提交真正异步，flush 必须等待
    config.headless.execution_latency_us = 500;
    config
}

fn initialized_device() -> Device {
    let mut device = Device::new(&headless_config()).unwrap();
    device.initialize(None).unwrap();
    device
}

fn headless_texture(texture: &dist_rhi::rhi::Texture2D) -> &HeadlessTexture {
    texture.backend().as_any().downcast_ref::<HeadlessTexture>().unwrap()
}

#[test]
fn test_four_frames_end_with_fence_value_four() {
    let device = initialized_device();
    let queue = device.create_command_queue(CommandType::Direct).unwrap();
    let heap = device.create_descriptor_heap(DescriptorType::RenderTarget, 3).unwrap();
    let allocator = device.create_command_allocator(CommandType::Direct).unwrap();
    let mut list = device.create_command_list(&allocator).unwrap();
    let fence = device.create_fence(0).unwrap();
    let surface = HeadlessSurface::new(64, 64);
    let swapchain = device
        .create_swapchain(&queue, &heap, &surface, PixelFormat::R8G8B8A8Unorm, 3)
        .unwrap();

    for frame in 0..=3u64 {
        let buffer = swapchain.buffer((frame % 3) as u32).unwrap();
        list.reset(&allocator).unwrap();
        list.resource_barrier(&allocator, Some(&heap), buffer, ResourceState::Present, ResourceState::RenderTarget)
            .unwrap();
        list.clear(buffer, ColorRgba::RED).unwrap();
        list.resource_barrier(&allocator, Some(&heap), buffer, ResourceState::RenderTarget, ResourceState::Present)
            .unwrap();
        list.close().unwrap();
        queue.execute(&list).unwrap();
        queue.present(&swapchain).unwrap();
        queue.flush(&fence, frame + 1).unwrap();

        assert!(fence.completed_value() >= frame + 1);
    }

    assert_eq!(fence.completed_value(), 4);
    assert_eq!(fence.last_signaled_value(), 4);

    for (index, buffer) in swapchain.buffers().iter().enumerate() {
        let texture = headless_texture(buffer);
        assert_eq!(texture.last_clear_color(), Some(ColorRgba::RED.to_normalized()));
        assert_eq!(texture.gpu_state(), ResourceState::Present);
        // 第 4 帧又回到了缓冲 0
        assert_eq!(texture.clear_count(), if index == 0 { 2 } else { 1 });
    }

    let chain = swapchain
        .backend()
        .as_any()
        .downcast_ref::<HeadlessSwapChain>()
        .unwrap();
    assert_eq!(chain.present_count(), 4);
    assert_eq!(swapchain.current_back_buffer_index(), 1);
}

#[test]
fn test_swapchain_views_share_one_stride() {
    let device = initialized_device();
    let queue = device.create_command_queue(CommandType::Direct).unwrap();
    let heap = device.create_descriptor_heap(DescriptorType::RenderTarget, 3).unwrap();
    let swapchain = device
        .create_swapchain(&queue, &heap, &HeadlessSurface::new(32, 32), PixelFormat::B8G8R8A8Unorm, 3)
        .unwrap();

    assert_eq!(swapchain.buffer_count(), 3);
    let offsets: Vec<u64> = swapchain
        .buffers()
        .iter()
        .map(|buffer| {
            assert_eq!(buffer.view_count(), 1);
            buffer.view(0).unwrap().offset()
        })
        .collect();
    let stride = offsets[1] - offsets[0];
    assert!(stride > 0);
    assert_eq!(offsets[2] - offsets[1], stride);
    assert_eq!(heap.remaining(), 0);

    // 三个缓冲各有独立的存储
    let textures: Vec<&HeadlessTexture> = swapchain.buffers().iter().map(headless_texture).collect();
    assert!(!textures[0].same_storage(textures[1]));
    assert!(!textures[1].same_storage(textures[2]));
    assert!(!textures[0].same_storage(textures[2]));

    // 只清缓冲 0，其余缓冲不受影响
    let allocator = device.create_command_allocator(CommandType::Direct).unwrap();
    let mut list = device.create_command_list(&allocator).unwrap();
    let fence = device.create_fence(0).unwrap();
    let first = swapchain.buffer(0).unwrap();
    list.reset(&allocator).unwrap();
    list.resource_barrier(&allocator, Some(&heap), first, ResourceState::Present, ResourceState::RenderTarget)
        .unwrap();
    list.clear(first, ColorRgba::BLUE).unwrap();
    list.resource_barrier(&allocator, Some(&heap), first, ResourceState::RenderTarget, ResourceState::Present)
        .unwrap();
    list.close().unwrap();
    queue.execute(&list).unwrap();
    queue.flush(&fence, 1).unwrap();

    assert_eq!(textures[0].clear_count(), 1);
    assert_eq!(textures[0].last_clear_color(), Some(ColorRgba::BLUE.to_normalized()));
    for texture in &textures[1..] {
        assert_eq!(texture.clear_count(), 0);
        assert_eq!(texture.last_clear_color(), None);
    }
}

#[test]
fn test_recording_after_close_rejected() {
    let device = initialized_device();
    let queue = device.create_command_queue(CommandType::Direct).unwrap();
    let heap = device.create_descriptor_heap(DescriptorType::RenderTarget, 2).unwrap();
    let swapchain = device
        .create_swapchain(&queue, &heap, &HeadlessSurface::new(16, 16), PixelFormat::R8G8B8A8Unorm, 2)
        .unwrap();
    let allocator = device.create_command_allocator(CommandType::Direct).unwrap();
    let mut list = device.create_command_list(&allocator).unwrap();
    let buffer = swapchain.buffer(0).unwrap();

    list.reset(&allocator).unwrap();
    list.close().unwrap();

    assert!(matches!(list.clear(buffer, ColorRgba::RED), Err(RhiError::InvalidState(_))));
    assert!(matches!(
        list.resource_barrier(&allocator, None, buffer, ResourceState::Present, ResourceState::RenderTarget),
        Err(RhiError::InvalidState(_))
    ));
    // 被拒绝的屏障不改变声明状态
    assert_eq!(buffer.declared_state(), ResourceState::Present);
}

#[test]
fn test_compute_queue_waits_on_direct_queue() {
    let device = initialized_device();
    let direct = device.create_command_queue(CommandType::Direct).unwrap();
    let compute = device.create_command_queue(CommandType::Compute).unwrap();
    let shared = device.create_fence(0).unwrap();
    let done = device.create_fence(0).unwrap();

    let allocator = device.create_command_allocator(CommandType::Direct).unwrap();
    let mut list = device.create_command_list(&allocator).unwrap();
    list.reset(&allocator).unwrap();
    list.close().unwrap();

    direct.execute(&list).unwrap();
    direct.signal(&shared, 1).unwrap();
    compute.gpu_wait(&shared, 1).unwrap();
    compute.flush(&done, 1).unwrap();

    assert!(shared.is_reached(1));
}

#[test]
fn test_wait_timeout_and_cancellation() {
    let device = initialized_device();
    let queue = device.create_command_queue(CommandType::Direct).unwrap();
    let fence = device.create_fence(0).unwrap();

    let err = queue
        .wait_with(&fence, 1, &WaitOptions::with_timeout(Duration::from_millis(20)))
        .unwrap_err();
    assert!(matches!(err, RhiError::Timeout { value: 1, completed: 0 }));

    let token = CancelToken::new();
    let canceller = {
        let token = token.clone();
        thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            token.cancel();
        })
    };
    let err = queue
        .wait_with(&fence, 1, &WaitOptions::infinite().cancel_with(token))
        .unwrap_err();
    canceller.join().unwrap();
    assert!(matches!(err, RhiError::Cancelled { value: 1 }));
}

#[test]
fn test_present_policy_reaches_the_timeline() {
    let device = initialized_device();
    let queue = device.create_command_queue(CommandType::Direct).unwrap();
    let heap = device.create_descriptor_heap(DescriptorType::RenderTarget, 2).unwrap();
    let fence = device.create_fence(0).unwrap();
    let swapchain = device
        .create_swapchain(&queue, &heap, &HeadlessSurface::new(16, 16), PixelFormat::R8G8B8A8Unorm, 2)
        .unwrap();
    let chain = swapchain
        .backend()
        .as_any()
        .downcast_ref::<HeadlessSwapChain>()
        .unwrap();

    queue
        .present_with(&swapchain, PresentConfig { vsync: false, allow_tearing: true })
        .unwrap();
    queue.flush(&fence, 1).unwrap();
    let mode = chain.last_present_mode().unwrap();
    assert_eq!(mode.sync_interval, 0);
    assert!(mode.allow_tearing);

    // 默认策略：垂直同步，不撕裂
    queue.present(&swapchain).unwrap();
    queue.flush(&fence, 2).unwrap();
    let mode = chain.last_present_mode().unwrap();
    assert_eq!(mode.sync_interval, 1);
    assert!(!mode.allow_tearing);
}

#[test]
fn test_device_lifecycle() {
    let mut device = initialized_device();
    let first = device.adapter().cloned().unwrap();

    assert!(matches!(device.initialize(None), Err(RhiError::InvalidState(_))));
    assert_eq!(device.adapter(), Some(&first));
    assert!(device.create_fence(0).is_ok());

    device.release();
    device.release();
    assert!(!device.is_initialized());
    assert!(matches!(device.create_fence(0), Err(RhiError::InvalidState(_))));
}

#[test]
fn test_list_fails_without_hardware_adapters() {
    let mut config = headless_config();
    config.headless.adapters.retain(|adapter| adapter.software);
    assert!(matches!(Device::list(&config), Err(RhiError::AdapterNotFound(_))));

    let adapters = Device::list(&headless_config()).unwrap();
    assert!(!adapters.is_empty());
}
