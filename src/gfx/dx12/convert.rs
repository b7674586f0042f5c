//! RHI 枚举到 D3D12/DXGI 常量的转换

use windows::Win32::Graphics::Direct3D12::*;
use windows::Win32::Graphics::Dxgi::Common::*;

use crate::rhi::types::{CommandType, DescriptorType, PixelFormat, ResourceState};

pub(crate) fn command_list_type(ty: CommandType) -> D3D12_COMMAND_LIST_TYPE {
    match ty {
        CommandType::Direct => D3D12_COMMAND_LIST_TYPE_DIRECT,
        CommandType::Compute => D3D12_COMMAND_LIST_TYPE_COMPUTE,
        CommandType::Copy => D3D12_COMMAND_LIST_TYPE_COPY,
        CommandType::VideoDecode => D3D12_COMMAND_LIST_TYPE_VIDEO_DECODE,
        CommandType::VideoEncode => D3D12_COMMAND_LIST_TYPE_VIDEO_ENCODE,
    }
}

/// CBV、SRV、UAV 共用一种堆
pub(crate) fn descriptor_heap_type(ty: DescriptorType) -> D3D12_DESCRIPTOR_HEAP_TYPE {
    match ty {
        DescriptorType::ConstantBuffer
        | DescriptorType::ShaderResource
        | DescriptorType::UnorderedAccess => D3D12_DESCRIPTOR_HEAP_TYPE_CBV_SRV_UAV,
        DescriptorType::Sampler => D3D12_DESCRIPTOR_HEAP_TYPE_SAMPLER,
        DescriptorType::RenderTarget => D3D12_DESCRIPTOR_HEAP_TYPE_RTV,
        DescriptorType::DepthStencil => D3D12_DESCRIPTOR_HEAP_TYPE_DSV,
    }
}

pub(crate) fn resource_state(state: ResourceState) -> D3D12_RESOURCE_STATES {
    match state {
        ResourceState::Common => D3D12_RESOURCE_STATE_COMMON,
        ResourceState::VertexAndConstantBuffer => D3D12_RESOURCE_STATE_VERTEX_AND_CONSTANT_BUFFER,
        ResourceState::IndexBuffer => D3D12_RESOURCE_STATE_INDEX_BUFFER,
        ResourceState::RenderTarget => D3D12_RESOURCE_STATE_RENDER_TARGET,
        ResourceState::UnorderedAccess => D3D12_RESOURCE_STATE_UNORDERED_ACCESS,
        ResourceState::DepthWrite => D3D12_RESOURCE_STATE_DEPTH_WRITE,
        ResourceState::DepthRead => D3D12_RESOURCE_STATE_DEPTH_READ,
        ResourceState::PixelShaderResource => D3D12_RESOURCE_STATE_PIXEL_SHADER_RESOURCE,
        ResourceState::StreamOut => D3D12_RESOURCE_STATE_STREAM_OUT,
        ResourceState::IndirectArgument => D3D12_RESOURCE_STATE_INDIRECT_ARGUMENT,
        ResourceState::CopyDest => D3D12_RESOURCE_STATE_COPY_DEST,
        ResourceState::CopySource => D3D12_RESOURCE_STATE_COPY_SOURCE,
        ResourceState::RaytracingAccelerationStructure => {
            D3D12_RESOURCE_STATE_RAYTRACING_ACCELERATION_STRUCTURE
        }
        ResourceState::Present => D3D12_RESOURCE_STATE_PRESENT,
        ResourceState::VideoDecodeRead => D3D12_RESOURCE_STATE_VIDEO_DECODE_READ,
        ResourceState::VideoDecodeWrite => D3D12_RESOURCE_STATE_VIDEO_DECODE_WRITE,
        ResourceState::VideoEncodeRead => D3D12_RESOURCE_STATE_VIDEO_ENCODE_READ,
        ResourceState::VideoEncodeWrite => D3D12_RESOURCE_STATE_VIDEO_ENCODE_WRITE,
    }
}

pub(crate) fn dxgi_format(format: PixelFormat) -> DXGI_FORMAT {
    match format {
        PixelFormat::Unknown => DXGI_FORMAT_UNKNOWN,
        PixelFormat::R8G8B8A8Unorm => DXGI_FORMAT_R8G8B8A8_UNORM,
        PixelFormat::R8G8B8A8UnormSrgb => DXGI_FORMAT_R8G8B8A8_UNORM_SRGB,
        PixelFormat::B8G8R8A8Unorm => DXGI_FORMAT_B8G8R8A8_UNORM,
        PixelFormat::B8G8R8A8UnormSrgb => DXGI_FORMAT_B8G8R8A8_UNORM_SRGB,
        PixelFormat::R10G10B10A2Unorm => DXGI_FORMAT_R10G10B10A2_UNORM,
        PixelFormat::R16G16B16A16Float => DXGI_FORMAT_R16G16B16A16_FLOAT,
        PixelFormat::R32G32B32A32Float => DXGI_FORMAT_R32G32B32A32_FLOAT,
        PixelFormat::D32Float => DXGI_FORMAT_D32_FLOAT,
        PixelFormat::D24UnormS8Uint => DXGI_FORMAT_D24_UNORM_S8_UINT,
    }
}
