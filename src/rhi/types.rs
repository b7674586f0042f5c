//! RHI 公共类型
//!
//! 与具体图形 API 无关的枚举和值类型。各后端在自己的模块中把它们映射为原生常量。

use serde::{Deserialize, Serialize};

/// 命令类型
///
/// 命令队列、命令分配器和命令列表都带有这个标记；
/// 同一个命令列表只能在相同类型的分配器上录制，并提交到相同类型的队列。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandType {
    /// 图形 + 计算 + 复制
    Direct,
    /// 计算 + 复制
    Compute,
    /// 仅复制
    Copy,
    /// 视频解码
    VideoDecode,
    /// 视频编码
    VideoEncode,
}

impl CommandType {
    pub fn name(&self) -> &'static str {
        match self {
            CommandType::Direct => "Direct",
            CommandType::Compute => "Compute",
            CommandType::Copy => "Copy",
            CommandType::VideoDecode => "VideoDecode",
            CommandType::VideoEncode => "VideoEncode",
        }
    }
}

/// 描述符类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DescriptorType {
    /// 常量缓冲视图 (CBV)
    ConstantBuffer,
    /// 着色资源视图 (SRV)
    ShaderResource,
    /// 无序访问视图 (UAV)
    UnorderedAccess,
    /// 采样器
    Sampler,
    /// 渲染目标视图 (RTV)
    RenderTarget,
    /// 深度模板视图 (DSV)
    DepthStencil,
}

impl DescriptorType {
    /// 获取描述符类型名称
    pub fn name(&self) -> &'static str {
        match self {
            DescriptorType::ConstantBuffer => "CBV",
            DescriptorType::ShaderResource => "SRV",
            DescriptorType::UnorderedAccess => "UAV",
            DescriptorType::Sampler => "Sampler",
            DescriptorType::RenderTarget => "RTV",
            DescriptorType::DepthStencil => "DSV",
        }
    }
}

/// GPU 资源状态
///
/// 核心层不集中跟踪资源状态，每次状态转换都由调用者在资源屏障处声明。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceState {
    Common,
    VertexAndConstantBuffer,
    IndexBuffer,
    RenderTarget,
    UnorderedAccess,
    DepthWrite,
    DepthRead,
    PixelShaderResource,
    StreamOut,
    IndirectArgument,
    CopyDest,
    CopySource,
    RaytracingAccelerationStructure,
    Present,
    VideoDecodeRead,
    VideoDecodeWrite,
    VideoEncodeRead,
    VideoEncodeWrite,
}

/// 像素格式
///
/// 只包含引擎实际使用的一组常见格式。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PixelFormat {
    Unknown,
    R8G8B8A8Unorm,
    R8G8B8A8UnormSrgb,
    B8G8R8A8Unorm,
    B8G8R8A8UnormSrgb,
    R10G10B10A2Unorm,
    R16G16B16A16Float,
    R32G32B32A32Float,
    D32Float,
    D24UnormS8Uint,
}

impl PixelFormat {
    /// 每个像素占用的字节数
    pub fn bytes_per_pixel(&self) -> u32 {
        match self {
            PixelFormat::Unknown => 0,
            PixelFormat::R8G8B8A8Unorm
            | PixelFormat::R8G8B8A8UnormSrgb
            | PixelFormat::B8G8R8A8Unorm
            | PixelFormat::B8G8R8A8UnormSrgb
            | PixelFormat::R10G10B10A2Unorm
            | PixelFormat::D32Float
            | PixelFormat::D24UnormS8Uint => 4,
            PixelFormat::R16G16B16A16Float => 8,
            PixelFormat::R32G32B32A32Float => 16,
        }
    }

    /// 是否为深度格式
    pub fn is_depth(&self) -> bool {
        matches!(self, PixelFormat::D32Float | PixelFormat::D24UnormS8Uint)
    }

    /// 能否作为 flip 模型交换链的缓冲格式
    pub fn is_presentable(&self) -> bool {
        matches!(
            self,
            PixelFormat::R8G8B8A8Unorm
                | PixelFormat::B8G8R8A8Unorm
                | PixelFormat::R10G10B10A2Unorm
                | PixelFormat::R16G16B16A16Float
        )
    }
}

/// 适配器信息
///
/// 由适配器枚举产生，创建后不可变；选择适配器时只比较 `id`。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceInfo {
    id: u64,
    label: String,
    dedicated_video_memory: u64,
}

impl DeviceInfo {
    pub fn new(id: u64, label: impl Into<String>, dedicated_video_memory: u64) -> Self {
        Self {
            id,
            label: label.into(),
            dedicated_video_memory,
        }
    }

    /// 适配器 ID（DXGI 的 DeviceId）
    pub fn id(&self) -> u64 {
        self.id
    }

    /// 显示名称
    pub fn label(&self) -> &str {
        &self.label
    }

    /// 专用显存大小（字节）
    pub fn dedicated_video_memory(&self) -> u64 {
        self.dedicated_video_memory
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_presentable_formats() {
        assert!(PixelFormat::R8G8B8A8Unorm.is_presentable());
        assert!(PixelFormat::R16G16B16A16Float.is_presentable());
        assert!(!PixelFormat::R8G8B8A8UnormSrgb.is_presentable());
        assert!(!PixelFormat::D32Float.is_presentable());
        assert!(!PixelFormat::Unknown.is_presentable());
    }

    #[test]
    fn test_format_properties() {
        assert_eq!(PixelFormat::R8G8B8A8Unorm.bytes_per_pixel(), 4);
        assert_eq!(PixelFormat::R32G32B32A32Float.bytes_per_pixel(), 16);
        assert!(PixelFormat::D24UnormS8Uint.is_depth());
        assert!(!PixelFormat::B8G8R8A8Unorm.is_depth());
    }

    #[test]
    fn test_format_serde_names() {
        #[derive(Deserialize)]
        struct Wrapper {
            format: PixelFormat,
        }
        let w: Wrapper = toml::from_str("format = \"r10g10b10a2_unorm\"").unwrap();
        assert_eq!(w.format, PixelFormat::R10G10B10A2Unorm);
    }

    #[test]
    fn test_descriptor_type_names() {
        assert_eq!(DescriptorType::RenderTarget.name(), "RTV");
        assert_eq!(DescriptorType::DepthStencil.name(), "DSV");
        assert_eq!(CommandType::Direct.name(), "Direct");
    }
}
