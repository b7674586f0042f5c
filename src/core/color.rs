//! 颜色值类型
//!
//! 清屏等操作接收 8 位 RGBA 颜色，在提交给 GPU 之前归一化到 0.0-1.0。

use serde::{Deserialize, Serialize};

/// 8 位 RGBA 颜色
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ColorRgba {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl ColorRgba {
    pub const BLACK: ColorRgba = ColorRgba::rgb(0, 0, 0);
    pub const WHITE: ColorRgba = ColorRgba::rgb(255, 255, 255);
    pub const RED: ColorRgba = ColorRgba::rgb(255, 0, 0);
    pub const GREEN: ColorRgba = ColorRgba::rgb(0, 255, 0);
    pub const BLUE: ColorRgba = ColorRgba::rgb(0, 0, 255);

    /// 创建新的颜色
    pub const fn new(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }

    /// 创建不透明颜色（alpha = 255）
    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self::new(r, g, b, 255)
    }

    /// 从 0xRRGGBBAA 打包值创建
    pub const fn from_packed(value: u32) -> Self {
        Self::new(
            (value >> 24) as u8,
            (value >> 16) as u8,
            (value >> 8) as u8,
            value as u8,
        )
    }

    /// 打包为 0xRRGGBBAA
    pub const fn packed(&self) -> u32 {
        (self.r as u32) << 24 | (self.g as u32) << 16 | (self.b as u32) << 8 | self.a as u32
    }

    /// 归一化为清屏操作使用的浮点分量
    pub fn to_normalized(&self) -> [f32; 4] {
        [
            self.r as f32 / 255.0,
            self.g as f32 / 255.0,
            self.b as f32 / 255.0,
            self.a as f32 / 255.0,
        ]
    }
}

impl Default for ColorRgba {
    fn default() -> Self {
        Self::BLACK
    }
}
