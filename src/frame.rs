// 该文件是 Honglvdeng （红绿灯） 项目的一部分。
// src/frame.rs - 模型输入张量帧
//
// 本文件根据 Apache 许可证第 2.0 版（以下简称“许可证”）授权使用；
// 除非遵守该许可证条款，否则您不得使用本文件。
// 您可通过以下网址获取许可证副本：
// http://www.apache.org/licenses/LICENSE-2.0
// 除非适用法律要求或书面同意，根据本许可协议分发的软件均按“原样”提供，
// 不附带任何形式的明示或暗示的保证或条件。
// 有关许可权限与限制的具体条款，请参阅本许可协议。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, Wareless Group

use thiserror::Error;

use crate::input::AsNchwTensor;

const RGB_CHANNELS: usize = 3;

/// 归一化到 [0, 1] 的 RGB 张量帧，NCHW 排列（N = 1）
///
/// 宽高由类型参数固定，构造时保证数据长度与形状一致。
#[derive(Debug, Clone)]
pub struct NchwTensorFrame<const W: u32, const H: u32> {
  data: Box<[f32]>,
}

impl<const W: u32, const H: u32> NchwTensorFrame<W, H> {
  pub const LEN: usize = RGB_CHANNELS * (W as usize) * (H as usize);

  pub fn height(&self) -> usize {
    H as usize
  }

  pub fn width(&self) -> usize {
    W as usize
  }

  pub fn channels(&self) -> usize {
    RGB_CHANNELS
  }

  /// 张量形状 [N, C, H, W]
  pub fn shape(&self) -> [usize; 4] {
    [1, RGB_CHANNELS, H as usize, W as usize]
  }
}

impl<const W: u32, const H: u32> TryFrom<Vec<f32>> for NchwTensorFrame<W, H> {
  type Error = FrameShapeError;

  fn try_from(data: Vec<f32>) -> Result<Self, Self::Error> {
    if data.len() != Self::LEN {
      return Err(FrameShapeError {
        expected: Self::LEN,
        actual: data.len(),
      });
    }

    Ok(Self {
      data: data.into_boxed_slice(),
    })
  }
}

impl<const W: u32, const H: u32> Default for NchwTensorFrame<W, H> {
  fn default() -> Self {
    Self {
      data: vec![0f32; Self::LEN].into_boxed_slice(),
    }
  }
}

impl<const W: u32, const H: u32> AsMut<[f32]> for NchwTensorFrame<W, H> {
  fn as_mut(&mut self) -> &mut [f32] {
    &mut self.data
  }
}

impl<const W: u32, const H: u32> AsNchwTensor<W, H> for NchwTensorFrame<W, H> {
  fn as_nchw(&self) -> &[f32] {
    &self.data
  }
}

#[derive(Error, Debug)]
#[error("tensor length mismatch: expected {expected}, found {actual}")]
pub struct FrameShapeError {
  pub expected: usize,
  pub actual: usize,
}

/// Letterbox 缩放参数，用于把检测框映射回原图坐标
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Letterbox {
  pub scale: f32,
  pub pad_x: f32,
  pub pad_y: f32,
  pub original_width: u32,
  pub original_height: u32,
}

impl Letterbox {
  /// 计算把 `width x height` 的图像等比缩放进 `W x H` 画布的参数
  pub fn fit<const W: u32, const H: u32>(width: u32, height: u32) -> Self {
    let scale = (W as f32 / width as f32).min(H as f32 / height as f32);
    let (resized_width, resized_height) = Self::resized(width, height, scale);
    Self {
      scale,
      pad_x: (W.saturating_sub(resized_width) / 2) as f32,
      pad_y: (H.saturating_sub(resized_height) / 2) as f32,
      original_width: width,
      original_height: height,
    }
  }

  /// 缩放后的图像尺寸，至少为 1 像素
  pub fn resized_size(&self) -> (u32, u32) {
    Self::resized(self.original_width, self.original_height, self.scale)
  }

  fn resized(width: u32, height: u32, scale: f32) -> (u32, u32) {
    let w = ((width as f32 * scale).round() as u32).max(1);
    let h = ((height as f32 * scale).round() as u32).max(1);
    (w, h)
  }

  /// 将画布坐标 [x_min, y_min, x_max, y_max] 映射回原图并裁剪到图像范围内
  pub fn restore(&self, bbox: [f32; 4]) -> [f32; 4] {
    let w = self.original_width as f32;
    let h = self.original_height as f32;
    let x1 = ((bbox[0] - self.pad_x) / self.scale).clamp(0.0, w);
    let y1 = ((bbox[1] - self.pad_y) / self.scale).clamp(0.0, h);
    let x2 = ((bbox[2] - self.pad_x) / self.scale).clamp(0.0, w);
    let y2 = ((bbox[3] - self.pad_y) / self.scale).clamp(0.0, h);
    [x1.min(x2), y1.min(y2), x1.max(x2), y1.max(y2)]
  }
}

/// 带 letterbox 参数的检测输入帧
#[derive(Debug, Clone)]
pub struct LetterboxFrame<const W: u32, const H: u32> {
  pub frame: NchwTensorFrame<W, H>,
  pub letterbox: Letterbox,
}

impl<const W: u32, const H: u32> AsNchwTensor<W, H> for LetterboxFrame<W, H> {
  fn as_nchw(&self) -> &[f32] {
    self.frame.as_nchw()
  }
}
