// 该文件是 Honglvdeng （红绿灯） 项目的一部分。
// src/input/image_bytes.rs - 上传图像字节解码
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

use std::io::Cursor;
use std::path::Path;

use image::{ImageReader, Rgb, RgbImage, imageops::FilterType};
use tracing::debug;

use crate::{
  frame::{Letterbox, LetterboxFrame, NchwTensorFrame},
  input::InputError,
};

/// Letterbox 填充色（与 YOLO 导出时一致）
const LETTERBOX_FILL: u8 = 114;

/// 解码后的 RGB 图像
pub struct ImageBytesInput {
  image: RgbImage,
}

impl ImageBytesInput {
  /// 从内存中的编码字节（PNG/JPEG 等）解码，格式由内容判断
  pub fn decode(bytes: &[u8]) -> Result<Self, InputError> {
    if bytes.is_empty() {
      return Err(InputError::Empty);
    }

    let image = ImageReader::new(Cursor::new(bytes))
      .with_guessed_format()?
      .decode()?
      .to_rgb8();
    debug!("解码图像: {}x{}", image.width(), image.height());

    Ok(Self { image })
  }

  pub fn open(path: impl AsRef<Path>) -> Result<Self, InputError> {
    let bytes = std::fs::read(path)?;
    Self::decode(&bytes)
  }

  pub fn width(&self) -> u32 {
    self.image.width()
  }

  pub fn height(&self) -> u32 {
    self.image.height()
  }

  pub fn image(&self) -> &RgbImage {
    &self.image
  }

  /// 拉伸缩放到 `W x H`（分类模型）
  pub fn to_resized<const W: u32, const H: u32>(&self) -> NchwTensorFrame<W, H> {
    NchwTensorFrame::from(&self.image)
  }

  /// 等比缩放并填充到 `W x H`（检测模型）
  pub fn to_letterboxed<const W: u32, const H: u32>(&self) -> LetterboxFrame<W, H> {
    LetterboxFrame::from(&self.image)
  }
}

/// 将 RGB 图像写入 NCHW 张量，像素值缩放到 [0, 1]
fn fill_nchw(image: &RgbImage, slice: &mut [f32]) {
  let (width, height) = image.dimensions();
  let plane = (width as usize) * (height as usize);

  for (x, y, pixel) in image.enumerate_pixels() {
    let idx = (y as usize) * (width as usize) + (x as usize);
    for c in 0..3 {
      slice[c * plane + idx] = pixel[c] as f32 / 255.0;
    }
  }
}

impl<const W: u32, const H: u32> From<&RgbImage> for NchwTensorFrame<W, H> {
  fn from(image: &RgbImage) -> Self {
    let mut frame = NchwTensorFrame::<W, H>::default();
    if image.dimensions() == (W, H) {
      fill_nchw(image, frame.as_mut());
    } else {
      let resized = image::imageops::resize(image, W, H, FilterType::Triangle);
      fill_nchw(&resized, frame.as_mut());
    }
    frame
  }
}

impl<const W: u32, const H: u32> From<&RgbImage> for LetterboxFrame<W, H> {
  fn from(image: &RgbImage) -> Self {
    let letterbox = Letterbox::fit::<W, H>(image.width(), image.height());
    let (resized_width, resized_height) = letterbox.resized_size();

    let resized = image::imageops::resize(image, resized_width, resized_height, FilterType::Triangle);
    let mut canvas = RgbImage::from_pixel(W, H, Rgb([LETTERBOX_FILL; 3]));
    image::imageops::overlay(
      &mut canvas,
      &resized,
      letterbox.pad_x as i64,
      letterbox.pad_y as i64,
    );

    let mut frame = NchwTensorFrame::<W, H>::default();
    fill_nchw(&canvas, frame.as_mut());

    LetterboxFrame { frame, letterbox }
  }
}
