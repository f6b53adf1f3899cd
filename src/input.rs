// 该文件是 Honglvdeng （红绿灯） 项目的一部分。
// src/input.rs - 图像输入与预处理
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

pub trait AsNchwTensor<const W: u32, const H: u32> {
  fn as_nchw(&self) -> &[f32];
}

mod image_bytes;
pub use self::image_bytes::ImageBytesInput;

#[derive(Error, Debug)]
pub enum InputError {
  #[error("empty upload")]
  Empty,
  #[error("cannot identify image file: {0}")]
  Decode(#[from] image::ImageError),
  #[error("I/O error: {0}")]
  Io(#[from] std::io::Error),
}
