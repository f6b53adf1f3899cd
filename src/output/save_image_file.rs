// 该文件是 Honglvdeng （红绿灯） 项目的一部分。
// src/output/save_image_file.rs - 保存标注后的图像文件
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

use std::path::{Path, PathBuf};

use image::{Rgb, RgbImage};
use imageproc::{drawing::draw_hollow_rect_mut, rect::Rect};
use thiserror::Error;
use tracing::info;
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  model::{ClassifyResult, DetectResult, TrafficLightLabel},
  output::Render,
};

const BOX_THICKNESS: u32 = 2;
const BORDER_THICKNESS: u32 = 4;

pub struct SaveImageFileOutput {
  path: PathBuf,
}

#[derive(Error, Debug)]
pub enum SaveImageFileError {
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("图像错误: {0}")]
  ImageError(#[from] image::ImageError),
  #[error("URI 方案不匹配: {0}")]
  SchemeMismatch(String),
}

impl FromUrlWithScheme for SaveImageFileOutput {
  const SCHEME: &'static str = "image";
}

impl FromUrl for SaveImageFileOutput {
  type Error = SaveImageFileError;

  fn from_url(uri: &Url) -> Result<Self, Self::Error> {
    if uri.scheme() != Self::SCHEME {
      return Err(SaveImageFileError::SchemeMismatch(format!(
        "期望保存方式 '{}', 实际保存方式 '{}'",
        Self::SCHEME,
        uri.scheme()
      )));
    }

    Ok(SaveImageFileOutput::new(uri.path()))
  }
}

impl SaveImageFileOutput {
  pub fn new(path: impl Into<PathBuf>) -> Self {
    Self { path: path.into() }
  }

  pub fn path(&self) -> &Path {
    &self.path
  }

  fn save_image(&self, image: &RgbImage) -> Result<(), SaveImageFileError> {
    if let Some(parent) = self.path.parent()
      && !parent.as_os_str().is_empty()
    {
      std::fs::create_dir_all(parent)?;
    }

    image.save(&self.path)?;
    info!("保存图像到文件: {}", self.path.display());

    Ok(())
  }
}

/// 画一个向内加粗的空心矩形，坐标为闭区间像素坐标
fn draw_thick_rect(image: &mut RgbImage, bbox: [i32; 4], thickness: u32, color: Rgb<u8>) {
  let [x_min, y_min, x_max, y_max] = bbox;
  for t in 0..thickness as i32 {
    let (x0, y0, x1, y1) = (x_min + t, y_min + t, x_max - t, y_max - t);
    if x0 >= x1 || y0 >= y1 {
      break;
    }
    let rect = Rect::at(x0, y0).of_size((x1 - x0 + 1) as u32, (y1 - y0 + 1) as u32);
    draw_hollow_rect_mut(image, rect, color);
  }
}

/// 把原图像素坐标的 bbox 转换为图像内的整数坐标
fn to_pixel_box(image: &RgbImage, bbox: &[f32; 4]) -> Option<[i32; 4]> {
  let max_x = image.width() as i32 - 1;
  let max_y = image.height() as i32 - 1;

  let x_min = (bbox[0].floor() as i32).clamp(0, max_x);
  let y_min = (bbox[1].floor() as i32).clamp(0, max_y);
  let x_max = (bbox[2].ceil() as i32).clamp(0, max_x);
  let y_max = (bbox[3].ceil() as i32).clamp(0, max_y);

  (x_min < x_max && y_min < y_max).then_some([x_min, y_min, x_max, y_max])
}

impl Render<RgbImage, DetectResult<TrafficLightLabel>> for SaveImageFileOutput {
  type Rendered = ();
  type Error = SaveImageFileError;

  fn render_result(
    &self,
    frame: &RgbImage,
    result: &DetectResult<TrafficLightLabel>,
  ) -> Result<(), Self::Error> {
    let mut image = frame.clone();
    for item in result.items.iter() {
      if let Some(bbox) = to_pixel_box(&image, &item.bbox) {
        draw_thick_rect(&mut image, bbox, BOX_THICKNESS, Rgb(item.kind.color()));
      }
    }
    self.save_image(&image)
  }
}

impl Render<RgbImage, ClassifyResult<TrafficLightLabel>> for SaveImageFileOutput {
  type Rendered = ();
  type Error = SaveImageFileError;

  fn render_result(
    &self,
    frame: &RgbImage,
    result: &ClassifyResult<TrafficLightLabel>,
  ) -> Result<(), Self::Error> {
    let mut image = frame.clone();
    if image.width() > 1 && image.height() > 1 {
      let bbox = [0, 0, image.width() as i32 - 1, image.height() as i32 - 1];
      draw_thick_rect(&mut image, bbox, BORDER_THICKNESS, Rgb(result.kind.color()));
    }
    self.save_image(&image)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::model::DetectItem;

  fn temp_path(name: &str) -> PathBuf {
    std::env::temp_dir()
      .join(format!("honglvdeng-output-{}", std::process::id()))
      .join(name)
  }

  #[test]
  fn scheme_must_be_image() {
    let url = Url::parse("video:out.mp4").unwrap();
    assert!(matches!(
      SaveImageFileOutput::from_url(&url),
      Err(SaveImageFileError::SchemeMismatch(_))
    ));

    let url = Url::parse("image:out/annotated.png").unwrap();
    let output = SaveImageFileOutput::from_url(&url).unwrap();
    assert_eq!(output.path(), Path::new("out/annotated.png"));
  }

  #[test]
  fn detection_boxes_are_drawn_in_label_color() {
    let path = temp_path("detect.png");
    let frame = RgbImage::new(100, 80);
    let result = DetectResult {
      items: vec![DetectItem {
        kind: TrafficLightLabel::Green,
        score: 0.9,
        bbox: [10.0, 10.0, 50.0, 60.0],
      }]
      .into_boxed_slice(),
    };

    SaveImageFileOutput::new(&path).render_result(&frame, &result).unwrap();
    let saved = image::open(&path).unwrap().to_rgb8();
    std::fs::remove_file(&path).ok();

    assert_eq!(saved.dimensions(), (100, 80));
    assert_eq!(saved.get_pixel(10, 30), &Rgb(TrafficLightLabel::Green.color()));
    assert_eq!(saved.get_pixel(30, 30), &Rgb([0, 0, 0]));
  }

  #[test]
  fn classification_draws_a_border() {
    let path = temp_path("classify.png");
    let frame = RgbImage::new(32, 32);
    let result = ClassifyResult {
      kind: TrafficLightLabel::Red,
      confidence: 0.8,
      probabilities: vec![0.8, 0.1, 0.1].into_boxed_slice(),
    };

    SaveImageFileOutput::new(&path).render_result(&frame, &result).unwrap();
    let saved = image::open(&path).unwrap().to_rgb8();
    std::fs::remove_file(&path).ok();

    assert_eq!(saved.get_pixel(0, 0), &Rgb(TrafficLightLabel::Red.color()));
    assert_eq!(saved.get_pixel(16, 16), &Rgb([0, 0, 0]));
  }
}
