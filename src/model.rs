// 该文件是 Honglvdeng （红绿灯） 项目的一部分。
// src/model.rs - 模型定义
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
use url::Url;

use crate::FromUrl;

pub trait Model {
  type Input;
  type Output;
  type Error;

  fn infer(&self, input: &Self::Input) -> Result<Self::Output, Self::Error>;
}

pub trait WithLabel: Sized + std::fmt::Debug {
  fn to_label_str(&self) -> String;
  fn to_label_id(&self) -> u32;
  fn from_label_id(id: u32) -> Option<Self>;
}

/// 交通灯颜色，类别编号与训练时一致
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TrafficLightLabel {
  Red,
  Yellow,
  Green,
}

impl TrafficLightLabel {
  pub const ALL: [TrafficLightLabel; 3] = [
    TrafficLightLabel::Red,
    TrafficLightLabel::Yellow,
    TrafficLightLabel::Green,
  ];

  /// 绘制时使用的颜色
  pub fn color(&self) -> [u8; 3] {
    match self {
      TrafficLightLabel::Red => [255, 0, 0],
      TrafficLightLabel::Yellow => [255, 200, 0],
      TrafficLightLabel::Green => [0, 200, 0],
    }
  }
}

impl WithLabel for TrafficLightLabel {
  fn to_label_str(&self) -> String {
    match self {
      TrafficLightLabel::Red => "red",
      TrafficLightLabel::Yellow => "yellow",
      TrafficLightLabel::Green => "green",
    }
    .to_string()
  }

  fn to_label_id(&self) -> u32 {
    *self as u32
  }

  fn from_label_id(id: u32) -> Option<Self> {
    Self::ALL.get(id as usize).copied()
  }
}

#[derive(Debug, Clone)]
pub struct DetectItem<T> {
  pub kind: T,
  pub score: f32,
  pub bbox: [f32; 4], // [x_min, y_min, x_max, y_max]，原图像素坐标
}

#[derive(Debug, Clone)]
pub struct DetectResult<T> {
  pub items: Box<[DetectItem<T>]>,
}

impl<T> DetectResult<T> {
  pub fn is_empty(&self) -> bool {
    self.items.is_empty()
  }
}

#[derive(Debug, Clone)]
pub struct ClassifyResult<T> {
  pub kind: T,
  pub confidence: f32,
  pub probabilities: Box<[f32]>,
}

#[derive(Error, Debug)]
pub enum ModelError {
  #[error("model file error: {0}")]
  ModelLoadError(#[from] std::io::Error),
  #[error("invalid model: {0}")]
  ModelInvalid(String),
  #[error("model url error: {0}")]
  ModelPathError(String),
  #[cfg(feature = "model_classify")]
  #[error("candle error: {0}")]
  CandleError(#[from] candle_core::Error),
  #[cfg(feature = "model_detect")]
  #[error("onnx runtime error: {0}")]
  OrtError(#[from] ort::Error),
  #[cfg(feature = "model_detect")]
  #[error("tensor shape error: {0}")]
  ShapeError(#[from] ndarray::ShapeError),
}

impl ModelError {
  pub fn invalid(msg: impl Into<String>) -> Self {
    ModelError::ModelInvalid(msg.into())
  }
}

/// 读取 URL 查询参数中的浮点数
pub(crate) fn query_param<T: std::str::FromStr>(url: &Url, key: &str) -> Result<Option<T>, ModelError> {
  match url.query_pairs().find(|(k, _)| k == key) {
    Some((_, v)) => v
      .parse()
      .map(Some)
      .map_err(|_| ModelError::ModelPathError(format!("invalid value '{}' for '{}'", v, key))),
    None => Ok(None),
  }
}

pub mod nms;

#[cfg(feature = "model_classify")]
mod cnn;
#[cfg(feature = "model_classify")]
pub use self::cnn::{CnnClassifier, CnnClassifierBuilder, CnnFrame, TrafficLightCnn};

#[cfg(feature = "model_detect")]
mod yolo;
#[cfg(feature = "model_detect")]
pub use self::yolo::{YoloDetector, YoloDetectorBuilder, YoloFrame, YoloParams, decode_predictions};

/// 按 URL 方案选择的模型变体
pub enum ModelWrapper {
  #[cfg(feature = "model_classify")]
  Classify(CnnClassifier),
  #[cfg(feature = "model_detect")]
  Detect(YoloDetector),
}

impl FromUrl for ModelWrapper {
  type Error = ModelError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    #[cfg(feature = "model_classify")]
    {
      use crate::FromUrlWithScheme;

      if url.scheme() == CnnClassifierBuilder::SCHEME {
        let model = CnnClassifierBuilder::from_url(url)?.build()?;
        return Ok(ModelWrapper::Classify(model));
      }
    }
    #[cfg(feature = "model_detect")]
    {
      use crate::FromUrlWithScheme;

      if url.scheme() == YoloDetectorBuilder::SCHEME {
        let model = YoloDetectorBuilder::from_url(url)?.build()?;
        return Ok(ModelWrapper::Detect(model));
      }
    }
    Err(ModelError::ModelPathError(format!(
      "unsupported model scheme '{}'",
      url.scheme()
    )))
  }
}

impl ModelWrapper {
  pub fn variant(&self) -> &'static str {
    match self {
      #[cfg(feature = "model_classify")]
      ModelWrapper::Classify(_) => "classification",
      #[cfg(feature = "model_detect")]
      ModelWrapper::Detect(_) => "detection",
    }
  }
}
