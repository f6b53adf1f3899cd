// 该文件是 Honglvdeng （红绿灯） 项目的一部分。
// src/output.rs - 输出定义
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

use std::convert::Infallible;

use serde::Serialize;
use thiserror::Error;

use crate::model::{ClassifyResult, DetectResult, WithLabel};

pub trait Render<Frame, Output>: Sized {
  type Rendered;
  type Error;
  fn render_result(&self, frame: &Frame, result: &Output) -> Result<Self::Rendered, Self::Error>;
}

mod save_image_file;
pub use self::save_image_file::{SaveImageFileError, SaveImageFileOutput};

#[derive(Error, Debug)]
pub enum OutputError {
  #[error("save image file error: {0}")]
  SaveImageFileError(#[from] SaveImageFileError),
}

impl From<Infallible> for OutputError {
  fn from(err: Infallible) -> Self {
    match err {}
  }
}

/// 预测接口返回的 JSON 结构
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum PredictResponse {
  Classification { prediction: ClassPrediction },
  Detection { predictions: Detections },
  Error { error: String },
}

impl PredictResponse {
  pub fn error(message: impl Into<String>) -> Self {
    PredictResponse::Error {
      error: message.into(),
    }
  }

  pub fn is_error(&self) -> bool {
    matches!(self, PredictResponse::Error { .. })
  }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClassPrediction {
  pub class: String,
  pub confidence: f32,
  pub class_index: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Detections {
  Found(Vec<DetectionEntry>),
  Nothing(NothingDetected),
}

/// 没有检测结果时的固定标记，序列化为字符串 "no detections"
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub enum NothingDetected {
  #[serde(rename = "no detections")]
  Marker,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DetectionEntry {
  pub label: String,
  pub confidence: f32,
  pub bbox: [f32; 4],
}

fn round_to(value: f32, digits: i32) -> f32 {
  let factor = 10f32.powi(digits);
  (value * factor).round() / factor
}

/// 把推理结果转换为 JSON 结构
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonRender;

impl<F, T: WithLabel> Render<F, ClassifyResult<T>> for JsonRender {
  type Rendered = PredictResponse;
  type Error = Infallible;

  fn render_result(&self, _frame: &F, result: &ClassifyResult<T>) -> Result<Self::Rendered, Self::Error> {
    Ok(PredictResponse::Classification {
      prediction: ClassPrediction {
        class: result.kind.to_label_str(),
        confidence: round_to(result.confidence, 4),
        class_index: result.kind.to_label_id(),
      },
    })
  }
}

impl<F, T: WithLabel> Render<F, DetectResult<T>> for JsonRender {
  type Rendered = PredictResponse;
  type Error = Infallible;

  fn render_result(&self, _frame: &F, result: &DetectResult<T>) -> Result<Self::Rendered, Self::Error> {
    let predictions = if result.is_empty() {
      Detections::Nothing(NothingDetected::Marker)
    } else {
      Detections::Found(
        result
          .items
          .iter()
          .map(|item| DetectionEntry {
            label: item.kind.to_label_str(),
            confidence: round_to(item.score, 4),
            bbox: item.bbox.map(|v| round_to(v, 2)),
          })
          .collect(),
      )
    };
    Ok(PredictResponse::Detection { predictions })
  }
}

/// 同时渲染到两个输出，返回第一个输出的结果
impl<F, D, A, B> Render<F, D> for (A, B)
where
  A: Render<F, D>,
  B: Render<F, D>,
  A::Error: Into<OutputError>,
  B::Error: Into<OutputError>,
{
  type Rendered = A::Rendered;
  type Error = OutputError;

  fn render_result(&self, frame: &F, result: &D) -> Result<Self::Rendered, Self::Error> {
    let rendered = self.0.render_result(frame, result).map_err(Into::into)?;
    self.1.render_result(frame, result).map_err(Into::into)?;
    Ok(rendered)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::model::{DetectItem, TrafficLightLabel};
  use serde_json::json;

  #[test]
  fn classification_json_shape() {
    let result = ClassifyResult {
      kind: TrafficLightLabel::Green,
      confidence: 0.912_345_6,
      probabilities: vec![0.05, 0.037_654_4, 0.912_345_6].into_boxed_slice(),
    };
    let response = JsonRender.render_result(&(), &result).unwrap();
    assert_eq!(
      serde_json::to_string(&response).unwrap(),
      r#"{"prediction":{"class":"green","confidence":0.9123,"class_index":2}}"#
    );
  }

  #[test]
  fn detection_json_shape() {
    let result = DetectResult {
      items: vec![DetectItem {
        kind: TrafficLightLabel::Red,
        score: 0.876_54,
        bbox: [10.123, 20.0, 30.5, 40.999],
      }]
      .into_boxed_slice(),
    };
    let response = JsonRender.render_result(&(), &result).unwrap();
    let value = serde_json::to_value(&response).unwrap();
    let entry = &value["predictions"][0];
    assert_eq!(entry["label"], "red");
    assert!((entry["confidence"].as_f64().unwrap() - 0.8765).abs() < 1e-6);
    assert!((entry["bbox"][0].as_f64().unwrap() - 10.12).abs() < 1e-4);
    assert!((entry["bbox"][3].as_f64().unwrap() - 41.0).abs() < 1e-4);
  }

  #[test]
  fn empty_detection_uses_marker() {
    let result: DetectResult<TrafficLightLabel> = DetectResult {
      items: Vec::new().into_boxed_slice(),
    };
    let response = JsonRender.render_result(&(), &result).unwrap();
    assert_eq!(
      serde_json::to_value(&response).unwrap(),
      json!({"predictions": "no detections"})
    );
    assert!(!response.is_error());
  }

  #[test]
  fn error_json_shape() {
    let response = PredictResponse::error("cannot identify image file");
    assert!(response.is_error());
    assert_eq!(
      serde_json::to_value(&response).unwrap(),
      json!({"error": "cannot identify image file"})
    );
  }
}
