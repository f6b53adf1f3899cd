// 该文件是 Honglvdeng （红绿灯） 项目的一部分。
// src/model/yolo.rs - ONNX 交通灯检测模型
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

use std::path::PathBuf;

use ndarray::{Array4, ArrayView2, Axis, CowArray, Ix3};
#[cfg(feature = "cuda")]
use ort::execution_providers::CUDAExecutionProvider;
use ort::execution_providers::CPUExecutionProvider;
use ort::session::{Session, builder::GraphOptimizationLevel};
use tracing::{debug, error, info, warn};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  frame::{Letterbox, LetterboxFrame},
  input::AsNchwTensor,
  model::{
    DetectItem, DetectResult, Model, ModelError, TrafficLightLabel, WithLabel, query_param,
    nms::{Candidate, nms},
  },
};

const YOLO_NUM_INPUTS: usize = 1;
const YOLO_INPUT_W: u32 = 640;
const YOLO_INPUT_H: u32 = 640;
/// 每个候选框的前 4 个值为 cx, cy, w, h
const YOLO_BOX_DIMS: usize = 4;

pub type YoloFrame = LetterboxFrame<YOLO_INPUT_W, YOLO_INPUT_H>;

/// 检测阈值
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct YoloParams {
  pub confidence: f32,
  pub iou: f32,
  pub max_det: usize,
}

impl Default for YoloParams {
  fn default() -> Self {
    Self {
      confidence: 0.25,
      iou: 0.45,
      max_det: 300,
    }
  }
}

pub struct YoloDetector {
  session: Session,
  output_name: String,
  params: YoloParams,
}

pub struct YoloDetectorBuilder {
  model_path: PathBuf,
  params: YoloParams,
}

impl FromUrlWithScheme for YoloDetectorBuilder {
  const SCHEME: &'static str = "detect";
}

impl FromUrl for YoloDetectorBuilder {
  type Error = ModelError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(ModelError::ModelPathError(format!(
        "model url must use the '{}' scheme",
        Self::SCHEME
      )));
    }

    let defaults = YoloParams::default();
    let params = YoloParams {
      confidence: query_param(url, "confidence")?.unwrap_or(defaults.confidence),
      iou: query_param(url, "iou")?.unwrap_or(defaults.iou),
      max_det: query_param(url, "max_det")?.unwrap_or(defaults.max_det),
    };

    YoloDetectorBuilder {
      model_path: PathBuf::from(url.path()),
      params: defaults,
    }
    .params(params)
  }
}

impl YoloDetectorBuilder {
  pub fn params(mut self, params: YoloParams) -> Result<Self, ModelError> {
    for (name, value) in [("confidence", params.confidence), ("iou", params.iou)] {
      if !(0.0..=1.0).contains(&value) {
        return Err(ModelError::ModelPathError(format!(
          "'{}' must be within [0, 1], found {}",
          name, value
        )));
      }
    }
    self.params = params;
    Ok(self)
  }

  pub fn build(self) -> Result<YoloDetector, ModelError> {
    info!("加载模型文件: {}", self.model_path.display());
    let metadata = std::fs::metadata(&self.model_path)?;
    debug!(
      "模型文件大小: {:.2} MB",
      metadata.len() as f64 / (1024.0 * 1024.0)
    );

    // 加速器不可用时 ONNX Runtime 会回退到 CPU
    let mut providers = Vec::new();
    #[cfg(feature = "cuda")]
    providers.push(CUDAExecutionProvider::default().build());
    providers.push(CPUExecutionProvider::default().build());

    info!("创建 ONNX Runtime 推理会话");
    let session = Session::builder()?
      .with_execution_providers(providers)?
      .with_optimization_level(GraphOptimizationLevel::Level3)?
      .commit_from_file(&self.model_path)?;

    let num_inputs = session.inputs.len();
    let num_outputs = session.outputs.len();
    debug!("模型输入数量: {}", num_inputs);
    debug!("模型输出数量: {}", num_outputs);

    if num_inputs != YOLO_NUM_INPUTS {
      error!(
        "预期模型输入数量为 {}, 实际为 {}",
        YOLO_NUM_INPUTS, num_inputs
      );
      return Err(ModelError::invalid(format!(
        "expected {} model input, found {}",
        YOLO_NUM_INPUTS, num_inputs
      )));
    }

    let output_name = match session.outputs.first() {
      Some(output) => output.name.clone(),
      None => {
        error!("模型没有输出");
        return Err(ModelError::invalid("model has no outputs"));
      }
    };

    info!("检测参数: {:?}", self.params);
    info!("模型加载完成");
    Ok(YoloDetector {
      session,
      output_name,
      params: self.params,
    })
  }
}

impl Model for YoloDetector {
  type Input = YoloFrame;
  type Output = DetectResult<TrafficLightLabel>;
  type Error = ModelError;

  fn infer(&self, input: &Self::Input) -> Result<Self::Output, Self::Error> {
    let [n, c, h, w] = input.frame.shape();
    let xs = Array4::from_shape_vec((n, c, h, w), input.as_nchw().to_vec())?;
    let xs = CowArray::from(xs.into_dyn());

    debug!("执行模型推理");
    let outputs = self.session.run(ort::inputs![xs.view()]?)?;

    let output = outputs[self.output_name.as_str()].try_extract_tensor::<f32>()?;
    let output = output.into_dimensionality::<Ix3>()?;
    debug!("模型输出形状: {:?}", output.shape());

    let items = decode_predictions(
      output.index_axis(Axis(0), 0),
      TrafficLightLabel::ALL.len(),
      &self.params,
      &input.letterbox,
    );
    Ok(DetectResult {
      items: items.into_boxed_slice(),
    })
  }
}

/// 解码单张图像的检测输出
///
/// 输出可以是 `[4 + nc, N]` 或 `[N, 4 + nc]`，按 `4 + num_classes` 所在的维度判断排列方式，
/// 两个维度相同时按 `[4 + nc, N]` 处理。
/// 返回的框已做阈值过滤、按类别 NMS，并映射回原图坐标。
pub fn decode_predictions<T: WithLabel>(
  prediction: ArrayView2<f32>,
  num_classes: usize,
  params: &YoloParams,
  letterbox: &Letterbox,
) -> Vec<DetectItem<T>> {
  let features = YOLO_BOX_DIMS + num_classes;
  let prediction = if prediction.nrows() == features {
    prediction
  } else if prediction.ncols() == features {
    debug!("检测输出为 [N, 4 + nc] 排列");
    prediction.reversed_axes()
  } else {
    warn!(
      "检测输出形状 {:?} 与类别数 {} 不符",
      prediction.dim(),
      num_classes
    );
    return Vec::new();
  };

  let anchors = prediction.ncols();

  let mut candidates = Vec::new();
  for i in 0..anchors {
    let (class_id, score) = (0..num_classes)
      .map(|c| (c, prediction[[YOLO_BOX_DIMS + c, i]]))
      .fold((0usize, f32::NEG_INFINITY), |(max_idx, max_val), (c, val)| {
        if val > max_val { (c, val) } else { (max_idx, max_val) }
      });

    if score < params.confidence {
      continue;
    }

    let cx = prediction[[0, i]];
    let cy = prediction[[1, i]];
    let w = prediction[[2, i]];
    let h = prediction[[3, i]];

    candidates.push(Candidate {
      class_id: class_id as u32,
      score,
      bbox: [cx - w / 2.0, cy - h / 2.0, cx + w / 2.0, cy + h / 2.0],
    });
  }
  debug!("阈值过滤后候选框数量: {}", candidates.len());

  let items = nms(candidates, params.iou, params.max_det)
    .into_iter()
    .filter_map(|candidate| match T::from_label_id(candidate.class_id) {
      Some(kind) => Some(DetectItem {
        kind,
        score: candidate.score,
        bbox: letterbox.restore(candidate.bbox),
      }),
      None => {
        warn!("未知类别编号 {}, 已忽略", candidate.class_id);
        None
      }
    })
    .collect::<Vec<_>>();

  debug!("检测到 {} 个物体", items.len());
  items
}
