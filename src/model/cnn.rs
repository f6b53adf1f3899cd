// 该文件是 Honglvdeng （红绿灯） 项目的一部分。
// src/model/cnn.rs - 交通灯颜色分类网络
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

use candle_core::{D, DType, Device, Module, Tensor};
use candle_nn::{Conv2d, Conv2dConfig, Linear, VarBuilder};
use tracing::{debug, info};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  frame::NchwTensorFrame,
  input::AsNchwTensor,
  model::{ClassifyResult, Model, ModelError, TrafficLightLabel, WithLabel},
};

const CNN_INPUT_W: u32 = 64;
const CNN_INPUT_H: u32 = 64;
const CNN_CLASS_NUM: usize = 3;

pub type CnnFrame = NchwTensorFrame<CNN_INPUT_W, CNN_INPUT_H>;

/// 三层卷积 + 两层全连接的分类网络
///
/// 参数名与 PyTorch `nn.Sequential` 的 state_dict 对应：
/// `features.{0,3,6}` 为卷积层，`classifier.{1,4}` 为全连接层。
/// Dropout 只在训练时生效，推理时不参与计算。
pub struct TrafficLightCnn {
  conv1: Conv2d,
  conv2: Conv2d,
  conv3: Conv2d,
  fc1: Linear,
  fc2: Linear,
}

impl TrafficLightCnn {
  pub fn load(vb: VarBuilder, num_classes: usize) -> candle_core::Result<Self> {
    let cfg = Conv2dConfig {
      padding: 1,
      ..Default::default()
    };
    let features = vb.pp("features");
    let conv1 = candle_nn::conv2d(3, 32, 3, cfg, features.pp("0"))?;
    let conv2 = candle_nn::conv2d(32, 64, 3, cfg, features.pp("3"))?;
    let conv3 = candle_nn::conv2d(64, 128, 3, cfg, features.pp("6"))?;

    // 64x64 输入经过三次 2x2 池化后为 8x8
    let classifier = vb.pp("classifier");
    let fc1 = candle_nn::linear(128 * 8 * 8, 256, classifier.pp("1"))?;
    let fc2 = candle_nn::linear(256, num_classes, classifier.pp("4"))?;

    Ok(Self {
      conv1,
      conv2,
      conv3,
      fc1,
      fc2,
    })
  }
}

impl Module for TrafficLightCnn {
  fn forward(&self, xs: &Tensor) -> candle_core::Result<Tensor> {
    xs.apply(&self.conv1)?
      .relu()?
      .max_pool2d(2)?
      .apply(&self.conv2)?
      .relu()?
      .max_pool2d(2)?
      .apply(&self.conv3)?
      .relu()?
      .max_pool2d(2)?
      .flatten_from(1)?
      .apply(&self.fc1)?
      .relu()?
      .apply(&self.fc2)
  }
}

pub struct CnnClassifier {
  network: TrafficLightCnn,
  device: Device,
}

pub struct CnnClassifierBuilder {
  model_path: PathBuf,
  device: Option<Device>,
}

impl FromUrlWithScheme for CnnClassifierBuilder {
  const SCHEME: &'static str = "classify";
}

impl FromUrl for CnnClassifierBuilder {
  type Error = ModelError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(ModelError::ModelPathError(format!(
        "model url must use the '{}' scheme",
        Self::SCHEME
      )));
    }

    Ok(CnnClassifierBuilder {
      model_path: PathBuf::from(url.path()),
      device: None,
    })
  }
}

impl CnnClassifierBuilder {
  pub fn device(mut self, device: Device) -> Self {
    self.device = Some(device);
    self
  }

  pub fn build(self) -> Result<CnnClassifier, ModelError> {
    info!("加载模型文件: {}", self.model_path.display());
    let metadata = std::fs::metadata(&self.model_path)?;
    debug!(
      "模型文件大小: {:.2} MB",
      metadata.len() as f64 / (1024.0 * 1024.0)
    );

    let device = match self.device {
      Some(device) => device,
      None => Device::cuda_if_available(0)?,
    };
    info!("推理设备: {:?}", device);

    let is_safetensors = self
      .model_path
      .extension()
      .is_some_and(|ext| ext == "safetensors");
    let vb = if is_safetensors {
      // SAFETY: 权重文件在加载期间不会被修改
      unsafe { VarBuilder::from_mmaped_safetensors(&[&self.model_path], DType::F32, &device)? }
    } else {
      VarBuilder::from_pth(&self.model_path, DType::F32, &device)?
    };

    let model = CnnClassifier::from_var_builder(vb, device)?;
    info!("模型加载完成");
    Ok(model)
  }
}

impl CnnClassifier {
  pub fn from_var_builder(vb: VarBuilder, device: Device) -> Result<Self, ModelError> {
    let network = TrafficLightCnn::load(vb, CNN_CLASS_NUM)
      .map_err(|e| ModelError::invalid(format!("checkpoint does not match network: {}", e)))?;
    Ok(Self { network, device })
  }

  fn postprocess(probabilities: Vec<f32>) -> Result<ClassifyResult<TrafficLightLabel>, ModelError> {
    let (index, confidence) = probabilities
      .iter()
      .copied()
      .enumerate()
      .fold((0, f32::NEG_INFINITY), |(max_idx, max_val), (i, val)| {
        if val > max_val { (i, val) } else { (max_idx, max_val) }
      });

    let kind = TrafficLightLabel::from_label_id(index as u32)
      .ok_or_else(|| ModelError::invalid(format!("class index {} out of range", index)))?;
    debug!("分类结果: {} ({:.4})", kind.to_label_str(), confidence);

    Ok(ClassifyResult {
      kind,
      confidence,
      probabilities: probabilities.into_boxed_slice(),
    })
  }
}

impl Model for CnnClassifier {
  type Input = CnnFrame;
  type Output = ClassifyResult<TrafficLightLabel>;
  type Error = ModelError;

  fn infer(&self, input: &Self::Input) -> Result<Self::Output, Self::Error> {
    let xs = Tensor::from_slice(
      input.as_nchw(),
      (1, input.channels(), input.height(), input.width()),
      &self.device,
    )?;

    // 推理结果与计算图分离，不记录梯度
    let logits = self.network.forward(&xs)?.detach();
    let probabilities = candle_nn::ops::softmax(&logits, D::Minus1)?
      .squeeze(0)?
      .to_vec1::<f32>()?;

    Self::postprocess(probabilities)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use candle_nn::VarMap;

  fn gradient_frame() -> CnnFrame {
    let data = (0..CnnFrame::LEN).map(|i| (i % 255) as f32 / 255.0).collect::<Vec<_>>();
    CnnFrame::try_from(data).unwrap()
  }

  #[test]
  fn zero_weights_give_uniform_distribution() {
    let vb = VarBuilder::zeros(DType::F32, &Device::Cpu);
    let model = CnnClassifier::from_var_builder(vb, Device::Cpu).unwrap();
    let result = model.infer(&gradient_frame()).unwrap();

    assert_eq!(result.probabilities.len(), 3);
    for p in result.probabilities.iter() {
      assert!((p - 1.0 / 3.0).abs() < 1e-5);
    }
    // 平局时取第一个类别
    assert_eq!(result.kind, TrafficLightLabel::Red);
  }

  #[test]
  fn probabilities_form_a_distribution() {
    let varmap = VarMap::new();
    let vb = VarBuilder::from_varmap(&varmap, DType::F32, &Device::Cpu);
    let model = CnnClassifier::from_var_builder(vb, Device::Cpu).unwrap();
    let result = model.infer(&gradient_frame()).unwrap();

    let sum: f32 = result.probabilities.iter().sum();
    assert!((sum - 1.0).abs() < 1e-5);
    assert!(result.probabilities.iter().all(|p| (0.0..=1.0).contains(p)));
    assert!((0.0..=1.0).contains(&result.confidence));

    let max = result.probabilities.iter().copied().fold(f32::MIN, f32::max);
    assert_eq!(result.confidence, max);
    assert_eq!(result.probabilities[result.kind.to_label_id() as usize], max);
  }

  #[test]
  fn repeated_inference_is_deterministic() {
    let varmap = VarMap::new();
    let vb = VarBuilder::from_varmap(&varmap, DType::F32, &Device::Cpu);
    let model = CnnClassifier::from_var_builder(vb, Device::Cpu).unwrap();
    let frame = gradient_frame();

    let first = model.infer(&frame).unwrap();
    let second = model.infer(&frame).unwrap();
    assert_eq!(first.kind, second.kind);
    assert_eq!(first.probabilities, second.probabilities);
  }

  #[test]
  fn saved_checkpoint_loads_with_same_weights() {
    let path = std::env::temp_dir().join(format!("honglvdeng-checkpoint-{}.safetensors", std::process::id()));
    let varmap = VarMap::new();
    let vb = VarBuilder::from_varmap(&varmap, DType::F32, &Device::Cpu);
    let in_memory = CnnClassifier::from_var_builder(vb, Device::Cpu).unwrap();
    varmap.save(&path).unwrap();

    let url = Url::parse(&format!("classify:{}", path.display())).unwrap();
    let loaded = CnnClassifierBuilder::from_url(&url)
      .unwrap()
      .device(Device::Cpu)
      .build();
    std::fs::remove_file(&path).ok();
    let loaded = loaded.unwrap();

    let frame = gradient_frame();
    let expected = in_memory.infer(&frame).unwrap();
    let actual = loaded.infer(&frame).unwrap();
    assert_eq!(actual.kind, expected.kind);
    assert_eq!(actual.probabilities, expected.probabilities);
  }

  #[test]
  fn missing_checkpoint_fails_to_build() {
    let url = Url::parse("classify:does/not/exist/best.pt").unwrap();
    let result = CnnClassifierBuilder::from_url(&url)
      .unwrap()
      .device(Device::Cpu)
      .build();
    assert!(matches!(result, Err(ModelError::ModelLoadError(_))));
  }

  #[test]
  fn malformed_checkpoint_fails_to_build() {
    let path = std::env::temp_dir().join(format!("honglvdeng-malformed-{}.safetensors", std::process::id()));
    std::fs::write(&path, b"definitely not a checkpoint").unwrap();

    let url = Url::parse(&format!("classify:{}", path.display())).unwrap();
    let result = CnnClassifierBuilder::from_url(&url)
      .unwrap()
      .device(Device::Cpu)
      .build();
    std::fs::remove_file(&path).ok();

    assert!(result.is_err());
  }

  #[test]
  fn wrong_scheme_is_rejected() {
    let url = Url::parse("detect:model/best.pt").unwrap();
    assert!(matches!(
      CnnClassifierBuilder::from_url(&url),
      Err(ModelError::ModelPathError(_))
    ));
  }
}
