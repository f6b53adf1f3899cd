// 该文件是 Honglvdeng （红绿灯） 项目的一部分。
// src/task.rs - 单次推理任务
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

use std::{error::Error as StdError, time::Instant};

use image::RgbImage;
use thiserror::Error;
use tracing::{debug, info};

use crate::{
  input::{ImageBytesInput, InputError},
  model::{ClassifyResult, DetectResult, Model, ModelWrapper, TrafficLightLabel},
  output::Render,
};

type BoxError = Box<dyn StdError + Send + Sync>;

#[derive(Error, Debug)]
pub enum TaskError {
  #[error("{0}")]
  Input(#[from] InputError),
  #[error("inference failed: {0}")]
  Inference(#[source] BoxError),
  #[error("render failed: {0}")]
  Render(#[source] BoxError),
}

pub trait Task<I, M, O>: Sized {
  type Output;
  type Error;
  fn run_task(self, input: &I, model: &M, output: &O) -> Result<Self::Output, Self::Error>;
}

/// 一张图片：预处理、推理、渲染各一次
pub struct OneShotTask;

impl<
  D,
  ME: StdError + Sync + Send + 'static,
  RE: StdError + Sync + Send + 'static,
  M: Model<Output = D, Error = ME>,
  O: Render<RgbImage, D, Error = RE>,
> Task<ImageBytesInput, M, O> for OneShotTask
where
  M::Input: for<'a> From<&'a RgbImage>,
{
  type Output = <O as Render<RgbImage, D>>::Rendered;
  type Error = TaskError;

  fn run_task(self, input: &ImageBytesInput, model: &M, output: &O) -> Result<Self::Output, Self::Error> {
    let now = Instant::now();
    let frame = M::Input::from(input.image());
    debug!("预处理完成，耗时: {:.2?}", now.elapsed());

    let now = Instant::now();
    let result = model
      .infer(&frame)
      .map_err(|e| TaskError::Inference(Box::new(e)))?;
    info!("推理完成，耗时: {:.2?}", now.elapsed());

    output
      .render_result(input.image(), &result)
      .map_err(|e| TaskError::Render(Box::new(e)))
  }
}

impl ModelWrapper {
  /// 对一张已解码的图片运行当前模型，并把结果交给 `output` 渲染
  pub fn run<O, R, RE>(&self, input: &ImageBytesInput, output: &O) -> Result<R, TaskError>
  where
    RE: StdError + Sync + Send + 'static,
    O: Render<RgbImage, ClassifyResult<TrafficLightLabel>, Rendered = R, Error = RE>
      + Render<RgbImage, DetectResult<TrafficLightLabel>, Rendered = R, Error = RE>,
  {
    debug!(
      "{} 模型处理 {}x{} 图像",
      self.variant(),
      input.width(),
      input.height()
    );
    match self {
      #[cfg(feature = "model_classify")]
      ModelWrapper::Classify(model) => OneShotTask.run_task(input, model, output),
      #[cfg(feature = "model_detect")]
      ModelWrapper::Detect(model) => OneShotTask.run_task(input, model, output),
    }
  }

  /// 解码上传的字节流并运行推理
  pub fn run_bytes<O, R, RE>(&self, bytes: &[u8], output: &O) -> Result<R, TaskError>
  where
    RE: StdError + Sync + Send + 'static,
    O: Render<RgbImage, ClassifyResult<TrafficLightLabel>, Rendered = R, Error = RE>
      + Render<RgbImage, DetectResult<TrafficLightLabel>, Rendered = R, Error = RE>,
  {
    let input = ImageBytesInput::decode(bytes)?;
    self.run(&input, output)
  }
}
