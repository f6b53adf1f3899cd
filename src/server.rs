// 该文件是 Honglvdeng （红绿灯） 项目的一部分。
// src/server.rs - HTTP 推理服务
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

use actix_multipart::{Multipart, MultipartError};
use actix_web::{HttpRequest, HttpResponse, Responder, web};
use futures::TryStreamExt;
use serde::Serialize;
use thiserror::Error;
use tracing::{error, info, warn};
use url::Url;

use crate::{
  FromUrl,
  model::{ModelError, ModelWrapper},
  output::{JsonRender, PredictResponse},
  task::TaskError,
};

pub const HEALTH_MESSAGE: &str = "Traffic Light Detection API is working!";
pub const UPLOAD_FIELD: &str = "file";
pub const DEFAULT_UPLOAD_LIMIT: usize = 10 * 1024 * 1024;

/// 进程内唯一的推理会话，服务启动前构造，服务停止后释放
pub struct InferenceSession {
  model: ModelWrapper,
}

impl InferenceSession {
  pub fn new(model: ModelWrapper) -> Self {
    info!("推理会话就绪: {}", model.variant());
    Self { model }
  }

  pub fn load(url: &Url) -> Result<Self, ModelError> {
    info!("加载模型: {}", url);
    let model = ModelWrapper::from_url(url)?;
    Ok(Self::new(model))
  }

  pub fn predict(&self, bytes: &[u8]) -> Result<PredictResponse, TaskError> {
    self.model.run_bytes(bytes, &JsonRender)
  }

  pub fn release(self) {
    info!("释放推理会话: {}", self.model.variant());
  }
}

#[derive(Debug, Clone, Copy)]
pub struct UploadConfig {
  pub limit: usize,
}

impl Default for UploadConfig {
  fn default() -> Self {
    Self {
      limit: DEFAULT_UPLOAD_LIMIT,
    }
  }
}

#[derive(Error, Debug)]
pub enum UploadError {
  #[error("multipart error: {0}")]
  Multipart(#[from] MultipartError),
  #[error("no file part named 'file' in request")]
  MissingFile,
  #[error("upload exceeds the limit of {0} bytes")]
  TooLarge(usize),
}

#[derive(Serialize)]
struct HealthResponse {
  message: &'static str,
}

pub fn routes(cfg: &mut web::ServiceConfig) {
  cfg
    .route("/", web::get().to(health))
    .route("/predict", web::post().to(predict));
}

pub async fn health() -> impl Responder {
  HttpResponse::Ok().json(HealthResponse {
    message: HEALTH_MESSAGE,
  })
}

/// 读取名为 `file` 的字段，其余字段丢弃
async fn read_upload(mut payload: Multipart, limit: usize) -> Result<Vec<u8>, UploadError> {
  while let Some(mut field) = payload.try_next().await? {
    if field.name() != Some(UPLOAD_FIELD) {
      while field.try_next().await?.is_some() {}
      continue;
    }

    let mut bytes = Vec::new();
    while let Some(chunk) = field.try_next().await? {
      if bytes.len() + chunk.len() > limit {
        return Err(UploadError::TooLarge(limit));
      }
      bytes.extend_from_slice(&chunk);
    }
    return Ok(bytes);
  }

  Err(UploadError::MissingFile)
}

pub async fn predict(
  req: HttpRequest,
  session: web::Data<InferenceSession>,
  payload: Multipart,
) -> HttpResponse {
  let limit = req
    .app_data::<web::Data<UploadConfig>>()
    .map(|config| config.limit)
    .unwrap_or(DEFAULT_UPLOAD_LIMIT);

  let bytes = match read_upload(payload, limit).await {
    Ok(bytes) => bytes,
    Err(e) => {
      warn!("上传读取失败: {}", e);
      return HttpResponse::Ok().json(PredictResponse::error(e.to_string()));
    }
  };
  info!("收到上传图像: {} 字节", bytes.len());

  let session = session.into_inner();
  let response = match web::block(move || session.predict(&bytes)).await {
    Ok(Ok(response)) => response,
    Ok(Err(e)) => {
      warn!("预测失败: {}", e);
      PredictResponse::error(e.to_string())
    }
    Err(e) => {
      error!("推理线程异常: {}", e);
      PredictResponse::error(e.to_string())
    }
  };

  HttpResponse::Ok().json(response)
}
