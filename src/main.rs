// 该文件是 Honglvdeng （红绿灯） 项目的一部分。
// src/main.rs - HTTP 服务主程序
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

mod args;

use std::sync::Arc;

use actix_web::{App, HttpServer, middleware, web};
use anyhow::{Context, Result};
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use honglvdeng::server::{self, InferenceSession, UploadConfig};

#[actix_web::main]
async fn main() -> Result<()> {
  tracing_subscriber::fmt()
    .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
    .init();

  let args = args::Args::parse();

  info!("模型地址: {}", args.model);
  info!("监听地址: {}", args.bind);
  info!("上传大小上限: {} 字节", args.upload_limit);

  let session = web::Data::new(
    InferenceSession::load(&args.model).with_context(|| format!("无法加载模型 {}", args.model))?,
  );
  let upload = web::Data::new(UploadConfig {
    limit: args.upload_limit,
  });

  let app_session = session.clone();
  let mut http = HttpServer::new(move || {
    App::new()
      .wrap(middleware::Logger::default())
      .app_data(app_session.clone())
      .app_data(upload.clone())
      .configure(server::routes)
  });
  if let Some(workers) = args.workers {
    http = http.workers(workers);
  }

  info!("服务启动");
  http
    .bind(&args.bind)
    .with_context(|| format!("无法监听 {}", args.bind))?
    .run()
    .await?;
  info!("服务已停止");

  match Arc::try_unwrap(session.into_inner()) {
    Ok(session) => session.release(),
    Err(_) => warn!("推理会话仍被引用，随进程退出释放"),
  }

  Ok(())
}
