// 该文件是 Honglvdeng （红绿灯） 项目的一部分。
// src/args.rs - 服务参数配置
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

use clap::Parser;
use url::Url;

use honglvdeng::server::DEFAULT_UPLOAD_LIMIT;

/// Honglvdeng 服务参数配置
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// 模型地址
  /// 支持格式:
  /// - 分类: classify:model/best.pt 或 classify:model/best.safetensors
  /// - 检测: detect:model/best.onnx?confidence=0.25&iou=0.45&max_det=300
  #[arg(long, value_name = "MODEL", default_value = "classify:model/best.pt")]
  pub model: Url,

  /// 监听地址
  #[arg(long, value_name = "ADDR", default_value = "0.0.0.0:8000")]
  pub bind: String,

  /// 工作线程数，默认与 CPU 核数相同
  #[arg(long, value_name = "N")]
  pub workers: Option<usize>,

  /// 上传文件大小上限（字节）
  #[arg(long, value_name = "BYTES", default_value_t = DEFAULT_UPLOAD_LIMIT)]
  pub upload_limit: usize,
}
