// 该文件是 Honglvdeng （红绿灯） 项目的一部分。
// src/bin/predict_file.rs - 对本地图片运行一次推理
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

use anyhow::Result;
use clap::Parser;
use tracing::info;
use url::Url;

use honglvdeng::{
  FromUrl,
  input::ImageBytesInput,
  model::ModelWrapper,
  output::{JsonRender, SaveImageFileOutput},
};

/// 对单张图片运行推理，输出 JSON
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// 模型地址
  #[arg(long, value_name = "MODEL", default_value = "classify:model/best.pt")]
  pub model: Url,
  /// 输入图片路径
  #[arg(long, value_name = "FILE")]
  pub input: PathBuf,
  /// 标注图像输出，例如 image:out/annotated.png
  #[arg(long, value_name = "OUTPUT")]
  pub output: Option<Url>,
}

fn main() -> Result<()> {
  tracing_subscriber::fmt::init();

  let args = Args::parse();

  info!("模型地址: {}", args.model);
  info!("输入图片: {}", args.input.display());

  let model = ModelWrapper::from_url(&args.model)?;
  let input = ImageBytesInput::open(&args.input)?;

  let response = match &args.output {
    Some(url) => {
      let output = SaveImageFileOutput::from_url(url)?;
      info!("输出路径: {}", output.path().display());
      model.run(&input, &(JsonRender, output))?
    }
    None => model.run(&input, &JsonRender)?,
  };

  println!("{}", serde_json::to_string_pretty(&response)?);

  Ok(())
}
