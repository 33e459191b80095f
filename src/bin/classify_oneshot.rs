// 该文件是 Jungu （菌菇） 项目的一部分。
// src/bin/classify_oneshot.rs - 单帧分类
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

use jungu::{
  FromUrl,
  input::InputWrapper,
  label::LabelTable,
  model::ModelBuilder,
  output::OutputWrapper,
  pipeline::PipelineConfig,
  preprocess::Rotation,
  task::{OneShotTask, Task},
};

/// 取一帧图像并输出蘑菇种类
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// 模型，例如 onnx:///models/mushroom.onnx 或 rknn:///models/mushroom.rknn
  #[arg(long, value_name = "MODEL")]
  pub model: Url,
  /// 输入来源，例如 image:///data/boletus.jpg
  #[arg(long, value_name = "SOURCE")]
  pub input: Url,
  /// 结果输出
  #[arg(long, value_name = "OUTPUT", default_value = "log:")]
  pub output: Url,
  /// 标签文件，缺省使用内置的蘑菇标签表
  #[arg(long, value_name = "FILE")]
  pub labels: Option<PathBuf>,
  /// 预处理旋转角度（顺时针，0/90/180/270）
  #[arg(long, value_name = "DEGREES", default_value = "90")]
  pub rotate: Rotation,
  /// 模型输入边长
  #[arg(long, value_name = "PIXELS", default_value_t = 224)]
  pub size: usize,
}

fn main() -> Result<()> {
  tracing_subscriber::fmt::init();

  let args = Args::parse();

  info!("模型: {}", args.model);
  info!("输入来源: {}", args.input);
  info!("输出: {}", args.output);

  let labels = match &args.labels {
    Some(path) => LabelTable::load(path)?,
    None => LabelTable::mushroom(),
  };
  let config = PipelineConfig::default()
    .with_input_size(args.size)
    .with_rotation(args.rotate);

  let input = InputWrapper::from_url(&args.input)?;
  let model = ModelBuilder::from_url(&args.model)?;
  let output = OutputWrapper::from_url(&args.output)?;

  let prediction = OneShotTask::new(config, labels).run_task(input, model, output)?;
  println!("{}", prediction.label);

  Ok(())
}
