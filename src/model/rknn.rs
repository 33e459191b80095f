// 该文件是 Jungu （菌菇） 项目的一部分。
// src/model/rknn.rs - RKNPU 分类模型
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

use rknpu::{Context, InitFlags, TensorFormat, TensorType};
use tracing::{debug, error, info};

use crate::{
  frame::NormalizedTensor,
  model::{EngineError, InferenceEngine, ScoreVector, warm_up},
};

const CLASSIFIER_NUM_INPUTS: u32 = 1;
const CLASSIFIER_NUM_OUTPUTS: u32 = 1;

pub struct RknnClassifier {
  context: Context,
  input_size: usize,
  output_width: usize,
}

impl From<rknpu::Error> for EngineError {
  fn from(err: rknpu::Error) -> Self {
    EngineError::Inference(format!("RKNN 错误: {}", err))
  }
}

fn invalid(msg: &str, e: rknpu::Error) -> EngineError {
  EngineError::ModelLoad(format!("{}: {}", msg, e))
}

impl RknnClassifier {
  pub fn load(bytes: &[u8], flags: InitFlags, input_size: usize) -> Result<Self, EngineError> {
    info!("创建 RKNN 推理上下文");
    let context = Context::new(bytes, flags).map_err(|e| invalid("无法创建推理上下文", e))?;

    match context.sdk_version() {
      Ok(version) => {
        if let Ok(api_ver) = version.api_version() {
          debug!("模型 API 版本: {}", api_ver);
        }
        if let Ok(drv_ver) = version.driver_version() {
          debug!("模型驱动版本: {}", drv_ver);
        }
      }
      Err(e) => {
        error!("查询 SDK 版本失败: {}", e);
        return Err(invalid("无法查询 SDK 版本", e));
      }
    }

    let num_inputs = context
      .num_inputs()
      .map_err(|e| invalid("无法获取输入数量", e))?;
    let num_outputs = context
      .num_outputs()
      .map_err(|e| invalid("无法获取输出数量", e))?;

    if num_inputs != CLASSIFIER_NUM_INPUTS || num_outputs != CLASSIFIER_NUM_OUTPUTS {
      error!(
        "预期模型输入/输出数量为 {}/{}, 实际为 {}/{}",
        CLASSIFIER_NUM_INPUTS, CLASSIFIER_NUM_OUTPUTS, num_inputs, num_outputs
      );
      return Err(EngineError::ModelLoad(format!(
        "预期模型输入/输出数量为 {}/{}, 实际为 {}/{}",
        CLASSIFIER_NUM_INPUTS, CLASSIFIER_NUM_OUTPUTS, num_inputs, num_outputs
      )));
    }

    let mut classifier = RknnClassifier {
      context,
      input_size,
      output_width: 0,
    };
    classifier.output_width = warm_up(&mut classifier, input_size)?;
    info!("模型加载完成，类别数 {}", classifier.output_width);
    Ok(classifier)
  }
}

impl InferenceEngine for RknnClassifier {
  fn output_width(&self) -> usize {
    self.output_width
  }

  fn infer(&mut self, input: &NormalizedTensor) -> Result<ScoreVector, EngineError> {
    if input.size() != self.input_size {
      return Err(EngineError::Inference(format!(
        "输入尺寸 {} 与模型输入尺寸 {} 不一致",
        input.size(),
        self.input_size
      )));
    }

    debug!("设置模型输入");
    self.context.set_input(
      0,
      &input.to_bytes(),
      TensorFormat::NHWC,
      TensorType::UInt8,
    )?;

    debug!("执行模型推理");
    self.context.run()?;

    let output = self.context.get_outputs()?;
    let scores = output.get_f32(0)?;
    debug!("模型推理结果：{:?}", scores);
    Ok(scores.to_vec())
  }
}
