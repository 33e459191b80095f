// 该文件是 Jungu （菌菇） 项目的一部分。
// src/model/onnx.rs - ONNX Runtime 分类模型
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

use ndarray::Array4;
use ort::{session::Session, value::Tensor};
use tracing::{debug, info};

use crate::{
  frame::{NormalizedTensor, RGB_CHANNELS},
  model::{EngineError, InferenceEngine, ScoreVector, warm_up},
};

/// 输入为 NHWC float32 的单输出分类模型
pub struct OnnxClassifier {
  session: Session,
  input_size: usize,
  output_width: usize,
}

impl OnnxClassifier {
  pub fn load(bytes: &[u8], input_size: usize) -> Result<Self, EngineError> {
    info!("创建 ONNX Runtime 推理会话");
    let session = Session::builder()
      .map_err(|e| EngineError::ModelLoad(format!("无法创建会话构建器: {}", e)))?
      .commit_from_memory(bytes)
      .map_err(|e| EngineError::ModelLoad(format!("无法从内存加载模型: {}", e)))?;

    let mut classifier = OnnxClassifier {
      session,
      input_size,
      output_width: 0,
    };
    classifier.output_width = warm_up(&mut classifier, input_size)?;
    info!("模型加载完成，类别数 {}", classifier.output_width);
    Ok(classifier)
  }
}

impl InferenceEngine for OnnxClassifier {
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

    let size = self.input_size;
    let array = Array4::from_shape_vec((1, size, size, RGB_CHANNELS), input.as_slice().to_vec())
      .map_err(|e| EngineError::Inference(format!("无法构造输入张量: {}", e)))?;
    let value = Tensor::from_array(array)
      .map_err(|e| EngineError::Inference(format!("无法创建 ONNX 张量: {}", e)))?;

    debug!("执行模型推理");
    let outputs = self
      .session
      .run(ort::inputs![value])
      .map_err(|e| EngineError::Inference(format!("推理失败: {}", e)))?;

    let scores = outputs[0]
      .try_extract_array::<f32>()
      .map_err(|e| EngineError::Inference(format!("输出不是 f32 张量: {}", e)))?;
    Ok(scores.iter().copied().collect())
  }
}
