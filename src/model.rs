// 该文件是 Jungu （菌菇） 项目的一部分。
// src/model.rs - 推理引擎
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

use thiserror::Error;
use tracing::{debug, info};
use url::Url;

use crate::{FromUrl, frame::NormalizedTensor};

/// 与标签表按索引对齐的类别得分
pub type ScoreVector = Vec<f32>;

#[derive(Error, Debug)]
pub enum EngineError {
  #[error("模型加载错误: {0}")]
  ModelLoad(String),
  #[error("推理错误: {0}")]
  Inference(String),
  #[error("模型尚未加载")]
  NotLoaded,
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("模型路径错误: {0}")]
  ModelPathError(String),
}

/// 已加载的分类模型。
///
/// 引擎实例由流水线的工作线程独占，因此不要求 `Send`。
pub trait InferenceEngine {
  /// 模型输出宽度，即类别数 N
  fn output_width(&self) -> usize;

  fn infer(&mut self, input: &NormalizedTensor) -> Result<ScoreVector, EngineError>;
}

impl<E: InferenceEngine + ?Sized> InferenceEngine for Box<E> {
  fn output_width(&self) -> usize {
    (**self).output_width()
  }

  fn infer(&mut self, input: &NormalizedTensor) -> Result<ScoreVector, EngineError> {
    (**self).infer(input)
  }
}

/// 从模型字节构造推理引擎
pub trait ModelLoader: Send + 'static {
  fn load(&self, bytes: &[u8], input_size: usize) -> Result<Box<dyn InferenceEngine>, EngineError>;
}

impl<F> ModelLoader for F
where
  F: Fn(&[u8], usize) -> Result<Box<dyn InferenceEngine>, EngineError> + Send + 'static,
{
  fn load(&self, bytes: &[u8], input_size: usize) -> Result<Box<dyn InferenceEngine>, EngineError> {
    self(bytes, input_size)
  }
}

/// 能够自行获取模型字节的加载器
pub trait ModelProvider: ModelLoader {
  fn model_bytes(&self) -> Result<Vec<u8>, EngineError>;
}

/// 用全零张量跑一次推理，得到并检查输出宽度
pub fn warm_up<E: InferenceEngine + ?Sized>(
  engine: &mut E,
  input_size: usize,
) -> Result<usize, EngineError> {
  let scores = engine
    .infer(&NormalizedTensor::zeros(input_size))
    .map_err(|e| EngineError::ModelLoad(format!("预热推理失败: {}", e)))?;
  if scores.is_empty() {
    return Err(EngineError::ModelLoad("模型输出为空".to_string()));
  }
  debug!("预热推理完成，输出宽度 {}", scores.len());
  Ok(scores.len())
}

#[cfg(feature = "model_onnx")]
mod onnx;
#[cfg(feature = "model_onnx")]
pub use self::onnx::OnnxClassifier;

#[cfg(feature = "model_rknpu")]
mod rknn;
#[cfg(feature = "model_rknpu")]
pub use self::rknn::RknnClassifier;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelBackend {
  #[cfg(feature = "model_onnx")]
  Onnx,
  #[cfg(feature = "model_rknpu")]
  Rknn,
}

const ONNX_SCHEME: &str = "onnx";
const RKNN_SCHEME: &str = "rknn";

/// 按 URL 选择后端并从文件读取模型
#[derive(Debug, Clone)]
pub struct ModelBuilder {
  backend: ModelBackend,
  model_path: String,
}

impl FromUrl for ModelBuilder {
  type Error = EngineError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    let model_path = url.path().to_string();
    if model_path.is_empty() {
      return Err(EngineError::ModelPathError(format!("模型路径为空: {}", url)));
    }

    let backend: ModelBackend = match url.scheme() {
      #[cfg(feature = "model_onnx")]
      ONNX_SCHEME => ModelBackend::Onnx,
      #[cfg(feature = "model_rknpu")]
      RKNN_SCHEME => ModelBackend::Rknn,
      scheme @ (ONNX_SCHEME | RKNN_SCHEME) => {
        return Err(EngineError::ModelPathError(format!(
          "未启用 {} 后端，请在编译时打开对应特性",
          scheme
        )));
      }
      scheme => {
        return Err(EngineError::ModelPathError(format!(
          "不支持的模型方案 '{}'，可选 {} / {}",
          scheme, ONNX_SCHEME, RKNN_SCHEME
        )));
      }
    };

    Ok(ModelBuilder {
      backend,
      model_path,
    })
  }
}

impl ModelBuilder {
  pub fn backend(&self) -> ModelBackend {
    self.backend
  }

  pub fn model_path(&self) -> &str {
    &self.model_path
  }
}

impl ModelLoader for ModelBuilder {
  #[allow(unused_variables)]
  fn load(&self, bytes: &[u8], input_size: usize) -> Result<Box<dyn InferenceEngine>, EngineError> {
    let backend = self.backend;
    match backend {
      #[cfg(feature = "model_onnx")]
      ModelBackend::Onnx => Ok(Box::new(OnnxClassifier::load(bytes, input_size)?)),
      #[cfg(feature = "model_rknpu")]
      ModelBackend::Rknn => Ok(Box::new(RknnClassifier::load(
        bytes,
        rknpu::InitFlags::default(),
        input_size,
      )?)),
    }
  }
}

impl ModelProvider for ModelBuilder {
  fn model_bytes(&self) -> Result<Vec<u8>, EngineError> {
    info!("加载模型文件: {}", self.model_path);
    let bytes = std::fs::read(&self.model_path)?;
    debug!(
      "模型文件大小: {:.2} MB",
      bytes.len() as f64 / (1024.0 * 1024.0)
    );
    Ok(bytes)
  }
}
