// 该文件是 Jungu （菌菇） 项目的一部分。
// src/output.rs - 输出定义
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

use thiserror::Error;
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  pipeline::{ClassifyError, Prediction},
};

/// 分类结果的接收方。
///
/// 由工作线程调用，每次只有一个调用在进行。
pub trait Render: Send + Sync {
  fn render_result(&self, result: &Prediction) -> Result<(), OutputError>;

  /// 单帧失败通知，默认忽略
  fn render_error(&self, _error: &ClassifyError) -> Result<(), OutputError> {
    Ok(())
  }
}

mod channel;
pub use self::channel::{ChannelOutput, LatestLabel};

mod json_lines;
pub use self::json_lines::JsonLinesOutput;

mod log_output;
pub use self::log_output::LogOutput;

#[derive(Error, Debug)]
pub enum OutputError {
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("序列化错误: {0}")]
  JsonError(#[from] serde_json::Error),
  #[error("接收方已关闭")]
  Disconnected,
  #[error("URI 方案不匹配")]
  SchemeMismatch,
}

pub enum OutputWrapper {
  Log(LogOutput),
  JsonLines(JsonLinesOutput),
}

impl FromUrl for OutputWrapper {
  type Error = OutputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    match url.scheme() {
      LogOutput::SCHEME => Ok(OutputWrapper::Log(LogOutput::from_url(url)?)),
      JsonLinesOutput::SCHEME => Ok(OutputWrapper::JsonLines(JsonLinesOutput::from_url(url)?)),
      _ => Err(OutputError::SchemeMismatch),
    }
  }
}

impl Render for OutputWrapper {
  fn render_result(&self, result: &Prediction) -> Result<(), OutputError> {
    match self {
      OutputWrapper::Log(output) => output.render_result(result),
      OutputWrapper::JsonLines(output) => output.render_result(result),
    }
  }

  fn render_error(&self, error: &ClassifyError) -> Result<(), OutputError> {
    match self {
      OutputWrapper::Log(output) => output.render_error(error),
      OutputWrapper::JsonLines(output) => output.render_error(error),
    }
  }
}

impl<R: Render + ?Sized> Render for std::sync::Arc<R> {
  fn render_result(&self, result: &Prediction) -> Result<(), OutputError> {
    (**self).render_result(result)
  }

  fn render_error(&self, error: &ClassifyError) -> Result<(), OutputError> {
    (**self).render_error(error)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn output_url_dispatch() {
    let log = Url::parse("log://").unwrap();
    assert!(matches!(
      OutputWrapper::from_url(&log),
      Ok(OutputWrapper::Log(_))
    ));

    let stdout = Url::parse("jsonl://stdout").unwrap();
    assert!(matches!(
      OutputWrapper::from_url(&stdout),
      Ok(OutputWrapper::JsonLines(_))
    ));

    let unknown = Url::parse("rtsp://localhost/stream").unwrap();
    assert!(matches!(
      OutputWrapper::from_url(&unknown),
      Err(OutputError::SchemeMismatch)
    ));
  }
}
