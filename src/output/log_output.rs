// 该文件是 Jungu （菌菇） 项目的一部分。
// src/output/log_output.rs - 日志输出
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

use tracing::{info, warn};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  output::{OutputError, Render},
  pipeline::{ClassifyError, Prediction},
};

/// 把每个预测写入 `info!` 日志，`log://?scores` 时附带完整得分
#[derive(Debug, Clone, Default)]
pub struct LogOutput {
  with_scores: bool,
}

impl FromUrlWithScheme for LogOutput {
  const SCHEME: &'static str = "log";
}

impl FromUrl for LogOutput {
  type Error = OutputError;

  fn from_url(uri: &Url) -> Result<Self, Self::Error> {
    if uri.scheme() != Self::SCHEME {
      return Err(OutputError::SchemeMismatch);
    }

    Ok(LogOutput {
      with_scores: uri.query_pairs().any(|(k, _)| k == "scores"),
    })
  }
}

impl Render for LogOutput {
  fn render_result(&self, result: &Prediction) -> Result<(), OutputError> {
    if self.with_scores {
      info!(
        "第 {} 帧: {} ({:.4}), 耗时 {:.2?}, 得分 {:?}",
        result.sequence, result.label, result.score, result.latency, result.scores
      );
    } else {
      info!(
        "第 {} 帧: {} ({:.4}), 耗时 {:.2?}",
        result.sequence, result.label, result.score, result.latency
      );
    }
    Ok(())
  }

  fn render_error(&self, error: &ClassifyError) -> Result<(), OutputError> {
    warn!("分类失败: {}", error);
    Ok(())
  }
}
