// 该文件是 Jungu （菌菇） 项目的一部分。
// src/output/json_lines.rs - JSON Lines 输出
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

use std::{
  fs::{File, OpenOptions},
  io::{self, Write},
  path::{Path, PathBuf},
  sync::Mutex,
};

use chrono::Utc;
use serde_json::{Value, json};
use tracing::info;
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  output::{OutputError, Render},
  pipeline::{ClassifyError, Prediction},
};

enum Sink {
  Stdout,
  File(File),
  Memory(Vec<u8>),
}

/// 每个预测一行 JSON。
///
/// - `jsonl://stdout` 或 `jsonl:` 写到标准输出
/// - `jsonl:///var/log/jungu.jsonl` 追加到文件
pub struct JsonLinesOutput {
  sink: Mutex<Sink>,
  path: Option<PathBuf>,
}

impl FromUrlWithScheme for JsonLinesOutput {
  const SCHEME: &'static str = "jsonl";
}

impl FromUrl for JsonLinesOutput {
  type Error = OutputError;

  fn from_url(uri: &Url) -> Result<Self, Self::Error> {
    if uri.scheme() != Self::SCHEME {
      return Err(OutputError::SchemeMismatch);
    }

    let to_stdout = uri.host_str() == Some("stdout") || matches!(uri.path(), "" | "/" | "-");
    if to_stdout {
      Ok(Self::stdout())
    } else {
      Self::create(uri.path())
    }
  }
}

impl JsonLinesOutput {
  pub fn stdout() -> Self {
    JsonLinesOutput {
      sink: Mutex::new(Sink::Stdout),
      path: None,
    }
  }

  pub fn create(path: impl AsRef<Path>) -> Result<Self, OutputError> {
    let path = path.as_ref();
    if let Some(parent) = path.parent()
      && !parent.as_os_str().is_empty()
    {
      std::fs::create_dir_all(parent)?;
    }
    let file = OpenOptions::new().create(true).append(true).open(path)?;
    info!("分类结果写入文件: {}", path.display());
    Ok(JsonLinesOutput {
      sink: Mutex::new(Sink::File(file)),
      path: Some(path.to_path_buf()),
    })
  }

  /// 写入内存缓冲，用于检查输出内容
  pub fn in_memory() -> Self {
    JsonLinesOutput {
      sink: Mutex::new(Sink::Memory(Vec::new())),
      path: None,
    }
  }

  pub fn path(&self) -> Option<&Path> {
    self.path.as_deref()
  }

  /// 内存缓冲中的内容；其他输出方式返回 `None`
  pub fn buffered(&self) -> Option<String> {
    let sink = self.sink.lock().unwrap_or_else(|p| p.into_inner());
    match &*sink {
      Sink::Memory(buffer) => Some(String::from_utf8_lossy(buffer).into_owned()),
      _ => None,
    }
  }

  fn write_line(&self, value: &Value) -> Result<(), OutputError> {
    let mut line = serde_json::to_vec(value)?;
    line.push(b'\n');

    let mut sink = self.sink.lock().unwrap_or_else(|p| p.into_inner());
    match &mut *sink {
      Sink::Stdout => {
        let mut stdout = io::stdout().lock();
        stdout.write_all(&line)?;
        stdout.flush()?;
      }
      Sink::File(file) => {
        file.write_all(&line)?;
        file.flush()?;
      }
      Sink::Memory(buffer) => buffer.extend_from_slice(&line),
    }
    Ok(())
  }
}

impl Render for JsonLinesOutput {
  fn render_result(&self, result: &Prediction) -> Result<(), OutputError> {
    self.write_line(&json!({
      "timestamp": Utc::now().to_rfc3339(),
      "sequence": result.sequence,
      "index": result.index,
      "label": result.label,
      "score": result.score,
      "latency_ms": result.latency.as_secs_f64() * 1000.0,
      "scores": result.scores,
    }))
  }

  fn render_error(&self, error: &ClassifyError) -> Result<(), OutputError> {
    self.write_line(&json!({
      "timestamp": Utc::now().to_rfc3339(),
      "error": error.to_string(),
      "fatal": error.is_configuration_defect(),
    }))
  }
}

#[cfg(test)]
mod tests {
  use std::time::Duration;

  use super::*;

  #[test]
  fn writes_one_object_per_line() {
    let output = JsonLinesOutput::in_memory();
    let prediction = Prediction {
      sequence: 4,
      index: 2,
      label: "morchella".to_string(),
      score: 0.75,
      scores: vec![0.1, 0.15, 0.75],
      latency: Duration::from_millis(12),
    };
    output.render_result(&prediction).unwrap();
    output.render_result(&prediction).unwrap();

    let text = output.buffered().unwrap();
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(lines.len(), 2);

    let value: Value = serde_json::from_str(lines[0]).unwrap();
    assert_eq!(value["label"], "morchella");
    assert_eq!(value["index"], 2);
    assert_eq!(value["sequence"], 4);
    assert_eq!(value["scores"].as_array().unwrap().len(), 3);
    assert!(value["timestamp"].is_string());
  }

  #[test]
  fn stdout_urls() {
    for text in ["jsonl://stdout", "jsonl:-", "jsonl:"] {
      let url = Url::parse(text).unwrap();
      let output = JsonLinesOutput::from_url(&url).unwrap();
      assert!(output.path().is_none(), "{}", text);
    }
  }
}
