// 该文件是 Jungu （菌菇） 项目的一部分。
// src/output/channel.rs - 转发到宿主线程的输出
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

use std::sync::{
  Mutex,
  mpsc::{self, Receiver, Sender},
};

use crate::{
  output::{OutputError, Render},
  pipeline::Prediction,
};

/// 把预测结果发送给宿主持有的接收端，例如界面线程
pub struct ChannelOutput {
  sender: Sender<Prediction>,
}

impl ChannelOutput {
  pub fn new() -> (Self, Receiver<Prediction>) {
    let (sender, receiver) = mpsc::channel();
    (ChannelOutput { sender }, receiver)
  }
}

impl Render for ChannelOutput {
  fn render_result(&self, result: &Prediction) -> Result<(), OutputError> {
    self
      .sender
      .send(result.clone())
      .map_err(|_| OutputError::Disconnected)
  }
}

/// 保存最近一次成功的预测，失败的帧不会覆盖它
#[derive(Default)]
pub struct LatestLabel {
  latest: Mutex<Option<Prediction>>,
}

impl LatestLabel {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn label(&self) -> Option<String> {
    self.prediction().map(|p| p.label)
  }

  pub fn prediction(&self) -> Option<Prediction> {
    self
      .latest
      .lock()
      .unwrap_or_else(|p| p.into_inner())
      .clone()
  }
}

impl Render for LatestLabel {
  fn render_result(&self, result: &Prediction) -> Result<(), OutputError> {
    *self.latest.lock().unwrap_or_else(|p| p.into_inner()) = Some(result.clone());
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use std::time::Duration;

  use super::*;
  use crate::{label::LabelIndexOutOfRange, pipeline::ClassifyError};

  fn prediction(label: &str) -> Prediction {
    Prediction {
      sequence: 0,
      index: 0,
      label: label.to_string(),
      score: 1.0,
      scores: vec![1.0],
      latency: Duration::ZERO,
    }
  }

  #[test]
  fn latest_label_survives_errors() {
    let latest = LatestLabel::new();
    assert_eq!(latest.label(), None);

    latest.render_result(&prediction("boletus")).unwrap();
    latest
      .render_error(&ClassifyError::from(LabelIndexOutOfRange { index: 3, len: 1 }))
      .unwrap();
    assert_eq!(latest.label().as_deref(), Some("boletus"));

    latest.render_result(&prediction("amanita")).unwrap();
    assert_eq!(latest.label().as_deref(), Some("amanita"));
  }

  #[test]
  fn channel_forwards_and_reports_disconnect() {
    let (output, receiver) = ChannelOutput::new();
    output.render_result(&prediction("boletus")).unwrap();
    assert_eq!(receiver.recv().unwrap().label, "boletus");

    drop(receiver);
    assert!(matches!(
      output.render_result(&prediction("boletus")),
      Err(OutputError::Disconnected)
    ));
  }
}
