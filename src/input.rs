// 该文件是 Jungu （菌菇） 项目的一部分。
// src/input.rs - 帧源
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
  sync::{
    Arc,
    atomic::{AtomicBool, AtomicU64, Ordering},
  },
  thread::{self, JoinHandle},
  time::{Duration, Instant},
};

use thiserror::Error;
use tracing::{debug, warn};

use crate::{
  FromUrl, FromUrlWithScheme,
  frame::{RawFrame, SourceFrame},
};

/// 帧源在自己的线程上调用的回调
pub type FrameHandler = Arc<dyn Fn(SourceFrame) + Send + Sync>;

/// 推送式帧源。
///
/// 帧源在自己的线程上逐帧调用处理函数，每一帧都携带一次性的释放回调。
pub trait FrameSource: Send {
  fn start(&mut self, handler: FrameHandler) -> Result<(), InputError>;

  /// 停止推送，返回后不再调用处理函数
  fn stop(&mut self);
}

mod synthetic;
pub use self::synthetic::{SyntheticFormat, SyntheticSource, solid_frame};

#[cfg(feature = "read_image_file")]
mod read_image_file;
#[cfg(feature = "read_image_file")]
pub use self::read_image_file::{ImageFileInputError, ImageFileSource};

#[cfg(feature = "gstreamer_input")]
mod gstreamer_input;
#[cfg(feature = "gstreamer_input")]
pub use self::gstreamer_input::{
  GStreamerInputError, GStreamerInputPipelineBuilder, GStreamerSource,
};

#[derive(Error, Debug)]
pub enum InputError {
  #[cfg(feature = "read_image_file")]
  #[error("图像文件输入错误: {0}")]
  ImageFileInputError(#[from] ImageFileInputError),
  #[cfg(feature = "gstreamer_input")]
  #[error("GStreamer 输入错误: {0}")]
  GStreamerInputError(#[from] GStreamerInputError),
  #[error("参数错误: {0}")]
  InvalidParameter(String),
  #[error("帧源已启动")]
  AlreadyStarted,
  #[error("无法创建帧源线程: {0}")]
  Spawn(std::io::Error),
  #[error("URI 方案不匹配")]
  SchemeMismatch,
}

/// 帧源计数器快照
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SourceStats {
  pub delivered: u64,
  pub released: u64,
}

impl SourceStats {
  /// 已交付但尚未释放的帧数
  pub fn outstanding(&self) -> u64 {
    self.delivered.saturating_sub(self.released)
  }
}

#[derive(Debug, Default)]
pub(crate) struct SourceCounters {
  delivered: AtomicU64,
  released: AtomicU64,
}

impl SourceCounters {
  pub(crate) fn snapshot(&self) -> SourceStats {
    SourceStats {
      delivered: self.delivered.load(Ordering::Acquire),
      released: self.released.load(Ordering::Acquire),
    }
  }

  /// 包装一帧：计入交付数，释放时计入释放数
  pub(crate) fn wrap<F>(self: &Arc<Self>, raw: RawFrame, sequence: u64, release: F) -> SourceFrame
  where
    F: FnOnce() + Send + 'static,
  {
    self.delivered.fetch_add(1, Ordering::AcqRel);
    let counters = self.clone();
    SourceFrame::new(raw, sequence, move || {
      release();
      counters.released.fetch_add(1, Ordering::AcqRel);
    })
  }
}

type Produce = Box<dyn FnMut(u64) -> RawFrame + Send>;

/// 按固定帧率在独立线程上产生帧
pub(crate) struct PacedThread {
  name: &'static str,
  fps: f64,
  count: Option<u64>,
  counters: Arc<SourceCounters>,
  running: Arc<AtomicBool>,
  handle: Option<JoinHandle<()>>,
}

impl PacedThread {
  pub(crate) fn new(name: &'static str, fps: f64, count: Option<u64>) -> Self {
    Self {
      name,
      fps,
      count,
      counters: Arc::new(SourceCounters::default()),
      running: Arc::new(AtomicBool::new(false)),
      handle: None,
    }
  }

  pub(crate) fn stats(&self) -> SourceStats {
    self.counters.snapshot()
  }

  /// 线程已启动并且仍在产生帧
  pub(crate) fn is_running(&self) -> bool {
    self.running.load(Ordering::Acquire)
  }

  pub(crate) fn start(&mut self, mut produce: Produce, handler: FrameHandler) -> Result<(), InputError> {
    if self.handle.is_some() {
      return Err(InputError::AlreadyStarted);
    }

    let interval = if self.fps > 0.0 {
      Duration::from_secs_f64(1.0 / self.fps)
    } else {
      Duration::ZERO
    };
    let count = self.count;
    let counters = self.counters.clone();
    let running = self.running.clone();
    running.store(true, Ordering::Release);

    let handle = thread::Builder::new()
      .name(format!("jungu-{}", self.name))
      .spawn(move || {
        let mut sequence = 0u64;
        let mut next = Instant::now();
        while running.load(Ordering::Acquire) {
          if count.is_some_and(|count| sequence >= count) {
            debug!("已产生 {} 帧，帧源结束", sequence);
            break;
          }
          let frame = counters.wrap(produce(sequence), sequence, || {});
          handler(frame);
          sequence += 1;

          next += interval;
          let now = Instant::now();
          if next > now {
            thread::sleep(next - now);
          } else {
            next = now;
          }
        }
        running.store(false, Ordering::Release);
      })
      .map_err(|e| {
        self.running.store(false, Ordering::Release);
        InputError::Spawn(e)
      })?;

    self.handle = Some(handle);
    Ok(())
  }

  pub(crate) fn stop(&mut self) {
    self.running.store(false, Ordering::Release);
    if let Some(handle) = self.handle.take()
      && handle.join().is_err()
    {
      warn!("帧源线程 {} 异常退出", self.name);
    }
  }
}

impl Drop for PacedThread {
  fn drop(&mut self) {
    self.stop();
  }
}

pub enum InputWrapper {
  Synthetic(SyntheticSource),
  #[cfg(feature = "read_image_file")]
  ImageFile(ImageFileSource),
  #[cfg(feature = "gstreamer_input")]
  GStreamer(GStreamerSource),
}

impl FromUrl for InputWrapper {
  type Error = InputError;

  fn from_url(url: &url::Url) -> Result<Self, Self::Error> {
    #[cfg(feature = "gstreamer_input")]
    {
      if url.scheme() == GStreamerInputPipelineBuilder::SCHEME {
        let input = GStreamerInputPipelineBuilder::from_url(url)?.build()?;
        return Ok(InputWrapper::GStreamer(input));
      }
    }
    #[cfg(feature = "read_image_file")]
    {
      if url.scheme() == ImageFileSource::SCHEME {
        let input = ImageFileSource::from_url(url)?;
        return Ok(InputWrapper::ImageFile(input));
      }
    }
    if url.scheme() == SyntheticSource::SCHEME {
      return Ok(InputWrapper::Synthetic(SyntheticSource::from_url(url)?));
    }
    Err(InputError::SchemeMismatch)
  }
}

impl FrameSource for InputWrapper {
  fn start(&mut self, handler: FrameHandler) -> Result<(), InputError> {
    match self {
      InputWrapper::Synthetic(input) => input.start(handler),
      #[cfg(feature = "read_image_file")]
      InputWrapper::ImageFile(input) => input.start(handler),
      #[cfg(feature = "gstreamer_input")]
      InputWrapper::GStreamer(input) => input.start(handler),
    }
  }

  fn stop(&mut self) {
    match self {
      InputWrapper::Synthetic(input) => input.stop(),
      #[cfg(feature = "read_image_file")]
      InputWrapper::ImageFile(input) => input.stop(),
      #[cfg(feature = "gstreamer_input")]
      InputWrapper::GStreamer(input) => input.stop(),
    }
  }
}

#[cfg(test)]
mod tests {
  use std::sync::Mutex;

  use super::*;

  #[test]
  fn paced_thread_stops_after_count() {
    let mut paced = PacedThread::new("test", 0.0, Some(5));
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    paced
      .start(
        Box::new(|_| RawFrame::solid_rgba(2, 2, [0, 0, 0])),
        Arc::new(move |frame: SourceFrame| sink.lock().unwrap().push(frame.sequence())),
      )
      .unwrap();
    while paced.is_running() {
      thread::sleep(Duration::from_millis(1));
    }
    paced.stop();

    assert_eq!(*seen.lock().unwrap(), vec![0, 1, 2, 3, 4]);
    let stats = paced.stats();
    assert_eq!(stats.delivered, 5);
    assert_eq!(stats.released, 5);
    assert_eq!(stats.outstanding(), 0);
  }

  #[test]
  fn paced_thread_cannot_start_twice() {
    let mut paced = PacedThread::new("test", 1000.0, Some(1));
    let handler: FrameHandler = Arc::new(|_| {});
    paced
      .start(Box::new(|_| RawFrame::solid_rgba(1, 1, [0, 0, 0])), handler.clone())
      .unwrap();
    assert!(matches!(
      paced.start(Box::new(|_| RawFrame::solid_rgba(1, 1, [0, 0, 0])), handler),
      Err(InputError::AlreadyStarted)
    ));
  }

  #[test]
  fn unknown_input_scheme() {
    let url = url::Url::parse("rtmp://localhost/live").unwrap();
    assert!(matches!(
      InputWrapper::from_url(&url),
      Err(InputError::SchemeMismatch)
    ));
  }
}
