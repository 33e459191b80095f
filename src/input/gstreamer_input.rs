// 该文件是 Jungu （菌菇） 项目的一部分。
// src/input/gstreamer_input.rs - GStreamer 输入
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

//! # GStreamer 帧源
//!
//! 摄像头或视频文件经 `videoconvert` 转为分析格式后进入 appsink，
//! appsink 的 `new-sample` 回调在 GStreamer 流线程上把每个样本推给处理函数。
//! 样本在帧被释放之前一直保持引用。
//!
//! ## 系统依赖
//!
//! **Ubuntu/Debian:**
//! ```bash
//! sudo apt-get install libgstreamer1.0-dev libgstreamer-plugins-base1.0-dev
//! ```
//!
//! ## URL
//!
//! - `gst://camera/dev/video0?width=640&height=480&fps=30&format=RGBA`
//! - `gst://file/data/forest.mp4?format=NV12`
//!
//! `format` 可选 `RGBA`（默认）、`RGB`、`BGR`、`I420`、`NV12`、`NV21`。

use std::{
  collections::HashMap,
  sync::{
    Arc,
    atomic::{AtomicU64, Ordering},
  },
};

use gstreamer::{self as gst, prelude::*};
use gstreamer_app as gst_app;
use gstreamer_video as gst_video;
use thiserror::Error;
use tracing::{debug, error, info, warn};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  frame::{PixelFormat, Plane, RawFrame},
  input::{FrameHandler, FrameSource, InputError, SourceCounters, SourceStats},
};

/// GStreamer 输入错误类型
#[derive(Error, Debug)]
pub enum GStreamerInputError {
  /// URI scheme 不匹配（期望 "gst://"）
  #[error("URI 方案不匹配")]
  SchemeMismatch,
  #[error("GStreamer 错误: {0}")]
  GStreamerError(#[from] gst::glib::Error),
  #[error("GStreamer 操作失败: {0}")]
  GStreamerBoolError(#[from] gst::glib::BoolError),
  #[error("找不到 appsink 元素")]
  AppSinkNotFound,
  #[error("元素无法转换为 appsink")]
  AppSinkConversionFailed,
  #[error("无法从 caps 获取视频信息")]
  VideoInfoError,
  #[error("不支持的视频格式: {0}")]
  UnsupportedFormat(String),
  #[error("管道错误: {0}")]
  PipelineError(String),
  #[error("缓冲区大小不足: 需要 {expected} 字节, 实际 {actual} 字节")]
  BufferSizeMismatch { expected: usize, actual: usize },
  #[error("状态改变错误: {0}")]
  StateChangeError(#[from] gst::StateChangeError),
}

const DEFAULT_TARGET_FORMAT: &str = "RGBA";
const SUPPORTED_FORMATS: [&str; 6] = ["RGBA", "RGB", "BGR", "I420", "NV12", "NV21"];

pub enum GStreamerInputBuilderItem {
  FileSource(String),
  CameraSource {
    camera: String,
    io_mode: Option<u32>,
    width: u32,
    height: u32,
    fps: u32,
  },
  TargetFormat {
    format: String,
  },
}

impl GStreamerInputBuilderItem {
  fn to_pipeline(&self) -> String {
    match self {
      GStreamerInputBuilderItem::FileSource(path) => {
        format!("filesrc location={} ! decodebin", path)
      }
      GStreamerInputBuilderItem::CameraSource {
        camera,
        io_mode,
        width,
        height,
        fps,
      } => {
        let io_mode_str = if let Some(mode) = io_mode {
          format!(" io-mode={}", mode)
        } else {
          "".to_string()
        };
        format!(
          "v4l2src device={}{} ! video/x-raw,width={},height={},framerate={}/1",
          camera, io_mode_str, width, height, fps
        )
      }
      GStreamerInputBuilderItem::TargetFormat { format } => {
        format!("videoconvert ! video/x-raw,format={}", format)
      }
    }
  }
}

/// GStreamer 输入管道构建器
///
/// ```no_run
/// use jungu::input::GStreamerInputPipelineBuilder;
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let source = GStreamerInputPipelineBuilder::default()
///     .camera("/dev/video0", 640, 480, 30)
///     .target_format("NV12")
///     .build()?;
/// # Ok(())
/// # }
/// ```
#[derive(Default)]
pub struct GStreamerInputPipelineBuilder {
  items: Vec<GStreamerInputBuilderItem>,
}

impl FromUrlWithScheme for GStreamerInputPipelineBuilder {
  const SCHEME: &'static str = "gst";
}

impl GStreamerInputPipelineBuilder {
  pub fn camera(mut self, camera: &str, width: u32, height: u32, fps: u32) -> Self {
    self.items.push(GStreamerInputBuilderItem::CameraSource {
      camera: camera.to_string(),
      io_mode: None,
      width,
      height,
      fps,
    });
    self
  }

  pub fn file(mut self, path: &str) -> Self {
    self
      .items
      .push(GStreamerInputBuilderItem::FileSource(path.to_string()));
    self
  }

  pub fn target_format(mut self, format: &str) -> Self {
    self.items.push(GStreamerInputBuilderItem::TargetFormat {
      format: format.to_string(),
    });
    self
  }

  fn build_video_pipline(path: &str, query: &HashMap<String, String>) -> Self {
    let camera = path.to_string();
    let io_mode = query.get("io-mode").and_then(|v| v.parse::<u32>().ok());
    let width = query
      .get("width")
      .and_then(|v| v.parse::<u32>().ok())
      .unwrap_or(640);
    let height = query
      .get("height")
      .and_then(|v| v.parse::<u32>().ok())
      .unwrap_or(480);
    let fps = query
      .get("fps")
      .and_then(|v| v.parse::<u32>().ok())
      .unwrap_or(30);

    GStreamerInputPipelineBuilder {
      items: vec![GStreamerInputBuilderItem::CameraSource {
        camera,
        io_mode,
        width,
        height,
        fps,
      }],
    }
  }

  fn pipeline_description(&self) -> String {
    let basic_pipeline = self
      .items
      .iter()
      .map(GStreamerInputBuilderItem::to_pipeline)
      .collect::<Vec<String>>()
      .join(" ! ");
    format!(
      "{} ! appsink max-buffers=2 drop=true name=sink",
      basic_pipeline
    )
  }

  pub fn build(self) -> Result<GStreamerSource, GStreamerInputError> {
    gst::init()?;

    let full_pipeline = self.pipeline_description();
    info!("GStreamer 管道描述: {}", full_pipeline);

    let pipeline = gst::parse::launch(&full_pipeline)?
      .downcast::<gst::Pipeline>()
      .map_err(|_| GStreamerInputError::PipelineError("无法创建管道".to_string()))?;

    let appsink = pipeline
      .by_name("sink")
      .ok_or(GStreamerInputError::AppSinkNotFound)?
      .downcast::<gst_app::AppSink>()
      .map_err(|_| GStreamerInputError::AppSinkConversionFailed)?;

    Ok(GStreamerSource {
      pipeline,
      appsink,
      counters: Arc::new(SourceCounters::default()),
      playing: false,
    })
  }
}

impl FromUrl for GStreamerInputPipelineBuilder {
  type Error = GStreamerInputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(GStreamerInputError::SchemeMismatch);
    }

    let query: HashMap<String, String> = url
      .query_pairs()
      .map(|(k, v)| (String::from(k), String::from(v)))
      .collect();

    let builder = match url.host_str() {
      Some("camera") => Self::build_video_pipline(url.path(), &query),
      Some("file") => Self::default().file(url.path()),
      _ => {
        return Err(GStreamerInputError::SchemeMismatch);
      }
    };

    let format = query
      .get("format")
      .map(|f| f.to_ascii_uppercase())
      .unwrap_or_else(|| DEFAULT_TARGET_FORMAT.to_string());
    if !SUPPORTED_FORMATS.contains(&format.as_str()) {
      return Err(GStreamerInputError::UnsupportedFormat(format));
    }

    Ok(builder.target_format(&format))
  }
}

/// 基于 appsink 回调的推送式帧源
pub struct GStreamerSource {
  pipeline: gst::Pipeline,
  appsink: gst_app::AppSink,
  counters: Arc<SourceCounters>,
  playing: bool,
}

impl GStreamerSource {
  pub fn stats(&self) -> SourceStats {
    self.counters.snapshot()
  }
}

impl FrameSource for GStreamerSource {
  fn start(&mut self, handler: FrameHandler) -> Result<(), InputError> {
    if self.playing {
      return Err(InputError::AlreadyStarted);
    }

    let counters = self.counters.clone();
    let sequence = AtomicU64::new(0);
    self.appsink.set_callbacks(
      gst_app::AppSinkCallbacks::builder()
        .new_sample(move |appsink| {
          let sample = appsink.pull_sample().map_err(|_| gst::FlowError::Eos)?;
          match sample_to_frame(&sample) {
            Ok(raw) => {
              let sequence = sequence.fetch_add(1, Ordering::Relaxed);
              // 样本随释放回调一起被丢弃，缓冲区在此之前不会被复用
              let frame = counters.wrap(raw, sequence, move || drop(sample));
              handler(frame);
            }
            Err(e) => warn!("无法转换样本: {}", e),
          }
          Ok(gst::FlowSuccess::Ok)
        })
        .build(),
    );

    self
      .pipeline
      .set_state(gst::State::Playing)
      .map_err(GStreamerInputError::from)?;
    self.playing = true;
    info!("GStreamer 帧源已启动");
    Ok(())
  }

  fn stop(&mut self) {
    if !self.playing {
      return;
    }
    // 切换到 Null 会等待流线程退出，返回后不再有回调
    if let Err(e) = self.pipeline.set_state(gst::State::Null) {
      error!("无法停止 GStreamer 管道: {}", e);
    }
    self.playing = false;
    debug!("GStreamer 帧源已停止: {:?}", self.stats());
  }
}

impl Drop for GStreamerSource {
  fn drop(&mut self) {
    self.stop();
  }
}

fn plane(data: &[u8], offset: usize, row_stride: usize, pixel_stride: usize) -> Plane {
  Plane::new(data[offset.min(data.len())..].to_vec(), row_stride, pixel_stride)
}

fn sample_to_frame(sample: &gst::Sample) -> Result<RawFrame, GStreamerInputError> {
  let buffer = sample
    .buffer()
    .ok_or_else(|| GStreamerInputError::PipelineError("样本中没有缓冲区".to_string()))?;
  let caps = sample
    .caps()
    .ok_or_else(|| GStreamerInputError::PipelineError("样本中没有 caps".to_string()))?;
  let info =
    gst_video::VideoInfo::from_caps(caps).map_err(|_| GStreamerInputError::VideoInfoError)?;

  let map = buffer.map_readable().map_err(|e| {
    GStreamerInputError::PipelineError(format!("无法映射缓冲区: {}", e))
  })?;
  let data = map.as_slice();
  if data.len() < info.size() {
    return Err(GStreamerInputError::BufferSizeMismatch {
      expected: info.size(),
      actual: data.len(),
    });
  }

  let offsets = info.offset();
  let strides: Vec<usize> = info.stride().iter().map(|&s| s.max(0) as usize).collect();
  let (width, height) = (info.width(), info.height());

  let (format, planes) = match info.format() {
    gst_video::VideoFormat::Rgba => (
      PixelFormat::Rgba8888,
      vec![plane(data, offsets[0], strides[0], 4)],
    ),
    gst_video::VideoFormat::Rgb => (
      PixelFormat::Rgb888,
      vec![plane(data, offsets[0], strides[0], 3)],
    ),
    gst_video::VideoFormat::Bgr => (
      PixelFormat::Bgr888,
      vec![plane(data, offsets[0], strides[0], 3)],
    ),
    gst_video::VideoFormat::I420 => (
      PixelFormat::Yuv420,
      vec![
        plane(data, offsets[0], strides[0], 1),
        plane(data, offsets[1], strides[1], 1),
        plane(data, offsets[2], strides[2], 1),
      ],
    ),
    gst_video::VideoFormat::Nv12 => (
      PixelFormat::Yuv420,
      vec![
        plane(data, offsets[0], strides[0], 1),
        plane(data, offsets[1], strides[1], 2),
        plane(data, offsets[1] + 1, strides[1], 2),
      ],
    ),
    gst_video::VideoFormat::Nv21 => (
      PixelFormat::Yuv420,
      vec![
        plane(data, offsets[0], strides[0], 1),
        plane(data, offsets[1] + 1, strides[1], 2),
        plane(data, offsets[1], strides[1], 2),
      ],
    ),
    other => {
      return Err(GStreamerInputError::UnsupportedFormat(format!(
        "{:?}",
        other
      )));
    }
  };

  Ok(RawFrame::new(width, height, format, planes))
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn camera_url_builds_appsink_pipeline() {
    let url = Url::parse("gst://camera/dev/video0?width=320&height=240&fps=15").unwrap();
    let builder = GStreamerInputPipelineBuilder::from_url(&url).unwrap();
    assert_eq!(
      builder.pipeline_description(),
      "v4l2src device=/dev/video0 ! video/x-raw,width=320,height=240,framerate=15/1 ! \
       videoconvert ! video/x-raw,format=RGBA ! appsink max-buffers=2 drop=true name=sink"
    );
  }

  #[test]
  fn file_url_with_format() {
    let url = Url::parse("gst://file/data/forest.mp4?format=nv12").unwrap();
    let builder = GStreamerInputPipelineBuilder::from_url(&url).unwrap();
    assert!(
      builder
        .pipeline_description()
        .starts_with("filesrc location=/data/forest.mp4 ! decodebin ! videoconvert ! video/x-raw,format=NV12")
    );

    let bad = Url::parse("gst://file/data/forest.mp4?format=YUY2").unwrap();
    assert!(matches!(
      GStreamerInputPipelineBuilder::from_url(&bad),
      Err(GStreamerInputError::UnsupportedFormat(_))
    ));
  }
}
