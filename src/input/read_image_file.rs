// 该文件是 Jungu （菌菇） 项目的一部分。
// src/input/read_image_file.rs - 图像文件输入
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

use std::path::Path;

use image::{ImageReader, RgbImage};
use thiserror::Error;
use tracing::{error, info};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  frame::{PixelFormat, RawFrame},
  input::{FrameHandler, FrameSource, InputError, PacedThread, SourceStats},
};

#[derive(Error, Debug)]
pub enum ImageFileInputError {
  #[error("URI 方案不匹配")]
  SchemaMismatch,
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("图像加载错误: {0}")]
  ImageLoadError(#[from] image::ImageError),
  #[error("参数错误: {0}")]
  InvalidParameter(String),
}

const DEFAULT_FPS: f64 = 5.0;

/// 把一张静态图片按固定帧率重复推送，默认只推送一次。
///
/// `image:///data/boletus.jpg?fps=5&count=20`
pub struct ImageFileSource {
  frame: RawFrame,
  paced: PacedThread,
}

impl FromUrlWithScheme for ImageFileSource {
  const SCHEME: &'static str = "image";
}

impl FromUrl for ImageFileSource {
  type Error = ImageFileInputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      error!(
        "URI 方案不匹配: 期望 '{}', 实际 '{}'",
        Self::SCHEME,
        url.scheme()
      );
      return Err(ImageFileInputError::SchemaMismatch);
    }

    let mut fps = DEFAULT_FPS;
    let mut count = Some(1);
    for (k, v) in url.query_pairs() {
      let invalid = || ImageFileInputError::InvalidParameter(format!("{}={}", k, v));
      match k.as_ref() {
        "fps" => fps = v.parse().map_err(|_| invalid())?,
        "count" if v == "inf" => count = None,
        "count" => count = Some(v.parse().map_err(|_| invalid())?),
        _ => {}
      }
    }

    Self::open(url.path(), fps, count)
  }
}

impl ImageFileSource {
  pub fn open(path: impl AsRef<Path>, fps: f64, count: Option<u64>) -> Result<Self, ImageFileInputError> {
    let path = path.as_ref();
    let image = ImageReader::open(path)?.decode()?;
    info!(
      "读取图像文件 {}: {}x{}",
      path.display(),
      image.width(),
      image.height()
    );
    Ok(Self::from_image(image.into_rgb8(), fps, count))
  }

  pub fn from_image(image: RgbImage, fps: f64, count: Option<u64>) -> Self {
    let (width, height) = image.dimensions();
    let frame = RawFrame::packed(width, height, PixelFormat::Rgb888, image.into_raw());
    Self {
      frame,
      paced: PacedThread::new("image", fps, count),
    }
  }

  pub fn frame(&self) -> &RawFrame {
    &self.frame
  }

  pub fn stats(&self) -> SourceStats {
    self.paced.stats()
  }
}

impl FrameSource for ImageFileSource {
  fn start(&mut self, handler: FrameHandler) -> Result<(), InputError> {
    let frame = self.frame.clone();
    self.paced.start(Box::new(move |_| frame.clone()), handler)
  }

  fn stop(&mut self) {
    self.paced.stop();
  }
}
