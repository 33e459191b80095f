// 该文件是 Jungu （菌菇） 项目的一部分。
// src/frame.rs - 原始帧与归一化张量定义
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

use std::fmt;

pub const RGB_CHANNELS: usize = 3;

/// 像素格式标签
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PixelFormat {
  /// 单平面 RGBA，每像素 4 字节
  Rgba8888,
  /// 单平面 RGB，每像素 3 字节
  Rgb888,
  /// 单平面 BGR，每像素 3 字节
  Bgr888,
  /// 三平面 YUV 4:2:0（Y / U / V），通过像素步长兼容 I420、NV12 与 NV21
  Yuv420,
}

impl PixelFormat {
  pub fn plane_count(&self) -> usize {
    match self {
      PixelFormat::Rgba8888 | PixelFormat::Rgb888 | PixelFormat::Bgr888 => 1,
      PixelFormat::Yuv420 => 3,
    }
  }

  /// 紧凑排列时单平面格式的每像素字节数
  pub fn packed_pixel_stride(&self) -> Option<usize> {
    match self {
      PixelFormat::Rgba8888 => Some(4),
      PixelFormat::Rgb888 | PixelFormat::Bgr888 => Some(3),
      PixelFormat::Yuv420 => None,
    }
  }
}

impl fmt::Display for PixelFormat {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let name = match self {
      PixelFormat::Rgba8888 => "RGBA_8888",
      PixelFormat::Rgb888 => "RGB_888",
      PixelFormat::Bgr888 => "BGR_888",
      PixelFormat::Yuv420 => "YUV_420",
    };
    f.write_str(name)
  }
}

/// 单个像素平面
#[derive(Debug, Clone)]
pub struct Plane {
  pub data: Vec<u8>,
  /// 相邻两行起始位置之间的字节数
  pub row_stride: usize,
  /// 同一行相邻两个像素之间的字节数
  pub pixel_stride: usize,
}

impl Plane {
  pub fn new(data: Vec<u8>, row_stride: usize, pixel_stride: usize) -> Self {
    Self {
      data,
      row_stride,
      pixel_stride,
    }
  }
}

/// 帧源交付的原始帧
#[derive(Debug, Clone)]
pub struct RawFrame {
  pub width: u32,
  pub height: u32,
  pub format: PixelFormat,
  pub planes: Vec<Plane>,
}

impl RawFrame {
  pub fn new(width: u32, height: u32, format: PixelFormat, planes: Vec<Plane>) -> Self {
    Self {
      width,
      height,
      format,
      planes,
    }
  }

  /// 构造紧凑排列的单平面帧
  pub fn packed(width: u32, height: u32, format: PixelFormat, data: Vec<u8>) -> Self {
    let pixel_stride = format.packed_pixel_stride().unwrap_or(1);
    let row_stride = width as usize * pixel_stride;
    Self::new(
      width,
      height,
      format,
      vec![Plane::new(data, row_stride, pixel_stride)],
    )
  }

  /// 构造纯色 RGBA 帧
  pub fn solid_rgba(width: u32, height: u32, rgb: [u8; 3]) -> Self {
    let pixel = [rgb[0], rgb[1], rgb[2], u8::MAX];
    let data = pixel
      .iter()
      .copied()
      .cycle()
      .take(width as usize * height as usize * 4)
      .collect();
    Self::packed(width, height, PixelFormat::Rgba8888, data)
  }
}

type ReleaseFn = Box<dyn FnOnce() + Send>;

/// 帧源持有的帧：原始数据加上一次性的释放回调。
///
/// 释放回调在 [`SourceFrame::release`] 或析构时执行，并且只会执行一次。
pub struct SourceFrame {
  raw: RawFrame,
  sequence: u64,
  release: Option<ReleaseFn>,
}

impl SourceFrame {
  pub fn new<F>(raw: RawFrame, sequence: u64, release: F) -> Self
  where
    F: FnOnce() + Send + 'static,
  {
    Self {
      raw,
      sequence,
      release: Some(Box::new(release)),
    }
  }

  /// 无需通知帧源的帧
  pub fn detached(raw: RawFrame, sequence: u64) -> Self {
    Self {
      raw,
      sequence,
      release: None,
    }
  }

  pub fn raw(&self) -> &RawFrame {
    &self.raw
  }

  pub fn sequence(&self) -> u64 {
    self.sequence
  }

  /// 将帧交还给帧源
  pub fn release(mut self) {
    self.run_release();
  }

  fn run_release(&mut self) {
    if let Some(release) = self.release.take() {
      release();
    }
  }
}

impl Drop for SourceFrame {
  fn drop(&mut self) {
    self.run_release();
  }
}

impl fmt::Debug for SourceFrame {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("SourceFrame")
      .field("sequence", &self.sequence)
      .field("width", &self.raw.width)
      .field("height", &self.raw.height)
      .field("format", &self.raw.format)
      .field("pending_release", &self.release.is_some())
      .finish()
  }
}

/// 模型输入张量，形状为 (1, S, S, 3)，行优先，RGB 通道顺序，取值范围 [0, 255]
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedTensor {
  size: usize,
  data: Box<[f32]>,
}

impl NormalizedTensor {
  pub fn zeros(size: usize) -> Self {
    Self {
      size,
      data: vec![0.0; size * size * RGB_CHANNELS].into_boxed_slice(),
    }
  }

  pub(crate) fn from_vec(size: usize, data: Vec<f32>) -> Self {
    debug_assert_eq!(data.len(), size * size * RGB_CHANNELS);
    Self {
      size,
      data: data.into_boxed_slice(),
    }
  }

  pub fn size(&self) -> usize {
    self.size
  }

  pub fn shape(&self) -> [usize; 4] {
    [1, self.size, self.size, RGB_CHANNELS]
  }

  pub fn as_slice(&self) -> &[f32] {
    &self.data
  }

  pub fn into_vec(self) -> Vec<f32> {
    self.data.into_vec()
  }

  /// 转回 NHWC 字节，供以 uint8 为输入的后端使用；张量值本就是整数字节值，转换无损
  pub fn to_bytes(&self) -> Vec<u8> {
    self.data.iter().map(|&v| v.clamp(0.0, 255.0) as u8).collect()
  }

  /// 读取 (y, x) 处的 RGB 三元组
  pub fn pixel(&self, y: usize, x: usize) -> [f32; 3] {
    let offset = (y * self.size + x) * RGB_CHANNELS;
    [self.data[offset], self.data[offset + 1], self.data[offset + 2]]
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::sync::{
    Arc,
    atomic::{AtomicUsize, Ordering},
  };

  fn counting_frame(counter: &Arc<AtomicUsize>) -> SourceFrame {
    let counter = counter.clone();
    SourceFrame::new(RawFrame::solid_rgba(4, 4, [1, 2, 3]), 0, move || {
      counter.fetch_add(1, Ordering::SeqCst);
    })
  }

  #[test]
  fn explicit_release_runs_callback_once() {
    let counter = Arc::new(AtomicUsize::new(0));
    let frame = counting_frame(&counter);
    frame.release();
    assert_eq!(counter.load(Ordering::SeqCst), 1);
  }

  #[test]
  fn drop_releases_frame() {
    let counter = Arc::new(AtomicUsize::new(0));
    {
      let _frame = counting_frame(&counter);
    }
    assert_eq!(counter.load(Ordering::SeqCst), 1);
  }

  #[test]
  fn solid_rgba_is_packed() {
    let frame = RawFrame::solid_rgba(3, 2, [10, 20, 30]);
    assert_eq!(frame.planes.len(), 1);
    assert_eq!(frame.planes[0].row_stride, 12);
    assert_eq!(frame.planes[0].pixel_stride, 4);
    assert_eq!(&frame.planes[0].data[4..8], &[10, 20, 30, 255]);
  }

  #[test]
  fn tensor_bytes_are_channel_values() {
    let tensor = NormalizedTensor::from_vec(1, vec![0.0, 128.0, 255.0]);
    assert_eq!(tensor.to_bytes(), vec![0, 128, 255]);
    assert_eq!(tensor.shape(), [1, 1, 1, 3]);
  }
}
