// 该文件是 Jungu （菌菇） 项目的一部分。
// src/preprocess.rs - 帧预处理
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

//! # 帧预处理
//!
//! 将帧源交付的原始平面缓冲区直接转换为模型输入张量：
//!
//! 1. 按像素格式与步长解析平面，重建无行填充的紧凑 RGB 图像（丢弃 alpha）；
//! 2. 按配置旋转（默认顺时针 90°，对应横置传感器竖屏使用）；
//! 3. 双线性插值缩放到 S×S；
//! 4. 每个通道字节按无符号解释写出为 `f32`，取值范围 [0, 255]。
//!
//! 整个过程不经过任何图像库，结果只取决于输入字节与配置。

use std::{fmt, str::FromStr};

use thiserror::Error;

use crate::frame::{NormalizedTensor, PixelFormat, Plane, RGB_CHANNELS, RawFrame};

pub const DEFAULT_INPUT_SIZE: usize = 224;

const COEF_BITS: u32 = 11;
const COEF_SCALE: i32 = 1 << COEF_BITS;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PreprocessError {
  #[error("无效的帧格式 {format}: {reason}")]
  InvalidFrameFormat { format: PixelFormat, reason: String },
  #[error("空帧: {0}")]
  EmptyFrame(String),
}

impl PreprocessError {
  fn invalid(format: PixelFormat, reason: impl Into<String>) -> Self {
    PreprocessError::InvalidFrameFormat {
      format,
      reason: reason.into(),
    }
  }
}

/// 图像旋转策略
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Rotation {
  None,
  #[default]
  Clockwise90,
  Rotate180,
  Counterclockwise90,
}

impl Rotation {
  pub fn from_degrees(degrees: u32) -> Option<Self> {
    match degrees % 360 {
      0 => Some(Rotation::None),
      90 => Some(Rotation::Clockwise90),
      180 => Some(Rotation::Rotate180),
      270 => Some(Rotation::Counterclockwise90),
      _ => None,
    }
  }

  pub fn degrees(&self) -> u32 {
    match self {
      Rotation::None => 0,
      Rotation::Clockwise90 => 90,
      Rotation::Rotate180 => 180,
      Rotation::Counterclockwise90 => 270,
    }
  }
}

impl FromStr for Rotation {
  type Err = String;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    s.trim()
      .parse::<u32>()
      .ok()
      .and_then(Rotation::from_degrees)
      .ok_or_else(|| format!("不支持的旋转角度 '{}'，可选 0 / 90 / 180 / 270", s))
  }
}

impl fmt::Display for Rotation {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}", self.degrees())
  }
}

/// 通道字节到张量值的映射，字节总是按无符号解释
#[inline]
pub fn channel_value(byte: u8) -> f32 {
  f32::from(byte)
}

/// 帧预处理器，无共享状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Preprocessor {
  size: usize,
  rotation: Rotation,
}

impl Default for Preprocessor {
  fn default() -> Self {
    Self::new(DEFAULT_INPUT_SIZE, Rotation::default())
  }
}

impl Preprocessor {
  pub fn new(size: usize, rotation: Rotation) -> Self {
    Self { size, rotation }
  }

  pub fn size(&self) -> usize {
    self.size
  }

  pub fn rotation(&self) -> Rotation {
    self.rotation
  }

  pub fn normalize(&self, frame: &RawFrame) -> Result<NormalizedTensor, PreprocessError> {
    if self.size == 0 {
      return Err(PreprocessError::EmptyFrame("目标尺寸为 0".to_string()));
    }
    let image = DenseRgb::decode(frame)?;
    let image = image.rotate(self.rotation);
    let image = image.resize_bilinear(self.size, self.size);
    let data = image.data.iter().copied().map(channel_value).collect();
    Ok(NormalizedTensor::from_vec(self.size, data))
  }
}

/// 紧凑排列的 RGB 图像，无行填充
#[derive(Debug, Clone, PartialEq, Eq)]
struct DenseRgb {
  width: usize,
  height: usize,
  data: Vec<u8>,
}

impl DenseRgb {
  fn decode(frame: &RawFrame) -> Result<Self, PreprocessError> {
    let format = frame.format;
    if frame.width == 0 || frame.height == 0 {
      return Err(PreprocessError::EmptyFrame(format!(
        "帧尺寸为 {}x{}",
        frame.width, frame.height
      )));
    }
    if frame.planes.len() != format.plane_count() {
      return Err(PreprocessError::invalid(
        format,
        format!(
          "期望 {} 个平面，实际 {} 个",
          format.plane_count(),
          frame.planes.len()
        ),
      ));
    }
    if let Some(index) = frame.planes.iter().position(|p| p.data.is_empty()) {
      return Err(PreprocessError::EmptyFrame(format!("第 {} 个平面为空", index)));
    }

    let width = frame.width as usize;
    let height = frame.height as usize;
    match format {
      PixelFormat::Rgba8888 => Self::decode_packed(&frame.planes[0], format, width, height, 4, [0, 1, 2]),
      PixelFormat::Rgb888 => Self::decode_packed(&frame.planes[0], format, width, height, 3, [0, 1, 2]),
      PixelFormat::Bgr888 => Self::decode_packed(&frame.planes[0], format, width, height, 3, [2, 1, 0]),
      PixelFormat::Yuv420 => Self::decode_yuv420(&frame.planes, width, height),
    }
  }

  fn decode_packed(
    plane: &Plane,
    format: PixelFormat,
    width: usize,
    height: usize,
    bytes_per_pixel: usize,
    order: [usize; 3],
  ) -> Result<Self, PreprocessError> {
    if plane.pixel_stride < bytes_per_pixel {
      return Err(PreprocessError::invalid(
        format,
        format!(
          "像素步长 {} 小于每像素字节数 {}",
          plane.pixel_stride, bytes_per_pixel
        ),
      ));
    }
    check_plane(plane, format, "RGB", width, height, bytes_per_pixel)?;

    let mut data = Vec::with_capacity(width * height * RGB_CHANNELS);
    for y in 0..height {
      let row = &plane.data[y * plane.row_stride..];
      for x in 0..width {
        let pixel = &row[x * plane.pixel_stride..];
        data.extend(order.iter().map(|&c| pixel[c]));
      }
    }
    Ok(Self {
      width,
      height,
      data,
    })
  }

  fn decode_yuv420(planes: &[Plane], width: usize, height: usize) -> Result<Self, PreprocessError> {
    let format = PixelFormat::Yuv420;
    let (y_plane, u_plane, v_plane) = (&planes[0], &planes[1], &planes[2]);
    let chroma_width = width.div_ceil(2);
    let chroma_height = height.div_ceil(2);
    for plane in planes {
      if plane.pixel_stride == 0 {
        return Err(PreprocessError::invalid(format, "像素步长为 0"));
      }
    }
    check_plane(y_plane, format, "Y", width, height, 1)?;
    check_plane(u_plane, format, "U", chroma_width, chroma_height, 1)?;
    check_plane(v_plane, format, "V", chroma_width, chroma_height, 1)?;

    let mut data = Vec::with_capacity(width * height * RGB_CHANNELS);
    for y in 0..height {
      let y_row = y * y_plane.row_stride;
      let u_row = (y / 2) * u_plane.row_stride;
      let v_row = (y / 2) * v_plane.row_stride;
      for x in 0..width {
        let luma = y_plane.data[y_row + x * y_plane.pixel_stride];
        let u = u_plane.data[u_row + (x / 2) * u_plane.pixel_stride];
        let v = v_plane.data[v_row + (x / 2) * v_plane.pixel_stride];
        data.extend_from_slice(&yuv_to_rgb(luma, u, v));
      }
    }
    Ok(Self {
      width,
      height,
      data,
    })
  }

  fn rotate(self, rotation: Rotation) -> Self {
    let (w, h) = (self.width, self.height);
    let (out_w, out_h) = match rotation {
      Rotation::None => return self,
      Rotation::Rotate180 => (w, h),
      Rotation::Clockwise90 | Rotation::Counterclockwise90 => (h, w),
    };

    let mut data = vec![0u8; self.data.len()];
    for dy in 0..out_h {
      for dx in 0..out_w {
        let (sx, sy) = match rotation {
          Rotation::Clockwise90 => (dy, h - 1 - dx),
          Rotation::Counterclockwise90 => (w - 1 - dy, dx),
          Rotation::Rotate180 => (w - 1 - dx, h - 1 - dy),
          Rotation::None => (dx, dy),
        };
        let src = (sy * w + sx) * RGB_CHANNELS;
        let dst = (dy * out_w + dx) * RGB_CHANNELS;
        data[dst..dst + RGB_CHANNELS].copy_from_slice(&self.data[src..src + RGB_CHANNELS]);
      }
    }
    Self {
      width: out_w,
      height: out_h,
      data,
    }
  }

  /// 双线性缩放：像素中心对齐，11 位定点系数
  fn resize_bilinear(self, out_w: usize, out_h: usize) -> Self {
    if out_w == self.width && out_h == self.height {
      return self;
    }

    let xs = axis_taps(self.width, out_w);
    let ys = axis_taps(self.height, out_h);

    // 水平方向先插值，每个源行只计算一次
    let horizontal = |row: usize| -> Vec<i32> {
      let src = &self.data[row * self.width * RGB_CHANNELS..];
      let mut out = Vec::with_capacity(out_w * RGB_CHANNELS);
      for tap in &xs {
        for c in 0..RGB_CHANNELS {
          let p0 = i32::from(src[tap.index0 * RGB_CHANNELS + c]);
          let p1 = i32::from(src[tap.index1 * RGB_CHANNELS + c]);
          out.push(p0 * tap.weight0 + p1 * tap.weight1);
        }
      }
      out
    };
    let rows: Vec<Vec<i32>> = (0..self.height).map(horizontal).collect();

    let mut data = Vec::with_capacity(out_w * out_h * RGB_CHANNELS);
    for tap in &ys {
      let (r0, r1) = (&rows[tap.index0], &rows[tap.index1]);
      for (a, b) in r0.iter().zip(r1) {
        data.push(vertical_lerp(*a, *b, tap.weight0, tap.weight1));
      }
    }
    Self {
      width: out_w,
      height: out_h,
      data,
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Tap {
  index0: usize,
  index1: usize,
  weight0: i32,
  weight1: i32,
}

fn axis_taps(src_len: usize, dst_len: usize) -> Vec<Tap> {
  let scale = 1.0 / (dst_len as f64 / src_len as f64);
  let last = src_len as isize - 1;
  (0..dst_len)
    .map(|d| {
      let position = ((d as f64 + 0.5) * scale - 0.5) as f32;
      let mut index = position.floor() as isize;
      let mut fraction = position - index as f32;
      if index < 0 {
        index = 0;
        fraction = 0.0;
      }
      if index >= last {
        index = last;
        fraction = 0.0;
      }
      let weight0 = ((1.0 - fraction) * COEF_SCALE as f32)
        .round()
        .clamp(i16::MIN as f32, i16::MAX as f32) as i32;
      let index0 = index as usize;
      Tap {
        index0,
        index1: (index0 + 1).min(last as usize),
        weight0,
        weight1: COEF_SCALE - weight0,
      }
    })
    .collect()
}

/// 纵向插值。
///
/// 舍入方式与 OpenCV 向量化路径一致：先将水平结果右移 4 位并饱和到 16 位，
/// 与系数相乘取高 16 位，两项饱和相加后再带舍入右移 2 位。
fn vertical_lerp(a: i32, b: i32, weight0: i32, weight1: i32) -> u8 {
  let saturate = |v: i32| v.clamp(i32::from(i16::MIN), i32::from(i16::MAX));
  let mul_hi = |v: i32, weight: i32| (saturate(v >> 4) * weight) >> 16;
  let sum = saturate(mul_hi(a, weight0) + mul_hi(b, weight1));
  ((sum + 2) >> 2).clamp(0, i32::from(u8::MAX)) as u8
}

/// BT.601 有限范围 YUV 到 RGB 的整数转换
fn yuv_to_rgb(y: u8, u: u8, v: u8) -> [u8; 3] {
  let c = i32::from(y) - 16;
  let d = i32::from(u) - 128;
  let e = i32::from(v) - 128;
  let clip = |value: i32| (value >> 8).clamp(0, u8::MAX as i32) as u8;
  [
    clip(298 * c + 409 * e + 128),
    clip(298 * c - 100 * d - 208 * e + 128),
    clip(298 * c + 516 * d + 128),
  ]
}

fn check_plane(
  plane: &Plane,
  format: PixelFormat,
  name: &str,
  width: usize,
  height: usize,
  bytes_per_pixel: usize,
) -> Result<(), PreprocessError> {
  let overflow = || {
    PreprocessError::invalid(
      format,
      format!(
        "{} 平面步长过大: 行步长 {}，像素步长 {}",
        name, plane.row_stride, plane.pixel_stride
      ),
    )
  };
  let min_row = plane
    .pixel_stride
    .checked_mul(width - 1)
    .and_then(|n| n.checked_add(bytes_per_pixel))
    .ok_or_else(overflow)?;
  if plane.row_stride < min_row {
    return Err(PreprocessError::invalid(
      format,
      format!(
        "{} 平面行步长 {} 小于一行所需的 {} 字节",
        name, plane.row_stride, min_row
      ),
    ));
  }
  let required = plane
    .row_stride
    .checked_mul(height - 1)
    .and_then(|n| n.checked_add(min_row))
    .ok_or_else(overflow)?;
  if plane.data.len() < required {
    return Err(PreprocessError::invalid(
      format,
      format!(
        "{} 平面数据不足: 需要 {} 字节，实际 {} 字节",
        name,
        required,
        plane.data.len()
      ),
    ));
  }
  Ok(())
}

#[cfg(test)]
mod tests {
  use super::*;

  fn rgb_frame(width: u32, height: u32, pixels: &[[u8; 3]]) -> RawFrame {
    RawFrame::packed(
      width,
      height,
      PixelFormat::Rgb888,
      pixels.iter().flatten().copied().collect(),
    )
  }

  #[test]
  fn every_byte_maps_to_its_unsigned_value() {
    for signed in i8::MIN..=i8::MAX {
      let byte = signed as u8;
      let value = channel_value(byte);
      assert_eq!(value, byte as f32);
      assert!((0.0..=255.0).contains(&value));
    }
    assert_eq!(channel_value(-1i8 as u8), 255.0);
    assert_eq!(channel_value(i8::MIN as u8), 128.0);
  }

  #[test]
  fn signed_minus_one_byte_survives_the_full_transform() {
    let frame = RawFrame::solid_rgba(8, 8, [-1i8 as u8, 0, 128]);
    let tensor = Preprocessor::new(4, Rotation::Clockwise90)
      .normalize(&frame)
      .unwrap();
    assert!(
      tensor
        .as_slice()
        .chunks(3)
        .all(|px| px == [255.0, 0.0, 128.0])
    );
  }

  #[test]
  fn camera_frame_produces_model_shape() {
    let frame = RawFrame::solid_rgba(640, 480, [12, 200, 77]);
    let tensor = Preprocessor::default().normalize(&frame).unwrap();
    assert_eq!(tensor.shape(), [1, 224, 224, 3]);
    assert_eq!(tensor.as_slice().len(), 224 * 224 * 3);
    assert!(tensor.as_slice().iter().all(|v| (0.0..=255.0).contains(v)));
    assert_eq!(tensor.pixel(0, 0), [12.0, 200.0, 77.0]);
    assert_eq!(tensor.pixel(223, 223), [12.0, 200.0, 77.0]);
  }

  #[test]
  fn normalize_is_deterministic() {
    let data: Vec<u8> = (0..64 * 48 * 3).map(|i| (i * 7 % 256) as u8).collect();
    let frame = RawFrame::packed(64, 48, PixelFormat::Rgb888, data);
    let pre = Preprocessor::new(20, Rotation::Clockwise90);
    assert_eq!(pre.normalize(&frame).unwrap(), pre.normalize(&frame).unwrap());
  }

  #[test]
  fn rotations_move_pixels() {
    const A: [u8; 3] = [1, 1, 1];
    const B: [u8; 3] = [2, 2, 2];
    const C: [u8; 3] = [3, 3, 3];
    const D: [u8; 3] = [4, 4, 4];
    let frame = rgb_frame(2, 2, &[A, B, C, D]);
    let pixels = |rotation| {
      let t = Preprocessor::new(2, rotation).normalize(&frame).unwrap();
      [t.pixel(0, 0), t.pixel(0, 1), t.pixel(1, 0), t.pixel(1, 1)].map(|p| p[0] as u8)
    };
    assert_eq!(pixels(Rotation::None), [1, 2, 3, 4]);
    assert_eq!(pixels(Rotation::Clockwise90), [3, 1, 4, 2]);
    assert_eq!(pixels(Rotation::Rotate180), [4, 3, 2, 1]);
    assert_eq!(pixels(Rotation::Counterclockwise90), [2, 4, 1, 3]);
  }

  #[test]
  fn clockwise_rotation_swaps_dimensions() {
    let image = DenseRgb {
      width: 3,
      height: 2,
      data: (0..18).collect(),
    };
    let rotated = image.rotate(Rotation::Clockwise90);
    assert_eq!((rotated.width, rotated.height), (2, 3));
    // 左下角的像素转到左上角
    assert_eq!(&rotated.data[0..3], &[9, 10, 11]);
  }

  #[test]
  fn bilinear_downscale_averages_neighbours() {
    let row = [[0, 0, 0], [100, 100, 100], [200, 200, 200], [50, 50, 50]];
    let pixels: Vec<[u8; 3]> = row.iter().copied().cycle().take(16).collect();
    let frame = rgb_frame(4, 4, &pixels);
    let tensor = Preprocessor::new(2, Rotation::None).normalize(&frame).unwrap();
    assert_eq!(tensor.pixel(0, 0), [50.0; 3]);
    assert_eq!(tensor.pixel(0, 1), [125.0; 3]);
    assert_eq!(tensor.pixel(1, 1), [125.0; 3]);
  }

  #[test]
  fn vertical_rounding_follows_vector_path() {
    // 纯 32 位舍入得到 28
    assert_eq!(vertical_lerp(7 * 1365, 39 * 2048, 683, 1365), 27);
    for p in 0..=255 {
      assert_eq!(vertical_lerp(p * COEF_SCALE, 0, COEF_SCALE, 0), p as u8);
    }
  }

  #[test]
  fn row_padding_is_skipped() {
    let (w, h, stride) = (3usize, 2usize, 16usize);
    let mut data = vec![0xEEu8; stride * h];
    for y in 0..h {
      for x in 0..w {
        let o = y * stride + x * 4;
        data[o..o + 4].copy_from_slice(&[(y * 10 + x) as u8, 7, 9, 255]);
      }
    }
    let frame = RawFrame::new(
      w as u32,
      h as u32,
      PixelFormat::Rgba8888,
      vec![Plane::new(data, stride, 4)],
    );
    let image = DenseRgb::decode(&frame).unwrap();
    assert_eq!(image.data.len(), w * h * 3);
    assert_eq!(&image.data[0..3], &[0, 7, 9]);
    assert_eq!(&image.data[15..18], &[12, 7, 9]);
  }

  #[test]
  fn bgr_channels_are_swapped() {
    let frame = RawFrame::packed(1, 1, PixelFormat::Bgr888, vec![1, 2, 3]);
    let image = DenseRgb::decode(&frame).unwrap();
    assert_eq!(image.data, vec![3, 2, 1]);
  }

  #[test]
  fn yuv420_planar_and_semi_planar() {
    let (w, h) = (4usize, 4usize);
    let y = Plane::new(vec![81; w * h], w, 1);

    let i420 = RawFrame::new(
      w as u32,
      h as u32,
      PixelFormat::Yuv420,
      vec![y.clone(), Plane::new(vec![90; 4], 2, 1), Plane::new(vec![240; 4], 2, 1)],
    );
    let image = DenseRgb::decode(&i420).unwrap();
    assert!(image.data.chunks(3).all(|px| px == [255, 0, 0]));

    // NV12：UV 交错，像素步长为 2
    let interleaved: Vec<u8> = [90u8, 240].iter().copied().cycle().take(8).collect();
    let nv12 = RawFrame::new(
      w as u32,
      h as u32,
      PixelFormat::Yuv420,
      vec![
        y,
        Plane::new(interleaved.clone(), 4, 2),
        Plane::new(interleaved[1..].to_vec(), 4, 2),
      ],
    );
    assert_eq!(DenseRgb::decode(&nv12).unwrap(), image);
  }

  #[test]
  fn rejects_malformed_frames() {
    let pre = Preprocessor::default();

    let zero = RawFrame::packed(0, 4, PixelFormat::Rgb888, vec![1; 12]);
    assert!(matches!(pre.normalize(&zero), Err(PreprocessError::EmptyFrame(_))));

    let empty = RawFrame::new(2, 2, PixelFormat::Rgb888, vec![Plane::new(vec![], 6, 3)]);
    assert!(matches!(pre.normalize(&empty), Err(PreprocessError::EmptyFrame(_))));

    let planes = RawFrame::new(2, 2, PixelFormat::Yuv420, vec![Plane::new(vec![1; 4], 2, 1)]);
    assert!(matches!(
      pre.normalize(&planes),
      Err(PreprocessError::InvalidFrameFormat { .. })
    ));

    let truncated = RawFrame::packed(4, 4, PixelFormat::Rgba8888, vec![1; 10]);
    assert!(matches!(
      pre.normalize(&truncated),
      Err(PreprocessError::InvalidFrameFormat { .. })
    ));

    let narrow = RawFrame::new(2, 2, PixelFormat::Rgba8888, vec![Plane::new(vec![1; 32], 8, 2)]);
    assert!(matches!(
      pre.normalize(&narrow),
      Err(PreprocessError::InvalidFrameFormat { .. })
    ));
  }

  #[test]
  fn oversized_strides_are_rejected() {
    let pre = Preprocessor::default();

    let wide_pixel = RawFrame::new(3, 2, PixelFormat::Rgb888, vec![Plane::new(vec![1; 18], 9, 1 << 63)]);
    assert!(matches!(
      pre.normalize(&wide_pixel),
      Err(PreprocessError::InvalidFrameFormat { .. })
    ));

    let wide_row = RawFrame::new(3, 2, PixelFormat::Rgb888, vec![Plane::new(vec![1; 18], usize::MAX, 3)]);
    assert!(matches!(
      pre.normalize(&wide_row),
      Err(PreprocessError::InvalidFrameFormat { .. })
    ));

    let chroma = RawFrame::new(
      4,
      4,
      PixelFormat::Yuv420,
      vec![
        Plane::new(vec![16; 16], 4, 1),
        Plane::new(vec![128; 4], 2, 1),
        Plane::new(vec![128; 4], 2, usize::MAX),
      ],
    );
    assert!(matches!(
      pre.normalize(&chroma),
      Err(PreprocessError::InvalidFrameFormat { .. })
    ));
  }

  #[test]
  fn rotation_parses_degrees() {
    assert_eq!("90".parse::<Rotation>().unwrap(), Rotation::Clockwise90);
    assert_eq!("0".parse::<Rotation>().unwrap(), Rotation::None);
    assert!("45".parse::<Rotation>().is_err());
    assert_eq!(Rotation::default(), Rotation::Clockwise90);
  }
}
