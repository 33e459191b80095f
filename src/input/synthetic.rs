// 该文件是 Jungu （菌菇） 项目的一部分。
// src/input/synthetic.rs - 纯色合成帧源
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

//! 不依赖摄像头的帧源，用于联调与测试：
//!
//! ```text
//! synthetic://solid?width=640&height=480&color=8b5a2b&fps=30&format=yuv420&count=100
//! ```

use std::{collections::HashMap, str::FromStr};

use tracing::info;
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  frame::{PixelFormat, Plane, RawFrame},
  input::{FrameHandler, FrameSource, InputError, PacedThread, SourceStats},
};

const DEFAULT_WIDTH: u32 = 640;
const DEFAULT_HEIGHT: u32 = 480;
const DEFAULT_FPS: f64 = 30.0;

/// 合成帧的像素格式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SyntheticFormat {
  #[default]
  Rgba,
  Rgb,
  Bgr,
  /// I420 三平面
  Yuv420,
  /// NV12，UV 交错
  Nv12,
}

impl FromStr for SyntheticFormat {
  type Err = InputError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.to_ascii_lowercase().as_str() {
      "rgba" => Ok(SyntheticFormat::Rgba),
      "rgb" => Ok(SyntheticFormat::Rgb),
      "bgr" => Ok(SyntheticFormat::Bgr),
      "yuv420" | "i420" => Ok(SyntheticFormat::Yuv420),
      "nv12" => Ok(SyntheticFormat::Nv12),
      other => Err(InputError::InvalidParameter(format!(
        "不支持的合成帧格式 '{}'",
        other
      ))),
    }
  }
}

/// BT.601 有限范围 RGB 转 YUV
fn rgb_to_yuv([r, g, b]: [u8; 3]) -> [u8; 3] {
  let (r, g, b) = (r as i32, g as i32, b as i32);
  let y = ((66 * r + 129 * g + 25 * b + 128) >> 8) + 16;
  let u = ((-38 * r - 74 * g + 112 * b + 128) >> 8) + 128;
  let v = ((112 * r - 94 * g - 18 * b + 128) >> 8) + 128;
  [
    y.clamp(0, 255) as u8,
    u.clamp(0, 255) as u8,
    v.clamp(0, 255) as u8,
  ]
}

/// 生成一帧纯色图像
pub fn solid_frame(width: u32, height: u32, color: [u8; 3], format: SyntheticFormat) -> RawFrame {
  let pixels = width as usize * height as usize;
  let repeat = |pixel: &[u8], n: usize| -> Vec<u8> {
    pixel.iter().copied().cycle().take(pixel.len() * n).collect()
  };

  match format {
    SyntheticFormat::Rgba => RawFrame::solid_rgba(width, height, color),
    SyntheticFormat::Rgb => RawFrame::packed(width, height, PixelFormat::Rgb888, repeat(&color, pixels)),
    SyntheticFormat::Bgr => {
      let [r, g, b] = color;
      RawFrame::packed(width, height, PixelFormat::Bgr888, repeat(&[b, g, r], pixels))
    }
    SyntheticFormat::Yuv420 | SyntheticFormat::Nv12 => {
      let [y, u, v] = rgb_to_yuv(color);
      let (w, h) = (width as usize, height as usize);
      let (cw, ch) = (w.div_ceil(2), h.div_ceil(2));
      let luma = Plane::new(vec![y; pixels], w, 1);
      let planes = if format == SyntheticFormat::Yuv420 {
        vec![
          luma,
          Plane::new(vec![u; cw * ch], cw, 1),
          Plane::new(vec![v; cw * ch], cw, 1),
        ]
      } else {
        // 两个色度平面共享同一块交错内存，V 平面从偏移 1 开始
        let interleaved = repeat(&[u, v], cw * ch);
        vec![
          luma,
          Plane::new(interleaved.clone(), cw * 2, 2),
          Plane::new(interleaved[1..].to_vec(), cw * 2, 2),
        ]
      };
      RawFrame::new(width, height, PixelFormat::Yuv420, planes)
    }
  }
}

fn parse_color(text: &str) -> Result<[u8; 3], InputError> {
  let hex = text.trim_start_matches('#');
  let invalid = || InputError::InvalidParameter(format!("颜色应为 RRGGBB: '{}'", text));
  if hex.len() != 6 {
    return Err(invalid());
  }
  let value = u32::from_str_radix(hex, 16).map_err(|_| invalid())?;
  Ok([(value >> 16) as u8, (value >> 8) as u8, value as u8])
}

fn parse_param<T: FromStr>(query: &HashMap<String, String>, key: &str) -> Result<Option<T>, InputError> {
  query
    .get(key)
    .map(|v| {
      v.parse::<T>()
        .map_err(|_| InputError::InvalidParameter(format!("参数 {}={} 无效", key, v)))
    })
    .transpose()
}

pub struct SyntheticSource {
  width: u32,
  height: u32,
  color: [u8; 3],
  format: SyntheticFormat,
  paced: PacedThread,
}

impl FromUrlWithScheme for SyntheticSource {
  const SCHEME: &'static str = "synthetic";
}

impl FromUrl for SyntheticSource {
  type Error = InputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(InputError::SchemeMismatch);
    }

    let query: HashMap<String, String> = url
      .query_pairs()
      .map(|(k, v)| (String::from(k), String::from(v)))
      .collect();

    let width = parse_param(&query, "width")?.unwrap_or(DEFAULT_WIDTH);
    let height = parse_param(&query, "height")?.unwrap_or(DEFAULT_HEIGHT);
    let color = query
      .get("color")
      .map(|c| parse_color(c))
      .transpose()?
      .unwrap_or([0x80, 0x80, 0x80]);
    let format = parse_param(&query, "format")?.unwrap_or_default();
    let fps = parse_param(&query, "fps")?.unwrap_or(DEFAULT_FPS);
    let count = parse_param(&query, "count")?;

    Ok(Self::new(width, height, color, format, fps, count))
  }
}

impl SyntheticSource {
  pub fn new(
    width: u32,
    height: u32,
    color: [u8; 3],
    format: SyntheticFormat,
    fps: f64,
    count: Option<u64>,
  ) -> Self {
    Self {
      width,
      height,
      color,
      format,
      paced: PacedThread::new("synthetic", fps, count),
    }
  }

  pub fn stats(&self) -> SourceStats {
    self.paced.stats()
  }

  /// 设定了帧数上限且已全部产生时返回 `true`
  pub fn is_finished(&self) -> bool {
    !self.paced.is_running() && self.stats().delivered > 0
  }
}

impl FrameSource for SyntheticSource {
  fn start(&mut self, handler: FrameHandler) -> Result<(), InputError> {
    info!(
      "启动合成帧源: {}x{} {:?}, 颜色 #{:02x}{:02x}{:02x}",
      self.width, self.height, self.format, self.color[0], self.color[1], self.color[2]
    );
    let frame = solid_frame(self.width, self.height, self.color, self.format);
    self.paced.start(Box::new(move |_| frame.clone()), handler)
  }

  fn stop(&mut self) {
    self.paced.stop();
  }
}
