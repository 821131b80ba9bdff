// 该文件是 Shanan （山南西风） 项目的一部分。
// src/letterbox.rs - 保持长宽比的 letterbox 缩放
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

use image::{
  Rgb, RgbImage,
  imageops::{self, FilterType},
};
use thiserror::Error;
use tracing::debug;

use crate::{
  frame::RgbNhwcFrame,
  model::bbox::{Letterboxed, Original, Rect},
};

/// 填充区域的中性灰
pub const LETTERBOX_FILL: u8 = 114;

#[derive(Error, Debug)]
pub enum LetterboxError {
  #[error("图像尺寸无效: {width}x{height}")]
  EmptyImage { width: u32, height: u32 },
  #[error("目标尺寸无效: {0}")]
  InvalidTargetSize(u32),
}

/// 单张图像的 letterbox 变换参数。
///
/// `letterboxed = original * scale + pad`，逆变换为
/// `original = (letterboxed - pad) / scale`。
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LetterboxTransform {
  pub scale: f32,
  pub pad_x: f32,
  pub pad_y: f32,
  pub src_width: u32,
  pub src_height: u32,
  pub target_size: u32,
  resized_width: u32,
  resized_height: u32,
}

impl LetterboxTransform {
  pub fn new(src_width: u32, src_height: u32, target_size: u32) -> Result<Self, LetterboxError> {
    if src_width == 0 || src_height == 0 {
      return Err(LetterboxError::EmptyImage {
        width: src_width,
        height: src_height,
      });
    }
    if target_size == 0 {
      return Err(LetterboxError::InvalidTargetSize(target_size));
    }

    // 长边缩放到 target_size
    let scale = target_size as f64 / src_width.max(src_height) as f64;
    let resized_width = resized_side(src_width, scale, target_size);
    let resized_height = resized_side(src_height, scale, target_size);

    // 奇数余量放在右侧/下侧
    let pad_x = (target_size - resized_width) / 2;
    let pad_y = (target_size - resized_height) / 2;

    Ok(Self {
      scale: scale as f32,
      pad_x: pad_x as f32,
      pad_y: pad_y as f32,
      src_width,
      src_height,
      target_size,
      resized_width,
      resized_height,
    })
  }

  /// 缩放后（未填充）的图像尺寸
  pub fn resized_size(&self) -> (u32, u32) {
    (self.resized_width, self.resized_height)
  }

  pub fn apply(&self, (x, y): (f32, f32)) -> (f32, f32) {
    (x * self.scale + self.pad_x, y * self.scale + self.pad_y)
  }

  pub fn invert(&self, (x, y): (f32, f32)) -> (f32, f32) {
    ((x - self.pad_x) / self.scale, (y - self.pad_y) / self.scale)
  }

  /// 把 letterbox 空间中的矩形映射回原图空间（不裁剪）
  pub fn invert_rect(&self, rect: &Rect<Letterboxed>) -> Rect<Original> {
    let (x0, y0) = self.invert((rect.x, rect.y));
    let (x1, y1) = self.invert((rect.right(), rect.bottom()));
    Rect::from_corners(x0, y0, x1, y1)
  }
}

fn resized_side(side: u32, scale: f64, target_size: u32) -> u32 {
  ((side as f64 * scale).round() as u32).clamp(1, target_size)
}

/// letterbox 的结果：模型输入帧以及逆变换所需参数
#[derive(Debug, Clone)]
pub struct LetterboxOutput {
  pub frame: RgbNhwcFrame,
  pub transform: LetterboxTransform,
}

/// 将任意尺寸的 RGB 图像缩放并填充为 `target_size × target_size` 的输入帧
pub fn letterbox(image: &RgbImage, target_size: u32) -> Result<LetterboxOutput, LetterboxError> {
  let transform = LetterboxTransform::new(image.width(), image.height(), target_size)?;
  let (resized_width, resized_height) = transform.resized_size();
  debug!(
    "letterbox: {}x{} -> {}x{}, 缩放 {:.4}, 填充 ({}, {})",
    image.width(),
    image.height(),
    resized_width,
    resized_height,
    transform.scale,
    transform.pad_x,
    transform.pad_y
  );

  let mut canvas = RgbImage::from_pixel(target_size, target_size, Rgb([LETTERBOX_FILL; 3]));
  let offset_x = transform.pad_x as i64;
  let offset_y = transform.pad_y as i64;

  if image.dimensions() == (resized_width, resized_height) {
    imageops::replace(&mut canvas, image, offset_x, offset_y);
  } else {
    let resized = imageops::resize(image, resized_width, resized_height, FilterType::Triangle);
    imageops::replace(&mut canvas, &resized, offset_x, offset_y);
  }

  Ok(LetterboxOutput {
    frame: RgbNhwcFrame::from(canvas),
    transform,
  })
}
