// 该文件是 Shanan （山南西风） 项目的一部分。
// src/model/bbox.rs - 边界框与坐标空间
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

use std::marker::PhantomData;

/// letterbox 后的模型输入坐标空间
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Letterboxed;

/// 原始图像坐标空间
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Original;

/// 轴对齐矩形 [x, y, width, height]，(x, y) 为左上角。
///
/// 类型参数标记坐标所在的空间，两个空间之间只能通过
/// [`LetterboxTransform`](crate::letterbox::LetterboxTransform) 显式转换。
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rect<S> {
  pub x: f32,
  pub y: f32,
  pub width: f32,
  pub height: f32,
  _space: PhantomData<S>,
}

impl<S> Rect<S> {
  pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
    Self {
      x,
      y,
      width,
      height,
      _space: PhantomData,
    }
  }

  /// 由左上角和右下角构造
  pub fn from_corners(x0: f32, y0: f32, x1: f32, y1: f32) -> Self {
    Self::new(x0, y0, x1 - x0, y1 - y0)
  }

  /// 由中心点和宽高构造
  pub fn from_center(cx: f32, cy: f32, width: f32, height: f32) -> Self {
    Self::new(cx - width * 0.5, cy - height * 0.5, width, height)
  }

  pub fn right(&self) -> f32 {
    self.x + self.width
  }

  pub fn bottom(&self) -> f32 {
    self.y + self.height
  }

  pub fn area(&self) -> f32 {
    self.width * self.height
  }

  /// 重叠区域面积，不相交时为 0
  pub fn intersection_area(&self, other: &Rect<S>) -> f32 {
    let x0 = self.x.max(other.x);
    let y0 = self.y.max(other.y);
    let x1 = self.right().min(other.right());
    let y1 = self.bottom().min(other.bottom());

    (x1 - x0).max(0.0) * (y1 - y0).max(0.0)
  }

  /// 交并比 (IoU)
  pub fn iou(&self, other: &Rect<S>) -> f32 {
    let intersection = self.intersection_area(other);
    let union = self.area() + other.area() - intersection;

    if union > 0.0 {
      intersection / union
    } else {
      0.0
    }
  }

  /// 裁剪到 [0, width] × [0, height]
  pub fn clip(&self, width: f32, height: f32) -> Self {
    let x0 = self.x.clamp(0.0, width);
    let y0 = self.y.clamp(0.0, height);
    let x1 = self.right().clamp(0.0, width);
    let y1 = self.bottom().clamp(0.0, height);
    Self::from_corners(x0, y0, x1, y1)
  }
}
