// 该文件是 Shanan （山南西风） 项目的一部分。
// src/model.rs - 模型
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

pub mod bbox;
pub mod labels;
pub mod nms;
pub mod replay;
pub mod yolov5;

use self::bbox::{Original, Rect};

/// 推理引擎接口，具体后端（NPU 运行时、离线回放等）实现该 trait
pub trait Model {
  type Input;
  type Output;
  type Error;

  fn infer(&self, input: &Self::Input) -> Result<Self::Output, Self::Error>;
}

/// 单个检测目标，`S` 为坐标空间
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Detection<S> {
  pub rect: Rect<S>,
  pub label: usize,
  pub prob: f32,
}

/// 一个检测头的原始输出
#[derive(Debug, Clone, PartialEq)]
pub struct HeadOutput {
  pub stride: u32,
  pub data: Vec<f32>,
}

/// 经过 NMS 并映射回原图坐标的最终结果
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DetectResult {
  pub items: Box<[Detection<Original>]>,
}

impl DetectResult {
  pub fn is_empty(&self) -> bool {
    self.items.is_empty()
  }

  pub fn len(&self) -> usize {
    self.items.len()
  }

  pub fn iter(&self) -> impl Iterator<Item = &Detection<Original>> {
    self.items.iter()
  }
}

pub use self::labels::{COCO_CLASSES, class_name};
pub use self::nms::{non_max_suppression, suppress};
pub use self::replay::{ReplayError, TensorReplay};
pub use self::yolov5::{
  DecodeError, ProbThreshold, ScaleHead, Yolov5Config, Yolov5Postprocess, generate_proposals,
};
