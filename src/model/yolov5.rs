// 该文件是 Shanan （山南西风） 项目的一部分。
// src/model/yolov5.rs - YOLOv5 检测头解码
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

use thiserror::Error;
use tracing::debug;

use crate::{
  letterbox::LetterboxTransform,
  model::{
    DetectResult, Detection, HeadOutput,
    bbox::{Letterboxed, Rect},
    labels::COCO_CLASSES,
    nms::suppress,
  },
};

pub const YOLOV5_INPUT_SIZE: u32 = 640;
pub const YOLOV5_PROB_THRESHOLD: f32 = 0.20;
pub const YOLOV5_NMS_THRESHOLD: f32 = 0.45;
pub const YOLOV5_STRIDES: [u32; 3] = [8, 16, 32];
/// 每个尺度 3 组 (w, h)，按步长从小到大排列
pub const YOLOV5_ANCHORS: [f32; 18] = [
  10.0, 13.0, 16.0, 30.0, 33.0, 23.0, 30.0, 61.0, 62.0, 45.0, 59.0, 119.0, 116.0, 90.0, 156.0,
  198.0, 373.0, 326.0,
];
pub const ANCHORS_PER_CELL: usize = 3;
/// tx, ty, tw, th, objectness
const BOX_VALUES: usize = 5;

#[derive(Error, Debug)]
pub enum DecodeError {
  #[error("概率阈值无效: {0}，必须位于 (0, 1) 区间")]
  InvalidProbThreshold(f32),
  #[error("NMS 阈值无效: {0}，必须位于 [0, 1] 区间")]
  InvalidNmsThreshold(f32),
  #[error("类别表为空")]
  EmptyClassTable,
  #[error("未配置的步长: {0}")]
  UnknownStride(u32),
  #[error("步长 {stride} 无法整除输入尺寸 {width}x{height}")]
  StrideMismatch { stride: u32, width: u32, height: u32 },
  #[error("步长 {stride} 的输出张量大小不匹配: 期望 {expected}, 实际 {actual}")]
  TensorSizeMismatch {
    stride: u32,
    expected: usize,
    actual: usize,
  },
  #[error("预期模型输出数量为 {expected}, 实际为 {actual}")]
  OutputCountMismatch { expected: usize, actual: usize },
  #[error("letterbox 尺寸 {actual} 与模型输入尺寸 {expected} 不一致")]
  InputSizeMismatch { expected: u32, actual: u32 },
  #[error("步长 {stride} 第 {cell} 格 anchor {anchor} 的框回归值不是有限数")]
  NonFiniteValue {
    stride: u32,
    cell: usize,
    anchor: usize,
  },
}

#[inline]
pub fn sigmoid(x: f32) -> f32 {
  1.0 / (1.0 + (-x).exp())
}

/// sigmoid 的反函数 logit(p)
#[inline]
pub fn inverse_sigmoid(p: f32) -> f32 {
  -((1.0 / p) - 1.0).ln()
}

/// 概率阈值以及预先计算好的未激活（logit）阈值。
///
/// `sigmoid(x) >= prob` 与 `x >= logit` 等价，解码时直接用原始 objectness
/// 与 `logit` 比较，只有通过的格点才做 sigmoid。
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProbThreshold {
  pub prob: f32,
  pub logit: f32,
}

impl ProbThreshold {
  pub fn new(prob: f32) -> Result<Self, DecodeError> {
    if prob.is_nan() || prob <= 0.0 || prob >= 1.0 {
      return Err(DecodeError::InvalidProbThreshold(prob));
    }
    Ok(Self {
      prob,
      logit: inverse_sigmoid(prob),
    })
  }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Anchor {
  pub width: f32,
  pub height: f32,
}

/// 一个检测头：步长及其对应的 3 个 anchor
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScaleHead {
  pub stride: u32,
  pub anchors: [Anchor; ANCHORS_PER_CELL],
}

/// 解码一个检测头的原始输出，把通过阈值的候选框追加到 `proposals`。
///
/// 张量按 `[grid_y][grid_x][anchor][5 + num_classes]` 排列，候选框坐标位于
/// letterbox 空间。返回本次追加的数量。
pub fn generate_proposals(
  head: &ScaleHead,
  tensor: &[f32],
  threshold: &ProbThreshold,
  letterbox_width: u32,
  letterbox_height: u32,
  num_classes: usize,
  proposals: &mut Vec<Detection<Letterboxed>>,
) -> Result<usize, DecodeError> {
  let stride = head.stride;
  if stride == 0 || letterbox_width % stride != 0 || letterbox_height % stride != 0 {
    return Err(DecodeError::StrideMismatch {
      stride,
      width: letterbox_width,
      height: letterbox_height,
    });
  }

  let grid_w = (letterbox_width / stride) as usize;
  let grid_h = (letterbox_height / stride) as usize;
  let entry = BOX_VALUES + num_classes;
  let cell_len = ANCHORS_PER_CELL * entry;
  let expected = grid_h * grid_w * cell_len;
  if tensor.len() != expected {
    return Err(DecodeError::TensorSizeMismatch {
      stride,
      expected,
      actual: tensor.len(),
    });
  }

  let before = proposals.len();
  let stride_f = stride as f32;

  for (cell, cell_data) in tensor.chunks_exact(cell_len).enumerate() {
    let grid_x = (cell % grid_w) as f32;
    let grid_y = (cell / grid_w) as f32;

    let anchors = head.anchors.iter().zip(cell_data.chunks_exact(entry));
    for (idx, (anchor, values)) in anchors.enumerate() {
      let objectness = values[4];
      if objectness.is_nan() || objectness < threshold.logit {
        continue;
      }

      let (label, class_logit) = values[BOX_VALUES..].iter().copied().enumerate().fold(
        (0usize, f32::NEG_INFINITY),
        |best, (idx, logit)| if logit > best.1 { (idx, logit) } else { best },
      );

      let prob = sigmoid(objectness) * sigmoid(class_logit);
      if prob.is_nan() || prob < threshold.prob {
        continue;
      }

      if !values[..4].iter().all(|v| v.is_finite()) {
        return Err(DecodeError::NonFiniteValue {
          stride,
          cell,
          anchor: idx,
        });
      }

      let cx = (sigmoid(values[0]) * 2.0 - 0.5 + grid_x) * stride_f;
      let cy = (sigmoid(values[1]) * 2.0 - 0.5 + grid_y) * stride_f;
      let w = (sigmoid(values[2]) * 2.0).powi(2) * anchor.width;
      let h = (sigmoid(values[3]) * 2.0).powi(2) * anchor.height;

      proposals.push(Detection {
        rect: Rect::from_center(cx, cy, w, h),
        label,
        prob,
      });
    }
  }

  Ok(proposals.len() - before)
}

/// YOLOv5 后处理配置，初始化后只读
#[derive(Debug, Clone, PartialEq)]
pub struct Yolov5Config {
  pub input_size: u32,
  pub prob_threshold: f32,
  pub nms_threshold: f32,
  pub anchors: [f32; 18],
  pub strides: [u32; 3],
  pub class_names: &'static [&'static str],
}

impl Default for Yolov5Config {
  fn default() -> Self {
    Self {
      input_size: YOLOV5_INPUT_SIZE,
      prob_threshold: YOLOV5_PROB_THRESHOLD,
      nms_threshold: YOLOV5_NMS_THRESHOLD,
      anchors: YOLOV5_ANCHORS,
      strides: YOLOV5_STRIDES,
      class_names: &COCO_CLASSES,
    }
  }
}

impl Yolov5Config {
  pub fn input_size(mut self, input_size: u32) -> Self {
    self.input_size = input_size;
    self
  }

  pub fn prob_threshold(mut self, threshold: f32) -> Self {
    self.prob_threshold = threshold;
    self
  }

  pub fn nms_threshold(mut self, threshold: f32) -> Self {
    self.nms_threshold = threshold;
    self
  }

  pub fn num_classes(&self) -> usize {
    self.class_names.len()
  }

  pub fn validate(&self) -> Result<(), DecodeError> {
    ProbThreshold::new(self.prob_threshold)?;
    if !(0.0..=1.0).contains(&self.nms_threshold) {
      return Err(DecodeError::InvalidNmsThreshold(self.nms_threshold));
    }
    if self.class_names.is_empty() {
      return Err(DecodeError::EmptyClassTable);
    }
    for &stride in &self.strides {
      if stride == 0 || self.input_size % stride != 0 {
        return Err(DecodeError::StrideMismatch {
          stride,
          width: self.input_size,
          height: self.input_size,
        });
      }
    }
    Ok(())
  }

  /// 按步长在表中的位置取出对应的 anchor
  pub fn head(&self, stride: u32) -> Result<ScaleHead, DecodeError> {
    let group = self
      .strides
      .iter()
      .position(|&s| s == stride)
      .ok_or(DecodeError::UnknownStride(stride))?;

    let base = group * ANCHORS_PER_CELL * 2;
    let anchors = std::array::from_fn(|a| Anchor {
      width: self.anchors[base + a * 2],
      height: self.anchors[base + a * 2 + 1],
    });

    Ok(ScaleHead { stride, anchors })
  }

  pub fn heads(&self) -> Result<Vec<ScaleHead>, DecodeError> {
    self.strides.iter().map(|&s| self.head(s)).collect()
  }
}

/// 完整的后处理：各尺度生成候选框，合并后做 NMS 并映射回原图
#[derive(Debug, Clone)]
pub struct Yolov5Postprocess {
  config: Yolov5Config,
  threshold: ProbThreshold,
}

impl Yolov5Postprocess {
  pub fn new(config: Yolov5Config) -> Result<Self, DecodeError> {
    config.validate()?;
    let threshold = ProbThreshold::new(config.prob_threshold)?;
    debug!(
      "后处理阈值: prob {:.3}, logit {:.4}, nms {:.3}",
      threshold.prob, threshold.logit, config.nms_threshold
    );
    Ok(Self { config, threshold })
  }

  pub fn config(&self) -> &Yolov5Config {
    &self.config
  }

  pub fn decode(
    &self,
    outputs: &[HeadOutput],
    transform: &LetterboxTransform,
  ) -> Result<DetectResult, DecodeError> {
    let expected = self.config.strides.len();
    if outputs.len() != expected {
      return Err(DecodeError::OutputCountMismatch {
        expected,
        actual: outputs.len(),
      });
    }

    let size = self.config.input_size;
    if transform.target_size != size {
      return Err(DecodeError::InputSizeMismatch {
        expected: size,
        actual: transform.target_size,
      });
    }

    let mut proposals = Vec::new();
    for output in outputs {
      let head = self.config.head(output.stride)?;
      let count = generate_proposals(
        &head,
        &output.data,
        &self.threshold,
        size,
        size,
        self.config.num_classes(),
        &mut proposals,
      )?;
      debug!("步长 {}: {} 个候选框", output.stride, count);
    }

    let result = suppress(&proposals, self.config.nms_threshold, transform);
    debug!("NMS 后保留 {} / {} 个目标", result.len(), proposals.len());
    Ok(result)
  }
}
