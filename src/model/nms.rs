// 该文件是 Shanan （山南西风） 项目的一部分。
// src/model/nms.rs - 非极大值抑制
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

use crate::{
  letterbox::LetterboxTransform,
  model::{DetectResult, Detection, bbox::Letterboxed},
};

/// 贪心 NMS，返回保留下来的下标（按接受顺序）。
///
/// 按置信度降序稳定排序，置信度相同的保持原有顺序；与已接受框 IoU 大于
/// `iou_threshold` 的框被抑制，不区分类别。
pub fn non_max_suppression<S>(proposals: &[Detection<S>], iou_threshold: f32) -> Vec<usize> {
  let mut order: Vec<usize> = (0..proposals.len()).collect();
  order.sort_by(|&a, &b| proposals[b].prob.total_cmp(&proposals[a].prob));

  let mut suppressed = vec![false; order.len()];
  let mut picked = Vec::new();

  for i in 0..order.len() {
    if suppressed[i] {
      continue;
    }
    let accepted = &proposals[order[i]];
    picked.push(order[i]);

    for j in (i + 1)..order.len() {
      if !suppressed[j] && accepted.rect.iou(&proposals[order[j]].rect) > iou_threshold {
        suppressed[j] = true;
      }
    }
  }

  picked
}

/// NMS 后把保留的框从 letterbox 空间映射回原图，并裁剪到原图范围内
pub fn suppress(
  proposals: &[Detection<Letterboxed>],
  iou_threshold: f32,
  transform: &LetterboxTransform,
) -> DetectResult {
  let width = transform.src_width as f32;
  let height = transform.src_height as f32;

  let items = non_max_suppression(proposals, iou_threshold)
    .into_iter()
    .map(|idx| {
      let det = &proposals[idx];
      Detection {
        rect: transform.invert_rect(&det.rect).clip(width, height),
        label: det.label,
        prob: det.prob,
      }
    })
    .collect();

  DetectResult { items }
}
