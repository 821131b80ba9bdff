// 该文件是 Shanan （山南西风） 项目的一部分。
// src/output/coco_json.rs - COCO 格式检测结果输出
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

use std::{
  fs::File,
  io::{BufWriter, Write},
  path::Path,
};

use serde::Serialize;
use serde_json::value::RawValue;
use thiserror::Error;
use tracing::{info, warn};

use crate::{input::EvalSample, model::DetectResult, output::Render};

const BBOX_DECIMALS: usize = 3;
const SCORE_DECIMALS: usize = 6;

#[derive(Error, Debug)]
pub enum CocoJsonError {
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("JSON 序列化错误: {0}")]
  JsonError(#[from] serde_json::Error),
  #[error("输出已关闭")]
  Closed,
}

/// 数值按固定小数位写出，保留末尾的 0
#[derive(Serialize)]
struct CocoRecord {
  image_id: i64,
  category_id: usize,
  bbox: [Box<RawValue>; 4],
  score: Box<RawValue>,
}

fn fixed(value: f32, decimals: usize) -> Result<Box<RawValue>, serde_json::Error> {
  // 非有限值格式化为 NaN/inf，不是合法 JSON，在这里报错
  RawValue::from_string(format!("{value:.decimals$}"))
}

/// 以 JSON 数组流式写出所有检测结果，`[x, y, width, height]` 为原图坐标，
/// 保留 3 位小数，置信度保留 6 位
pub struct CocoJsonWriter<W: Write> {
  writer: W,
  count: usize,
  closed: bool,
}

impl CocoJsonWriter<BufWriter<File>> {
  pub fn create(path: &Path) -> Result<Self, CocoJsonError> {
    if let Some(parent) = path.parent() {
      if !parent.as_os_str().is_empty() {
        std::fs::create_dir_all(parent)?;
      }
    }
    info!("结果输出文件: {:?}", path);
    Self::new(BufWriter::new(File::create(path)?))
  }
}

impl<W: Write> CocoJsonWriter<W> {
  pub fn new(mut writer: W) -> Result<Self, CocoJsonError> {
    writer.write_all(b"[")?;
    Ok(Self {
      writer,
      count: 0,
      closed: false,
    })
  }

  /// 已写出的检测数量
  pub fn count(&self) -> usize {
    self.count
  }

  pub fn write_detections(
    &mut self,
    image_id: i64,
    result: &DetectResult,
  ) -> Result<(), CocoJsonError> {
    if self.closed {
      return Err(CocoJsonError::Closed);
    }

    for item in result.iter() {
      let rect = &item.rect;
      let record = CocoRecord {
        image_id,
        category_id: item.label,
        bbox: [
          fixed(rect.x, BBOX_DECIMALS)?,
          fixed(rect.y, BBOX_DECIMALS)?,
          fixed(rect.width, BBOX_DECIMALS)?,
          fixed(rect.height, BBOX_DECIMALS)?,
        ],
        score: fixed(item.prob, SCORE_DECIMALS)?,
      };
      if self.count > 0 {
        self.writer.write_all(b",")?;
      }
      serde_json::to_writer(&mut self.writer, &record)?;
      self.count += 1;
    }
    Ok(())
  }

  pub fn close(&mut self) -> Result<(), CocoJsonError> {
    if self.closed {
      warn!("结果输出重复关闭");
      return Ok(());
    }
    self.writer.write_all(b"]")?;
    self.writer.flush()?;
    self.closed = true;
    info!("共写出 {} 条检测结果", self.count);
    Ok(())
  }

  pub fn into_inner(self) -> W {
    self.writer
  }
}

impl<W: Write> Render<EvalSample, DetectResult> for CocoJsonWriter<W> {
  type Error = CocoJsonError;

  fn render_result(
    &mut self,
    frame: &EvalSample,
    result: &DetectResult,
  ) -> Result<(), Self::Error> {
    self.write_detections(frame.image_id, result)
  }

  fn finish(&mut self) -> Result<(), Self::Error> {
    self.close()
  }
}
