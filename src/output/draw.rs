// 该文件是 Shanan （山南西风） 项目的一部分。
// src/output/draw.rs - 检测结果可视化
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

use std::path::{Path, PathBuf};

use image::{Rgb, RgbImage};
use imageproc::drawing::draw_hollow_rect_mut;
use thiserror::Error;
use tracing::{debug, warn};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  input::EvalSample,
  model::{DetectResult, class_name},
  output::Render,
};

const DEFAULT_DRAW_COUNT: usize = 10;
const BOX_THICKNESS: i32 = 2;
const BOX_COLOR: [u8; 3] = [0, 0, 255]; // 蓝色

#[derive(Error, Debug)]
pub enum DrawError {
  #[error("URI 方案不匹配")]
  SchemeMismatch,
  #[error("无效的查询参数: {0}")]
  InvalidQuery(String),
  #[error("图像错误: {0}")]
  ImageError(#[from] image::ImageError),
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
}

/// 把前若干张图像的检测结果画出来保存到目录，同时写一份文本记录
pub struct DrawOutput {
  directory: PathBuf,
  limit: usize,
  drawn: usize,
  color: [u8; 3],
}

impl FromUrlWithScheme for DrawOutput {
  const SCHEME: &'static str = "folder";
}

impl FromUrl for DrawOutput {
  type Error = DrawError;

  fn from_url(uri: &Url) -> Result<Self, Self::Error> {
    if uri.scheme() != Self::SCHEME {
      return Err(DrawError::SchemeMismatch);
    }

    let mut output = DrawOutput::new(uri.path());
    for (k, v) in uri.query_pairs() {
      if k == "count" {
        output.limit = v
          .parse()
          .map_err(|_| DrawError::InvalidQuery(format!("count={v}")))?;
      }
    }
    Ok(output)
  }
}

impl DrawOutput {
  pub fn new(directory: impl Into<PathBuf>) -> Self {
    Self {
      directory: directory.into(),
      limit: DEFAULT_DRAW_COUNT,
      drawn: 0,
      color: BOX_COLOR,
    }
  }

  pub fn limit(mut self, limit: usize) -> Self {
    self.limit = limit;
    self
  }

  fn draw_boxes(&self, image: &mut RgbImage, result: &DetectResult) {
    let (w, h) = (image.width() as i32, image.height() as i32);

    for item in result.iter() {
      let x_min = (item.rect.x.floor() as i32).clamp(0, w - 1);
      let y_min = (item.rect.y.floor() as i32).clamp(0, h - 1);
      let x_max = (item.rect.right().ceil() as i32).clamp(0, w - 1);
      let y_max = (item.rect.bottom().ceil() as i32).clamp(0, h - 1);

      // 边框加粗，逐层向内收缩
      for t in 0..BOX_THICKNESS {
        let (x0, y0, x1, y1) = (x_min + t, y_min + t, x_max - t, y_max - t);
        if x0 >= x1 || y0 >= y1 {
          break;
        }
        let rect =
          imageproc::rect::Rect::at(x0, y0).of_size((x1 - x0 + 1) as u32, (y1 - y0 + 1) as u32);
        draw_hollow_rect_mut(image, rect, Rgb(self.color));
      }
    }
  }

  fn record(&self, result: &DetectResult, path: &Path) -> Result<(), std::io::Error> {
    let records: Vec<String> = result
      .iter()
      .map(|item| {
        format!(
          "{}, {:.4}, {:.3}, {:.3}, {:.3}, {:.3}",
          class_name(item.label),
          item.prob,
          item.rect.x,
          item.rect.y,
          item.rect.width,
          item.rect.height
        )
      })
      .collect();
    std::fs::write(path.with_extension("txt"), records.join("\n"))
  }
}

impl Render<EvalSample, DetectResult> for DrawOutput {
  type Error = DrawError;

  fn render_result(
    &mut self,
    frame: &EvalSample,
    result: &DetectResult,
  ) -> Result<(), Self::Error> {
    if self.drawn >= self.limit {
      return Ok(());
    }
    self.drawn += 1;

    // 保留原扩展名，避免同名不同格式的图像互相覆盖
    let path = self.directory.join(format!("{}.png", frame.file_name));
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent)?;
    }

    let mut image = frame.image.clone();
    self.draw_boxes(&mut image, result);
    image.save(&path)?;
    self.record(result, &path)?;

    if self.drawn == self.limit {
      warn!("已保存 {} 张可视化图像，后续图像不再绘制", self.drawn);
    } else {
      debug!("保存可视化图像到文件: {:?}", path);
    }
    Ok(())
  }
}
