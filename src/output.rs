// 该文件是 Shanan （山南西风） 项目的一部分。
// src/output.rs - 输出定义
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

use std::{fs::File, io::BufWriter, io::Write};

use thiserror::Error;

use crate::{input::EvalSample, model::DetectResult};

pub trait Render<Frame, Output> {
  type Error;
  fn render_result(&mut self, frame: &Frame, result: &Output) -> Result<(), Self::Error>;

  /// 所有帧处理完毕后调用一次
  fn finish(&mut self) -> Result<(), Self::Error> {
    Ok(())
  }
}

impl<Frame, Output, R: Render<Frame, Output> + ?Sized> Render<Frame, Output> for &mut R {
  type Error = R::Error;

  fn render_result(&mut self, frame: &Frame, result: &Output) -> Result<(), Self::Error> {
    (**self).render_result(frame, result)
  }

  fn finish(&mut self) -> Result<(), Self::Error> {
    (**self).finish()
  }
}

mod coco_json;
pub use self::coco_json::{CocoJsonError, CocoJsonWriter};

#[cfg(feature = "save_image_file")]
mod draw;
#[cfg(feature = "save_image_file")]
pub use self::draw::{DrawError, DrawOutput};

#[derive(Error, Debug)]
pub enum OutputError {
  #[error("结果 JSON 输出错误: {0}")]
  CocoJsonError(#[from] CocoJsonError),
  #[cfg(feature = "save_image_file")]
  #[error("可视化输出错误: {0}")]
  DrawError(#[from] DrawError),
}

/// 评估输出：结果 JSON，以及可选的可视化图像
pub struct OutputSet<W: Write = BufWriter<File>> {
  json: CocoJsonWriter<W>,
  #[cfg(feature = "save_image_file")]
  draw: Option<DrawOutput>,
}

impl<W: Write> OutputSet<W> {
  pub fn new(json: CocoJsonWriter<W>) -> Self {
    Self {
      json,
      #[cfg(feature = "save_image_file")]
      draw: None,
    }
  }

  #[cfg(feature = "save_image_file")]
  pub fn with_draw(mut self, draw: Option<DrawOutput>) -> Self {
    self.draw = draw;
    self
  }

  pub fn into_json(self) -> CocoJsonWriter<W> {
    self.json
  }
}

impl<W: Write> Render<EvalSample, DetectResult> for OutputSet<W> {
  type Error = OutputError;

  fn render_result(
    &mut self,
    frame: &EvalSample,
    result: &DetectResult,
  ) -> Result<(), Self::Error> {
    self.json.render_result(frame, result)?;
    #[cfg(feature = "save_image_file")]
    {
      if let Some(draw) = self.draw.as_mut() {
        draw.render_result(frame, result)?;
      }
    }
    Ok(())
  }

  fn finish(&mut self) -> Result<(), Self::Error> {
    self.json.finish()?;
    Ok(())
  }
}
