// 该文件是 Shanan （山南西风） 项目的一部分。
// src/task.rs - 评估任务
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

use anyhow::Context;
use image::RgbImage;
use tracing::{debug, info};

use crate::{
  frame::RgbNhwcFrame,
  input::EvalSample,
  letterbox::letterbox,
  model::{DecodeError, DetectResult, HeadOutput, Model, Yolov5Config, Yolov5Postprocess},
  output::Render,
};

pub trait Task<I, M, O>: Sized {
  type Error;
  fn run_task(self, input: I, model: M, output: O) -> Result<(), Self::Error>;
}

/// 精度评估：逐张图像 letterbox → 推理 → 解码 + NMS → 输出，出错即停止
pub struct EvalTask {
  postprocess: Yolov5Postprocess,
}

impl EvalTask {
  pub fn new(config: Yolov5Config) -> Result<Self, DecodeError> {
    Ok(Self {
      postprocess: Yolov5Postprocess::new(config)?,
    })
  }

  /// 处理单张图像，返回原图坐标下的检测结果
  pub fn process<M, ME>(&self, model: &M, image: &RgbImage) -> anyhow::Result<DetectResult>
  where
    ME: std::error::Error + Sync + Send + 'static,
    M: Model<Input = RgbNhwcFrame, Output = Vec<HeadOutput>, Error = ME>,
  {
    let input = letterbox(image, self.postprocess.config().input_size)?;
    // 推理失败时不进入后处理
    let outputs = model.infer(&input.frame).context("模型推理失败")?;
    let result = self.postprocess.decode(&outputs, &input.transform)?;
    Ok(result)
  }
}

impl<I, M, O, IE, ME, RE> Task<I, M, O> for EvalTask
where
  IE: std::error::Error + Sync + Send + 'static,
  ME: std::error::Error + Sync + Send + 'static,
  RE: std::error::Error + Sync + Send + 'static,
  I: Iterator<Item = Result<EvalSample, IE>>,
  M: Model<Input = RgbNhwcFrame, Output = Vec<HeadOutput>, Error = ME>,
  O: Render<EvalSample, DetectResult, Error = RE>,
{
  type Error = anyhow::Error;

  fn run_task(self, input: I, model: M, mut output: O) -> Result<(), Self::Error> {
    info!("开始评估任务...");
    let mut images = 0usize;
    let mut detections = 0usize;

    for sample in input {
      let sample = sample?;
      let result = self
        .process(&model, &sample.image)
        .with_context(|| format!("处理图像 {} (id {}) 失败", sample.file_name, sample.image_id))?;
      debug!(
        "图像 {} (id {}): {} 个检测结果",
        sample.file_name,
        sample.image_id,
        result.len()
      );

      output.render_result(&sample, &result)?;
      images += 1;
      detections += result.len();
    }

    output.finish()?;
    info!("评估完成: {} 张图像, {} 个检测结果", images, detections);
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::input::InputError;
  use image::Rgb;

  const SIZE: u32 = 64;
  const ENTRY: usize = 5 + 80;

  /// 每个尺度一个张量；`hit` 时在步长 32 的 (1, 0) 格子放一个 person
  fn heads(hit: bool) -> Vec<HeadOutput> {
    [8u32, 16, 32]
      .into_iter()
      .map(|stride| {
        let grid = (SIZE / stride) as usize;
        let mut data = vec![-10.0; grid * grid * 3 * ENTRY];
        if hit && stride == 32 {
          let base = 3 * ENTRY;
          data[base..base + 4].fill(0.0);
          data[base + 4] = 5.0;
          data[base + 5] = 5.0;
        }
        HeadOutput { stride, data }
      })
      .collect()
  }

  struct FixedModel {
    outputs: Vec<HeadOutput>,
  }

  impl Model for FixedModel {
    type Input = RgbNhwcFrame;
    type Output = Vec<HeadOutput>;
    type Error = std::io::Error;

    fn infer(&self, input: &Self::Input) -> Result<Self::Output, Self::Error> {
      assert_eq!((input.width(), input.height()), (SIZE as usize, SIZE as usize));
      Ok(self.outputs.clone())
    }
  }

  struct BrokenModel;

  impl Model for BrokenModel {
    type Input = RgbNhwcFrame;
    type Output = Vec<HeadOutput>;
    type Error = std::io::Error;

    fn infer(&self, _input: &Self::Input) -> Result<Self::Output, Self::Error> {
      Err(std::io::Error::other("npu 不可用"))
    }
  }

  #[derive(Default)]
  struct Collect {
    rendered: Vec<(i64, usize)>,
    finished: bool,
  }

  impl Render<EvalSample, DetectResult> for Collect {
    type Error = std::io::Error;

    fn render_result(
      &mut self,
      frame: &EvalSample,
      result: &DetectResult,
    ) -> Result<(), Self::Error> {
      self.rendered.push((frame.image_id, result.len()));
      Ok(())
    }

    fn finish(&mut self) -> Result<(), Self::Error> {
      self.finished = true;
      Ok(())
    }
  }

  fn sample(image_id: i64) -> Result<EvalSample, InputError> {
    Ok(EvalSample {
      image_id,
      file_name: format!("{image_id:012}.jpg"),
      image: RgbImage::from_pixel(128, 72, Rgb([30, 60, 90])),
    })
  }

  fn task() -> EvalTask {
    EvalTask::new(Yolov5Config::default().input_size(SIZE)).unwrap()
  }

  #[test]
  fn renders_every_sample_then_finishes() {
    let mut collect = Collect::default();
    let model = FixedModel { outputs: heads(true) };
    task()
      .run_task(vec![sample(1), sample(7)].into_iter(), model, &mut collect)
      .unwrap();

    assert_eq!(collect.rendered, vec![(1, 1), (7, 1)]);
    assert!(collect.finished);
  }

  #[test]
  fn detection_is_mapped_to_original_image() {
    let model = FixedModel { outputs: heads(true) };
    let result = task().process(&model, &sample(1).unwrap().image).unwrap();

    assert_eq!(result.len(), 1);
    let det = result.items[0];
    assert_eq!(det.label, 0);
    // 框超出图像，被裁剪到整幅图
    assert_eq!((det.rect.x, det.rect.y), (0.0, 0.0));
    assert_eq!((det.rect.width, det.rect.height), (128.0, 72.0));

    let empty = FixedModel { outputs: heads(false) };
    assert!(task().process(&empty, &sample(1).unwrap().image).unwrap().is_empty());
  }

  #[test]
  fn model_failure_aborts_the_run() {
    let mut collect = Collect::default();
    let err = task()
      .run_task(vec![sample(1)].into_iter(), BrokenModel, &mut collect)
      .unwrap_err();

    assert!(format!("{err:#}").contains("npu 不可用"));
    assert!(collect.rendered.is_empty());
    assert!(!collect.finished);
  }

  #[test]
  fn input_failure_aborts_the_run() {
    let mut collect = Collect::default();
    let input = vec![
      sample(1),
      Err(InputError::MalformedValLine {
        line: 2,
        content: "broken".to_string(),
      }),
      sample(3),
    ];
    let model = FixedModel { outputs: heads(false) };

    assert!(task().run_task(input.into_iter(), model, &mut collect).is_err());
    assert_eq!(collect.rendered, vec![(1, 0)]);
    assert!(!collect.finished);
  }

  #[test]
  fn missing_head_is_a_decode_error() {
    let mut outputs = heads(false);
    outputs.pop();
    let model = FixedModel { outputs };

    let err = task().process(&model, &sample(1).unwrap().image).unwrap_err();
    assert!(matches!(
      err.downcast_ref::<DecodeError>(),
      Some(DecodeError::OutputCountMismatch { expected: 3, actual: 2 })
    ));
  }
}
