// 该文件是 Shanan （山南西风） 项目的一部分。
// src/bin/yolov5_accuracy.rs - YOLOv5 精度评估工具
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

use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use url::Url;

use shanan_eval::{
  FromUrl,
  input::ImageFileInput,
  model::{
    TensorReplay, Yolov5Config,
    yolov5::{YOLOV5_INPUT_SIZE, YOLOV5_NMS_THRESHOLD, YOLOV5_PROB_THRESHOLD},
  },
  output::{CocoJsonWriter, OutputSet},
  task::{EvalTask, Task},
};
use tracing::info;

/// 在验证集上运行 YOLOv5 后处理，输出 COCO 格式检测结果
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// 模型来源，例如 replay:///path/to/tensors
  #[arg(long, value_name = "MODEL")]
  pub model: Url,
  /// 验证集图像目录
  #[arg(long, value_name = "DIR")]
  pub images: PathBuf,
  /// 验证集列表，每行 `文件名 image_id`
  #[arg(long, value_name = "FILE")]
  pub val: PathBuf,
  /// 结果 JSON 文件
  #[arg(long, value_name = "FILE", default_value = "./out.json")]
  pub out: PathBuf,
  /// 模型输入边长
  #[arg(long, default_value_t = YOLOV5_INPUT_SIZE)]
  pub input_size: u32,
  /// 置信度阈值
  #[arg(long, default_value_t = YOLOV5_PROB_THRESHOLD)]
  pub prob_threshold: f32,
  /// NMS IoU 阈值
  #[arg(long, default_value_t = YOLOV5_NMS_THRESHOLD)]
  pub nms_threshold: f32,
  /// 可视化输出目录，例如 folder:///tmp/vis
  #[cfg(feature = "save_image_file")]
  #[arg(long, value_name = "URL")]
  pub draw: Option<Url>,
  /// 可视化图像数量，URL 中的 count 参数优先
  #[cfg(feature = "save_image_file")]
  #[arg(long, default_value_t = 10)]
  pub draw_count: usize,
}

fn main() -> Result<()> {
  tracing_subscriber::fmt::init();

  let args = Args::parse();

  info!("模型来源: {}", args.model);
  info!("图像目录: {:?}", args.images);
  info!("验证集列表: {:?}", args.val);

  let config = Yolov5Config::default()
    .input_size(args.input_size)
    .prob_threshold(args.prob_threshold)
    .nms_threshold(args.nms_threshold);
  let task = EvalTask::new(config.clone())?;

  let input = ImageFileInput::open(&args.images, &args.val)?;
  let model = TensorReplay::from_url(&args.model)?.strides(&config.strides);
  let output = OutputSet::new(CocoJsonWriter::create(&args.out)?);

  #[cfg(feature = "save_image_file")]
  let output = {
    let draw = match &args.draw {
      Some(url) => {
        let draw = shanan_eval::output::DrawOutput::from_url(url)?;
        if url.query_pairs().any(|(k, _)| k == "count") {
          Some(draw)
        } else {
          Some(draw.limit(args.draw_count))
        }
      }
      None => None,
    };
    output.with_draw(draw)
  };

  task.run_task(input, model, output)?;

  info!("结果已写入 {:?}", args.out);
  Ok(())
}
