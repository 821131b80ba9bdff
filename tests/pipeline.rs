// 该文件是 Shanan （山南西风） 项目的一部分。
// tests/pipeline.rs - 端到端评估流程测试
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

use std::path::Path;

use image::{Rgb, RgbImage};
use serde_json::Value;
use shanan_eval::{
  input::ImageFileInput,
  letterbox::letterbox,
  model::{
    DecodeError, HeadOutput, TensorReplay, Yolov5Config, Yolov5Postprocess, yolov5::sigmoid,
  },
  output::CocoJsonWriter,
  task::{EvalTask, Task},
};

const SIZE: u32 = 640;
const ENTRY: usize = 5 + 80;
const LOW: f32 = -10.0;

/// 三个尺度的输出，`hit` 时步长 32 的 (5, 5) 格子 anchor 0 上有一个 person
fn heads(hit: bool) -> Vec<HeadOutput> {
  [8u32, 16, 32]
    .into_iter()
    .map(|stride| {
      let grid = (SIZE / stride) as usize;
      let mut data = vec![LOW; grid * grid * 3 * ENTRY];
      if hit && stride == 32 {
        let base = (5 * grid + 5) * 3 * ENTRY;
        data[base..base + 4].fill(0.0);
        data[base + 4] = 5.0;
        data[base + 5] = 5.0;
      }
      HeadOutput { stride, data }
    })
    .collect()
}

fn write_replay(dir: &Path, index: usize, outputs: &[HeadOutput]) {
  for output in outputs {
    let bytes: Vec<u8> = output.data.iter().flat_map(|v| v.to_le_bytes()).collect();
    std::fs::write(
      dir.join(TensorReplay::tensor_file_name(index, output.stride)),
      bytes,
    )
    .unwrap();
  }
}

fn assert_close(actual: f64, expected: f64) {
  assert!(
    (actual - expected).abs() < 1e-3,
    "actual {actual}, expected {expected}"
  );
}

#[test]
fn single_person_on_wide_image() {
  let image = RgbImage::from_pixel(1280, 720, Rgb([200, 10, 10]));
  let input = letterbox(&image, SIZE).unwrap();
  assert_eq!(input.transform.scale, 0.5);
  assert_eq!((input.transform.pad_x, input.transform.pad_y), (0.0, 140.0));

  let post = Yolov5Postprocess::new(Yolov5Config::default()).unwrap();
  let result = post.decode(&heads(true), &input.transform).unwrap();

  assert_eq!(result.len(), 1);
  let det = result.items[0];
  assert_eq!(det.label, 0);
  assert!((det.prob - sigmoid(5.0) * sigmoid(5.0)).abs() < 1e-6);
  assert_close(det.rect.x as f64, 236.0);
  assert_close(det.rect.y as f64, 0.0);
  assert_close(det.rect.width as f64, 232.0);
  assert_close(det.rect.height as f64, 162.0);
}

#[test]
fn non_finite_box_on_a_hit_fails_decode() {
  let image = RgbImage::from_pixel(1280, 720, Rgb([0, 0, 0]));
  let input = letterbox(&image, SIZE).unwrap();
  let post = Yolov5Postprocess::new(Yolov5Config::default()).unwrap();

  let mut outputs = heads(true);
  let base = (5 * 20 + 5) * 3 * ENTRY;
  outputs[2].data[base + 2] = f32::NAN;

  assert!(matches!(
    post.decode(&outputs, &input.transform),
    Err(DecodeError::NonFiniteValue {
      stride: 32,
      cell: 105,
      anchor: 0
    })
  ));
}

#[test]
fn quiet_tensors_produce_nothing() {
  let image = RgbImage::from_pixel(1280, 720, Rgb([0, 0, 0]));
  let input = letterbox(&image, SIZE).unwrap();
  let post = Yolov5Postprocess::new(Yolov5Config::default()).unwrap();

  assert!(post.decode(&heads(false), &input.transform).unwrap().is_empty());
}

#[test]
fn evaluation_run_writes_coco_results() {
  let dir = tempfile::tempdir().unwrap();
  let images = dir.path().join("images");
  let tensors = dir.path().join("tensors");
  std::fs::create_dir_all(&images).unwrap();
  std::fs::create_dir_all(&tensors).unwrap();

  RgbImage::from_pixel(1280, 720, Rgb([90, 90, 90]))
    .save(images.join("000000000139.png"))
    .unwrap();
  RgbImage::from_pixel(640, 480, Rgb([10, 20, 30]))
    .save(images.join("000000000285.png"))
    .unwrap();
  let val = dir.path().join("val.txt");
  std::fs::write(&val, "000000000139.png 139\n\n000000000285.png 285\n").unwrap();

  write_replay(&tensors, 0, &heads(true));
  write_replay(&tensors, 1, &heads(false));

  let input = ImageFileInput::open(&images, &val).unwrap();
  let model = TensorReplay::new(&tensors);
  let mut writer = CocoJsonWriter::new(Vec::new()).unwrap();

  EvalTask::new(Yolov5Config::default())
    .unwrap()
    .run_task(input, model, &mut writer)
    .unwrap();
  assert_eq!(writer.count(), 1);

  let text = String::from_utf8(writer.into_inner()).unwrap();
  let value: Value = serde_json::from_str(&text).unwrap();
  let records = value.as_array().unwrap();
  assert_eq!(records.len(), 1);

  let record = &records[0];
  assert_eq!(record["image_id"], 139);
  assert_eq!(record["category_id"], 0);
  let bbox: Vec<f64> = record["bbox"]
    .as_array()
    .unwrap()
    .iter()
    .map(|v| v.as_f64().unwrap())
    .collect();
  for (actual, expected) in bbox.into_iter().zip([236.0, 0.0, 232.0, 162.0]) {
    assert_close(actual, expected);
  }
  let score = record["score"].as_f64().unwrap();
  assert_close(score, (sigmoid(5.0) * sigmoid(5.0)) as f64);
}

#[test]
fn missing_tensor_aborts_run() {
  let dir = tempfile::tempdir().unwrap();
  RgbImage::from_pixel(64, 64, Rgb([1, 2, 3]))
    .save(dir.path().join("a.png"))
    .unwrap();
  let val = dir.path().join("val.txt");
  std::fs::write(&val, "a.png 1\n").unwrap();

  let input = ImageFileInput::open(dir.path(), &val).unwrap();
  let model = TensorReplay::new(dir.path().join("no-tensors"));
  let mut writer = CocoJsonWriter::new(Vec::new()).unwrap();

  let run = EvalTask::new(Yolov5Config::default())
    .unwrap()
    .run_task(input, model, &mut writer);
  assert!(run.is_err());
  assert_eq!(writer.count(), 0);
}
