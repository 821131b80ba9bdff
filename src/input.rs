// 该文件是 Shanan （山南西风） 项目的一部分。
// src/input.rs - 评估数据集输入
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

use image::RgbImage;
use thiserror::Error;

mod read_image_file;
mod val_list;

pub use self::read_image_file::ImageFileInput;
pub use self::val_list::{ValEntry, parse_val_list};

#[derive(Error, Debug)]
pub enum InputError {
  #[error("读取验证集列表 {path:?} 失败: {source}")]
  ValFile {
    path: PathBuf,
    source: std::io::Error,
  },
  #[error("验证集列表第 {line} 行格式错误: {content:?}")]
  MalformedValLine { line: usize, content: String },
  #[error("图像 {path:?} 加载失败: {source}")]
  ImageLoad {
    path: PathBuf,
    source: image::ImageError,
  },
  #[error("图像 {path:?} 尺寸无效: {width}x{height}")]
  EmptyImage {
    path: PathBuf,
    width: u32,
    height: u32,
  },
}

/// 一张待评估的图像
#[derive(Debug, Clone)]
pub struct EvalSample {
  pub image_id: i64,
  pub file_name: String,
  pub image: RgbImage,
}
