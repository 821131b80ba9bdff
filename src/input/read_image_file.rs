// 该文件是 Shanan （山南西风） 项目的一部分。
// src/input/read_image_file.rs - 图像文件输入
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

use image::{ImageReader, RgbImage};
use tracing::{debug, info};

use super::{EvalSample, InputError, ValEntry, parse_val_list};

/// 按验证集列表依次读取图像
pub struct ImageFileInput {
  images_dir: PathBuf,
  entries: std::vec::IntoIter<ValEntry>,
}

impl ImageFileInput {
  pub fn open(images_dir: impl Into<PathBuf>, val_file: &Path) -> Result<Self, InputError> {
    let content = std::fs::read_to_string(val_file).map_err(|source| InputError::ValFile {
      path: val_file.to_path_buf(),
      source,
    })?;
    let entries = parse_val_list(&content)?;
    info!("验证集列表 {:?}: {} 张图像", val_file, entries.len());

    Ok(Self::with_entries(images_dir, entries))
  }

  pub fn with_entries(images_dir: impl Into<PathBuf>, entries: Vec<ValEntry>) -> Self {
    Self {
      images_dir: images_dir.into(),
      entries: entries.into_iter(),
    }
  }

  pub fn remaining(&self) -> usize {
    self.entries.len()
  }
}

fn load_rgb_image(path: &Path) -> Result<RgbImage, InputError> {
  let image_load = |source| InputError::ImageLoad {
    path: path.to_path_buf(),
    source,
  };

  let image = ImageReader::open(path)
    .map_err(|e| image_load(image::ImageError::IoError(e)))?
    .decode()
    .map_err(image_load)?
    .to_rgb8();

  if image.width() == 0 || image.height() == 0 {
    return Err(InputError::EmptyImage {
      path: path.to_path_buf(),
      width: image.width(),
      height: image.height(),
    });
  }

  Ok(image)
}

impl Iterator for ImageFileInput {
  type Item = Result<EvalSample, InputError>;

  fn next(&mut self) -> Option<Self::Item> {
    let ValEntry {
      file_name,
      image_id,
    } = self.entries.next()?;
    let path = self.images_dir.join(&file_name);
    debug!("读取图像 {:?} (id {})", path, image_id);

    Some(load_rgb_image(&path).map(|image| EvalSample {
      image_id,
      file_name,
      image,
    }))
  }
}
