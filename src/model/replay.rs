// 该文件是 Shanan （山南西风） 项目的一部分。
// src/model/replay.rs - 离线张量回放后端
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

use std::{cell::Cell, path::PathBuf};

use thiserror::Error;
use tracing::{debug, error, info};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  frame::{AsNhwcFrame, RgbNhwcFrame},
  model::{HeadOutput, Model, yolov5::YOLOV5_STRIDES},
};

#[derive(Error, Debug)]
pub enum ReplayError {
  #[error("URI 方案不匹配: 期望 '{expected}', 实际 '{actual}'")]
  SchemeMismatch { expected: String, actual: String },
  #[error("读取张量文件 {path:?} 失败: {source}")]
  Io {
    path: PathBuf,
    source: std::io::Error,
  },
  #[error("张量文件 {path:?} 长度 {len} 不是 4 字节对齐")]
  Misaligned { path: PathBuf, len: usize },
}

/// 从目录中按顺序回放预先导出的检测头输出。
///
/// 第 n 次推理读取 `{n:06}_s{stride}.bin`，每个文件是小端 `f32` 序列。
pub struct TensorReplay {
  directory: PathBuf,
  strides: Vec<u32>,
  cursor: Cell<usize>,
}

impl FromUrlWithScheme for TensorReplay {
  const SCHEME: &'static str = "replay";
}

impl FromUrl for TensorReplay {
  type Error = ReplayError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      error!(
        "URI scheme mismatch: expected '{}', found '{}'",
        Self::SCHEME,
        url.scheme()
      );
      return Err(ReplayError::SchemeMismatch {
        expected: Self::SCHEME.to_string(),
        actual: url.scheme().to_string(),
      });
    }

    info!("张量回放目录: {}", url.path());
    Ok(Self::new(url.path()))
  }
}

impl TensorReplay {
  pub fn new(directory: impl Into<PathBuf>) -> Self {
    Self {
      directory: directory.into(),
      strides: YOLOV5_STRIDES.to_vec(),
      cursor: Cell::new(0),
    }
  }

  pub fn strides(mut self, strides: &[u32]) -> Self {
    self.strides = strides.to_vec();
    self
  }

  pub fn tensor_file_name(index: usize, stride: u32) -> String {
    format!("{index:06}_s{stride}.bin")
  }

  fn read_tensor(&self, index: usize, stride: u32) -> Result<Vec<f32>, ReplayError> {
    let path = self.directory.join(Self::tensor_file_name(index, stride));
    let bytes = match std::fs::read(&path) {
      Ok(bytes) => bytes,
      Err(source) => return Err(ReplayError::Io { path, source }),
    };
    if bytes.len() % 4 != 0 {
      return Err(ReplayError::Misaligned {
        path,
        len: bytes.len(),
      });
    }

    debug!("读取张量文件 {:?}: {} 个值", path, bytes.len() / 4);
    Ok(
      bytes
        .chunks_exact(4)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect(),
    )
  }
}

impl Model for TensorReplay {
  type Input = RgbNhwcFrame;
  type Output = Vec<HeadOutput>;
  type Error = ReplayError;

  fn infer(&self, input: &Self::Input) -> Result<Self::Output, Self::Error> {
    let index = self.cursor.get();
    self.cursor.set(index + 1);
    debug!("回放第 {} 组输出, 输入 {} 字节", index, input.as_nhwc().len());

    self
      .strides
      .iter()
      .map(|&stride| {
        Ok(HeadOutput {
          stride,
          data: self.read_tensor(index, stride)?,
        })
      })
      .collect()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn write_tensor(dir: &std::path::Path, index: usize, stride: u32, values: &[f32]) {
    let bytes: Vec<u8> = values.iter().flat_map(|v| v.to_le_bytes()).collect();
    std::fs::write(dir.join(TensorReplay::tensor_file_name(index, stride)), bytes).unwrap();
  }

  fn frame() -> RgbNhwcFrame {
    RgbNhwcFrame::from_raw(1, 1, vec![0; 3]).unwrap()
  }

  #[test]
  fn scheme_is_checked() {
    let url = Url::parse("file:///tmp/dumps").unwrap();
    assert!(matches!(
      TensorReplay::from_url(&url),
      Err(ReplayError::SchemeMismatch { .. })
    ));
    assert!(TensorReplay::from_url(&Url::parse("replay:///tmp/dumps").unwrap()).is_ok());
  }

  #[test]
  fn replays_in_order() {
    let dir = tempfile::tempdir().unwrap();
    write_tensor(dir.path(), 0, 8, &[1.0, -2.5]);
    write_tensor(dir.path(), 0, 16, &[3.0]);
    write_tensor(dir.path(), 1, 8, &[4.0]);
    write_tensor(dir.path(), 1, 16, &[]);

    let replay = TensorReplay::new(dir.path()).strides(&[8, 16]);

    let first = replay.infer(&frame()).unwrap();
    assert_eq!(first.len(), 2);
    assert_eq!(first[0], HeadOutput { stride: 8, data: vec![1.0, -2.5] });
    assert_eq!(first[1], HeadOutput { stride: 16, data: vec![3.0] });

    let second = replay.infer(&frame()).unwrap();
    assert_eq!(second[0].data, vec![4.0]);
    assert!(second[1].data.is_empty());

    assert!(matches!(replay.infer(&frame()), Err(ReplayError::Io { .. })));
  }

  #[test]
  fn misaligned_file_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join(TensorReplay::tensor_file_name(0, 32)), [0u8; 6]).unwrap();

    let replay = TensorReplay::new(dir.path()).strides(&[32]);
    assert!(matches!(
      replay.infer(&frame()),
      Err(ReplayError::Misaligned { len: 6, .. })
    ));
  }
}
