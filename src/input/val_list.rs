// 该文件是 Shanan （山南西风） 项目的一部分。
// src/input/val_list.rs - 验证集列表解析
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

use super::InputError;

/// 列表中的一行：`<file_name> <image_id>`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValEntry {
  pub file_name: String,
  pub image_id: i64,
}

impl ValEntry {
  fn parse(line_no: usize, line: &str) -> Result<Option<Self>, InputError> {
    let mut fields = line.split_whitespace();
    let Some(file_name) = fields.next() else {
      return Ok(None);
    };

    let image_id = fields
      .next()
      .and_then(|id| id.parse().ok())
      .ok_or_else(|| InputError::MalformedValLine {
        line: line_no,
        content: line.to_string(),
      })?;

    Ok(Some(Self {
      file_name: file_name.to_string(),
      image_id,
    }))
  }
}

/// 解析整个列表，空行跳过，其它格式错误立即返回
pub fn parse_val_list(content: &str) -> Result<Vec<ValEntry>, InputError> {
  let mut entries = Vec::new();
  for (idx, line) in content.lines().enumerate() {
    if let Some(entry) = ValEntry::parse(idx + 1, line)? {
      entries.push(entry);
    }
  }
  Ok(entries)
}
