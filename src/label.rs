// 该文件是 Jungu （菌菇） 项目的一部分。
// src/label.rs - 类别标签表
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

use std::{collections::HashMap, path::Path};

use thiserror::Error;
use tracing::info;

/// 蘑菇分类模型的 14 个类别
pub const MUSHROOM_LABELS: [&str; 14] = [
  "agaricus_xanthodermus",
  "amanita_muscaria",
  "amanita_phalloides",
  "armillaria_mellea",
  "boletus_edulis",
  "cantharellus_cibarius",
  "chalciporus_piperatus",
  "hygrophoropsis_aurantiaca",
  "hypholoma_fasciculare",
  "inocybe_geophylla",
  "rubroboletus_satanas",
  "russula_emetica",
  "russula_vesca",
  "suillus_luteus",
];

#[derive(Error, Debug)]
pub enum LabelError {
  #[error("标签表为空")]
  Empty,
  #[error("第 {0} 个标签为空")]
  BlankName(usize),
  #[error("标签重复: {name} (索引 {first} 与 {second})")]
  Duplicate {
    name: String,
    first: usize,
    second: usize,
  },
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("标签文件解析错误: {0}")]
  ParseError(#[from] serde_json::Error),
}

/// 类别索引超出标签表范围，说明模型与标签表不匹配
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("类别索引 {index} 超出标签表范围 (共 {len} 个标签)")]
pub struct LabelIndexOutOfRange {
  pub index: usize,
  pub len: usize,
}

/// 索引到类别名称的不可变映射，索引连续覆盖 0..N-1
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelTable {
  names: Box<[String]>,
}

impl LabelTable {
  pub fn new<I, S>(names: I) -> Result<Self, LabelError>
  where
    I: IntoIterator<Item = S>,
    S: Into<String>,
  {
    let names: Vec<String> = names.into_iter().map(Into::into).collect();
    if names.is_empty() {
      return Err(LabelError::Empty);
    }

    let mut seen = HashMap::with_capacity(names.len());
    for (index, name) in names.iter().enumerate() {
      if name.trim().is_empty() {
        return Err(LabelError::BlankName(index));
      }
      if let Some(first) = seen.insert(name.as_str(), index) {
        return Err(LabelError::Duplicate {
          name: name.clone(),
          first,
          second: index,
        });
      }
    }

    Ok(Self {
      names: names.into_boxed_slice(),
    })
  }

  /// 内置的蘑菇标签表
  pub fn mushroom() -> Self {
    Self {
      names: MUSHROOM_LABELS.iter().map(|s| s.to_string()).collect(),
    }
  }

  /// 从标签文件加载，支持 JSON 字符串数组或每行一个标签的纯文本
  pub fn load(path: impl AsRef<Path>) -> Result<Self, LabelError> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path)?;
    let table = if content.trim_start().starts_with('[') {
      let names: Vec<String> = serde_json::from_str(&content)?;
      Self::new(names)?
    } else {
      Self::new(
        content
          .lines()
          .map(str::trim)
          .filter(|line| !line.is_empty() && !line.starts_with('#')),
      )?
    };
    info!("从 {} 加载 {} 个标签", path.display(), table.len());
    Ok(table)
  }

  pub fn len(&self) -> usize {
    self.names.len()
  }

  pub fn is_empty(&self) -> bool {
    self.names.is_empty()
  }

  pub fn get(&self, index: usize) -> Option<&str> {
    self.names.get(index).map(String::as_str)
  }

  /// 将类别索引映射为名称，越界时返回错误而不是默认值
  pub fn resolve(&self, index: usize) -> Result<&str, LabelIndexOutOfRange> {
    self.get(index).ok_or(LabelIndexOutOfRange {
      index,
      len: self.len(),
    })
  }

  pub fn iter(&self) -> impl Iterator<Item = (usize, &str)> {
    self.names.iter().map(String::as_str).enumerate()
  }
}

impl Default for LabelTable {
  fn default() -> Self {
    Self::mushroom()
  }
}

#[cfg(test)]
mod tests {
  use std::collections::HashSet;

  use super::*;

  #[test]
  fn mushroom_table_covers_every_index() {
    let table = LabelTable::mushroom();
    assert_eq!(table.len(), 14);
    let distinct: HashSet<&str> = table.iter().map(|(_, name)| name).collect();
    assert_eq!(distinct.len(), 14);
    for index in 0..14 {
      let name = table.resolve(index).unwrap();
      assert!(!name.is_empty());
    }
    assert_eq!(table.resolve(1).unwrap(), "amanita_muscaria");
    assert_eq!(table.resolve(13).unwrap(), "suillus_luteus");
  }

  #[test]
  fn out_of_range_index_is_an_error() {
    let table = LabelTable::mushroom();
    assert_eq!(
      table.resolve(14),
      Err(LabelIndexOutOfRange { index: 14, len: 14 })
    );
    assert!(table.resolve(usize::MAX).is_err());
  }

  #[test]
  fn rejects_duplicates_and_blanks() {
    assert!(matches!(
      LabelTable::new(["a", "b", "a"]),
      Err(LabelError::Duplicate {
        first: 0,
        second: 2,
        ..
      })
    ));
    assert!(matches!(
      LabelTable::new(["a", " "]),
      Err(LabelError::BlankName(1))
    ));
    assert!(matches!(
      LabelTable::new(Vec::<String>::new()),
      Err(LabelError::Empty)
    ));
  }

  #[test]
  fn loads_text_and_json_files() {
    let dir = std::env::temp_dir();
    let text = dir.join(format!("jungu-labels-{}.txt", std::process::id()));
    std::fs::write(&text, "# classes\ncat\n\ndog\n").unwrap();
    let table = LabelTable::load(&text).unwrap();
    assert_eq!(table.iter().collect::<Vec<_>>(), vec![(0, "cat"), (1, "dog")]);

    let json = dir.join(format!("jungu-labels-{}.json", std::process::id()));
    std::fs::write(&json, r#"["x", "y", "z"]"#).unwrap();
    let table = LabelTable::load(&json).unwrap();
    assert_eq!(table.get(2), Some("z"));

    let _ = std::fs::remove_file(text);
    let _ = std::fs::remove_file(json);
  }
}
