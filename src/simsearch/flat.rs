// 该文件是 Liangce （量测） 项目的一部分。
// src/simsearch/flat.rs - 暴力检索索引
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

use tracing::debug;

use super::{SimSearch, SimSearchError};
use crate::record::{IndexEntry, Neighbor};

/// 内存中的 L2 暴力检索，用于命令行与测试
#[derive(Debug, Clone)]
pub struct FlatIndex {
  dimension: usize,
  entries: Vec<(IndexEntry, Vec<f64>)>,
  built: bool,
}

impl FlatIndex {
  pub fn len(&self) -> usize {
    self.entries.len()
  }

  pub fn is_empty(&self) -> bool {
    self.entries.is_empty()
  }

  pub fn is_built(&self) -> bool {
    self.built
  }

  fn check_dimension(&self, vector: &[f64]) -> Result<(), SimSearchError> {
    if vector.len() != self.dimension {
      return Err(SimSearchError::DimensionMismatch {
        expected: self.dimension,
        actual: vector.len(),
      });
    }
    Ok(())
  }
}

fn l2(a: &[f64], b: &[f64]) -> f64 {
  a.iter()
    .zip(b)
    .map(|(x, y)| (x - y) * (x - y))
    .sum::<f64>()
    .sqrt()
}

impl SimSearch for FlatIndex {
  fn create(dimension: usize) -> Result<Self, SimSearchError> {
    if dimension == 0 {
      return Err(SimSearchError::Backend("索引维度不能为 0".to_string()));
    }
    Ok(Self {
      dimension,
      entries: Vec::new(),
      built: false,
    })
  }

  fn dimension(&self) -> usize {
    self.dimension
  }

  fn index(&mut self, entry: IndexEntry, vector: &[f64]) -> Result<(), SimSearchError> {
    self.check_dimension(vector)?;
    self.entries.push((entry, vector.to_vec()));
    self.built = false;
    Ok(())
  }

  fn build(&mut self) -> Result<(), SimSearchError> {
    debug!("构建暴力索引，共 {} 条", self.entries.len());
    self.built = true;
    Ok(())
  }

  fn search(&self, vector: &[f64], k: usize) -> Result<Vec<Neighbor>, SimSearchError> {
    self.check_dimension(vector)?;
    let mut scored: Vec<Neighbor> = self
      .entries
      .iter()
      .map(|(entry, v)| Neighbor {
        distance: l2(vector, v),
        entry: entry.clone(),
      })
      .collect();
    scored.sort_by(|a, b| a.distance.total_cmp(&b.distance));
    scored.truncate(k);
    Ok(scored)
  }
}
