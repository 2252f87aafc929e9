// 该文件是 Liangce （量测） 项目的一部分。
// src/record.rs - 单个来源的聚合结果
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

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

/// 边界框，坐标为 [xmin, ymin, xmax, ymax]
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BBox {
  pub xmin: f64,
  pub ymin: f64,
  pub xmax: f64,
  pub ymax: f64,
}

impl BBox {
  pub fn new(xmin: f64, ymin: f64, xmax: f64, ymax: f64) -> Self {
    Self {
      xmin,
      ymin,
      xmax,
      ymax,
    }
  }

  /// 去重键，仅由几何坐标决定，固定六位小数
  pub fn dedup_key(&self) -> String {
    format!(
      "{:.6}-{:.6}-{:.6}-{:.6}",
      self.xmin, self.ymin, self.xmax, self.ymax
    )
  }
}

/// 按分数降序排列的 (分数, 载荷) 序列
///
/// 允许重复分数，分数相同时保持插入顺序。
#[derive(Debug, Clone, PartialEq)]
pub struct Ranked<T> {
  entries: Vec<(f64, T)>,
}

impl<T> Default for Ranked<T> {
  fn default() -> Self {
    Self {
      entries: Vec::new(),
    }
  }
}

impl<T> Ranked<T> {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn insert(&mut self, score: f64, value: T) {
    // 插在所有分数不低于它的条目之后
    let pos = self
      .entries
      .partition_point(|(s, _)| s.total_cmp(&score) != Ordering::Less);
    self.entries.insert(pos, (score, value));
  }

  /// 追加一个已知不高于末尾分数的条目
  pub(crate) fn push_ordered(&mut self, score: f64, value: T) {
    debug_assert!(
      self
        .entries
        .last()
        .is_none_or(|(s, _)| s.total_cmp(&score) != Ordering::Less)
    );
    self.entries.push((score, value));
  }

  pub fn len(&self) -> usize {
    self.entries.len()
  }

  pub fn is_empty(&self) -> bool {
    self.entries.is_empty()
  }

  pub fn iter(&self) -> impl ExactSizeIterator<Item = (f64, &T)> {
    self.entries.iter().map(|(s, v)| (*s, v))
  }

  pub fn scores(&self) -> Vec<f64> {
    self.entries.iter().map(|(s, _)| *s).collect()
  }

  pub fn get(&self, rank: usize) -> Option<(f64, &T)> {
    self.entries.get(rank).map(|(s, v)| (*s, v))
  }
}

impl<T: Clone> Ranked<T> {
  /// 取前 k 个条目
  pub fn top(&self, k: usize) -> Self {
    Self {
      entries: self.entries.iter().take(k).cloned().collect(),
    }
  }
}

/// 索引中保存的区域信息
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegionHit {
  pub bbox: BBox,
  pub prob: f64,
  pub cat: String,
}

/// 相似检索索引中的条目
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexEntry {
  pub uri: String,
  pub region: Option<RegionHit>,
}

impl IndexEntry {
  pub fn uri(uri: impl Into<String>) -> Self {
    Self {
      uri: uri.into(),
      region: None,
    }
  }

  pub fn region(uri: impl Into<String>, bbox: BBox, prob: f64, cat: impl Into<String>) -> Self {
    Self {
      uri: uri.into(),
      region: Some(RegionHit {
        bbox,
        prob,
        cat: cat.into(),
      }),
    }
  }
}

/// 最近邻结果
#[derive(Debug, Clone, PartialEq)]
pub struct Neighbor {
  pub distance: f64,
  pub entry: IndexEntry,
}

/// 单个来源（uri）的聚合结果
#[derive(Debug, Clone)]
pub struct ResultRecord {
  label: String,
  loss: f64,
  pub(crate) categories: Ranked<String>,
  pub(crate) boxes: Ranked<BBox>,
  pub(crate) regions: Ranked<Vec<f64>>,
  pub(crate) indexed: bool,
  pub(crate) neighbors: Vec<Neighbor>,
  pub(crate) region_neighbors: Vec<Vec<Neighbor>>,
}

impl ResultRecord {
  pub fn new(label: impl Into<String>, loss: f64) -> Self {
    Self {
      label: label.into(),
      loss,
      categories: Ranked::new(),
      boxes: Ranked::new(),
      regions: Ranked::new(),
      indexed: false,
      neighbors: Vec::new(),
      region_neighbors: Vec::new(),
    }
  }

  /// 复制标识与损失，不带任何条目
  pub(crate) fn empty_like(&self) -> Self {
    Self::new(self.label.clone(), self.loss)
  }

  pub fn label(&self) -> &str {
    &self.label
  }

  pub fn loss(&self) -> f64 {
    self.loss
  }

  pub fn categories(&self) -> &Ranked<String> {
    &self.categories
  }

  pub fn boxes(&self) -> &Ranked<BBox> {
    &self.boxes
  }

  pub fn regions(&self) -> &Ranked<Vec<f64>> {
    &self.regions
  }

  pub fn is_indexed(&self) -> bool {
    self.indexed
  }

  pub fn neighbors(&self) -> &[Neighbor] {
    &self.neighbors
  }

  pub fn region_neighbors(&self) -> &[Vec<Neighbor>] {
    &self.region_neighbors
  }

  pub(crate) fn add_cat(&mut self, prob: f64, cat: impl Into<String>) {
    self.categories.insert(prob, cat.into());
  }

  pub(crate) fn add_bbox(&mut self, prob: f64, bbox: BBox) {
    self.boxes.insert(prob, bbox);
  }

  pub(crate) fn add_region(&mut self, prob: f64, vals: Vec<f64>) {
    self.regions.insert(prob, vals);
  }

  /// 近邻按距离升序保存
  pub(crate) fn add_nn(&mut self, neighbor: Neighbor) {
    insert_by_distance(&mut self.neighbors, neighbor);
  }

  /// 第 rank 个区域的近邻，首次调用时按区域数量分配
  pub(crate) fn add_region_nn(&mut self, rank: usize, neighbor: Neighbor) -> bool {
    if self.region_neighbors.is_empty() {
      self.region_neighbors = vec![Vec::new(); self.categories.len()];
    }
    match self.region_neighbors.get_mut(rank) {
      Some(nns) => {
        insert_by_distance(nns, neighbor);
        true
      }
      None => false,
    }
  }
}

fn insert_by_distance(nns: &mut Vec<Neighbor>, neighbor: Neighbor) {
  let pos = nns.partition_point(|n| n.distance.total_cmp(&neighbor.distance) != Ordering::Greater);
  nns.insert(pos, neighbor);
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_ranked_descending_with_ties_in_insertion_order() {
    let mut ranked = Ranked::new();
    ranked.insert(0.2, "a");
    ranked.insert(0.9, "b");
    ranked.insert(0.2, "c");
    ranked.insert(0.5, "d");
    ranked.insert(0.9, "e");

    let order: Vec<_> = ranked.iter().map(|(_, v)| *v).collect();
    assert_eq!(order, vec!["b", "e", "d", "a", "c"]);
    assert_eq!(ranked.scores(), vec![0.9, 0.9, 0.5, 0.2, 0.2]);
  }

  #[test]
  fn test_ranked_top() {
    let mut ranked = Ranked::new();
    for (i, s) in [0.1, 0.4, 0.3].into_iter().enumerate() {
      ranked.insert(s, i);
    }
    let top = ranked.top(2);
    assert_eq!(top.len(), 2);
    assert_eq!(top.get(0), Some((0.4, &1)));
    assert_eq!(top.get(1), Some((0.3, &2)));
    assert_eq!(ranked.top(10).len(), 3);
  }

  #[test]
  fn test_dedup_key_uses_geometry_only() {
    let a = BBox::new(1.0, 2.0, 3.5, 4.25);
    let b = BBox::new(1.0, 2.0, 3.5, 4.25);
    assert_eq!(a.dedup_key(), "1.000000-2.000000-3.500000-4.250000");
    assert_eq!(a.dedup_key(), b.dedup_key());
    assert_ne!(a.dedup_key(), BBox::new(1.0, 2.0, 3.5, 4.0).dedup_key());
  }

  #[test]
  fn test_neighbors_sorted_by_distance() {
    let mut record = ResultRecord::new("img", 0.0);
    record.add_cat(0.7, "cat");
    record.add_nn(Neighbor {
      distance: 2.0,
      entry: IndexEntry::uri("far"),
    });
    record.add_nn(Neighbor {
      distance: 0.5,
      entry: IndexEntry::uri("near"),
    });
    let uris: Vec<_> = record.neighbors().iter().map(|n| n.entry.uri.as_str()).collect();
    assert_eq!(uris, vec!["near", "far"]);

    assert!(record.add_region_nn(
      0,
      Neighbor {
        distance: 1.0,
        entry: IndexEntry::uri("x"),
      }
    ));
    assert!(!record.add_region_nn(
      3,
      Neighbor {
        distance: 1.0,
        entry: IndexEntry::uri("y"),
      }
    ));
    assert_eq!(record.region_neighbors().len(), 1);
  }
}
