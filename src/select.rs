// 该文件是 Liangce （量测） 项目的一部分。
// src/select.rs - best-k 选择
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

use std::collections::HashMap;

use serde::Deserialize;
use tracing::debug;

use crate::aggregate::{AggregateError, ResultSet};
use crate::record::ResultRecord;
use crate::task::TaskShape;

/// 每个来源保留的条目数，`-1` 表示全部（即类别数）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(from = "i64")]
pub enum BestK {
  Top(usize),
  All,
}

impl Default for BestK {
  fn default() -> Self {
    BestK::Top(1)
  }
}

impl From<i64> for BestK {
  fn from(value: i64) -> Self {
    if value < 0 {
      BestK::All
    } else {
      BestK::Top(value as usize)
    }
  }
}

impl BestK {
  /// 请求覆盖优先，其次为默认值
  pub fn resolve(request: Option<BestK>, default: BestK) -> BestK {
    request.unwrap_or(default)
  }

  /// 转换为具体数量；类别数未知时 `All` 为 None
  pub fn count(&self, nclasses: Option<usize>) -> Option<usize> {
    match self {
      BestK::Top(k) => Some(*k),
      BestK::All => nclasses,
    }
  }

  fn is_all(&self, nclasses: Option<usize>) -> bool {
    match (self, nclasses) {
      (BestK::All, _) => true,
      (BestK::Top(k), Some(n)) => *k == n,
      _ => false,
    }
  }
}

/// 对每个来源保留最好的 k 个条目
///
/// 检测任务且 k 小于类别数时，同一个边界框（按几何坐标判定）最多保留 k 个
/// 类别假设；计数只在单个来源内有效。其余情况为简单的前 k 个截取。
/// 检测任务要求每个类别条目都带有边界框（区域检测还需区域向量）。
pub fn select_best(
  results: &ResultSet,
  best: BestK,
  nclasses: Option<usize>,
  shape: TaskShape,
) -> Result<ResultSet, AggregateError> {
  let mut selected = ResultSet::new();
  let take_all = best.is_all(nclasses);
  debug!(
    "best-k 选择: best={:?}, 类别数={:?}, 形态={:?}",
    best, nclasses, shape
  );

  for record in results.iter() {
    check_shape(record, shape)?;
    let reduced = if !shape.has_boxes() {
      let k = best.count(nclasses).unwrap_or(usize::MAX);
      take_top(record, k)
    } else if take_all {
      take_top(record, usize::MAX)
    } else {
      let k = best.count(nclasses).unwrap_or(usize::MAX);
      take_per_box(record, k, shape.has_regions())
    };
    selected.push(reduced);
  }

  Ok(selected)
}

fn check_shape(record: &ResultRecord, shape: TaskShape) -> Result<(), AggregateError> {
  let expected = record.categories().len();
  if shape.has_boxes() && record.boxes().len() != expected {
    return Err(AggregateError::MissingBoxes {
      uri: record.label().to_string(),
      expected,
      actual: record.boxes().len(),
    });
  }
  if shape.has_regions() && record.regions().len() != expected {
    return Err(AggregateError::MissingRegions {
      uri: record.label().to_string(),
      expected,
      actual: record.regions().len(),
    });
  }
  Ok(())
}

fn take_top(record: &ResultRecord, k: usize) -> ResultRecord {
  let mut out = record.empty_like();
  out.categories = record.categories.top(k);
  out.boxes = record.boxes.top(k);
  out.regions = record.regions.top(k);
  out
}

fn take_per_box(record: &ResultRecord, k: usize, has_regions: bool) -> ResultRecord {
  let mut out = record.empty_like();
  let mut occurrences: HashMap<String, usize> = HashMap::new();
  let mut regions = record.regions.iter();

  for ((prob, cat), (bprob, bbox)) in record.categories.iter().zip(record.boxes.iter()) {
    let region = if has_regions { regions.next() } else { None };

    let count = occurrences.entry(bbox.dedup_key()).or_insert(0);
    *count += 1;
    if *count > k {
      continue;
    }

    out.categories.push_ordered(prob, cat.clone());
    out.boxes.push_ordered(bprob, *bbox);
    if let Some((vprob, vals)) = region {
      out.regions.push_ordered(vprob, vals.clone());
    }
  }

  out
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::aggregate::RawPrediction;
  use crate::record::BBox;

  fn names(n: usize) -> Vec<String> {
    (0..n).map(|i| format!("cat{}", i)).collect()
  }

  fn flat_set() -> ResultSet {
    let mut set = ResultSet::new();
    set
      .add_results(vec![
        RawPrediction::new("a", vec![0.1, 0.6, 0.3], names(3)),
        RawPrediction::new("b", vec![0.5, 0.2, 0.3], names(3)),
      ])
      .unwrap();
    set
  }

  /// 两个框 A、B，A 出现三次，B 出现两次
  fn detection_set() -> ResultSet {
    let a = BBox::new(0.1, 0.1, 0.4, 0.4);
    let b = BBox::new(0.5, 0.5, 0.9, 0.9);
    let mut set = ResultSet::new();
    set
      .add_result(
        RawPrediction::new("img", vec![0.9, 0.8, 0.7, 0.6, 0.5], names(5))
          .with_bboxes(vec![a, a, b, a, b])
          .with_rois(vec![vec![1.0], vec![2.0], vec![3.0], vec![4.0], vec![5.0]]),
      )
      .unwrap();
    set
  }

  #[test]
  fn test_flat_top_k() {
    let selected = select_best(&flat_set(), BestK::Top(2), Some(3), TaskShape::Classification).unwrap();
    assert_eq!(selected.len(), 2);
    let a = selected.get("a").unwrap();
    assert_eq!(a.categories().scores(), vec![0.6, 0.3]);
    let b = selected.get("b").unwrap();
    assert_eq!(b.categories().get(0).map(|(_, c)| c.as_str()), Some("cat0"));
  }

  #[test]
  fn test_flat_k_larger_than_size() {
    let selected = select_best(&flat_set(), BestK::Top(10), None, TaskShape::Classification).unwrap();
    assert_eq!(selected.get("a").unwrap().categories().len(), 3);
  }

  #[test]
  fn test_all_is_idempotent() {
    let set = detection_set();
    let once = select_best(&set, BestK::All, Some(5), TaskShape::RegionDetection).unwrap();
    let twice = select_best(&once, BestK::All, Some(5), TaskShape::RegionDetection).unwrap();
    let (r1, r2) = (once.get("img").unwrap(), twice.get("img").unwrap());
    assert_eq!(r1.categories(), r2.categories());
    assert_eq!(r1.boxes(), r2.boxes());
    assert_eq!(r1.regions(), r2.regions());
    assert_eq!(r1.categories().len(), 5);

    let flat = select_best(&flat_set(), BestK::All, Some(3), TaskShape::Classification).unwrap();
    let flat2 = select_best(&flat, BestK::All, Some(3), TaskShape::Classification).unwrap();
    assert_eq!(
      flat.get("b").unwrap().categories(),
      flat2.get("b").unwrap().categories()
    );
  }

  #[test]
  fn test_per_box_cap() {
    let selected = select_best(&detection_set(), BestK::Top(2), Some(80), TaskShape::RegionDetection).unwrap();
    let record = selected.get("img").unwrap();

    // A 保留前两次，第四个条目（A 第三次）被丢弃，B 不受影响
    assert_eq!(record.categories().scores(), vec![0.9, 0.8, 0.7, 0.5]);
    assert_eq!(record.boxes().len(), 4);
    assert_eq!(record.regions().len(), 4);
    let regions: Vec<f64> = record.regions().iter().map(|(_, v)| v[0]).collect();
    assert_eq!(regions, vec![1.0, 2.0, 3.0, 5.0]);
  }

  #[test]
  fn test_per_box_cap_of_one_keeps_each_box_once() {
    let selected = select_best(&detection_set(), BestK::Top(1), Some(80), TaskShape::Detection).unwrap();
    let record = selected.get("img").unwrap();
    assert_eq!(record.categories().scores(), vec![0.9, 0.7]);
    assert!(record.regions().is_empty());
  }

  #[test]
  fn test_counter_is_fresh_per_record() {
    let a = BBox::new(0.0, 0.0, 1.0, 1.0);
    let mut set = ResultSet::new();
    for uri in ["x", "y"] {
      set
        .add_result(RawPrediction::new(uri, vec![0.9, 0.8], names(2)).with_bboxes(vec![a, a]))
        .unwrap();
    }
    let selected = select_best(&set, BestK::Top(1), Some(80), TaskShape::Detection).unwrap();
    assert_eq!(selected.get("x").unwrap().categories().len(), 1);
    assert_eq!(selected.get("y").unwrap().categories().len(), 1);
  }

  #[test]
  fn test_detection_requires_boxes() {
    let mut set = ResultSet::new();
    set
      .add_result(RawPrediction::new("img", vec![0.9, 0.1], names(2)))
      .unwrap();
    for best in [BestK::Top(1), BestK::All] {
      assert!(matches!(
        select_best(&set, best, Some(80), TaskShape::Detection),
        Err(AggregateError::MissingBoxes { expected: 2, actual: 0, .. })
      ));
    }
    assert!(select_best(&set, BestK::Top(1), Some(80), TaskShape::Classification).is_ok());

    let mut set = ResultSet::new();
    set
      .add_result(
        RawPrediction::new("img", vec![0.9, 0.1], names(2))
          .with_bboxes(vec![BBox::new(0.0, 0.0, 1.0, 1.0), BBox::new(1.0, 1.0, 2.0, 2.0)]),
      )
      .unwrap();
    assert!(select_best(&set, BestK::Top(1), Some(80), TaskShape::Detection).is_ok());
    assert!(matches!(
      select_best(&set, BestK::Top(1), Some(80), TaskShape::RegionDetection),
      Err(AggregateError::MissingRegions { expected: 2, actual: 0, .. })
    ));
  }

  #[test]
  fn test_best_from_raw() {
    assert_eq!(BestK::from(-1), BestK::All);
    assert_eq!(BestK::from(3), BestK::Top(3));
    assert_eq!(BestK::resolve(None, BestK::Top(2)), BestK::Top(2));
    assert_eq!(BestK::resolve(Some(BestK::All), BestK::Top(2)), BestK::All);
    assert_eq!(BestK::All.count(Some(7)), Some(7));
  }
}
