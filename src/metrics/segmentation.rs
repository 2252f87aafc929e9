// 该文件是 Liangce （量测） 项目的一部分。
// src/metrics/segmentation.rs - 分割准确率与 IoU
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

use super::{EvalBatch, MetricsError};

#[derive(Debug, Clone, PartialEq)]
pub struct SegmentationScores {
  /// 像素级准确率，按样本平均
  pub accuracy: f64,
  pub mean_accuracy: f64,
  pub mean_iou: f64,
  /// 每个类别的准确率，未出现的类别为 0
  pub class_accuracy: Vec<f64>,
}

#[derive(Default, Clone, Copy)]
struct ClassStats {
  acc: f64,
  iou: f64,
  seen: usize,
}

/// 预测与目标均为逐像素的类别编号
///
/// 类别的准确率与 IoU 只在目标中出现该类别的样本上平均，
/// 均值只统计至少出现过一次的类别。
pub fn segmentation(batch: &EvalBatch) -> Result<SegmentationScores, MetricsError> {
  let n = batch.nclasses;
  let mut stats = vec![ClassStats::default(); n];
  let mut pixel_acc = 0.0;

  for (index, sample) in batch.samples.iter().enumerate() {
    let (pred, target) = (&sample.pred, sample.target.values());
    if pred.is_empty() || pred.len() != target.len() {
      return Err(MetricsError::malformed(
        index,
        format!("预测长度 {} 与目标长度 {} 不一致", pred.len(), target.len()),
      ));
    }
    let matched = pred.iter().zip(target).filter(|(p, t)| p == t).count();
    pixel_acc += matched as f64 / pred.len() as f64;

    for (c, stat) in stats.iter_mut().enumerate() {
      let c = c as f64;
      let (mut inter, mut false_pos, mut false_neg) = (0usize, 0usize, 0usize);
      for (&p, &t) in pred.iter().zip(target) {
        match (p == c, t == c) {
          (true, true) => inter += 1,
          (true, false) => false_pos += 1,
          (false, true) => false_neg += 1,
          (false, false) => {}
        }
      }
      let in_target = inter + false_neg;
      if in_target == 0 {
        continue;
      }
      stat.acc += inter as f64 / in_target as f64;
      stat.iou += inter as f64 / (inter + false_pos + false_neg) as f64;
      stat.seen += 1;
    }
  }

  let class_accuracy: Vec<f64> = stats
    .iter()
    .map(|s| if s.seen > 0 { s.acc / s.seen as f64 } else { 0.0 })
    .collect();
  let present: Vec<&ClassStats> = stats.iter().filter(|s| s.seen > 0).collect();
  let (mean_accuracy, mean_iou) = if present.is_empty() {
    (0.0, 0.0)
  } else {
    let count = present.len() as f64;
    (
      present.iter().map(|s| s.acc / s.seen as f64).sum::<f64>() / count,
      present.iter().map(|s| s.iou / s.seen as f64).sum::<f64>() / count,
    )
  };
  let accuracy = if batch.samples.is_empty() {
    0.0
  } else {
    pixel_acc / batch.batch_size() as f64
  };
  debug!(
    "分割指标: acc={} meanacc={} meaniou={}（出现类别 {}）",
    accuracy,
    mean_accuracy,
    mean_iou,
    present.len()
  );

  Ok(SegmentationScores {
    accuracy,
    mean_accuracy,
    mean_iou,
    class_accuracy,
  })
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::metrics::{EvalSample, Target};

  fn seg_batch(nclasses: usize, rows: Vec<(Vec<f64>, Vec<f64>)>) -> EvalBatch {
    let mut batch = EvalBatch::new(
      nclasses,
      rows
        .into_iter()
        .map(|(p, t)| EvalSample::new(p, Target::Vector(t)))
        .collect(),
    );
    batch.segmentation = true;
    batch
  }

  #[test]
  fn test_perfect_segmentation() {
    let batch = seg_batch(3, vec![(vec![0.0, 1.0, 1.0, 0.0], vec![0.0, 1.0, 1.0, 0.0])]);
    let s = segmentation(&batch).unwrap();
    assert_eq!(s.accuracy, 1.0);
    assert_eq!(s.mean_accuracy, 1.0);
    assert_eq!(s.mean_iou, 1.0);
    // 类别 2 未出现
    assert_eq!(s.class_accuracy, vec![1.0, 1.0, 0.0]);
  }

  #[test]
  fn test_partial_overlap() {
    // 类别 1：交集 1，目标 2，误报 1 -> acc 0.5, iou 1/3
    // 类别 0：交集 1，目标 2，误报 1 -> acc 0.5, iou 1/3
    let batch = seg_batch(2, vec![(vec![0.0, 1.0, 0.0, 1.0], vec![0.0, 0.0, 1.0, 1.0])]);
    let s = segmentation(&batch).unwrap();
    assert_eq!(s.accuracy, 0.5);
    assert!((s.mean_accuracy - 0.5).abs() < 1e-12);
    assert!((s.mean_iou - 1.0 / 3.0).abs() < 1e-12);
  }

  #[test]
  fn test_class_averaged_over_present_samples() {
    let batch = seg_batch(
      2,
      vec![
        (vec![1.0, 1.0], vec![1.0, 1.0]),
        (vec![0.0, 0.0], vec![0.0, 0.0]),
      ],
    );
    let s = segmentation(&batch).unwrap();
    assert_eq!(s.class_accuracy, vec![1.0, 1.0]);
    assert_eq!(s.mean_iou, 1.0);
  }

  #[test]
  fn test_length_mismatch() {
    let batch = seg_batch(2, vec![(vec![0.0, 1.0], vec![0.0])]);
    assert!(matches!(segmentation(&batch), Err(MetricsError::Malformed { index: 0, .. })));
  }
}
