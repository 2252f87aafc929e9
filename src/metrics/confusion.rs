// 该文件是 Liangce （量测） 项目的一部分。
// src/metrics/confusion.rs - 混淆矩阵、F1 与 MCC
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

use super::{EvalBatch, MetricsError, argmax, class_index};

const EPS: f64 = 1e-8;

/// 方阵，行为预测类别，列为真实类别
#[derive(Debug, Clone, PartialEq)]
pub struct ConfusionMatrix {
  n: usize,
  cells: Vec<f64>,
}

impl ConfusionMatrix {
  pub fn zeros(n: usize) -> Self {
    Self {
      n,
      cells: vec![0.0; n * n],
    }
  }

  pub fn from_batch(batch: &EvalBatch) -> Result<Self, MetricsError> {
    let n = batch.nclasses;
    let mut matrix = Self::zeros(n);
    for (index, sample) in batch.samples.iter().enumerate() {
      let predicted = argmax(&sample.pred)
        .ok_or_else(|| MetricsError::malformed(index, "预测向量为空"))?;
      if predicted >= n {
        return Err(MetricsError::malformed(
          index,
          format!("预测向量长度 {} 超过类别数 {}", sample.pred.len(), n),
        ));
      }
      let truth = class_index(index, sample.target.scalar(index)?, n)?;
      matrix.add(predicted, truth);
    }
    Ok(matrix)
  }

  pub fn add(&mut self, predicted: usize, truth: usize) {
    self.cells[predicted * self.n + truth] += 1.0;
  }

  pub fn get(&self, predicted: usize, truth: usize) -> f64 {
    self.cells[predicted * self.n + truth]
  }

  pub fn total(&self) -> f64 {
    self.cells.iter().sum()
  }

  pub fn trace(&self) -> f64 {
    (0..self.n).map(|i| self.get(i, i)).sum()
  }

  pub fn row_sum(&self, predicted: usize) -> f64 {
    (0..self.n).map(|t| self.get(predicted, t)).sum()
  }

  pub fn col_sum(&self, truth: usize) -> f64 {
    (0..self.n).map(|p| self.get(p, truth)).sum()
  }

  pub fn scores(&self) -> F1Scores {
    let n = self.n;
    let diagonal: Vec<f64> = (0..n).map(|c| self.get(c, c) / (self.col_sum(c) + EPS)).collect();
    let mean = |v: &[f64]| if v.is_empty() { 0.0 } else { v.iter().sum::<f64>() / v.len() as f64 };

    let precision = mean(&diagonal);
    let per_row: Vec<f64> = (0..n).map(|c| self.get(c, c) / (self.row_sum(c) + EPS)).collect();
    let recall = mean(&per_row);
    let total = self.total();
    let accuracy = if total > 0.0 { self.trace() / total } else { 0.0 };
    let f1 = if precision + recall > 0.0 {
      2.0 * precision * recall / (precision + recall)
    } else {
      0.0
    };

    let normalized = (0..n)
      .map(|truth| {
        let sum = self.col_sum(truth);
        (0..n)
          .map(|p| if sum > 0.0 { self.get(p, truth) / sum } else { 0.0 })
          .collect()
      })
      .collect();

    F1Scores {
      f1,
      precision,
      recall,
      accuracy,
      diagonal,
      normalized,
    }
  }
}

#[derive(Debug, Clone, PartialEq)]
pub struct F1Scores {
  pub f1: f64,
  pub precision: f64,
  pub recall: f64,
  /// 混淆矩阵对角线占比
  pub accuracy: f64,
  pub diagonal: Vec<f64>,
  /// 按真实类别归一化的列
  pub normalized: Vec<Vec<f64>>,
}

pub fn f1_scores(batch: &EvalBatch) -> Result<F1Scores, MetricsError> {
  let scores = ConfusionMatrix::from_batch(batch)?.scores();
  debug!(
    "f1={} precision={} recall={} accp={}",
    scores.f1, scores.precision, scores.recall, scores.accuracy
  );
  Ok(scores)
}

/// 二分类的 Matthews 相关系数
pub fn mcc(batch: &EvalBatch) -> Result<f64, MetricsError> {
  if batch.nclasses != 2 {
    return Err(MetricsError::NotBinary {
      measure: "mcc",
      nclasses: batch.nclasses,
    });
  }
  let m = ConfusionMatrix::from_batch(batch)?;
  let (tp, tn) = (m.get(0, 0), m.get(1, 1));
  let (false_neg, false_pos) = (m.get(0, 1), m.get(1, 0));
  let mut den = (tp + false_pos) * (tp + false_neg) * (tn + false_pos) * (tn + false_neg);
  if den == 0.0 {
    den = 1.0;
  }
  Ok((tp * tn - false_pos * false_neg) / den.sqrt())
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::metrics::tests::scalar_batch;

  /// 行为预测，列为真实：[[8, 2], [1, 9]]
  fn sample_batch() -> EvalBatch {
    const ZERO: &[f64] = &[0.9, 0.1];
    const ONE: &[f64] = &[0.1, 0.9];
    let mut rows: Vec<(&[f64], f64)> = Vec::new();
    rows.extend(std::iter::repeat_n((ZERO, 0.0), 8));
    rows.extend(std::iter::repeat_n((ZERO, 1.0), 2));
    rows.extend(std::iter::repeat_n((ONE, 0.0), 1));
    rows.extend(std::iter::repeat_n((ONE, 1.0), 9));
    scalar_batch(2, &rows)
  }

  #[test]
  fn test_matrix_layout() {
    let m = ConfusionMatrix::from_batch(&sample_batch()).unwrap();
    assert_eq!(m.get(0, 0), 8.0);
    assert_eq!(m.get(0, 1), 2.0);
    assert_eq!(m.get(1, 0), 1.0);
    assert_eq!(m.get(1, 1), 9.0);
    assert_eq!(m.total(), 20.0);
  }

  #[test]
  fn test_f1_scores() {
    let s = f1_scores(&sample_batch()).unwrap();
    assert!((s.accuracy - 0.85).abs() < 1e-12);

    let precision = (8.0 / 9.0 + 9.0 / 11.0) / 2.0;
    let recall = (8.0 / 10.0 + 9.0 / 10.0) / 2.0;
    assert!((s.precision - precision).abs() < 1e-6);
    assert!((s.recall - recall).abs() < 1e-6);
    assert!((s.f1 - 2.0 * precision * recall / (precision + recall)).abs() < 1e-6);

    assert!((s.diagonal[0] - 8.0 / 9.0).abs() < 1e-6);
    assert!((s.normalized[1][0] - 2.0 / 11.0).abs() < 1e-12);
    assert!((s.normalized[1][1] - 9.0 / 11.0).abs() < 1e-12);
  }

  #[test]
  fn test_empty_class_column() {
    let batch = scalar_batch(3, &[(&[0.9, 0.1, 0.0], 0.0), (&[0.1, 0.9, 0.0], 1.0)]);
    let s = f1_scores(&batch).unwrap();
    assert_eq!(s.normalized[2], vec![0.0, 0.0, 0.0]);
    assert_eq!(s.accuracy, 1.0);
  }

  #[test]
  fn test_out_of_range_target() {
    let batch = scalar_batch(2, &[(&[0.9, 0.1], -1.0)]);
    assert!(matches!(
      f1_scores(&batch),
      Err(MetricsError::OutOfRangeTarget { index: 0, .. })
    ));
  }

  #[test]
  fn test_mcc() {
    let m = mcc(&sample_batch()).unwrap();
    let expected = (8.0 * 9.0 - 1.0 * 2.0) / ((8.0f64 + 1.0) * (8.0 + 2.0) * (9.0 + 1.0) * (9.0 + 2.0)).sqrt();
    assert!((m - expected).abs() < 1e-12);
  }

  #[test]
  fn test_mcc_zero_denominator() {
    let batch = scalar_batch(2, &[(&[0.9, 0.1], 0.0), (&[0.8, 0.2], 0.0)]);
    assert_eq!(mcc(&batch).unwrap(), 0.0);
  }

  #[test]
  fn test_mcc_requires_binary() {
    let batch = scalar_batch(3, &[(&[0.9, 0.1, 0.0], 0.0)]);
    assert!(matches!(mcc(&batch), Err(MetricsError::NotBinary { nclasses: 3, .. })));
  }
}
