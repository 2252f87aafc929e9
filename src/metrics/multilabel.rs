// 该文件是 Liangce （量测） 项目的一部分。
// src/metrics/multilabel.rs - 多标签指标
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

use super::{EvalBatch, EvalSample, MetricsError};

/// delta 准确率的误差阈值
pub const DELTAS: [f64; 4] = [0.05, 0.1, 0.2, 0.5];

const LOG_EPS: f64 = 1e-5;

#[derive(Debug, Clone, PartialEq)]
pub struct MultilabelScores {
  pub sensitivity: f64,
  pub specificity: f64,
  pub harmmean: f64,
  pub precision: f64,
  pub f1: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SoftScores {
  pub kl_divergence: f64,
  pub js_divergence: f64,
  pub wasserstein: f64,
  pub kolmogorov_smirnov: f64,
  pub distance_correlation: f64,
  pub r2: f64,
  /// (阈值, 误差小于阈值的比例)
  pub delta_scores: Vec<(f64, f64)>,
}

/// 预测与目标逐维配对，负目标视为忽略
fn labels(index: usize, sample: &EvalSample) -> Result<Vec<(f64, f64)>, MetricsError> {
  let target = sample.target.values();
  if sample.pred.len() != target.len() {
    return Err(MetricsError::malformed(
      index,
      format!("预测维度 {} 与标签维度 {} 不一致", sample.pred.len(), target.len()),
    ));
  }
  Ok(
    sample
      .pred
      .iter()
      .copied()
      .zip(target.iter().copied())
      .filter(|&(_, t)| t >= 0.0)
      .collect(),
  )
}

/// 硬标签：预测取符号，目标以 0.5 为界
pub fn multilabel_hard(batch: &EvalBatch) -> Result<MultilabelScores, MetricsError> {
  let (mut tp, mut fp, mut tn, mut false_neg) = (0.0, 0.0, 0.0, 0.0);
  for (index, sample) in batch.samples.iter().enumerate() {
    for (p, t) in labels(index, sample)? {
      match (t >= 0.5, p >= 0.0) {
        (true, true) => tp += 1.0,
        (true, false) => false_neg += 1.0,
        (false, true) => fp += 1.0,
        (false, false) => tn += 1.0,
      }
    }
  }

  let positives = tp + false_neg;
  let negatives = tn + fp;
  let sensitivity = if positives > 0.0 { tp / positives } else { 0.0 };
  let specificity = if negatives > 0.0 { tn / negatives } else { 0.0 };
  let harmmean = if sensitivity + specificity > 0.0 {
    2.0 * sensitivity * specificity / (sensitivity + specificity)
  } else {
    0.0
  };
  let precision = if tp > 0.0 { tp / (tp + fp) } else { 0.0 };
  let f1 = if tp > 0.0 {
    2.0 * tp / (2.0 * tp + fp + false_neg)
  } else {
    0.0
  };
  debug!(
    "多标签: tp={} fp={} tn={} fn={}",
    tp, fp, tn, false_neg
  );

  Ok(MultilabelScores {
    sensitivity,
    specificity,
    harmmean,
    precision,
    f1,
  })
}

/// 单个样本的距离相关系数，方差为 0 时返回 None
fn distance_correlation(pairs: &[(f64, f64)]) -> Option<f64> {
  let m = pairs.len();
  if m < 2 {
    return None;
  }
  let centered = |value: fn(&(f64, f64)) -> f64| {
    let mut d = vec![0.0; m * m];
    for j in 0..m {
      for k in 0..m {
        d[j * m + k] = (value(&pairs[j]) - value(&pairs[k])).abs();
      }
    }
    let row: Vec<f64> = (0..m)
      .map(|j| d[j * m..(j + 1) * m].iter().sum::<f64>() / m as f64)
      .collect();
    let grand = row.iter().sum::<f64>() / m as f64;
    for j in 0..m {
      for k in 0..m {
        // 距离矩阵对称，行均值与列均值相同
        d[j * m + k] += grand - row[j] - row[k];
      }
    }
    d
  };
  let a = centered(|&(_, t)| t);
  let b = centered(|&(p, _)| p);

  let cells = (m * m) as f64;
  let dcov = (a.iter().zip(&b).map(|(x, y)| x * y).sum::<f64>() / cells).max(0.0).sqrt();
  let dvar_t = (a.iter().map(|x| x * x).sum::<f64>() / cells).sqrt();
  let dvar_p = (b.iter().map(|y| y * y).sum::<f64>() / cells).sqrt();
  if dvar_t <= 0.0 || dvar_p <= 0.0 {
    return None;
  }
  Some(dcov / (dvar_t * dvar_p).sqrt())
}

/// 软标签：连续多标签回归的分布距离
pub fn multilabel_soft(batch: &EvalBatch) -> Result<SoftScores, MetricsError> {
  let mut samples = Vec::with_capacity(batch.batch_size());
  for (index, sample) in batch.samples.iter().enumerate() {
    samples.push(labels(index, sample)?);
  }
  let total: usize = samples.iter().map(Vec::len).sum();
  if total == 0 {
    return Ok(SoftScores {
      kl_divergence: 0.0,
      js_divergence: 0.0,
      wasserstein: 0.0,
      kolmogorov_smirnov: 0.0,
      distance_correlation: 0.0,
      r2: 0.0,
      delta_scores: DELTAS.iter().map(|&d| (d, 0.0)).collect(),
    });
  }

  let (mut kl, mut js, mut ssres, mut ks, mut tsum) = (0.0, 0.0, 0.0, 0.0f64, 0.0);
  let mut within = [0usize; DELTAS.len()];
  for &(p, t) in samples.iter().flatten() {
    let (tv, pv) = (t.max(LOG_EPS), p.max(LOG_EPS));
    kl += tv * (tv / pv).ln();
    js += 0.5 * tv * (2.0 * tv / (tv + pv)).ln() + 0.5 * pv * (2.0 * pv / (tv + pv)).ln();
    let diff = t - p;
    ssres += diff * diff;
    ks = ks.max(diff.abs());
    for (count, delta) in within.iter_mut().zip(DELTAS) {
      if diff.abs() < delta {
        *count += 1;
      }
    }
    tsum += t;
  }

  let n = total as f64;
  let tmean = tsum / n;
  let sstot: f64 = samples
    .iter()
    .flatten()
    .map(|&(_, t)| (t - tmean) * (t - tmean))
    .sum();

  let dcor = samples
    .iter()
    .filter_map(|s| distance_correlation(s))
    .sum::<f64>()
    / batch.batch_size() as f64;

  let scores = SoftScores {
    kl_divergence: kl / n,
    js_divergence: js / n,
    wasserstein: ssres.sqrt() / n.sqrt(),
    kolmogorov_smirnov: ks,
    distance_correlation: dcor,
    r2: 1.0 - ssres / sstot.max(f64::EPSILON),
    delta_scores: DELTAS
      .iter()
      .zip(within)
      .map(|(&d, count)| (d, count as f64 / n))
      .collect(),
  };
  debug!("软标签指标: {:?}", scores);
  Ok(scores)
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::metrics::Target;

  fn ml_batch(rows: Vec<(Vec<f64>, Vec<f64>)>) -> EvalBatch {
    let nclasses = rows.first().map(|(p, _)| p.len()).unwrap_or(0);
    let mut batch = EvalBatch::new(
      nclasses,
      rows
        .into_iter()
        .map(|(p, t)| EvalSample::new(p, Target::Vector(t)))
        .collect(),
    );
    batch.multilabel = true;
    batch
  }

  #[test]
  fn test_hard_counts() {
    let batch = ml_batch(vec![
      (vec![1.0, -1.0, 0.5, -0.2], vec![1.0, 0.0, 0.0, 1.0]),
      (vec![0.3, -0.1, -2.0, 0.0], vec![1.0, 0.0, -1.0, 0.0]),
    ]);
    // tp=2 fn=1 fp=2 tn=2，第二个样本第三维被忽略
    let s = multilabel_hard(&batch).unwrap();
    assert!((s.sensitivity - 2.0 / 3.0).abs() < 1e-12);
    assert!((s.specificity - 0.5).abs() < 1e-12);
    assert!((s.precision - 0.5).abs() < 1e-12);
    assert!((s.f1 - 4.0 / 7.0).abs() < 1e-12);
    let harm = 2.0 * (2.0 / 3.0) * 0.5 / (2.0 / 3.0 + 0.5);
    assert!((s.harmmean - harm).abs() < 1e-12);
  }

  #[test]
  fn test_hard_without_positives() {
    let batch = ml_batch(vec![(vec![-1.0, -1.0], vec![0.0, 0.0])]);
    let s = multilabel_hard(&batch).unwrap();
    assert_eq!(s.sensitivity, 0.0);
    assert_eq!(s.specificity, 1.0);
    assert_eq!(s.harmmean, 0.0);
    assert_eq!(s.f1, 0.0);
  }

  #[test]
  fn test_soft_perfect_prediction() {
    let batch = ml_batch(vec![
      (vec![0.2, 0.3, 0.5], vec![0.2, 0.3, 0.5]),
      (vec![0.1, 0.6, 0.3], vec![0.1, 0.6, 0.3]),
    ]);
    let s = multilabel_soft(&batch).unwrap();
    assert!(s.kl_divergence.abs() < 1e-12);
    assert!(s.js_divergence.abs() < 1e-12);
    assert_eq!(s.wasserstein, 0.0);
    assert_eq!(s.kolmogorov_smirnov, 0.0);
    assert!((s.r2 - 1.0).abs() < 1e-12);
    assert!((s.distance_correlation - 1.0).abs() < 1e-9);
    assert!(s.delta_scores.iter().all(|&(_, v)| v == 1.0));
  }

  #[test]
  fn test_soft_deltas_and_ks() {
    let batch = ml_batch(vec![(vec![0.0, 0.0, 0.0, 0.0], vec![0.01, 0.08, 0.15, 0.4])]);
    let s = multilabel_soft(&batch).unwrap();
    let deltas: Vec<f64> = s.delta_scores.iter().map(|&(_, v)| v).collect();
    assert_eq!(deltas, vec![0.25, 0.5, 0.75, 1.0]);
    assert!((s.kolmogorov_smirnov - 0.4).abs() < 1e-12);
    // 预测为常数，距离方差为 0，该样本不计入
    assert_eq!(s.distance_correlation, 0.0);
  }

  #[test]
  fn test_soft_ignores_negative_targets() {
    let batch = ml_batch(vec![(vec![0.5, 0.9], vec![0.5, -1.0])]);
    let s = multilabel_soft(&batch).unwrap();
    assert_eq!(s.kolmogorov_smirnov, 0.0);
    assert_eq!(s.wasserstein, 0.0);
  }

  #[test]
  fn test_dimension_mismatch() {
    let batch = ml_batch(vec![(vec![0.5, 0.9], vec![0.5])]);
    assert!(multilabel_soft(&batch).is_err());
    assert!(multilabel_hard(&batch).is_err());
  }
}
