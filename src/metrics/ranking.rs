// 该文件是 Liangce （量测） 项目的一部分。
// src/metrics/ranking.rs - AUC 与归一化 Gini
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

use super::{EvalBatch, MetricsError, argmax, class_index};

/// 以正类（编号 1）分数计算的 ROC 曲线下面积
///
/// 只有一种类别时返回 1。
pub fn auc(batch: &EvalBatch) -> Result<f64, MetricsError> {
  let mut pairs: Vec<(f64, u64)> = Vec::with_capacity(batch.batch_size());
  for (index, sample) in batch.samples.iter().enumerate() {
    let score = *sample
      .pred
      .get(1)
      .ok_or_else(|| MetricsError::malformed(index, "auc 需要正类分数（预测向量至少两维）"))?;
    let answer = class_index(index, sample.target.scalar(index)?, 2)? as u64;
    pairs.push((score, answer));
  }
  pairs.sort_by(|a, b| a.0.total_cmp(&b.0));

  let count = pairs.len() as u64;
  let ones: u64 = pairs.iter().map(|(_, a)| a).sum();
  if ones == 0 || ones == count {
    return Ok(1.0);
  }

  // 按阈值分段的梯形面积，同分样本归为一段
  let (mut true_pos, mut tp0) = (ones, ones);
  let (mut accum, mut true_neg) = (0u64, 0u64);
  let mut threshold = pairs[0].0;
  for &(score, answer) in &pairs {
    if score != threshold {
      threshold = score;
      accum += true_neg * (true_pos + tp0);
      tp0 = true_pos;
      true_neg = 0;
    }
    true_neg += 1 - answer;
    true_pos -= answer;
  }
  accum += true_neg * (true_pos + tp0);

  Ok(accum as f64 / (2 * ones * (count - ones)) as f64)
}

fn raw_gini(actual: &[f64], predicted: &[f64]) -> f64 {
  let n = actual.len();
  let total: f64 = actual.iter().sum();
  if n == 0 || total == 0.0 {
    return 0.0;
  }
  let mut order: Vec<usize> = (0..n).collect();
  order.sort_by(|&a, &b| predicted[b].total_cmp(&predicted[a]));

  let (mut acc_loss, mut acc_pop, mut sum) = (0.0, 0.0, 0.0);
  for i in order {
    acc_loss += actual[i] / total;
    acc_pop += 1.0 / n as f64;
    sum += acc_loss - acc_pop;
  }
  sum / n as f64
}

/// 归一化 Gini 系数
///
/// 回归取预测的第一维，分类取预测的最大类别编号。
pub fn gini(batch: &EvalBatch, regression: bool) -> Result<f64, MetricsError> {
  let mut actual = Vec::with_capacity(batch.batch_size());
  let mut predicted = Vec::with_capacity(batch.batch_size());
  for (index, sample) in batch.samples.iter().enumerate() {
    actual.push(sample.target.scalar(index)?);
    let p = if regression {
      sample.pred.first().copied()
    } else {
      argmax(&sample.pred).map(|c| c as f64)
    };
    predicted.push(p.ok_or_else(|| MetricsError::malformed(index, "预测向量为空"))?);
  }

  let best = raw_gini(&actual, &actual);
  if best == 0.0 || !best.is_finite() {
    return Ok(0.0);
  }
  Ok(raw_gini(&actual, &predicted) / best)
}
