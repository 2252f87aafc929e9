// 该文件是 Liangce （量测） 项目的一部分。
// src/metrics/loss.rs - 对数损失与欧氏损失
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

use super::{EvalBatch, MetricsError, class_index};

const MIN_PROB: f64 = 1e-15;

/// 多类别对数损失的批均值，概率下限截断为 1e-15
pub fn mcll(batch: &EvalBatch) -> Result<f64, MetricsError> {
  if batch.samples.is_empty() {
    return Ok(0.0);
  }
  let mut total = 0.0;
  for (index, sample) in batch.samples.iter().enumerate() {
    let target = class_index(index, sample.target.scalar(index)?, sample.pred.len())?;
    total -= sample.pred[target].max(MIN_PROB).ln();
  }
  Ok(total / batch.batch_size() as f64)
}

/// 平方误差和的批均值，负目标值视为忽略
///
/// 多维预测与目标向量逐维比较，单维预测与标量目标比较。
pub fn eucll(batch: &EvalBatch) -> Result<f64, MetricsError> {
  if batch.samples.is_empty() {
    return Ok(0.0);
  }
  let mut total = 0.0;
  for (index, sample) in batch.samples.iter().enumerate() {
    let target = sample.target.values();
    if sample.pred.len() > target.len() {
      return Err(MetricsError::malformed(
        index,
        format!("预测维度 {} 大于目标维度 {}", sample.pred.len(), target.len()),
      ));
    }
    total += sample
      .pred
      .iter()
      .zip(target)
      .filter(|(_, t)| **t >= 0.0)
      .map(|(p, t)| (p - t) * (p - t))
      .sum::<f64>();
  }
  Ok(total / batch.batch_size() as f64)
}
