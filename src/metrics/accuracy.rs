// 该文件是 Liangce （量测） 项目的一部分。
// src/metrics/accuracy.rs - top-k 准确率
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

use tracing::{debug, warn};

use super::{EvalBatch, MetricsError};

/// 从指标名中解析 top-k 的 k，`acc` 为 1，`acc-N` 为 N
pub fn requested_ks(measures: &[String]) -> Vec<usize> {
  let mut ks = Vec::new();
  for name in measures {
    let k = if name == "acc" {
      Some(1)
    } else if let Some(suffix) = name.strip_prefix("acc-") {
      match suffix.parse::<usize>() {
        Ok(k) if k >= 1 => Some(k),
        _ => {
          warn!("无法解析的准确率指标: {}", name);
          None
        }
      }
    } else {
      None
    };
    if let Some(k) = k
      && !ks.contains(&k)
    {
      ks.push(k);
    }
  }
  ks
}

/// 按分数降序排列的类别编号，分数相同时编号小者在前
fn ranked_classes(pred: &[f64]) -> Vec<usize> {
  let mut order: Vec<usize> = (0..pred.len()).collect();
  order.sort_by(|&a, &b| pred[b].total_cmp(&pred[a]));
  order
}

/// 目标类别出现在前 k 名中的样本比例
///
/// 预测向量长度小于 k 的样本不参与计算，也不计入分母。
pub fn ranked_accuracy(batch: &EvalBatch, ks: &[usize]) -> Result<Vec<(String, f64)>, MetricsError> {
  let mut out = Vec::with_capacity(ks.len());
  for &k in ks {
    let mut hits = 0usize;
    let mut evaluated = 0usize;
    for (index, sample) in batch.samples.iter().enumerate() {
      if k > sample.pred.len() {
        continue;
      }
      let target = sample.target.scalar(index)?;
      evaluated += 1;
      if ranked_classes(&sample.pred)[..k]
        .iter()
        .any(|&c| c as f64 == target)
      {
        hits += 1;
      }
    }
    let acc = if evaluated > 0 {
      hits as f64 / evaluated as f64
    } else {
      0.0
    };
    debug!("top-{} 准确率 {}（{}/{}）", k, acc, hits, evaluated);
    let key = if k == 1 {
      "acc".to_string()
    } else {
      format!("acc-{}", k)
    };
    out.push((key, acc));
  }
  Ok(out)
}
