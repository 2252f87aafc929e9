// 该文件是 Liangce （量测） 项目的一部分。
// src/metrics.rs - 评估指标
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

//! 所有评估函数都是作用于 [`EvalBatch`] 的纯函数。

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::task::MeasureKind;

mod accuracy;
mod confusion;
mod loss;
mod multilabel;
mod ranking;
mod segmentation;

pub use self::accuracy::{ranked_accuracy, requested_ks};
pub use self::confusion::{ConfusionMatrix, F1Scores, f1_scores, mcc};
pub use self::loss::{eucll, mcll};
pub use self::multilabel::{DELTAS, MultilabelScores, SoftScores, multilabel_hard, multilabel_soft};
pub use self::ranking::{auc, gini};
pub use self::segmentation::{SegmentationScores, segmentation};

#[derive(Error, Debug)]
pub enum MetricsError {
  #[error("第 {index} 个样本的目标类别 {target} 超出范围 [0, {nclasses})（是否误用了 label_offset 或 nclasses？）")]
  OutOfRangeTarget {
    index: usize,
    target: f64,
    nclasses: usize,
  },
  #[error("第 {index} 个样本格式错误: {reason}")]
  Malformed { index: usize, reason: String },
  #[error("{measure} 仅适用于二分类，当前类别数 {nclasses}")]
  NotBinary {
    measure: &'static str,
    nclasses: usize,
  },
}

impl MetricsError {
  pub(crate) fn malformed(index: usize, reason: impl Into<String>) -> Self {
    MetricsError::Malformed {
      index,
      reason: reason.into(),
    }
  }
}

/// 样本目标：类别编号、回归值或逐维向量
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum Target {
  Scalar(f64),
  Vector(Vec<f64>),
}

impl Target {
  pub fn scalar(&self, index: usize) -> Result<f64, MetricsError> {
    match self {
      Target::Scalar(v) => Ok(*v),
      Target::Vector(v) if v.len() == 1 => Ok(v[0]),
      Target::Vector(v) => Err(MetricsError::malformed(
        index,
        format!("需要标量目标，实际为 {} 维向量", v.len()),
      )),
    }
  }

  pub fn values(&self) -> &[f64] {
    match self {
      Target::Scalar(v) => std::slice::from_ref(v),
      Target::Vector(v) => v,
    }
  }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct EvalSample {
  pub pred: Vec<f64>,
  pub target: Target,
}

impl EvalSample {
  pub fn new(pred: Vec<f64>, target: Target) -> Self {
    Self { pred, target }
  }
}

/// 一次评估调用的样本集合
#[derive(Debug, Clone, Default, Deserialize)]
pub struct EvalBatch {
  pub nclasses: usize,
  #[serde(default)]
  pub regression: bool,
  #[serde(default)]
  pub segmentation: bool,
  #[serde(default)]
  pub multilabel: bool,
  #[serde(default)]
  pub clnames: Vec<String>,
  #[serde(default)]
  pub loss: Option<f64>,
  #[serde(default)]
  pub train_loss: Option<f64>,
  #[serde(default)]
  pub iteration: Option<f64>,
  pub samples: Vec<EvalSample>,
}

impl EvalBatch {
  pub fn new(nclasses: usize, samples: Vec<EvalSample>) -> Self {
    Self {
      nclasses,
      samples,
      ..Default::default()
    }
  }

  pub fn batch_size(&self) -> usize {
    self.samples.len()
  }

  pub fn kind(&self) -> MeasureKind {
    MeasureKind::from_flags(self.regression, self.segmentation, self.multilabel)
  }

  /// 类别名，未提供时使用类别编号
  pub fn class_names(&self) -> Vec<String> {
    (0..self.nclasses)
      .map(|c| {
        self
          .clnames
          .get(c)
          .cloned()
          .unwrap_or_else(|| c.to_string())
      })
      .collect()
  }
}

/// 目标类别编号检查，负数、越界或带小数部分直接报错
pub(crate) fn class_index(index: usize, target: f64, nclasses: usize) -> Result<usize, MetricsError> {
  if !target.is_finite() || target < 0.0 || target >= nclasses as f64 {
    return Err(MetricsError::OutOfRangeTarget {
      index,
      target,
      nclasses,
    });
  }
  if target.fract() != 0.0 {
    return Err(MetricsError::malformed(
      index,
      format!("目标类别 {} 不是整数", target),
    ));
  }
  Ok(target as usize)
}

/// 第一个最大值的位置
pub(crate) fn argmax(values: &[f64]) -> Option<usize> {
  let mut best: Option<(usize, f64)> = None;
  for (i, &v) in values.iter().enumerate() {
    match best {
      Some((_, b)) if v <= b => {}
      _ => best = Some((i, v)),
    }
  }
  best.map(|(i, _)| i)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum MeasureValue {
  Scalar(f64),
  Vector(Vec<f64>),
  Labels(Vec<String>),
  Table(Vec<BTreeMap<String, Vec<f64>>>),
}

impl MeasureValue {
  pub fn as_scalar(&self) -> Option<f64> {
    match self {
      MeasureValue::Scalar(v) => Some(*v),
      _ => None,
    }
  }

  pub fn as_vector(&self) -> Option<&[f64]> {
    match self {
      MeasureValue::Vector(v) => Some(v),
      _ => None,
    }
  }
}

impl From<f64> for MeasureValue {
  fn from(v: f64) -> Self {
    MeasureValue::Scalar(v)
  }
}

impl From<Vec<f64>> for MeasureValue {
  fn from(v: Vec<f64>) -> Self {
    MeasureValue::Vector(v)
  }
}

pub type MeasureSummary = BTreeMap<String, MeasureValue>;

/// 按请求的指标名计算评估结果
///
/// 未请求或不适用于当前任务的指标直接跳过；目标越界等错误会中止整个计算。
pub fn measure(batch: &EvalBatch, measures: &[String]) -> Result<MeasureSummary, MetricsError> {
  let kind = batch.kind();
  info!(
    "计算评估指标 {:?}，样本数 {}，任务 {:?}",
    measures,
    batch.batch_size(),
    kind
  );
  compute(batch, kind, measures).inspect_err(|e| error!("评估指标计算失败: {}", e))
}

fn compute(batch: &EvalBatch, kind: MeasureKind, measures: &[String]) -> Result<MeasureSummary, MetricsError> {
  let wants = |name: &str| measures.iter().any(|m| m == name);
  let binary = |name: &str| {
    if batch.nclasses != 2 {
      warn!("{} 仅适用于二分类，类别数 {}，跳过", name, batch.nclasses);
      return false;
    }
    true
  };
  let mut out = MeasureSummary::new();

  if wants("auc") && binary("auc") {
    out.insert("auc".into(), auc(batch)?.into());
  }

  if kind.is_flat() {
    let ks = requested_ks(measures);
    if !ks.is_empty() {
      for (key, acc) in ranked_accuracy(batch, &ks)? {
        out.insert(key, acc.into());
      }
    }
  }

  if wants("acc") {
    match kind {
      MeasureKind::Segmentation => {
        let scores = segmentation(batch)?;
        out.insert("acc".into(), scores.accuracy.into());
        out.insert("meanacc".into(), scores.mean_accuracy.into());
        out.insert("meaniou".into(), scores.mean_iou.into());
        out.insert("clacc".into(), scores.class_accuracy.into());
      }
      MeasureKind::MultilabelHard => {
        let scores = multilabel_hard(batch)?;
        out.insert("f1".into(), scores.f1.into());
        out.insert("precision".into(), scores.precision.into());
        out.insert("sensitivity".into(), scores.sensitivity.into());
        out.insert("specificity".into(), scores.specificity.into());
        out.insert("harmmean".into(), scores.harmmean.into());
      }
      MeasureKind::MultilabelSoft => {
        let scores = multilabel_soft(batch)?;
        out.insert("kl_divergence".into(), scores.kl_divergence.into());
        out.insert("js_divergence".into(), scores.js_divergence.into());
        out.insert("wasserstein".into(), scores.wasserstein.into());
        out.insert("kolmogorov_smirnov".into(), scores.kolmogorov_smirnov.into());
        out.insert("distance_correlation".into(), scores.distance_correlation.into());
        out.insert("r2".into(), scores.r2.into());
        for (delta, score) in scores.delta_scores {
          out.insert(format!("delta_score_{}", delta), score.into());
        }
      }
      MeasureKind::Classification | MeasureKind::Regression => {}
    }
  }

  if kind.is_flat() && wants("f1") {
    let scores = f1_scores(batch)?;
    out.insert("f1".into(), scores.f1.into());
    out.insert("precision".into(), scores.precision.into());
    out.insert("recall".into(), scores.recall.into());
    out.insert("accp".into(), scores.accuracy.into());
    if wants("cmdiag") {
      out.insert("cmdiag".into(), scores.diagonal.clone().into());
      out.insert("labels".into(), MeasureValue::Labels(batch.class_names()));
    }
    if wants("cmfull") {
      let table = batch
        .class_names()
        .into_iter()
        .zip(scores.normalized)
        .map(|(name, column)| BTreeMap::from([(name, column)]))
        .collect();
      out.insert("cmfull".into(), MeasureValue::Table(table));
    }
  }

  if kind.is_flat() && wants("mcll") {
    out.insert("mcll".into(), mcll(batch)?.into());
  }
  if wants("gini") {
    out.insert("gini".into(), gini(batch, batch.regression)?.into());
  }
  if wants("eucll") {
    out.insert("eucll".into(), eucll(batch)?.into());
  }
  if wants("mcc") && binary("mcc") {
    out.insert("mcc".into(), mcc(batch)?.into());
  }

  if let Some(loss) = batch.loss {
    out.insert("loss".into(), loss.into());
  }
  if let Some(train_loss) = batch.train_loss {
    out.insert("train_loss".into(), train_loss.into());
  }
  if let Some(iteration) = batch.iteration {
    out.insert("iteration".into(), iteration.into());
  }

  debug!("评估结果: {:?}", out);
  Ok(out)
}
