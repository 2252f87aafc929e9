// 该文件是 Liangce （量测） 项目的一部分。
// src/aggregate.rs - 按来源聚合推理结果
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
use thiserror::Error;
use tracing::debug;

use crate::record::{BBox, ResultRecord};

/// 推理层给出的单个样本结果
#[derive(Debug, Clone, Deserialize)]
pub struct RawPrediction {
  pub uri: String,
  #[serde(default)]
  pub loss: f64,
  pub probs: Vec<f64>,
  pub cats: Vec<String>,
  #[serde(default)]
  pub bboxes: Option<Vec<BBox>>,
  #[serde(default, alias = "vals")]
  pub rois: Option<Vec<Vec<f64>>>,
}

impl RawPrediction {
  pub fn new(uri: impl Into<String>, probs: Vec<f64>, cats: Vec<String>) -> Self {
    Self {
      uri: uri.into(),
      loss: 0.0,
      probs,
      cats,
      bboxes: None,
      rois: None,
    }
  }

  pub fn with_loss(mut self, loss: f64) -> Self {
    self.loss = loss;
    self
  }

  pub fn with_bboxes(mut self, bboxes: Vec<BBox>) -> Self {
    self.bboxes = Some(bboxes);
    self
  }

  pub fn with_rois(mut self, rois: Vec<Vec<f64>>) -> Self {
    self.rois = Some(rois);
    self
  }

  fn validate(&self) -> Result<(), AggregateError> {
    if self.cats.len() != self.probs.len() {
      return Err(AggregateError::CategoryMismatch {
        uri: self.uri.clone(),
        probs: self.probs.len(),
        cats: self.cats.len(),
      });
    }
    if let Some(bboxes) = &self.bboxes
      && bboxes.len() < self.probs.len()
    {
      return Err(AggregateError::MissingBoxes {
        uri: self.uri.clone(),
        expected: self.probs.len(),
        actual: bboxes.len(),
      });
    }
    if let Some(rois) = &self.rois
      && rois.len() < self.probs.len()
    {
      return Err(AggregateError::MissingRegions {
        uri: self.uri.clone(),
        expected: self.probs.len(),
        actual: rois.len(),
      });
    }
    Ok(())
  }
}

/// 输入形状错误
#[derive(Error, Debug)]
pub enum AggregateError {
  #[error("类别数量 {cats} 与分数数量 {probs} 不一致: {uri}")]
  CategoryMismatch {
    uri: String,
    probs: usize,
    cats: usize,
  },
  #[error("边界框数量 {actual} 少于分数数量 {expected}: {uri}")]
  MissingBoxes {
    uri: String,
    expected: usize,
    actual: usize,
  },
  #[error("区域向量数量 {actual} 少于分数数量 {expected}: {uri}")]
  MissingRegions {
    uri: String,
    expected: usize,
    actual: usize,
  },
  #[error("区域序号 {rank} 超出范围: {uri}")]
  RegionOutOfRange { uri: String, rank: usize },
}

/// 一次请求内按 uri 聚合的结果集合
///
/// `index` 与 `records` 同步维护，记录按首次出现的顺序排列。
#[derive(Debug, Clone, Default)]
pub struct ResultSet {
  index: HashMap<String, usize>,
  records: Vec<ResultRecord>,
}

impl ResultSet {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn len(&self) -> usize {
    self.records.len()
  }

  pub fn is_empty(&self) -> bool {
    self.records.is_empty()
  }

  pub fn get(&self, uri: &str) -> Option<&ResultRecord> {
    self.index.get(uri).map(|&i| &self.records[i])
  }

  pub fn records(&self) -> &[ResultRecord] {
    &self.records
  }

  pub fn iter(&self) -> std::slice::Iter<'_, ResultRecord> {
    self.records.iter()
  }

  pub(crate) fn records_mut(&mut self) -> std::slice::IterMut<'_, ResultRecord> {
    self.records.iter_mut()
  }

  /// 取出 uri 对应的记录，不存在时以 loss 新建
  fn entry(&mut self, uri: &str, loss: f64) -> &mut ResultRecord {
    let idx = match self.index.get(uri) {
      Some(&idx) => idx,
      None => {
        let idx = self.records.len();
        self.index.insert(uri.to_string(), idx);
        self.records.push(ResultRecord::new(uri, loss));
        idx
      }
    };
    &mut self.records[idx]
  }

  /// 追加一条已构建好的记录；uri 已存在时返回 false 且不做修改
  pub(crate) fn push(&mut self, record: ResultRecord) -> bool {
    if self.index.contains_key(record.label()) {
      return false;
    }
    self
      .index
      .insert(record.label().to_string(), self.records.len());
    self.records.push(record);
    true
  }

  pub fn add_result(&mut self, pred: RawPrediction) -> Result<(), AggregateError> {
    pred.validate()?;
    let RawPrediction {
      uri,
      loss,
      probs,
      cats,
      bboxes,
      rois,
    } = pred;

    let record = self.entry(&uri, loss);
    let mut bboxes = bboxes.map(Vec::into_iter);
    let mut rois = rois.map(Vec::into_iter);
    for (prob, cat) in probs.into_iter().zip(cats) {
      record.add_cat(prob, cat);
      if let Some(bbox) = bboxes.as_mut().and_then(Iterator::next) {
        record.add_bbox(prob, bbox);
      }
      if let Some(vals) = rois.as_mut().and_then(Iterator::next) {
        record.add_region(prob, vals);
      }
    }
    Ok(())
  }

  /// 聚合一批推理结果，遇到第一个形状错误即停止
  pub fn add_results<I>(&mut self, preds: I) -> Result<(), AggregateError>
  where
    I: IntoIterator<Item = RawPrediction>,
  {
    let mut count = 0usize;
    for pred in preds {
      self.add_result(pred)?;
      count += 1;
    }
    debug!("聚合 {} 个样本，共 {} 个来源", count, self.records.len());
    Ok(())
  }

  /// 调试输出，每个来源最多 rmax 个类别
  pub fn describe(&self, rmax: usize) -> String {
    let mut out = String::new();
    for record in &self.records {
      out += "-------------\n";
      out += record.label();
      out += "\n";
      for (prob, cat) in record.categories().iter().take(rmax) {
        out += &format!("accuracy={:.6} -- cat={}\n", prob, cat);
      }
    }
    out
  }
}
