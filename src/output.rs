// 该文件是 Liangce （量测） 项目的一部分。
// src/output.rs - 结果输出结构
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

use serde::Serialize;

use crate::aggregate::ResultSet;
use crate::record::{BBox, Neighbor, ResultRecord};
use crate::task::TaskShape;

/// 单个来源的输出
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Prediction {
  pub uri: String,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub loss: Option<f64>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub indexed: Option<bool>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub nns: Option<Vec<NeighborOut>>,
  #[serde(flatten)]
  pub group: RankGroup,
}

/// 分组键，每条输出只会出现其中一个
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RankGroup {
  Classes(Vec<RankEntry>),
  Vector(Vec<RankEntry>),
  Losses(Vec<RankEntry>),
  Rois(Vec<RankEntry>),
}

impl RankGroup {
  fn new(shape: TaskShape, entries: Vec<RankEntry>) -> Self {
    match shape {
      TaskShape::Regression => RankGroup::Vector(entries),
      TaskShape::Autoencoder => RankGroup::Losses(entries),
      TaskShape::RegionDetection => RankGroup::Rois(entries),
      TaskShape::Classification | TaskShape::Detection => RankGroup::Classes(entries),
    }
  }

  pub fn key(&self) -> &'static str {
    match self {
      RankGroup::Classes(_) => "classes",
      RankGroup::Vector(_) => "vector",
      RankGroup::Losses(_) => "losses",
      RankGroup::Rois(_) => "rois",
    }
  }

  pub fn entries(&self) -> &[RankEntry] {
    match self {
      RankGroup::Classes(v) | RankGroup::Vector(v) | RankGroup::Losses(v) | RankGroup::Rois(v) => v,
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub enum RankValue {
  #[serde(rename = "prob")]
  Prob(f64),
  #[serde(rename = "val")]
  Val(f64),
  #[serde(rename = "loss")]
  Loss(f64),
}

impl RankValue {
  pub fn value(&self) -> f64 {
    match self {
      RankValue::Prob(v) | RankValue::Val(v) | RankValue::Loss(v) => *v,
    }
  }
}

/// 排名条目
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RankEntry {
  #[serde(skip_serializing_if = "Option::is_none")]
  pub cat: Option<String>,
  #[serde(flatten)]
  pub value: RankValue,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub bbox: Option<BBox>,
  #[serde(rename = "vals", skip_serializing_if = "Option::is_none")]
  pub region: Option<Vec<f64>>,
  #[serde(skip_serializing_if = "is_false")]
  pub last: bool,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub nns: Option<Vec<NeighborOut>>,
}

fn is_false(b: &bool) -> bool {
  !*b
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NeighborOut {
  pub uri: String,
  pub dist: f64,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub prob: Option<f64>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub cat: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub bbox: Option<BBox>,
}

impl From<&Neighbor> for NeighborOut {
  fn from(nn: &Neighbor) -> Self {
    let region = nn.entry.region.as_ref();
    Self {
      uri: nn.entry.uri.clone(),
      dist: nn.distance,
      prob: region.map(|r| r.prob),
      cat: region.map(|r| r.cat.clone()),
      bbox: region.map(|r| r.bbox),
    }
  }
}

fn neighbors_out(nns: &[Neighbor]) -> Vec<NeighborOut> {
  nns.iter().map(NeighborOut::from).collect()
}

/// 将结果集合转换为统一的输出结构
pub fn to_predictions(results: &ResultSet, shape: TaskShape) -> Vec<Prediction> {
  results.iter().map(|r| to_prediction(r, shape)).collect()
}

pub fn to_prediction(record: &ResultRecord, shape: TaskShape) -> Prediction {
  let total = record.categories().len();
  let with_cat = matches!(
    shape,
    TaskShape::Classification | TaskShape::Detection | TaskShape::RegionDetection
  );

  let mut boxes = record.boxes().iter();
  let mut regions = record.regions().iter();
  let entries = record
    .categories()
    .iter()
    .enumerate()
    .map(|(rank, (score, cat))| {
      let value = match shape {
        TaskShape::Regression => RankValue::Val(score),
        TaskShape::Autoencoder => RankValue::Loss(score),
        _ => RankValue::Prob(score),
      };
      let bbox = if shape.has_boxes() {
        boxes.next().map(|(_, b)| *b)
      } else {
        None
      };
      let region = if shape.has_regions() {
        regions.next().map(|(_, v)| v.clone())
      } else {
        None
      };
      let nns = if shape.has_regions() {
        record.region_neighbors().get(rank).map(|nns| neighbors_out(nns))
      } else {
        None
      };
      RankEntry {
        cat: with_cat.then(|| cat.clone()),
        value,
        bbox,
        region,
        last: rank + 1 == total,
        nns,
      }
    })
    .collect();

  let nns = if !shape.has_regions() && !record.neighbors().is_empty() {
    Some(neighbors_out(record.neighbors()))
  } else {
    None
  };

  Prediction {
    uri: record.label().to_string(),
    loss: (record.loss() > 0.0).then_some(record.loss()),
    indexed: record.is_indexed().then_some(true),
    nns,
    group: RankGroup::new(shape, entries),
  }
}
