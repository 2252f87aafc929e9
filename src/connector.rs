// 该文件是 Liangce （量测） 项目的一部分。
// src/connector.rs - 监督输出连接器
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
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, error, info, warn};
use url::Url;

use crate::aggregate::{AggregateError, RawPrediction, ResultSet};
use crate::metrics::{self, EvalBatch, MeasureSummary, MetricsError};
use crate::output::{Prediction, to_predictions};
use crate::record::{IndexEntry, ResultRecord};
use crate::select::{BestK, select_best};
use crate::simsearch::{LazyIndex, SimSearch, SimSearchError};
use crate::task::{TaskError, TaskFlags, TaskShape};
use crate::{FromUrl, FromUrlWithScheme};

const SUPERVISED_SCHEME: &str = "supervised";
pub const DEFAULT_SEARCH_NN: usize = 10;
const DESCRIBE_RMAX: usize = 10;

#[derive(Error, Debug)]
pub enum ConfigError {
  #[error("期望配置方案 '{expected}', 实际方案 '{actual}'")]
  SchemeMismatch {
    expected: &'static str,
    actual: String,
  },
  #[error("配置参数 {key} 的值 '{value}' 无效")]
  InvalidParam { key: &'static str, value: String },
}

#[derive(Error, Debug)]
pub enum ConnectorError {
  #[error("结果聚合错误: {0}")]
  Aggregate(#[from] AggregateError),
  #[error("任务标志错误: {0}")]
  Task(#[from] TaskError),
  #[error("相似检索错误: {0}")]
  SimSearch(#[from] SimSearchError),
  #[error("评估指标错误: {0}")]
  Metrics(#[from] MetricsError),
  #[error("配置错误: {0}")]
  Config(#[from] ConfigError),
}

/// 连接器配置
///
/// 由 `supervised://?best=3&nclasses=10&search_nn=5` 形式的 URL 给出，
/// `best=-1` 表示保留全部类别。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutputConfig {
  pub best: BestK,
  pub nclasses: Option<usize>,
  pub search_nn: usize,
}

impl Default for OutputConfig {
  fn default() -> Self {
    Self {
      best: BestK::default(),
      nclasses: None,
      search_nn: DEFAULT_SEARCH_NN,
    }
  }
}

fn query_param<T: FromStr>(
  pairs: &HashMap<String, String>,
  key: &'static str,
) -> Result<Option<T>, ConfigError> {
  match pairs.get(key) {
    None => Ok(None),
    Some(value) => value
      .parse::<T>()
      .map(Some)
      .map_err(|_| ConfigError::InvalidParam {
        key,
        value: value.clone(),
      }),
  }
}

impl FromUrl for OutputConfig {
  type Error = ConfigError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      error!(
        "配置方案不匹配: 期望 '{}', 实际 '{}'",
        Self::SCHEME,
        url.scheme()
      );
      return Err(ConfigError::SchemeMismatch {
        expected: Self::SCHEME,
        actual: url.scheme().to_string(),
      });
    }

    let pairs: HashMap<String, String> = url.query_pairs().into_owned().collect();
    let defaults = Self::default();
    let config = Self {
      best: query_param::<i64>(&pairs, "best")?
        .map(BestK::from)
        .unwrap_or(defaults.best),
      nclasses: query_param(&pairs, "nclasses")?,
      search_nn: query_param(&pairs, "search_nn")?.unwrap_or(defaults.search_nn),
    };
    info!("连接器配置: {:?}", config);
    Ok(config)
  }
}

impl FromUrlWithScheme for OutputConfig {
  const SCHEME: &'static str = SUPERVISED_SCHEME;
}

/// 请求级参数，覆盖连接器配置
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct PredictParams {
  pub best: Option<BestK>,
  pub search_nn: Option<usize>,
  pub index: bool,
  pub build_index: bool,
  pub search: bool,
  pub measure: Vec<String>,
}

impl PredictParams {
  fn wants_index(&self) -> bool {
    self.index || self.build_index || self.search
  }
}

/// 推理层交给连接器的一次请求
#[derive(Debug, Clone, Deserialize)]
pub struct PredictRequest {
  pub predictions: Vec<RawPrediction>,
  #[serde(default)]
  pub nclasses: Option<usize>,
  #[serde(flatten)]
  pub flags: TaskFlags,
  #[serde(default)]
  pub parameters: PredictParams,
  /// 带目标值的评估样本，配合 `parameters.measure` 使用
  #[serde(default)]
  pub evaluation: Option<EvalBatch>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PredictResponse {
  pub predictions: Vec<Prediction>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub measure: Option<MeasureSummary>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub measure_error: Option<String>,
}

/// 单次请求的监督输出
pub struct SupervisedOutput {
  config: OutputConfig,
  results: ResultSet,
}

impl SupervisedOutput {
  pub fn new(config: OutputConfig) -> Self {
    Self {
      config,
      results: ResultSet::new(),
    }
  }

  pub fn results(&self) -> &ResultSet {
    &self.results
  }

  pub fn add_results<I>(&mut self, preds: I) -> Result<(), ConnectorError>
  where
    I: IntoIterator<Item = RawPrediction>,
  {
    self.results.add_results(preds)?;
    Ok(())
  }

  /// 请求覆盖优先，其次为任务默认，最后为配置
  pub fn resolve_best(&self, params: &PredictParams, shape: TaskShape) -> BestK {
    BestK::resolve(params.best, shape.default_best(self.config.best))
  }

  fn select(
    &self,
    params: &PredictParams,
    shape: TaskShape,
    nclasses: Option<usize>,
  ) -> Result<ResultSet, ConnectorError> {
    let best = self.resolve_best(params, shape);
    info!("选择最好的 {:?} 个条目，类别数 {:?}", best, nclasses);
    Ok(select_best(&self.results, best, nclasses, shape)?)
  }

  /// 不带相似检索的输出
  pub fn finalize(
    &self,
    params: &PredictParams,
    shape: TaskShape,
    nclasses: Option<usize>,
  ) -> Result<Vec<Prediction>, ConnectorError> {
    if params.wants_index() {
      error!("请求了索引或检索，但没有可用的相似检索索引");
      return Err(SimSearchError::MissingIndex.into());
    }
    let nclasses = nclasses.or(self.config.nclasses);
    let selected = self.select(params, shape, nclasses)?;
    debug!("输出结果:\n{}", selected.describe(DESCRIBE_RMAX));
    Ok(to_predictions(&selected, shape))
  }

  /// 带相似检索的输出，索引在首次需要时创建
  pub fn finalize_with_index<S: SimSearch>(
    &self,
    params: &PredictParams,
    shape: TaskShape,
    nclasses: Option<usize>,
    index: &mut LazyIndex<S>,
  ) -> Result<Vec<Prediction>, ConnectorError> {
    let nclasses = nclasses.or(self.config.nclasses);
    let best = self.resolve_best(params, shape);
    let mut selected = self.select(params, shape, nclasses)?;

    if params.index {
      add_to_index(&mut selected, shape, index)?;
    }

    if params.build_index {
      let idx = index.get_mut().ok_or_else(|| {
        error!("索引尚未创建，无法构建");
        SimSearchError::MissingIndex
      })?;
      idx.build()?;
      info!("索引构建完成");
    }

    if params.search {
      let default_nn = if shape.has_regions() {
        self.config.search_nn
      } else {
        best.count(nclasses).unwrap_or(self.config.search_nn)
      };
      let k = params.search_nn.unwrap_or(default_nn);
      search_index(&mut selected, shape, index, k)?;
    }

    debug!("输出结果:\n{}", selected.describe(DESCRIBE_RMAX));
    Ok(to_predictions(&selected, shape))
  }

  pub fn measure(batch: &EvalBatch, measures: &[String]) -> Result<MeasureSummary, MetricsError> {
    metrics::measure(batch, measures)
  }

  /// 处理一次完整请求：聚合、选择、检索、序列化，以及可选的评估
  ///
  /// 评估失败只影响评估部分，预测输出照常返回。
  pub fn process<S: SimSearch>(
    config: OutputConfig,
    request: PredictRequest,
    index: &mut LazyIndex<S>,
  ) -> Result<PredictResponse, ConnectorError> {
    let shape = TaskShape::try_from(request.flags)?;
    let mut output = Self::new(config);
    output.add_results(request.predictions)?;
    let predictions =
      output.finalize_with_index(&request.parameters, shape, request.nclasses, index)?;

    let (measure, measure_error) = match &request.evaluation {
      Some(batch) if !request.parameters.measure.is_empty() => {
        match Self::measure(batch, &request.parameters.measure) {
          Ok(summary) => (Some(summary), None),
          Err(e) => (None, Some(e.to_string())),
        }
      }
      Some(_) => {
        warn!("收到评估样本，但未请求任何指标");
        (None, None)
      }
      None => (None, None),
    };

    Ok(PredictResponse {
      predictions,
      measure,
      measure_error,
    })
  }
}

/// 待索引的向量：平面模式为选出的分数，区域模式为每个区域的特征向量
fn index_vectors(record: &ResultRecord, shape: TaskShape) -> Vec<(IndexEntry, Vec<f64>)> {
  if shape.has_regions() {
    record
      .categories()
      .iter()
      .zip(record.boxes().iter())
      .zip(record.regions().iter())
      .map(|(((prob, cat), (_, bbox)), (_, vals))| {
        (
          IndexEntry::region(record.label(), *bbox, prob, cat.as_str()),
          vals.clone(),
        )
      })
      .collect()
  } else if record.categories().is_empty() {
    Vec::new()
  } else {
    vec![(IndexEntry::uri(record.label()), record.categories().scores())]
  }
}

fn first_dimension(results: &ResultSet, shape: TaskShape) -> Option<usize> {
  results
    .iter()
    .flat_map(|r| index_vectors(r, shape))
    .map(|(_, v)| v.len())
    .next()
}

fn add_to_index<S: SimSearch>(
  selected: &mut ResultSet,
  shape: TaskShape,
  index: &mut LazyIndex<S>,
) -> Result<(), ConnectorError> {
  let Some(dimension) = index
    .get()
    .map(|idx| idx.dimension())
    .or_else(|| first_dimension(selected, shape))
  else {
    warn!("没有可索引的向量");
    return Ok(());
  };
  let idx = index.get_or_create(dimension)?;

  let mut count = 0usize;
  for record in selected.records_mut() {
    let vectors = index_vectors(record, shape);
    if vectors.is_empty() {
      continue;
    }
    for (entry, vector) in vectors {
      idx.index(entry, &vector)?;
      count += 1;
    }
    record.indexed = true;
  }
  info!("已加入索引 {} 条向量", count);
  Ok(())
}

fn search_index<S: SimSearch>(
  selected: &mut ResultSet,
  shape: TaskShape,
  index: &mut LazyIndex<S>,
  k: usize,
) -> Result<(), ConnectorError> {
  if !index.is_created() {
    let dimension = first_dimension(selected, shape).ok_or_else(|| {
      error!("索引不存在，且无法确定向量维度");
      SimSearchError::MissingIndex
    })?;
    index.get_or_create(dimension)?;
  }
  let idx = index.get().ok_or(SimSearchError::MissingIndex)?;
  debug!("检索最近的 {} 个邻居", k);

  for record in selected.records_mut() {
    if shape.has_regions() {
      let queries: Vec<Vec<f64>> = record.regions().iter().map(|(_, v)| v.clone()).collect();
      for (rank, query) in queries.iter().enumerate() {
        for nn in idx.search(query, k)? {
          if !record.add_region_nn(rank, nn) {
            return Err(
              AggregateError::RegionOutOfRange {
                uri: record.label().to_string(),
                rank,
              }
              .into(),
            );
          }
        }
      }
    } else {
      let query = record.categories().scores();
      if query.is_empty() {
        continue;
      }
      for nn in idx.search(&query, k)? {
        record.add_nn(nn);
      }
    }
  }
  Ok(())
}
