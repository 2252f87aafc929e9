// 该文件是 Liangce （量测） 项目的一部分。
// src/simsearch.rs - 相似检索索引接口
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

use thiserror::Error;
use tracing::info;

use crate::record::{IndexEntry, Neighbor};

#[derive(Error, Debug)]
pub enum SimSearchError {
  #[error("索引尚未创建，无法构建或检索")]
  MissingIndex,
  #[error("向量维度不匹配: 索引维度 {expected}, 实际 {actual}")]
  DimensionMismatch { expected: usize, actual: usize },
  #[error("索引后端错误: {0}")]
  Backend(String),
}

/// 外部相似检索服务
///
/// 本模块只消费这一接口，不对实现的线程安全做任何假设。
pub trait SimSearch {
  fn create(dimension: usize) -> Result<Self, SimSearchError>
  where
    Self: Sized;

  fn dimension(&self) -> usize;

  fn index(&mut self, entry: IndexEntry, vector: &[f64]) -> Result<(), SimSearchError>;

  fn build(&mut self) -> Result<(), SimSearchError>;

  /// 返回按距离升序排列的最多 k 个近邻
  fn search(&self, vector: &[f64], k: usize) -> Result<Vec<Neighbor>, SimSearchError>;
}

/// 首次使用时才创建的索引
///
/// 由调用方持有，可以跨请求复用。
#[derive(Debug)]
pub struct LazyIndex<S> {
  inner: Option<S>,
}

impl<S> Default for LazyIndex<S> {
  fn default() -> Self {
    Self { inner: None }
  }
}

impl<S: SimSearch> LazyIndex<S> {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn is_created(&self) -> bool {
    self.inner.is_some()
  }

  pub fn get(&self) -> Option<&S> {
    self.inner.as_ref()
  }

  pub fn get_mut(&mut self) -> Option<&mut S> {
    self.inner.as_mut()
  }

  pub fn get_or_create(&mut self, dimension: usize) -> Result<&mut S, SimSearchError> {
    if self.inner.is_none() {
      info!("创建相似检索索引，维度: {}", dimension);
      self.inner = Some(S::create(dimension)?);
    }
    self.inner.as_mut().ok_or(SimSearchError::MissingIndex)
  }
}

#[cfg(feature = "flat_index")]
mod flat;
#[cfg(feature = "flat_index")]
pub use self::flat::FlatIndex;
