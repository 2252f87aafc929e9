// 该文件是 Liangce （量测） 项目的一部分。
// src/task.rs - 任务形态
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

use serde::Deserialize;
use thiserror::Error;

use crate::select::BestK;

/// 推理层随结果一起给出的任务标志
#[derive(Debug, Clone, Copy, Default, Deserialize)]
#[serde(default)]
pub struct TaskFlags {
  pub regression: bool,
  pub autoencoder: bool,
  pub bbox: bool,
  pub roi: bool,
  pub multilabel: bool,
  pub segmentation: bool,
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum TaskError {
  #[error("任务标志冲突: {0} 与 {1} 不能同时启用")]
  Conflict(&'static str, &'static str),
}

/// 输出形态，决定选择与序列化路径
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TaskShape {
  #[default]
  Classification,
  Regression,
  Autoencoder,
  /// 目标检测，每个类别带边界框
  Detection,
  /// 目标检测并附带区域特征向量
  RegionDetection,
}

impl TaskShape {
  pub fn has_boxes(&self) -> bool {
    matches!(self, TaskShape::Detection | TaskShape::RegionDetection)
  }

  pub fn has_regions(&self) -> bool {
    matches!(self, TaskShape::RegionDetection)
  }

  /// 任务本身对 best 的默认要求；请求中的 best 仍然优先
  pub fn default_best(&self, configured: BestK) -> BestK {
    match self {
      TaskShape::Regression => BestK::All,
      TaskShape::Autoencoder => BestK::Top(1),
      _ => configured,
    }
  }
}

impl TryFrom<TaskFlags> for TaskShape {
  type Error = TaskError;

  fn try_from(flags: TaskFlags) -> Result<Self, Self::Error> {
    let detection = flags.bbox || flags.roi;
    if flags.autoencoder && flags.regression {
      return Err(TaskError::Conflict("autoencoder", "regression"));
    }
    if flags.autoencoder && detection {
      return Err(TaskError::Conflict("autoencoder", "bbox"));
    }
    if flags.regression && detection {
      return Err(TaskError::Conflict("regression", "bbox"));
    }

    Ok(if flags.roi {
      TaskShape::RegionDetection
    } else if flags.bbox {
      TaskShape::Detection
    } else if flags.regression {
      TaskShape::Regression
    } else if flags.autoencoder {
      TaskShape::Autoencoder
    } else {
      TaskShape::Classification
    })
  }
}

/// 评估路径
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum MeasureKind {
  #[default]
  Classification,
  Regression,
  Segmentation,
  /// 多标签二值判定
  MultilabelHard,
  /// 多标签连续目标
  MultilabelSoft,
}

impl MeasureKind {
  pub fn from_flags(regression: bool, segmentation: bool, multilabel: bool) -> Self {
    if segmentation {
      MeasureKind::Segmentation
    } else if multilabel && regression {
      MeasureKind::MultilabelSoft
    } else if multilabel {
      MeasureKind::MultilabelHard
    } else if regression {
      MeasureKind::Regression
    } else {
      MeasureKind::Classification
    }
  }

  /// 单标签路径：分类或回归
  pub fn is_flat(&self) -> bool {
    matches!(self, MeasureKind::Classification | MeasureKind::Regression)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_shape_from_flags() {
    let flags = TaskFlags {
      bbox: true,
      ..Default::default()
    };
    assert_eq!(TaskShape::try_from(flags), Ok(TaskShape::Detection));

    let flags = TaskFlags {
      bbox: true,
      roi: true,
      ..Default::default()
    };
    assert_eq!(TaskShape::try_from(flags), Ok(TaskShape::RegionDetection));

    assert_eq!(
      TaskShape::try_from(TaskFlags::default()),
      Ok(TaskShape::Classification)
    );
  }

  #[test]
  fn test_illegal_combinations_rejected() {
    let flags = TaskFlags {
      autoencoder: true,
      bbox: true,
      ..Default::default()
    };
    assert!(TaskShape::try_from(flags).is_err());

    let flags = TaskFlags {
      regression: true,
      roi: true,
      ..Default::default()
    };
    assert!(TaskShape::try_from(flags).is_err());
  }

  #[test]
  fn test_default_best() {
    assert_eq!(TaskShape::Regression.default_best(BestK::Top(3)), BestK::All);
    assert_eq!(TaskShape::Autoencoder.default_best(BestK::All), BestK::Top(1));
    assert_eq!(TaskShape::Detection.default_best(BestK::Top(3)), BestK::Top(3));
  }

  #[test]
  fn test_measure_kind() {
    assert_eq!(MeasureKind::from_flags(true, false, true), MeasureKind::MultilabelSoft);
    assert_eq!(MeasureKind::from_flags(false, false, true), MeasureKind::MultilabelHard);
    assert_eq!(MeasureKind::from_flags(false, true, true), MeasureKind::Segmentation);
    assert!(MeasureKind::from_flags(true, false, false).is_flat());
  }
}
