// 该文件是 Liangce （量测） 项目的一部分。
// src/args.rs - 命令行参数
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

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use url::Url;

/// Liangce 监督输出工具
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// 连接器配置，例如 supervised://?best=3&nclasses=10&search_nn=5
  #[arg(long, value_name = "CONNECTOR", default_value = "supervised://")]
  pub connector: Url,

  #[command(subcommand)]
  pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
  /// 处理推理结果
  ///
  /// 输入为请求的 JSON 数组，按顺序处理，所有请求共享同一个相似检索索引。
  Predict {
    /// 请求文件，- 表示标准输入
    #[arg(long, value_name = "FILE", default_value = "-")]
    input: PathBuf,
  },
  /// 计算评估指标
  Measure {
    /// 评估样本文件，- 表示标准输入
    #[arg(long, value_name = "FILE", default_value = "-")]
    input: PathBuf,

    /// 指标名，可重复或以逗号分隔，例如 acc,acc-5,f1,mcll
    #[arg(long, value_name = "NAME", value_delimiter = ',', required = true)]
    measure: Vec<String>,
  },
}
