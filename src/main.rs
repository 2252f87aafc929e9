// 该文件是 Liangce （量测） 项目的一部分。
// src/main.rs - 项目主程序
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

mod args;

use std::io::Read;
use std::path::Path;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;

use liangce::simsearch::FlatIndex;
use liangce::{EvalBatch, FromUrl, LazyIndex, OutputConfig, PredictRequest, SupervisedOutput};

use args::{Args, Command};

fn read_input(path: &Path) -> Result<String> {
  if path == Path::new("-") {
    let mut buf = String::new();
    std::io::stdin()
      .read_to_string(&mut buf)
      .context("读取标准输入失败")?;
    Ok(buf)
  } else {
    std::fs::read_to_string(path).with_context(|| format!("读取文件失败: {}", path.display()))
  }
}

fn main() -> Result<()> {
  tracing_subscriber::fmt::init();

  let args = Args::parse();
  info!("连接器配置: {}", args.connector);
  let config = OutputConfig::from_url(&args.connector)?;

  match args.command {
    Command::Predict { input } => {
      let requests: Vec<PredictRequest> =
        serde_json::from_str(&read_input(&input)?).context("请求格式错误")?;
      info!("共 {} 个请求", requests.len());

      let mut index: LazyIndex<FlatIndex> = LazyIndex::new();
      let mut responses = Vec::with_capacity(requests.len());
      for (i, request) in requests.into_iter().enumerate() {
        let response = SupervisedOutput::process(config, request, &mut index)
          .with_context(|| format!("处理第 {} 个请求失败", i))?;
        responses.push(response);
      }
      println!("{}", serde_json::to_string_pretty(&responses)?);
    }
    Command::Measure { input, measure } => {
      let batch: EvalBatch =
        serde_json::from_str(&read_input(&input)?).context("评估样本格式错误")?;
      let summary = SupervisedOutput::measure(&batch, &measure)?;
      println!(
        "{}",
        serde_json::to_string_pretty(&serde_json::json!({ "measure": summary }))?
      );
    }
  }

  Ok(())
}
