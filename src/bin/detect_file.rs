// 该文件是 AutoLens 项目的一部分。
// src/bin/detect_file.rs - 上传图片文件并展示检测结果
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

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;
use url::Url;

use autolens::{
  FromUrl,
  args::PipelineArgs,
  input::{RawFile, UploadField},
  output::OutputWrapper,
  payload::PreviewStore,
  task::{Task, UploadTask},
};

/// AutoLens 文件检测
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// 待检测的图片文件（JPG、PNG 或 GIF）
  #[arg(long, value_name = "FILE", required = true, num_args = 1..)]
  pub input: Vec<PathBuf>,
  /// 输出方式，如 console: 或 image:///tmp/out.png
  #[arg(long, value_name = "OUTPUT", default_value = "console:")]
  pub output: Url,

  #[command(flatten)]
  pub pipeline: PipelineArgs,
}

fn main() -> Result<()> {
  tracing_subscriber::fmt::init();

  let args = Args::parse();

  info!("输入文件: {:?}", args.input);
  info!("输出方式: {}", args.output);

  let files = args
    .input
    .iter()
    .map(|path| RawFile::from_path(path).with_context(|| format!("无法读取 {}", path.display())))
    .collect::<Result<Vec<_>>>()?;

  let previews = PreviewStore::new();
  let field = UploadField::new(args.pipeline.upload_validator(previews.clone()));
  let normalizer = args.pipeline.normalizer(previews);
  let client = args.pipeline.detection_client()?;
  let output = OutputWrapper::from_url(&args.output)?;

  UploadTask::new(field, normalizer).run_task(files, client, output)
}
