// 该文件是 AutoLens 项目的一部分。
// src/bin/detect_camera.rs - 摄像头拍摄并展示检测结果
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

use anyhow::Result;
use clap::Parser;
use tracing::info;
use url::Url;

use autolens::{
  FromUrl,
  args::PipelineArgs,
  input::{CaptureSessionManager, GStreamerCamera, enumerate_capture_devices},
  output::OutputWrapper,
  payload::PreviewStore,
  task::{CameraTask, Task, command_channel},
};

/// AutoLens 摄像头检测
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// 摄像头地址，如 camera:///dev/video0?facing=environment&width=1280&height=720
  #[arg(long, value_name = "CAMERA", default_value = "camera:///?facing=environment")]
  pub camera: Url,
  /// 输出方式，如 console: 或 image:///tmp/out.png
  #[arg(long, value_name = "OUTPUT", default_value = "console:")]
  pub output: Url,
  /// 列出可用的摄像头后退出
  #[arg(long)]
  pub list_devices: bool,

  #[command(flatten)]
  pub pipeline: PipelineArgs,
}

fn main() -> Result<()> {
  tracing_subscriber::fmt::init();

  let args = Args::parse();

  if args.list_devices {
    for device in enumerate_capture_devices() {
      println!("{}\t{}\t{}", device.index, device.path, device.name);
    }
    return Ok(());
  }

  info!("摄像头: {}", args.camera);
  info!("输出方式: {}", args.output);

  let camera = GStreamerCamera::from_url(&args.camera)?;
  let facing = camera.initial_facing();
  let previews = PreviewStore::new();
  let manager = CaptureSessionManager::new(camera, previews.clone());
  let normalizer = args.pipeline.normalizer(previews);
  let client = args.pipeline.detection_client()?;
  let output = OutputWrapper::from_url(&args.output)?;
  let commands = command_channel()?;

  CameraTask::new(manager, normalizer, facing).run_task(commands, client, output)
}
