// 该文件是 AutoLens 项目的一部分。
// src/task.rs - 上传与拍摄任务流程
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

use std::fmt::Display;
use std::io::BufRead;
use std::str::FromStr;
use std::sync::mpsc::{self, Receiver};
use std::{thread, time::Duration};

use anyhow::anyhow;
use tracing::{error, info, warn};

use crate::{
  detection::DetectionService,
  input::{CaptureDevice, CaptureError, CaptureSessionManager, FacingMode, RawFile, UploadField},
  normalize::ImageNormalizer,
  output::{OutputError, Render, RenderBoundary},
  payload::ImagePayload,
  pipeline::{PipelineContext, PipelineError, ViewState},
};

pub trait Task<I, S, O>: Sized {
  type Error;
  fn run_task(self, input: I, service: S, output: O) -> Result<(), Self::Error>;
}

fn render<O>(output: &RenderBoundary<O>, context: &PipelineContext) -> anyhow::Result<()>
where
  O: Render<ImagePayload, ViewState>,
  OutputError: From<O::Error>,
{
  let Some(payload) = context.selected() else {
    return Ok(());
  };
  // 已触发的边界不再渲染，只提示回退界面
  if let Some(fallback) = output.fallback() {
    eprintln!("{}", fallback);
    return Ok(());
  }
  match output.render_result(payload, context.view()) {
    Ok(()) => Ok(()),
    Err(OutputError::RenderingFault(message)) => {
      error!("渲染失败: {}", message);
      if let Some(fallback) = output.fallback() {
        eprintln!("{}", fallback);
      }
      Ok(())
    }
    Err(e) => Err(e.into()),
  }
}

/// 提交当前选中的图像并渲染每个阶段的界面
fn submit_and_render<S, O>(
  context: &mut PipelineContext,
  service: &S,
  output: &RenderBoundary<O>,
) -> anyhow::Result<()>
where
  S: DetectionService,
  S::Error: Display,
  O: Render<ImagePayload, ViewState>,
  OutputError: From<O::Error>,
{
  let submission = context
    .begin_submission()
    .ok_or_else(|| anyhow!("没有可提交的图像"))?;
  render(output, context)?;

  let payload = context
    .selected()
    .ok_or_else(|| anyhow!("没有可提交的图像"))?;
  let now = std::time::Instant::now();
  let result = service.detect(payload);
  info!("检测请求完成，耗时: {:.2?}", now.elapsed());

  context.complete_submission(submission, result);
  render(output, context)
}

/// 上传流程：校验、规整化、提交、展示
pub struct UploadTask {
  field: UploadField,
  normalizer: ImageNormalizer,
}

impl UploadTask {
  pub fn new(field: UploadField, normalizer: ImageNormalizer) -> Self {
    Self { field, normalizer }
  }
}

impl<I, S, O> Task<I, S, O> for UploadTask
where
  I: IntoIterator<Item = RawFile>,
  S: DetectionService,
  S::Error: Display,
  O: Render<ImagePayload, ViewState>,
  OutputError: From<O::Error>,
{
  type Error = anyhow::Error;

  fn run_task(mut self, input: I, service: S, output: O) -> Result<(), Self::Error> {
    info!("开始任务...");
    let output = RenderBoundary::new(output);
    let mut context = PipelineContext::new();
    let mut failures = 0usize;

    for file in input {
      let name = file.name.clone();
      let Some(payload) = self.field.on_file_selected(file) else {
        if let Some(rejection) = self.field.error().cloned() {
          context.reject(&PipelineError::from(rejection));
        }
        warn!(
          "{}: {}",
          name,
          context.inline_error().unwrap_or("文件未被选中")
        );
        failures += 1;
        continue;
      };

      // 选中新文件相当于重试，恢复被触发的渲染边界
      output.reset();
      context.select(self.normalizer.normalize(payload));
      render(&output, &context)?;
      submit_and_render(&mut context, &service, &output)?;

      if matches!(context.view(), ViewState::Error(_)) {
        failures += 1;
      }
    }

    info!("任务完成，退出");
    match failures {
      0 => Ok(()),
      n => Err(anyhow!("{} 个文件处理失败", n)),
    }
  }
}

/// 拍摄界面上的用户指令
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CameraCommand {
  Capture,
  Switch,
  Retake,
  Quit,
}

impl FromStr for CameraCommand {
  type Err = String;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.trim().to_ascii_lowercase().as_str() {
      "" | "c" | "capture" => Ok(CameraCommand::Capture),
      "s" | "switch" => Ok(CameraCommand::Switch),
      "r" | "retake" | "open" => Ok(CameraCommand::Retake),
      "q" | "quit" | "exit" => Ok(CameraCommand::Quit),
      other => Err(format!("未知指令: {}", other)),
    }
  }
}

/// 从标准输入读取指令，Ctrl-C 转换为退出指令
///
/// 标准输入结束时同样发送退出指令。
pub fn command_channel() -> anyhow::Result<Receiver<CameraCommand>> {
  let (tx, rx) = mpsc::channel();

  let interrupt = tx.clone();
  ctrlc::set_handler(move || {
    info!("收到中断信号，准备退出...");
    let _ = interrupt.send(CameraCommand::Quit);
    thread::spawn(|| {
      thread::sleep(Duration::from_secs(30));
      warn!("强制退出程序");
      std::process::exit(1);
    });
  })
  .map_err(|e| anyhow!("无法设置 Ctrl-C 处理函数: {}", e))?;

  thread::spawn(move || {
    let stdin = std::io::stdin();
    for line in stdin.lock().lines() {
      let Ok(line) = line else {
        break;
      };
      match line.parse::<CameraCommand>() {
        Ok(command) => {
          if tx.send(command).is_err() || command == CameraCommand::Quit {
            return;
          }
        }
        Err(e) => warn!("{} (可用指令: capture, switch, retake, quit)", e),
      }
    }
    let _ = tx.send(CameraCommand::Quit);
  });

  Ok(rx)
}

/// 拍摄流程：打开摄像头，按指令切换、拍摄并提交
pub struct CameraTask<D: CaptureDevice> {
  manager: CaptureSessionManager<D>,
  normalizer: ImageNormalizer,
  facing: FacingMode,
}

impl<D: CaptureDevice> CameraTask<D> {
  pub fn new(manager: CaptureSessionManager<D>, normalizer: ImageNormalizer, facing: FacingMode) -> Self {
    Self {
      manager,
      normalizer,
      facing,
    }
  }

  fn open(&mut self, context: &mut PipelineContext) -> Result<(), PipelineError> {
    context.open_camera();
    match self.manager.open(self.facing) {
      Ok(()) => {
        info!("摄像头已打开，输入 capture 拍摄，switch 切换摄像头，quit 退出");
        Ok(())
      }
      Err(e) => {
        let e = PipelineError::from(e);
        context.camera_failed(&e);
        Err(e)
      }
    }
  }
}

impl<D, I, S, O> Task<I, S, O> for CameraTask<D>
where
  D: CaptureDevice,
  I: IntoIterator<Item = CameraCommand>,
  S: DetectionService,
  S::Error: Display,
  O: Render<ImagePayload, ViewState>,
  OutputError: From<O::Error>,
{
  type Error = anyhow::Error;

  fn run_task(mut self, input: I, service: S, output: O) -> Result<(), Self::Error> {
    info!("开始任务...");
    let output = RenderBoundary::new(output);
    let mut context = PipelineContext::new();

    if let Err(e) = self.open(&mut context) {
      return Err(anyhow!(e.user_message()));
    }

    for command in input {
      match command {
        CameraCommand::Capture => match self.manager.capture_photo() {
          Ok(payload) => {
            context.close_camera();
            context.select(self.normalizer.normalize(payload));
            render(&output, &context)?;
            submit_and_render(&mut context, &service, &output)?;
            info!("输入 retake 重新拍摄，quit 退出");
          }
          Err(e @ CaptureError::InvalidState { .. }) => warn!("{}", e),
          Err(e) => {
            self.manager.close();
            context.camera_failed(&PipelineError::from(e));
          }
        },
        CameraCommand::Switch => match self.manager.switch_device() {
          Ok(()) => {
            if let Some(facing) = self.manager.facing_mode() {
              self.facing = facing;
            }
          }
          Err(e @ (CaptureError::InvalidState { .. } | CaptureError::NoAlternateDevice)) => {
            warn!("{}", e)
          }
          Err(e) => {
            self.manager.close();
            context.camera_failed(&PipelineError::from(e));
          }
        },
        CameraCommand::Retake => {
          output.reset();
          if let Err(e) = self.open(&mut context) {
            warn!("重新打开摄像头失败: {}", e);
          }
        }
        CameraCommand::Quit => {
          info!("收到退出指令");
          break;
        }
      }
    }

    self.manager.close();
    context.close_camera();
    info!("任务完成，退出");
    Ok(())
  }
}
