// 该文件是 AutoLens 项目的一部分。
// src/output/boundary.rs - 渲染异常隔离
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

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Mutex, MutexGuard};

use tracing::{error, info};

use crate::output::{OutputError, Render};

pub const FALLBACK_MESSAGE: &str = "Something went wrong while showing the results.";
pub const RESET_HINT: &str = "Reset the view to try again.";
pub const UNEXPECTED_ERROR: &str = "An unexpected error occurred";

/// 包裹一个输出，渲染中的 panic 被拦截并转为回退界面
///
/// 一旦触发，后续渲染都只显示回退界面，直到调用 [`RenderBoundary::reset`]。
pub struct RenderBoundary<R> {
  inner: R,
  // 触发时捕获的错误信息
  fault: Mutex<Option<String>>,
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
  let message = if let Some(message) = payload.downcast_ref::<&str>() {
    message.to_string()
  } else if let Some(message) = payload.downcast_ref::<String>() {
    message.clone()
  } else {
    String::new()
  };
  if message.trim().is_empty() {
    UNEXPECTED_ERROR.to_string()
  } else {
    message
  }
}

impl<R> RenderBoundary<R> {
  pub fn new(inner: R) -> Self {
    Self {
      inner,
      fault: Mutex::new(None),
    }
  }

  fn fault(&self) -> MutexGuard<'_, Option<String>> {
    self.fault.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
  }

  pub fn inner(&self) -> &R {
    &self.inner
  }

  pub fn is_tripped(&self) -> bool {
    self.fault().is_some()
  }

  /// 回退界面的文本，包含捕获的错误信息；未触发时为 `None`
  pub fn fallback(&self) -> Option<String> {
    self
      .fault()
      .as_ref()
      .map(|message| format!("{}\n{}\n{}", FALLBACK_MESSAGE, message, RESET_HINT))
  }

  pub fn reset(&self) {
    if self.fault().take().is_some() {
      info!("渲染边界已重置");
    }
  }
}

impl<Frame, Output, R> Render<Frame, Output> for RenderBoundary<R>
where
  R: Render<Frame, Output>,
  OutputError: From<R::Error>,
{
  type Error = OutputError;

  fn render_result(&self, frame: &Frame, result: &Output) -> Result<(), Self::Error> {
    if self.is_tripped() {
      return Ok(());
    }

    match panic::catch_unwind(AssertUnwindSafe(|| self.inner.render_result(frame, result))) {
      Ok(rendered) => rendered.map_err(OutputError::from),
      Err(payload) => {
        let message = panic_message(payload.as_ref());
        error!("渲染时发生崩溃: {}", message);
        *self.fault() = Some(message.clone());
        Err(OutputError::RenderingFault(message))
      }
    }
  }
}
