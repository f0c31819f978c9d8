// 该文件是 AutoLens 项目的一部分。
// src/input/upload.rs - 文件选择与拖放上传
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

use tracing::{debug, info};

use super::{RawFile, UploadValidator, ValidationError};
use crate::payload::ImagePayload;

/// 文件选择控件
///
/// 只有选中值发生变化时才会触发 change，与浏览器的文件控件一致。
#[derive(Debug, Default)]
pub struct FileInput {
  value: Option<String>,
}

impl FileInput {
  /// 选中文件；值未变化时不触发 change，返回 `None`
  pub fn pick(&mut self, file: RawFile) -> Option<RawFile> {
    if self.value.as_deref() == Some(file.name.as_str()) {
      debug!("选中值未变化，不触发 change: {}", file.name);
      return None;
    }
    self.value = Some(file.name.clone());
    Some(file)
  }

  pub fn value(&self) -> Option<&str> {
    self.value.as_deref()
  }

  pub fn clear(&mut self) {
    self.value = None;
  }
}

/// 拖放事件
#[derive(Debug, Default)]
pub struct DragEvent {
  pub files: Vec<RawFile>,
  default_prevented: bool,
}

impl DragEvent {
  pub fn new(files: Vec<RawFile>) -> Self {
    Self {
      files,
      default_prevented: false,
    }
  }

  pub fn prevent_default(&mut self) {
    self.default_prevented = true;
  }

  pub fn default_prevented(&self) -> bool {
    self.default_prevented
  }
}

/// 上传区域：文件选择与拖放共用同一套校验规则
#[derive(Debug)]
pub struct UploadField {
  validator: UploadValidator,
  input: FileInput,
  dragging: bool,
  error: Option<ValidationError>,
}

impl UploadField {
  pub fn new(validator: UploadValidator) -> Self {
    Self {
      validator,
      input: FileInput::default(),
      dragging: false,
      error: None,
    }
  }

  pub fn on_file_selected(&mut self, file: RawFile) -> Option<ImagePayload> {
    let file = self.input.pick(file)?;
    self.error = None;
    match self.validator.validate(file) {
      Ok(payload) => {
        info!("已选择文件: {}", payload.name());
        Some(payload)
      }
      Err(err) => {
        self.error = Some(err);
        // 清空选中值，重复选择同一文件时重新校验
        self.input.clear();
        None
      }
    }
  }

  pub fn on_drag_over(&mut self, event: &mut DragEvent) {
    event.prevent_default();
    self.dragging = true;
  }

  pub fn on_drag_leave(&mut self) {
    self.dragging = false;
  }

  pub fn on_drop(&mut self, event: &mut DragEvent) -> Option<ImagePayload> {
    event.prevent_default();
    self.dragging = false;
    self.error = None;

    if event.files.is_empty() {
      return None;
    }
    let file = event.files.swap_remove(0);
    match self.validator.validate(file) {
      Ok(payload) => {
        info!("已拖入文件: {}", payload.name());
        Some(payload)
      }
      Err(err) => {
        self.error = Some(err);
        None
      }
    }
  }

  pub fn error(&self) -> Option<&ValidationError> {
    self.error.as_ref()
  }

  /// 内联显示的错误文本
  pub fn error_text(&self) -> Option<String> {
    self.error.as_ref().map(ToString::to_string)
  }

  pub fn is_dragging(&self) -> bool {
    self.dragging
  }

  pub fn input(&self) -> &FileInput {
    &self.input
  }
}
