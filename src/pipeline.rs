// 该文件是 AutoLens 项目的一部分。
// src/pipeline.rs - 流水线上下文与错误汇总
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

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::detection::{DetectionBatch, DetectionError, DetectionService, RankingView};
use crate::input::{CaptureError, ValidationError};
use crate::normalize::NormalizeError;
use crate::output::OutputError;
use crate::payload::ImagePayload;

pub const DETECTION_FAILED_MESSAGE: &str =
  "Something went wrong while detecting objects. Please try again.";

#[derive(Error, Debug)]
pub enum PipelineError {
  #[error(transparent)]
  Validation(#[from] ValidationError),
  #[error(transparent)]
  Capture(#[from] CaptureError),
  #[error(transparent)]
  Normalize(#[from] NormalizeError),
  #[error(transparent)]
  Detection(#[from] DetectionError),
  #[error(transparent)]
  Output(#[from] OutputError),
  #[error("渲染异常: {0}")]
  RenderingFault(String),
}

/// 面向用户的错误类别
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
  UnsupportedFormat,
  TooLarge,
  CameraPermissionDenied,
  CameraUnavailable,
  NormalizationFailed,
  DetectionRequestFailed,
  RenderingFault,
}

impl PipelineError {
  pub fn kind(&self) -> ErrorKind {
    match self {
      PipelineError::Validation(ValidationError::UnsupportedFormat(_)) => ErrorKind::UnsupportedFormat,
      PipelineError::Validation(ValidationError::TooLarge { .. }) => ErrorKind::TooLarge,
      PipelineError::Capture(CaptureError::PermissionDenied(_)) => ErrorKind::CameraPermissionDenied,
      PipelineError::Capture(_) => ErrorKind::CameraUnavailable,
      PipelineError::Normalize(_) => ErrorKind::NormalizationFailed,
      PipelineError::Detection(_) => ErrorKind::DetectionRequestFailed,
      PipelineError::Output(_) | PipelineError::RenderingFault(_) => ErrorKind::RenderingFault,
    }
  }

  /// 展示给用户的文本
  pub fn user_message(&self) -> String {
    match self {
      PipelineError::Validation(e) => e.to_string(),
      PipelineError::Detection(_) => DETECTION_FAILED_MESSAGE.to_string(),
      other => other.to_string(),
    }
  }
}

/// 用户可见的界面状态
#[derive(Debug, Clone, PartialEq, Default)]
pub enum ViewState {
  #[default]
  Idle,
  Previewing,
  Submitting,
  Results(RankingView),
  Error(String),
}

/// 一次已发出的检测请求
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[must_use]
pub struct Submission {
  generation: u64,
}

impl Submission {
  pub fn generation(&self) -> u64 {
    self.generation
  }
}

/// 显式传递的界面状态：当前选中的载荷、加载标记、错误文本
#[derive(Debug, Default)]
pub struct PipelineContext {
  selected: Option<ImagePayload>,
  view: ViewState,
  inline_error: Option<String>,
  camera_visible: bool,
  generation: u64,
  in_flight: Option<u64>,
}

impl PipelineContext {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn view(&self) -> &ViewState {
    &self.view
  }

  pub fn selected(&self) -> Option<&ImagePayload> {
    self.selected.as_ref()
  }

  /// 上传区域或摄像头下方的内联错误
  pub fn inline_error(&self) -> Option<&str> {
    self.inline_error.as_deref()
  }

  pub fn camera_visible(&self) -> bool {
    self.camera_visible
  }

  pub fn is_submitting(&self) -> bool {
    self.in_flight.is_some()
  }

  /// 选中新的载荷，旧载荷连同其预览一并作废
  pub fn select(&mut self, payload: ImagePayload) {
    if let Some(previous) = self.selected.replace(payload) {
      debug!("替换已选图像 {}", previous.name());
    }
    // 未完成的请求结果不再展示
    self.generation += 1;
    self.in_flight = None;
    self.inline_error = None;
    self.view = ViewState::Previewing;
  }

  /// 校验失败：只显示错误，不改变当前选择
  pub fn reject(&mut self, error: &PipelineError) {
    warn!("输入被拒绝: {}", error);
    self.inline_error = Some(error.user_message());
  }

  pub fn open_camera(&mut self) {
    self.camera_visible = true;
    self.inline_error = None;
  }

  /// 摄像头会话结束，隐藏拍摄界面
  pub fn close_camera(&mut self) {
    self.camera_visible = false;
  }

  pub fn camera_failed(&mut self, error: &PipelineError) {
    warn!("摄像头会话结束: {}", error);
    self.camera_visible = false;
    self.inline_error = Some(error.user_message());
  }

  /// 没有选中图像或已有请求在途时返回 `None`
  pub fn begin_submission(&mut self) -> Option<Submission> {
    if self.selected.is_none() {
      debug!("没有选中的图像，忽略提交");
      return None;
    }
    if self.in_flight.is_some() {
      debug!("已有请求在途，忽略提交");
      return None;
    }
    self.generation += 1;
    self.in_flight = Some(self.generation);
    self.inline_error = None;
    self.view = ViewState::Submitting;
    Some(Submission {
      generation: self.generation,
    })
  }

  /// 写入请求结果；过期的结果被丢弃并返回 `false`
  pub fn complete_submission<E: Display>(
    &mut self,
    submission: Submission,
    result: Result<DetectionBatch, E>,
  ) -> bool {
    if self.in_flight != Some(submission.generation) {
      debug!(
        "丢弃过期的检测结果 (第 {} 次请求，当前 {})",
        submission.generation, self.generation
      );
      return false;
    }
    self.in_flight = None;
    self.view = match result {
      Ok(batch) => {
        let view = RankingView::from(&batch);
        info!("{}", view.summary());
        ViewState::Results(view)
      }
      Err(e) => {
        warn!("检测请求失败: {}", e);
        ViewState::Error(DETECTION_FAILED_MESSAGE.to_string())
      }
    };
    true
  }

  /// 同步地提交当前选中的图像
  pub fn submit<S>(&mut self, service: &S) -> Option<&ViewState>
  where
    S: DetectionService,
    S::Error: Display,
  {
    let submission = self.begin_submission()?;
    let result = match self.selected.as_ref() {
      Some(payload) => service.detect(payload),
      None => return None,
    };
    self.complete_submission(submission, result);
    Some(&self.view)
  }
}

#[cfg(test)]
pub(crate) mod tests {
  use std::cell::Cell;

  use super::*;
  use crate::detection::{ConfidenceTier, Detection};
  use crate::input::camera::tests::MockDevice;
  use crate::input::{CaptureSessionManager, FacingMode, RawFile, UploadValidator};
  use crate::payload::{ImageMime, PreviewStore};

  pub(crate) struct FixedService {
    response: Result<Vec<Detection>, u16>,
    pub(crate) calls: Cell<usize>,
  }

  impl FixedService {
    pub(crate) fn ok(items: Vec<Detection>) -> Self {
      Self {
        response: Ok(items),
        calls: Cell::new(0),
      }
    }

    pub(crate) fn failing(status: u16) -> Self {
      Self {
        response: Err(status),
        calls: Cell::new(0),
      }
    }
  }

  impl DetectionService for FixedService {
    type Error = DetectionError;

    fn detect(&self, _: &ImagePayload) -> Result<DetectionBatch, Self::Error> {
      self.calls.set(self.calls.get() + 1);
      match &self.response {
        Ok(items) => Ok(DetectionBatch::new(items.clone())),
        Err(status) => Err(DetectionError::Status(*status)),
      }
    }
  }

  fn payload(store: &PreviewStore, name: &str) -> ImagePayload {
    ImagePayload::new(name, ImageMime::Png, vec![1, 2, 3], store.mint())
  }

  pub(crate) fn headlight() -> Detection {
    Detection {
      bbox: [10.0, 20.0, 200.0, 220.0],
      label: "headlight".into(),
      confidence: 0.93,
    }
  }

  #[test]
  fn upload_to_results() {
    let store = PreviewStore::new();
    let mut context = PipelineContext::new();
    assert_eq!(context.view(), &ViewState::Idle);

    context.select(payload(&store, "car.png"));
    assert_eq!(context.view(), &ViewState::Previewing);

    let service = FixedService::ok(vec![headlight()]);
    let view = context.submit(&service).cloned();
    let Some(ViewState::Results(ranking)) = view else {
      panic!("unexpected view {:?}", view);
    };
    assert_eq!(ranking.summary(), "1 item detected");
    assert_eq!(ranking.items()[0].detection.label, "headlight");
    assert_eq!(ranking.items()[0].percent, 93);
    assert_eq!(ranking.items()[0].tier, ConfidenceTier::High);
  }

  #[test]
  fn empty_response_renders_the_empty_state() {
    let store = PreviewStore::new();
    let mut context = PipelineContext::new();
    context.select(payload(&store, "wall.png"));
    context.submit(&FixedService::ok(Vec::new()));
    assert_eq!(context.view(), &ViewState::Results(RankingView::Empty));
  }

  #[test]
  fn nothing_to_submit_without_a_selection() {
    let mut context = PipelineContext::new();
    let service = FixedService::ok(vec![headlight()]);
    assert!(context.begin_submission().is_none());
    assert!(context.submit(&service).is_none());
    assert_eq!(service.calls.get(), 0);
  }

  #[test]
  fn overlapping_submissions_are_refused() {
    let store = PreviewStore::new();
    let mut context = PipelineContext::new();
    context.select(payload(&store, "car.png"));

    let first = context.begin_submission().expect("first");
    assert!(context.is_submitting());
    assert!(context.begin_submission().is_none());
    assert_eq!(context.view(), &ViewState::Submitting);

    assert!(context.complete_submission(first, Ok::<_, DetectionError>(DetectionBatch::default())));
    assert!(!context.is_submitting());
    assert!(context.begin_submission().is_some());
  }

  #[test]
  fn stale_responses_are_dropped_after_reselection() {
    let store = PreviewStore::new();
    let mut context = PipelineContext::new();
    context.select(payload(&store, "old.png"));
    let stale = context.begin_submission().expect("submission");

    context.select(payload(&store, "new.png"));
    let fresh = context.begin_submission().expect("submission");
    assert!(fresh.generation() > stale.generation());

    let batch = DetectionBatch::new(vec![headlight()]);
    assert!(!context.complete_submission(stale, Ok::<_, DetectionError>(batch.clone())));
    assert_eq!(context.view(), &ViewState::Submitting);

    assert!(context.complete_submission(fresh, Ok::<_, DetectionError>(batch)));
    assert!(matches!(context.view(), ViewState::Results(_)));
  }

  #[test]
  fn failure_keeps_the_selection_for_resubmission() {
    let store = PreviewStore::new();
    let mut context = PipelineContext::new();
    context.select(payload(&store, "car.png"));

    context.submit(&FixedService::failing(502));
    assert_eq!(
      context.view(),
      &ViewState::Error(DETECTION_FAILED_MESSAGE.to_string())
    );
    assert_eq!(context.selected().map(|p| p.name()), Some("car.png"));

    context.submit(&FixedService::ok(vec![headlight()]));
    assert!(matches!(context.view(), ViewState::Results(_)));
  }

  #[test]
  fn reselection_revokes_the_previous_preview() {
    let store = PreviewStore::new();
    let mut context = PipelineContext::new();
    for i in 0..20 {
      context.select(payload(&store, &format!("{}.png", i)));
    }
    assert_eq!(store.live_count(), 1);
    assert!(context.selected().map(|p| p.preview().is_live()).unwrap_or(false));
  }

  #[test]
  fn validation_errors_leave_the_selection_alone() {
    let store = PreviewStore::new();
    let validator = UploadValidator::new(store.clone());
    let mut context = PipelineContext::new();
    context.select(payload(&store, "car.png"));

    let error = validator
      .validate(RawFile::new("notes.txt", "text/plain", vec![0; 10]))
      .map_err(PipelineError::from)
      .expect_err("rejected");
    assert_eq!(error.kind(), ErrorKind::UnsupportedFormat);
    context.reject(&error);

    assert_eq!(context.inline_error(), Some("Please upload a JPG, PNG, or GIF image"));
    assert_eq!(context.view(), &ViewState::Previewing);
    assert_eq!(context.selected().map(|p| p.name()), Some("car.png"));

    context.select(payload(&store, "next.png"));
    assert!(context.inline_error().is_none());
  }

  #[test]
  fn denied_camera_hides_the_capture_surface() {
    let store = PreviewStore::new();
    let device = MockDevice {
      deny: true,
      ..MockDevice::with_cameras(1)
    };
    let peak = device.peak.clone();
    let mut manager = CaptureSessionManager::new(device, store);
    let mut context = PipelineContext::new();

    context.open_camera();
    let error = manager
      .open(FacingMode::Environment)
      .map_err(PipelineError::from)
      .expect_err("denied");
    assert_eq!(error.kind(), ErrorKind::CameraPermissionDenied);
    context.camera_failed(&error);

    assert!(!context.camera_visible());
    assert!(context.inline_error().is_some());
    assert!(!manager.is_active());
    assert_eq!(manager.device().live(), 0);
    assert_eq!(peak.load(std::sync::atomic::Ordering::SeqCst), 0);
  }

  #[test]
  fn error_kinds_cover_every_source() {
    assert_eq!(
      PipelineError::from(ValidationError::TooLarge {
        size: 11,
        limit: 10
      })
      .kind(),
      ErrorKind::TooLarge
    );
    assert_eq!(
      PipelineError::from(CaptureError::Unavailable("busy".into())).kind(),
      ErrorKind::CameraUnavailable
    );
    assert_eq!(
      PipelineError::from(NormalizeError::EmptyOutput).kind(),
      ErrorKind::NormalizationFailed
    );
    let detection = PipelineError::from(DetectionError::Status(500));
    assert_eq!(detection.kind(), ErrorKind::DetectionRequestFailed);
    assert_eq!(detection.user_message(), DETECTION_FAILED_MESSAGE);
    assert_eq!(
      PipelineError::RenderingFault("boom".into()).kind(),
      ErrorKind::RenderingFault
    );
  }
}
