// 该文件是 AutoLens 项目的一部分。
// src/input/camera.rs - 摄像头会话生命周期
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

//! # 摄像头会话
//!
//! `CaptureSessionManager` 独占一个摄像头设备，按如下状态机管理视频流：
//!
//! ```text
//! Idle -> RequestingPermission -> Streaming -> SwitchingDevice -> Streaming
//!                                           -> Captured
//!                                           -> Closed
//! ```
//!
//! 任意时刻最多持有一路视频流；开启新流之前总是先停止旧流。
//! 管理器被丢弃时会自动关闭会话。

use std::fmt;
use std::io::Cursor;
use std::str::FromStr;

use chrono::Local;
use image::{RgbImage, codecs::jpeg::JpegEncoder};
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::payload::{ImageMime, ImagePayload, PreviewStore};

/// 浏览器 `toBlob("image/jpeg")` 的默认质量
const CAPTURE_JPEG_QUALITY: u8 = 92;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FacingMode {
  User,
  Environment,
}

impl FacingMode {
  pub fn flipped(self) -> Self {
    match self {
      FacingMode::User => FacingMode::Environment,
      FacingMode::Environment => FacingMode::User,
    }
  }

  pub fn as_str(&self) -> &'static str {
    match self {
      FacingMode::User => "user",
      FacingMode::Environment => "environment",
    }
  }
}

impl fmt::Display for FacingMode {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

impl FromStr for FacingMode {
  type Err = CaptureError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s {
      "user" => Ok(FacingMode::User),
      "environment" => Ok(FacingMode::Environment),
      other => Err(CaptureError::InvalidFacingMode(other.to_string())),
    }
  }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceInfo {
  pub index: usize,
  pub path: String,
  pub name: String,
}

#[derive(Error, Debug)]
pub enum CaptureError {
  #[error("摄像头权限被拒绝: {0}")]
  PermissionDenied(String),
  #[error("摄像头不可用: {0}")]
  Unavailable(String),
  #[error("当前状态 {state:?} 下不允许执行 {operation}")]
  InvalidState {
    operation: &'static str,
    state: CaptureState,
  },
  #[error("没有可切换的其他摄像头")]
  NoAlternateDevice,
  #[error("无效的朝向: {0}")]
  InvalidFacingMode(String),
  #[error("抓取画面失败: {0}")]
  Snapshot(String),
  #[error("JPEG 编码失败: {0}")]
  Encode(#[from] image::ImageError),
}

/// 摄像头设备协作者
pub trait CaptureDevice {
  type Stream: VideoStream;

  /// 按朝向提示申请视频流；设备权限在此协商
  fn request_stream(&mut self, facing: FacingMode) -> Result<Self::Stream, CaptureError>;

  fn list_devices(&self) -> Result<Vec<DeviceInfo>, CaptureError>;
}

/// 已获取的视频流
pub trait VideoStream {
  /// 开始持续渲染预览画面
  fn start_preview(&mut self) -> Result<(), CaptureError>;

  /// 以原始分辨率抓取当前帧
  fn snapshot(&mut self) -> Result<RgbImage, CaptureError>;

  /// 停止全部硬件轨道，不可恢复
  fn stop(&mut self);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureState {
  Idle,
  RequestingPermission,
  Streaming,
  SwitchingDevice,
  Captured,
  Closed,
}

impl CaptureState {
  pub fn is_terminal(&self) -> bool {
    matches!(self, CaptureState::Captured | CaptureState::Closed)
  }
}

struct CaptureSession<S> {
  stream: S,
  facing: FacingMode,
  active: bool,
}

impl<S: VideoStream> CaptureSession<S> {
  fn release(mut self) {
    if self.active {
      self.stream.stop();
      self.active = false;
    }
  }
}

pub struct CaptureSessionManager<D: CaptureDevice> {
  device: D,
  previews: PreviewStore,
  state: CaptureState,
  // 仅在 Streaming 状态下为 Some
  session: Option<CaptureSession<D::Stream>>,
}

impl<D: CaptureDevice> CaptureSessionManager<D> {
  pub fn new(device: D, previews: PreviewStore) -> Self {
    Self {
      device,
      previews,
      state: CaptureState::Idle,
      session: None,
    }
  }

  pub fn state(&self) -> CaptureState {
    self.state
  }

  pub fn facing_mode(&self) -> Option<FacingMode> {
    self.session.as_ref().map(|session| session.facing)
  }

  pub fn is_active(&self) -> bool {
    self.session.as_ref().is_some_and(|session| session.active)
  }

  pub fn device(&self) -> &D {
    &self.device
  }

  /// 是否存在可切换的其他摄像头
  pub fn can_switch_device(&self) -> bool {
    match self.device.list_devices() {
      Ok(devices) => devices.len() > 1,
      Err(e) => {
        warn!("枚举摄像头失败: {}", e);
        false
      }
    }
  }

  pub fn open(&mut self, facing: FacingMode) -> Result<(), CaptureError> {
    if matches!(
      self.state,
      CaptureState::RequestingPermission | CaptureState::SwitchingDevice
    ) {
      return Err(CaptureError::InvalidState {
        operation: "open",
        state: self.state,
      });
    }

    self.release_session();
    self.state = CaptureState::RequestingPermission;
    self.bind(facing)
  }

  pub fn switch_device(&mut self) -> Result<(), CaptureError> {
    if self.state != CaptureState::Streaming {
      return Err(CaptureError::InvalidState {
        operation: "switch_device",
        state: self.state,
      });
    }
    if !self.can_switch_device() {
      return Err(CaptureError::NoAlternateDevice);
    }

    let facing = self
      .session
      .as_ref()
      .map(|session| session.facing.flipped())
      .unwrap_or(FacingMode::Environment);

    info!("切换摄像头至 {}", facing);
    self.state = CaptureState::SwitchingDevice;
    self.release_session();
    self.bind(facing)
  }

  pub fn capture_photo(&mut self) -> Result<ImagePayload, CaptureError> {
    let invalid = CaptureError::InvalidState {
      operation: "capture_photo",
      state: self.state,
    };
    if self.state != CaptureState::Streaming {
      return Err(invalid);
    }
    let Some(session) = self.session.as_mut().filter(|session| session.active) else {
      return Err(invalid);
    };

    let frame = session.stream.snapshot()?;
    debug!("抓取画面 {}x{}", frame.width(), frame.height());

    // 抓取后立即停止全部轨道
    session.stream.stop();
    session.active = false;
    self.session = None;

    match encode_jpeg(&frame) {
      Ok(bytes) => {
        let name = format!("captured-{}.jpg", Local::now().format("%Y%m%d-%H%M%S"));
        info!("拍摄完成: {} ({} 字节)", name, bytes.len());
        self.state = CaptureState::Captured;
        Ok(ImagePayload::new(
          name,
          ImageMime::Jpeg,
          bytes,
          self.previews.mint(),
        ))
      }
      Err(e) => {
        error!("拍摄画面编码失败: {}", e);
        self.state = CaptureState::Closed;
        Err(e)
      }
    }
  }

  /// 关闭会话；终止状态下为空操作
  pub fn close(&mut self) {
    if self.state.is_terminal() {
      return;
    }
    self.release_session();
    self.state = CaptureState::Closed;
    info!("摄像头会话已关闭");
  }

  fn release_session(&mut self) {
    if let Some(session) = self.session.take() {
      debug!("停止当前视频流 ({})", session.facing);
      session.release();
    }
  }

  fn bind(&mut self, facing: FacingMode) -> Result<(), CaptureError> {
    debug_assert!(self.session.is_none());

    let mut stream = match self.device.request_stream(facing) {
      Ok(stream) => stream,
      Err(e) => {
        error!("申请摄像头失败: {}", e);
        self.state = CaptureState::Closed;
        return Err(e);
      }
    };

    if let Err(e) = stream.start_preview() {
      error!("启动预览失败: {}", e);
      stream.stop();
      self.state = CaptureState::Closed;
      return Err(e);
    }

    info!("摄像头已就绪 ({})", facing);
    self.session = Some(CaptureSession {
      stream,
      facing,
      active: true,
    });
    self.state = CaptureState::Streaming;
    Ok(())
  }
}

impl<D: CaptureDevice> Drop for CaptureSessionManager<D> {
  fn drop(&mut self) {
    self.close();
  }
}

fn encode_jpeg(frame: &RgbImage) -> Result<Vec<u8>, CaptureError> {
  let mut cursor = Cursor::new(Vec::new());
  JpegEncoder::new_with_quality(&mut cursor, CAPTURE_JPEG_QUALITY).encode_image(frame)?;
  Ok(cursor.into_inner())
}
