// 该文件是 AutoLens 项目的一部分。
// src/input/gstreamer_camera.rs - 基于 GStreamer 的摄像头
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

//! # GStreamer 摄像头
//!
//! 通过 URL 配置：
//!
//! ```text
//! camera:///dev/video0?facing=environment&width=1280&height=720&preview=auto
//! camera:?facing=user&preview=none
//! ```
//!
//! - 路径为空时按朝向从 V4L2 设备列表中挑选摄像头
//! - `preview=auto` 打开本地预览窗口，`preview=none` 不显示预览
//! - `width`/`height` 同时给出时对画面进行缩放
//!
//! 管道在 tee 处分为预览与抓拍两路，抓拍分支只保留最新的一帧。
//!
//! ## 系统依赖
//!
//! 需要安装 GStreamer 开发库以及 good/base 插件。

use std::collections::HashMap;
use std::io::ErrorKind;

use gstreamer::{self as gst, prelude::*};
use gstreamer_app as gst_app;
use gstreamer_video as gst_video;
use image::RgbImage;
use tracing::{debug, error, info, warn};
use url::Url;

use super::{
  CaptureDevice, CaptureError, DeviceInfo, FacingMode, VideoStream, enumerate_capture_devices,
  v4l_devices::resolve_facing,
};
use crate::{FromUrl, FromUrlWithScheme};

const STATE_CHANGE_TIMEOUT_SECS: u64 = 5;
const SNAPSHOT_TIMEOUT_SECS: u64 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PreviewSink {
  Auto,
  None,
}

enum CameraPipelineItem {
  Source { device: String },
  Decode,
  Scale { width: u32, height: u32 },
  Tee,
}

impl CameraPipelineItem {
  fn to_pipeline(&self) -> String {
    match self {
      CameraPipelineItem::Source { device } => format!("v4l2src device={}", device),
      CameraPipelineItem::Decode => "decodebin ! videoconvert".to_string(),
      CameraPipelineItem::Scale { width, height } => {
        format!("videoscale ! video/x-raw,width={},height={}", width, height)
      }
      CameraPipelineItem::Tee => "tee name=t".to_string(),
    }
  }
}

/// GStreamer 摄像头设备
pub struct GStreamerCamera {
  pinned: Option<String>,
  initial_facing: FacingMode,
  size: Option<(u32, u32)>,
  preview: PreviewSink,
}

impl FromUrlWithScheme for GStreamerCamera {
  const SCHEME: &'static str = "camera";
}

impl FromUrl for GStreamerCamera {
  type Error = CaptureError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      error!(
        "URI scheme mismatch: expected '{}', found '{}'",
        Self::SCHEME,
        url.scheme()
      );
      return Err(CaptureError::Unavailable(format!(
        "不支持的摄像头地址: {}",
        url
      )));
    }

    let query: HashMap<String, String> = url
      .query_pairs()
      .map(|(k, v)| (String::from(k), String::from(v)))
      .collect();

    let pinned = Some(url.path())
      .filter(|path| !path.is_empty() && *path != "/")
      .map(String::from);
    let initial_facing = query
      .get("facing")
      .map(|v| v.parse::<FacingMode>())
      .transpose()?
      .unwrap_or(FacingMode::Environment);
    let width = query.get("width").and_then(|v| v.parse::<u32>().ok());
    let height = query.get("height").and_then(|v| v.parse::<u32>().ok());
    let preview = match query.get("preview").map(String::as_str) {
      Some("none") => PreviewSink::None,
      _ => PreviewSink::Auto,
    };

    Ok(GStreamerCamera {
      pinned,
      initial_facing,
      size: width.zip(height),
      preview,
    })
  }
}

impl GStreamerCamera {
  pub fn initial_facing(&self) -> FacingMode {
    self.initial_facing
  }

  fn device_for(&self, facing: FacingMode) -> Result<String, CaptureError> {
    self.pick_device(&enumerate_capture_devices(), facing)
  }

  /// 固定设备对应初始朝向；另一朝向取第一个与之不同的设备
  fn pick_device(&self, devices: &[DeviceInfo], facing: FacingMode) -> Result<String, CaptureError> {
    let picked = match &self.pinned {
      Some(pinned) if facing == self.initial_facing => return Ok(pinned.clone()),
      Some(pinned) => devices
        .iter()
        .find(|device| &device.path != pinned)
        .or_else(|| resolve_facing(devices, facing)),
      None => resolve_facing(devices, facing),
    };
    picked
      .map(|device| device.path.clone())
      .ok_or_else(|| CaptureError::Unavailable("没有找到可用的摄像头".to_string()))
  }

  fn pipeline_description(&self, device: &str) -> String {
    let mut items = vec![
      CameraPipelineItem::Source {
        device: device.to_string(),
      },
      CameraPipelineItem::Decode,
    ];
    if let Some((width, height)) = self.size {
      items.push(CameraPipelineItem::Scale { width, height });
    }
    items.push(CameraPipelineItem::Tee);

    let trunk = items
      .iter()
      .map(CameraPipelineItem::to_pipeline)
      .collect::<Vec<String>>()
      .join(" ! ");
    let preview_sink = match self.preview {
      PreviewSink::Auto => "autovideosink sync=false",
      PreviewSink::None => "fakesink sync=false",
    };

    format!(
      "{} t. ! queue ! videoconvert ! {} \
       t. ! queue leaky=downstream max-size-buffers=1 ! videoconvert ! video/x-raw,format=RGB ! \
       appsink name=snapshot max-buffers=1 drop=true sync=false",
      trunk, preview_sink
    )
  }
}

/// 先直接打开设备节点，区分权限问题与设备缺失
fn check_access(device: &str) -> Result<(), CaptureError> {
  match std::fs::OpenOptions::new()
    .read(true)
    .write(true)
    .open(device)
  {
    Ok(_) => Ok(()),
    Err(e) if e.kind() == ErrorKind::PermissionDenied => {
      Err(CaptureError::PermissionDenied(device.to_string()))
    }
    Err(e) => Err(CaptureError::Unavailable(format!("{}: {}", device, e))),
  }
}

fn unavailable(e: impl std::fmt::Display) -> CaptureError {
  CaptureError::Unavailable(e.to_string())
}

impl CaptureDevice for GStreamerCamera {
  type Stream = GStreamerCameraStream;

  fn request_stream(&mut self, facing: FacingMode) -> Result<Self::Stream, CaptureError> {
    let device = self.device_for(facing)?;
    info!("申请摄像头 {} ({})", device, facing);
    check_access(&device)?;

    gst::init().map_err(unavailable)?;

    let description = self.pipeline_description(&device);
    info!("GStreamer pipeline description: {}", description);

    let pipeline = gst::parse::launch(&description)
      .map_err(unavailable)?
      .downcast::<gst::Pipeline>()
      .map_err(|_| unavailable("Failed to create pipeline"))?;

    let appsink = pipeline
      .by_name("snapshot")
      .ok_or_else(|| unavailable("Failed to get appsink element"))?
      .downcast::<gst_app::AppSink>()
      .map_err(|_| unavailable("Failed to convert element to appsink"))?;

    let mut stream = GStreamerCameraStream {
      pipeline,
      appsink,
      device,
      stopped: false,
    };
    // 进入 PAUSED 时打开设备
    if let Err(e) = stream.change_state(gst::State::Paused) {
      stream.stop();
      return Err(e);
    }
    Ok(stream)
  }

  fn list_devices(&self) -> Result<Vec<DeviceInfo>, CaptureError> {
    Ok(enumerate_capture_devices())
  }
}

/// GStreamer 摄像头视频流
pub struct GStreamerCameraStream {
  pipeline: gst::Pipeline,
  appsink: gst_app::AppSink,
  device: String,
  stopped: bool,
}

impl GStreamerCameraStream {
  pub fn device(&self) -> &str {
    &self.device
  }

  fn change_state(&self, state: gst::State) -> Result<(), CaptureError> {
    self.pipeline.set_state(state).map_err(|e| {
      unavailable(format!(
        "{}: {} ({})",
        self.device,
        e,
        self.bus_error().unwrap_or_default()
      ))
    })?;

    let (result, current, _pending) = self
      .pipeline
      .state(gst::ClockTime::from_seconds(STATE_CHANGE_TIMEOUT_SECS));
    debug!("管道状态: {:?}", current);
    result.map(|_| ()).map_err(|e| {
      unavailable(format!(
        "{}: {} ({})",
        self.device,
        e,
        self.bus_error().unwrap_or_default()
      ))
    })
  }

  fn bus_error(&self) -> Option<String> {
    let bus = self.pipeline.bus()?;
    let message = bus.pop_filtered(&[gst::MessageType::Error])?;
    match message.view() {
      gst::MessageView::Error(err) => Some(err.error().to_string()),
      _ => None,
    }
  }
}

impl VideoStream for GStreamerCameraStream {
  fn start_preview(&mut self) -> Result<(), CaptureError> {
    self.change_state(gst::State::Playing)
  }

  fn snapshot(&mut self) -> Result<RgbImage, CaptureError> {
    let sample = self
      .appsink
      .try_pull_sample(gst::ClockTime::from_seconds(SNAPSHOT_TIMEOUT_SECS))
      .ok_or_else(|| CaptureError::Snapshot("等待画面超时".to_string()))?;
    convert_sample_to_rgb(sample)
  }

  fn stop(&mut self) {
    if self.stopped {
      return;
    }
    self.stopped = true;
    if let Err(e) = self.pipeline.set_state(gst::State::Null) {
      warn!("Failed to stop GStreamer pipeline: {}", e);
    }
    debug!("已释放摄像头 {}", self.device);
  }
}

impl Drop for GStreamerCameraStream {
  fn drop(&mut self) {
    self.stop();
  }
}

fn convert_sample_to_rgb(sample: gst::Sample) -> Result<RgbImage, CaptureError> {
  let buffer = sample
    .buffer()
    .ok_or_else(|| CaptureError::Snapshot("No buffer in sample".to_string()))?;
  let caps = sample
    .caps()
    .ok_or_else(|| CaptureError::Snapshot("No caps in sample".to_string()))?;

  let video_info = gst_video::VideoInfo::from_caps(caps)
    .map_err(|_| CaptureError::Snapshot("Failed to get video info from caps".to_string()))?;
  if video_info.format() != gst_video::VideoFormat::Rgb {
    return Err(CaptureError::Snapshot(format!(
      "Unsupported video format: {:?}",
      video_info.format()
    )));
  }

  let width = video_info.width() as usize;
  let height = video_info.height() as usize;
  let stride = video_info.stride()[0] as usize;

  let map = buffer
    .map_readable()
    .map_err(|e| CaptureError::Snapshot(format!("Failed to map buffer for reading: {}", e)))?;
  let data = map.as_slice();

  // 每行可能有对齐填充
  let row = width * 3;
  if width == 0 || height == 0 || stride < row || data.len() < stride * (height - 1) + row {
    return Err(CaptureError::Snapshot(format!(
      "Buffer size mismatch: stride {}, {} bytes for {}x{}",
      stride,
      data.len(),
      width,
      height
    )));
  }

  let mut packed = Vec::with_capacity(row * height);
  for y in 0..height {
    packed.extend_from_slice(&data[y * stride..y * stride + row]);
  }

  RgbImage::from_raw(width as u32, height as u32, packed)
    .ok_or_else(|| CaptureError::Snapshot("Failed to assemble frame".to_string()))
}

#[cfg(test)]
mod tests {
  use super::*;

  fn camera(url: &str) -> GStreamerCamera {
    GStreamerCamera::from_url(&Url::parse(url).unwrap()).expect("camera url")
  }

  #[test]
  fn url_carries_device_facing_and_size() {
    let camera = camera("camera:///dev/video2?facing=user&width=1280&height=720&preview=none");
    assert_eq!(camera.pinned.as_deref(), Some("/dev/video2"));
    assert_eq!(camera.initial_facing(), FacingMode::User);
    assert_eq!(camera.size, Some((1280, 720)));
    assert_eq!(camera.preview, PreviewSink::None);
  }

  #[test]
  fn empty_path_means_resolve_by_facing() {
    let camera = camera("camera:?preview=auto");
    assert_eq!(camera.pinned, None);
    assert_eq!(camera.initial_facing(), FacingMode::Environment);
    assert_eq!(camera.size, None);
    assert_eq!(camera.preview, PreviewSink::Auto);
  }

  #[test]
  fn switching_away_from_a_pinned_device_picks_another() {
    let devices = [
      DeviceInfo {
        index: 0,
        path: "/dev/video0".to_string(),
        name: "USB Camera".to_string(),
      },
      DeviceInfo {
        index: 2,
        path: "/dev/video2".to_string(),
        name: "USB Camera".to_string(),
      },
    ];
    let front = camera("camera:///dev/video0?facing=user");
    assert_eq!(
      front.pick_device(&devices, FacingMode::User).unwrap(),
      "/dev/video0"
    );
    assert_eq!(
      front.pick_device(&devices, FacingMode::Environment).unwrap(),
      "/dev/video2"
    );

    let rear = camera("camera:///dev/video2?facing=environment");
    assert_eq!(
      rear.pick_device(&devices, FacingMode::User).unwrap(),
      "/dev/video0"
    );
  }

  #[test]
  fn bad_scheme_or_facing_is_rejected() {
    assert!(GStreamerCamera::from_url(&Url::parse("gst://camera/dev/video0").unwrap()).is_err());
    assert!(
      GStreamerCamera::from_url(&Url::parse("camera:///dev/video0?facing=rear").unwrap()).is_err()
    );
  }

  #[test]
  fn pipeline_splits_preview_and_snapshot() {
    let description = camera("camera:///dev/video0?width=640&height=480&preview=none")
      .pipeline_description("/dev/video0");
    assert!(description.starts_with("v4l2src device=/dev/video0 ! decodebin"));
    assert!(description.contains("video/x-raw,width=640,height=480 ! tee name=t"));
    assert!(description.contains("fakesink"));
    assert!(description.contains("appsink name=snapshot"));
  }

  #[test]
  fn missing_device_node_is_unavailable() {
    assert!(matches!(
      check_access("/dev/autolens-does-not-exist"),
      Err(CaptureError::Unavailable(_))
    ));
  }
}
