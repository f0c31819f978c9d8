// 该文件是 AutoLens 项目的一部分。
// src/input.rs - 图像获取：上传与摄像头
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

mod validate;
pub use self::validate::{DEFAULT_MAX_UPLOAD_BYTES, RawFile, UploadValidator, ValidationError};

mod upload;
pub use self::upload::{DragEvent, FileInput, UploadField};

pub(crate) mod camera;
pub use self::camera::{
  CaptureDevice, CaptureError, CaptureSessionManager, CaptureState, DeviceInfo, FacingMode,
  VideoStream,
};

mod v4l_devices;
pub use self::v4l_devices::enumerate_capture_devices;

#[cfg(feature = "gstreamer_input")]
mod gstreamer_camera;
#[cfg(feature = "gstreamer_input")]
pub use self::gstreamer_camera::{GStreamerCamera, GStreamerCameraStream};
