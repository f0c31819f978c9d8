// 该文件是 AutoLens 项目的一部分。
// src/input/v4l_devices.rs - V4L2 摄像头枚举
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

use tracing::debug;
use v4l::capability::Flags;

use super::{DeviceInfo, FacingMode};

const USER_HINTS: [&str; 4] = ["front", "user", "face", "integrated"];
const ENVIRONMENT_HINTS: [&str; 4] = ["back", "rear", "environment", "world"];

/// 列出支持视频采集的 V4L2 设备
pub fn enumerate_capture_devices() -> Vec<DeviceInfo> {
  let mut devices: Vec<DeviceInfo> = v4l::context::enum_devices()
    .into_iter()
    .filter(|node| {
      let capture = v4l::Device::with_path(node.path())
        .and_then(|device| device.query_caps())
        .map(|caps| caps.capabilities.contains(Flags::VIDEO_CAPTURE))
        .unwrap_or(false);
      if !capture {
        debug!("跳过非采集设备: {}", node.path().display());
      }
      capture
    })
    .map(|node| DeviceInfo {
      index: node.index(),
      path: node.path().to_string_lossy().into_owned(),
      name: node.name().unwrap_or_default(),
    })
    .collect();
  devices.sort_by_key(|device| device.index);
  devices
}

/// 按朝向提示挑选设备
///
/// 名称中带有朝向关键字的设备优先；否则 user 取第一个，
/// environment 取第二个（只有一个设备时退回第一个）。
pub(crate) fn resolve_facing(devices: &[DeviceInfo], facing: FacingMode) -> Option<&DeviceInfo> {
  let hints: &[&str] = match facing {
    FacingMode::User => &USER_HINTS,
    FacingMode::Environment => &ENVIRONMENT_HINTS,
  };

  let by_name = devices.iter().find(|device| {
    let name = device.name.to_lowercase();
    hints.iter().any(|hint| name.contains(hint))
  });
  if by_name.is_some() {
    return by_name;
  }

  match facing {
    FacingMode::User => devices.first(),
    FacingMode::Environment => devices.get(1).or_else(|| devices.first()),
  }
}
