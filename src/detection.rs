// 该文件是 AutoLens 项目的一部分。
// src/detection.rs - 检测结果定义
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

use serde::{Deserialize, Serialize};

use crate::payload::ImagePayload;

/// 检测服务
pub trait DetectionService {
  type Error;

  fn detect(&self, payload: &ImagePayload) -> Result<DetectionBatch, Self::Error>;
}

impl<T: DetectionService + ?Sized> DetectionService for &T {
  type Error = T::Error;

  fn detect(&self, payload: &ImagePayload) -> Result<DetectionBatch, Self::Error> {
    (**self).detect(payload)
  }
}

/// 线上格式：`[x1, y1, x2, y2, label, confidence]`
#[derive(Debug, Clone, Deserialize, Serialize)]
struct DetectionTuple(f64, f64, f64, f64, String, f64);

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(from = "DetectionTuple", into = "DetectionTuple")]
pub struct Detection {
  pub bbox: [f64; 4], // [x1, y1, x2, y2]，坐标含义由检测服务决定
  pub label: String,
  pub confidence: f64,
}

impl From<DetectionTuple> for Detection {
  fn from(DetectionTuple(x1, y1, x2, y2, label, confidence): DetectionTuple) -> Self {
    Detection {
      bbox: [x1, y1, x2, y2],
      label,
      confidence,
    }
  }
}

impl From<Detection> for DetectionTuple {
  fn from(detection: Detection) -> Self {
    let [x1, y1, x2, y2] = detection.bbox;
    DetectionTuple(x1, y1, x2, y2, detection.label, detection.confidence)
  }
}

/// 一次请求返回的检测结果
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(transparent)]
pub struct DetectionBatch {
  items: Vec<Detection>,
}

impl DetectionBatch {
  pub fn new(items: Vec<Detection>) -> Self {
    Self { items }
  }

  pub fn items(&self) -> &[Detection] {
    &self.items
  }

  pub fn len(&self) -> usize {
    self.items.len()
  }

  pub fn is_empty(&self) -> bool {
    self.items.is_empty()
  }
}

impl FromIterator<Detection> for DetectionBatch {
  fn from_iter<I: IntoIterator<Item = Detection>>(iter: I) -> Self {
    Self::new(iter.into_iter().collect())
  }
}

mod ranking;
pub use self::ranking::{ConfidenceTier, RankedDetection, RankingView, confidence_percent, rank};

mod client;
pub use self::client::{DetectionClient, DetectionError, Profile, resolve_endpoint};
