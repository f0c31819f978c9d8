// 该文件是 AutoLens 项目的一部分。
// src/normalize.rs - 图像缩放与重新编码
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

use std::io::Cursor;

use image::{codecs::jpeg::JpegEncoder, imageops::FilterType};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::payload::{ImageMime, ImagePayload, PreviewStore};

pub const DEFAULT_RESIZE_THRESHOLD: usize = 2 * 1024 * 1024;
pub const DEFAULT_MAX_DIMENSION: u32 = 1200;
pub const DEFAULT_JPEG_QUALITY: f32 = 0.85;

#[derive(Error, Debug)]
pub enum NormalizeError {
  #[error("图像解码失败: {0}")]
  Decode(image::ImageError),
  #[error("图像编码失败: {0}")]
  Encode(image::ImageError),
  #[error("编码结果为空")]
  EmptyOutput,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NormalizerConfig {
  /// 不超过该字节数的图像原样通过
  pub resize_threshold: usize,
  pub max_dimension: u32,
  /// JPEG 质量，取值 0.0 - 1.0
  pub jpeg_quality: f32,
}

impl Default for NormalizerConfig {
  fn default() -> Self {
    Self {
      resize_threshold: DEFAULT_RESIZE_THRESHOLD,
      max_dimension: DEFAULT_MAX_DIMENSION,
      jpeg_quality: DEFAULT_JPEG_QUALITY,
    }
  }
}

impl NormalizerConfig {
  fn encoder_quality(&self) -> u8 {
    (self.jpeg_quality.clamp(0.01, 1.0) * 100.0).round() as u8
  }
}

/// 保持宽高比，将较长边限制在 `max` 以内
pub fn target_dimensions(width: u32, height: u32, max: u32) -> (u32, u32) {
  let scale = |side: u32, long: u32| -> u32 {
    ((side as f64 * max as f64 / long as f64).round() as u32).max(1)
  };

  if width >= height && width > max {
    (max, scale(height, width))
  } else if height > max {
    (scale(width, height), max)
  } else {
    (width, height)
  }
}

#[derive(Debug, Clone)]
pub struct ImageNormalizer {
  config: NormalizerConfig,
  previews: PreviewStore,
}

impl ImageNormalizer {
  pub fn new(config: NormalizerConfig, previews: PreviewStore) -> Self {
    Self { config, previews }
  }

  pub fn config(&self) -> &NormalizerConfig {
    &self.config
  }

  /// 尽力而为的规整化：失败时返回原始载荷
  pub fn normalize(&self, payload: ImagePayload) -> ImagePayload {
    if payload.byte_len() <= self.config.resize_threshold {
      debug!(
        "{} 大小 {} 字节，无需缩放",
        payload.name(),
        payload.byte_len()
      );
      return payload;
    }

    match self.try_normalize(&payload) {
      Ok(normalized) => {
        info!(
          "{} 已重新编码: {} -> {} 字节",
          payload.name(),
          payload.byte_len(),
          normalized.byte_len()
        );
        normalized
      }
      Err(e) => {
        warn!("{} 规整化失败，使用原图: {}", payload.name(), e);
        payload
      }
    }
  }

  /// 解码、缩放并重新编码为 JPEG，不考虑阈值
  pub fn try_normalize(&self, payload: &ImagePayload) -> Result<ImagePayload, NormalizeError> {
    let decoded = image::load_from_memory(payload.bytes()).map_err(NormalizeError::Decode)?;
    let (width, height) = (decoded.width(), decoded.height());
    let (target_w, target_h) = target_dimensions(width, height, self.config.max_dimension);
    debug!(
      "{}: {}x{} -> {}x{}",
      payload.name(),
      width,
      height,
      target_w,
      target_h
    );

    let surface = decoded.to_rgb8();
    let surface = if (target_w, target_h) == (width, height) {
      surface
    } else {
      image::imageops::resize(&surface, target_w, target_h, FilterType::Triangle)
    };

    let mut cursor = Cursor::new(Vec::new());
    JpegEncoder::new_with_quality(&mut cursor, self.config.encoder_quality())
      .encode_image(&surface)
      .map_err(NormalizeError::Encode)?;
    let bytes = cursor.into_inner();
    if bytes.is_empty() {
      return Err(NormalizeError::EmptyOutput);
    }

    Ok(ImagePayload::new(
      payload.name(),
      ImageMime::Jpeg,
      bytes,
      self.previews.mint(),
    ))
  }
}
