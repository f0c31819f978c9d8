// 该文件是 AutoLens 项目的一部分。
// src/input/validate.rs - 上传图像校验
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

use std::path::Path;

use image::ImageFormat;
use thiserror::Error;
use tracing::{debug, warn};

use crate::payload::{ImageMime, ImagePayload, PreviewStore};

pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
  #[error("Please upload a JPG, PNG, or GIF image")]
  UnsupportedFormat(String),
  #[error("File size exceeds {}MB limit", .limit / (1024 * 1024))]
  TooLarge { size: usize, limit: usize },
}

/// 待校验的原始文件
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawFile {
  pub name: String,
  /// 声明的 MIME 类型，未知时为空串
  pub declared_type: String,
  pub bytes: Vec<u8>,
}

impl RawFile {
  pub fn new(name: impl Into<String>, declared_type: impl Into<String>, bytes: Vec<u8>) -> Self {
    Self {
      name: name.into(),
      declared_type: declared_type.into(),
      bytes,
    }
  }

  /// 从磁盘读取文件，按扩展名推断声明类型
  pub fn from_path(path: impl AsRef<Path>) -> std::io::Result<Self> {
    let path = path.as_ref();
    let bytes = std::fs::read(path)?;
    let declared_type = ImageFormat::from_path(path)
      .map(|format| format.to_mime_type().to_string())
      .unwrap_or_default();
    let name = path
      .file_name()
      .map(|name| name.to_string_lossy().into_owned())
      .unwrap_or_default();
    debug!("读取文件 {}: {} 字节, 类型 '{}'", name, bytes.len(), declared_type);
    Ok(Self {
      name,
      declared_type,
      bytes,
    })
  }
}

#[derive(Debug, Clone)]
pub struct UploadValidator {
  max_bytes: usize,
  previews: PreviewStore,
}

impl UploadValidator {
  pub fn new(previews: PreviewStore) -> Self {
    Self {
      max_bytes: DEFAULT_MAX_UPLOAD_BYTES,
      previews,
    }
  }

  pub fn with_max_bytes(mut self, max_bytes: usize) -> Self {
    self.max_bytes = max_bytes;
    self
  }

  pub fn max_bytes(&self) -> usize {
    self.max_bytes
  }

  pub fn validate(&self, candidate: RawFile) -> Result<ImagePayload, ValidationError> {
    let Some(mime) = ImageMime::from_declared(&candidate.declared_type) else {
      warn!(
        "拒绝文件 {}: 不支持的类型 '{}'",
        candidate.name, candidate.declared_type
      );
      return Err(ValidationError::UnsupportedFormat(candidate.declared_type));
    };

    if candidate.bytes.len() > self.max_bytes {
      warn!(
        "拒绝文件 {}: 大小 {} 超过上限 {}",
        candidate.name,
        candidate.bytes.len(),
        self.max_bytes
      );
      return Err(ValidationError::TooLarge {
        size: candidate.bytes.len(),
        limit: self.max_bytes,
      });
    }

    Ok(ImagePayload::new(
      candidate.name,
      mime,
      candidate.bytes,
      self.previews.mint(),
    ))
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::io::Write;
  use tempfile::Builder;

  fn validator() -> (UploadValidator, PreviewStore) {
    let store = PreviewStore::new();
    (UploadValidator::new(store.clone()), store)
  }

  #[test]
  fn accepted_types_within_limit_pass() {
    let (validator, store) = validator();
    for declared in ["image/jpeg", "image/png", "image/gif"] {
      let payload = validator
        .validate(RawFile::new("x", declared, vec![0; 128]))
        .expect("accepted");
      assert_eq!(payload.mime().as_str(), declared);
      assert_eq!(payload.byte_len(), 128);
      assert!(payload.preview().is_live());
    }
    assert_eq!(store.live_count(), 0);
  }

  #[test]
  fn exactly_at_the_limit_is_accepted() {
    let (validator, _store) = validator();
    let file = RawFile::new("edge.jpg", "image/jpeg", vec![0; DEFAULT_MAX_UPLOAD_BYTES]);
    assert!(validator.validate(file).is_ok());
  }

  #[test]
  fn one_byte_over_the_limit_is_too_large() {
    let (validator, store) = validator();
    let file = RawFile::new("big.png", "image/png", vec![0; DEFAULT_MAX_UPLOAD_BYTES + 1]);
    let err = validator.validate(file).unwrap_err();
    assert_eq!(
      err,
      ValidationError::TooLarge {
        size: DEFAULT_MAX_UPLOAD_BYTES + 1,
        limit: DEFAULT_MAX_UPLOAD_BYTES
      }
    );
    assert_eq!(err.to_string(), "File size exceeds 10MB limit");
    assert_eq!(store.live_count(), 0);
  }

  #[test]
  fn unsupported_types_are_rejected_before_size() {
    let (validator, store) = validator();
    for declared in ["image/webp", "image/bmp", "application/pdf", ""] {
      let file = RawFile::new("x", declared, vec![0; DEFAULT_MAX_UPLOAD_BYTES + 1]);
      let err = validator.validate(file).unwrap_err();
      assert!(matches!(err, ValidationError::UnsupportedFormat(_)));
      assert_eq!(err.to_string(), "Please upload a JPG, PNG, or GIF image");
    }
    assert_eq!(store.live_count(), 0);
  }

  #[test]
  fn configured_limit_is_honoured() {
    let (validator, _store) = validator();
    let validator = validator.with_max_bytes(16);
    assert!(
      validator
        .validate(RawFile::new("a.gif", "image/gif", vec![0; 16]))
        .is_ok()
    );
    assert!(
      validator
        .validate(RawFile::new("a.gif", "image/gif", vec![0; 17]))
        .is_err()
    );
  }

  #[test]
  fn from_path_declares_type_by_extension() {
    let mut file = Builder::new().suffix(".png").tempfile().expect("tempfile");
    file.write_all(b"not really a png").expect("write");

    let raw = RawFile::from_path(file.path()).expect("read");
    assert_eq!(raw.declared_type, "image/png");
    assert_eq!(raw.bytes, b"not really a png");

    let unknown = Builder::new().suffix(".txt").tempfile().expect("tempfile");
    let raw = RawFile::from_path(unknown.path()).expect("read");
    assert_eq!(raw.declared_type, "");
  }
}
