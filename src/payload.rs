// 该文件是 AutoLens 项目的一部分。
// src/payload.rs - 图像载荷与预览引用
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

use std::collections::HashSet;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use tracing::debug;

/// 管线接受的图像类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ImageMime {
  Jpeg,
  Png,
  Gif,
}

impl ImageMime {
  pub const ACCEPTED: [ImageMime; 3] = [ImageMime::Jpeg, ImageMime::Png, ImageMime::Gif];

  pub fn as_str(&self) -> &'static str {
    match self {
      ImageMime::Jpeg => "image/jpeg",
      ImageMime::Png => "image/png",
      ImageMime::Gif => "image/gif",
    }
  }

  /// 按声明的 MIME 类型解析，不在接受集合内时返回 `None`
  pub fn from_declared(declared: &str) -> Option<Self> {
    Self::ACCEPTED
      .into_iter()
      .find(|mime| mime.as_str() == declared)
  }
}

impl fmt::Display for ImageMime {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

#[derive(Debug, Default)]
struct PreviewRegistry {
  next_id: u64,
  live: HashSet<u64>,
}

fn lock(registry: &Mutex<PreviewRegistry>) -> MutexGuard<'_, PreviewRegistry> {
  registry.lock().unwrap_or_else(PoisonError::into_inner)
}

/// 预览引用的发放与回收登记
///
/// 克隆得到的 store 共享同一份登记表。
#[derive(Debug, Clone, Default)]
pub struct PreviewStore {
  inner: Arc<Mutex<PreviewRegistry>>,
}

impl PreviewStore {
  pub fn new() -> Self {
    Self::default()
  }

  /// 发放一个新的预览引用
  pub fn mint(&self) -> PreviewRef {
    let mut registry = lock(&self.inner);
    registry.next_id += 1;
    let id = registry.next_id;
    registry.live.insert(id);
    debug!("发放预览引用 preview:{}", id);
    PreviewRef {
      id,
      store: Arc::downgrade(&self.inner),
    }
  }

  /// 当前仍然有效的预览引用数量
  pub fn live_count(&self) -> usize {
    lock(&self.inner).live.len()
  }

  pub fn is_live(&self, preview: &PreviewRef) -> bool {
    lock(&self.inner).live.contains(&preview.id)
  }
}

/// 仅用于本地渲染的短期预览引用
///
/// 单一所有者，不可克隆；被替换或丢弃时自动回收。
#[derive(Debug)]
pub struct PreviewRef {
  id: u64,
  store: Weak<Mutex<PreviewRegistry>>,
}

impl PreviewRef {
  pub fn uri(&self) -> String {
    format!("preview:{}", self.id)
  }

  pub fn is_live(&self) -> bool {
    self
      .store
      .upgrade()
      .map(|registry| lock(&registry).live.contains(&self.id))
      .unwrap_or(false)
  }

  /// 显式回收预览引用
  pub fn revoke(self) {
    drop(self)
  }
}

impl Drop for PreviewRef {
  fn drop(&mut self) {
    if let Some(registry) = self.store.upgrade()
      && lock(&registry).live.remove(&self.id)
    {
      debug!("回收预览引用 preview:{}", self.id);
    }
  }
}

/// 进入管线的图像载荷
#[derive(Debug)]
pub struct ImagePayload {
  name: String,
  mime: ImageMime,
  bytes: Vec<u8>,
  preview: PreviewRef,
}

impl ImagePayload {
  pub fn new(name: impl Into<String>, mime: ImageMime, bytes: Vec<u8>, preview: PreviewRef) -> Self {
    Self {
      name: name.into(),
      mime,
      bytes,
      preview,
    }
  }

  pub fn name(&self) -> &str {
    &self.name
  }

  pub fn mime(&self) -> ImageMime {
    self.mime
  }

  pub fn bytes(&self) -> &[u8] {
    &self.bytes
  }

  pub fn byte_len(&self) -> usize {
    self.bytes.len()
  }

  pub fn preview(&self) -> &PreviewRef {
    &self.preview
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn declared_types_outside_the_accepted_set_are_rejected() {
    assert_eq!(ImageMime::from_declared("image/jpeg"), Some(ImageMime::Jpeg));
    assert_eq!(ImageMime::from_declared("image/png"), Some(ImageMime::Png));
    assert_eq!(ImageMime::from_declared("image/gif"), Some(ImageMime::Gif));
    assert_eq!(ImageMime::from_declared("image/webp"), None);
    assert_eq!(ImageMime::from_declared("IMAGE/JPEG"), None);
    assert_eq!(ImageMime::from_declared(""), None);
  }

  #[test]
  fn dropping_a_payload_revokes_its_preview() {
    let store = PreviewStore::new();
    let first = ImagePayload::new("a.png", ImageMime::Png, vec![1, 2, 3], store.mint());
    let second = ImagePayload::new("b.png", ImageMime::Png, vec![4], store.mint());
    assert_eq!(store.live_count(), 2);
    assert_ne!(first.preview().uri(), second.preview().uri());

    drop(first);
    assert_eq!(store.live_count(), 1);
    assert!(second.preview().is_live());
  }

  #[test]
  fn explicit_revoke_releases_the_reference() {
    let store = PreviewStore::new();
    let preview = store.mint();
    assert!(store.is_live(&preview));
    preview.revoke();
    assert_eq!(store.live_count(), 0);
  }

  #[test]
  fn preview_outliving_its_store_reports_dead() {
    let preview = {
      let store = PreviewStore::new();
      store.mint()
    };
    assert!(!preview.is_live());
  }
}
