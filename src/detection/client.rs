// 该文件是 AutoLens 项目的一部分。
// src/detection/client.rs - 检测服务 HTTP 客户端
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

use std::time::Duration;

use reqwest::blocking::{Client, multipart};
use thiserror::Error;
use tracing::{debug, info, warn};
use url::Url;

use super::{DetectionBatch, DetectionService};
use crate::FromUrl;
use crate::payload::ImagePayload;

pub const DEVELOPMENT_ENDPOINT: &str = "http://127.0.0.1:8000/api/detect";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
const FILE_FIELD: &str = "image_file";

#[derive(Error, Debug)]
pub enum DetectionError {
  #[error("无效的检测服务地址: {0}")]
  InvalidEndpoint(String),
  #[error("不支持的协议: {0}")]
  UnsupportedScheme(String),
  #[error("production 环境需要设置 BACKEND_URL")]
  MissingBackendUrl,
  #[error("HTTP 客户端初始化失败: {0}")]
  Client(#[source] reqwest::Error),
  #[error("请求发送失败: {0}")]
  Transport(#[source] reqwest::Error),
  #[error("检测服务返回状态码 {0}")]
  Status(u16),
  #[error("响应解析失败: {0}")]
  Decode(#[from] serde_json::Error),
}

/// 部署环境，决定默认的检测服务地址
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum Profile {
  #[default]
  Development,
  Production,
}

/// 解析检测服务地址
///
/// 显式地址优先；否则 development 指向本地开发服务器，
/// production 使用 `<BACKEND_URL>/detect`。
pub fn resolve_endpoint(
  profile: Profile,
  backend_url: Option<&str>,
  explicit: Option<&str>,
) -> Result<Url, DetectionError> {
  let raw = match (explicit, profile) {
    (Some(endpoint), _) => endpoint.to_string(),
    (None, Profile::Development) => DEVELOPMENT_ENDPOINT.to_string(),
    (None, Profile::Production) => {
      let backend = backend_url
        .filter(|backend| !backend.trim().is_empty())
        .ok_or(DetectionError::MissingBackendUrl)?;
      format!("{}/detect", backend.trim().trim_end_matches('/'))
    }
  };
  Url::parse(&raw).map_err(|e| DetectionError::InvalidEndpoint(format!("{}: {}", raw, e)))
}

pub struct DetectionClient {
  endpoint: Url,
  client: Client,
}

impl DetectionClient {
  pub fn new(endpoint: Url, timeout: Duration) -> Result<Self, DetectionError> {
    match endpoint.scheme() {
      "http" | "https" => {}
      other => return Err(DetectionError::UnsupportedScheme(other.to_string())),
    }
    let client = Client::builder()
      .timeout(timeout)
      .build()
      .map_err(DetectionError::Client)?;
    info!("检测服务地址: {}，超时 {:?}", endpoint, timeout);
    Ok(Self { endpoint, client })
  }

  pub fn endpoint(&self) -> &Url {
    &self.endpoint
  }
}

impl FromUrl for DetectionClient {
  type Error = DetectionError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    Self::new(url.clone(), DEFAULT_TIMEOUT)
  }
}

impl DetectionService for DetectionClient {
  type Error = DetectionError;

  fn detect(&self, payload: &ImagePayload) -> Result<DetectionBatch, Self::Error> {
    let part = multipart::Part::bytes(payload.bytes().to_vec())
      .file_name(payload.name().to_string())
      .mime_str(payload.mime().as_str())
      .map_err(DetectionError::Client)?;
    let form = multipart::Form::new().part(FILE_FIELD, part);

    debug!(
      "提交 {} ({}, {} 字节) 到 {}",
      payload.name(),
      payload.mime(),
      payload.byte_len(),
      self.endpoint
    );
    let response = self
      .client
      .post(self.endpoint.clone())
      .multipart(form)
      .send()
      .map_err(DetectionError::Transport)?;

    let status = response.status();
    if !status.is_success() {
      warn!("检测服务返回错误状态: {}", status);
      return Err(DetectionError::Status(status.as_u16()));
    }

    let body = response.bytes().map_err(DetectionError::Transport)?;
    let batch: DetectionBatch = serde_json::from_slice(&body)?;
    info!("检测完成，共 {} 个结果", batch.len());
    Ok(batch)
  }
}
