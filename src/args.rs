// 该文件是 AutoLens 项目的一部分。
// src/args.rs - 项目参数配置
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

use clap::Args;
use url::Url;

use crate::detection::{DetectionClient, DetectionError, Profile, resolve_endpoint};
use crate::input::{DEFAULT_MAX_UPLOAD_BYTES, UploadValidator};
use crate::normalize::{
  DEFAULT_JPEG_QUALITY, DEFAULT_MAX_DIMENSION, DEFAULT_RESIZE_THRESHOLD, ImageNormalizer,
  NormalizerConfig,
};
use crate::payload::PreviewStore;

fn parse_quality(value: &str) -> Result<f32, String> {
  let quality: f32 = value.parse().map_err(|e| format!("{}", e))?;
  if quality > 0.0 && quality <= 1.0 {
    Ok(quality)
  } else {
    Err(format!("质量需在 (0, 1] 范围内: {}", quality))
  }
}

/// 流水线公共参数，可由环境变量提供
#[derive(Args, Debug, Clone)]
pub struct PipelineArgs {
  /// 检测服务地址，指定后忽略 profile
  #[arg(long, env = "AUTOLENS_ENDPOINT", value_name = "URL")]
  pub endpoint: Option<String>,

  /// 部署环境
  #[arg(long, env = "AUTOLENS_PROFILE", value_enum, default_value_t = Profile::Development)]
  pub profile: Profile,

  /// production 环境下的后端地址
  #[arg(long, env = "BACKEND_URL", value_name = "URL")]
  pub backend_url: Option<String>,

  /// 上传文件大小上限（字节）
  #[arg(long, env = "AUTOLENS_MAX_UPLOAD_BYTES", default_value_t = DEFAULT_MAX_UPLOAD_BYTES)]
  pub max_upload_bytes: usize,

  /// 超过该字节数的图像会被缩放并重新编码
  #[arg(long, env = "AUTOLENS_RESIZE_THRESHOLD", default_value_t = DEFAULT_RESIZE_THRESHOLD)]
  pub resize_threshold: usize,

  /// 缩放后较长边的像素上限
  #[arg(
    long,
    env = "AUTOLENS_MAX_DIMENSION",
    default_value_t = DEFAULT_MAX_DIMENSION,
    value_parser = clap::value_parser!(u32).range(1..)
  )]
  pub max_dimension: u32,

  /// 重新编码的 JPEG 质量 (0.0 - 1.0)
  #[arg(long, env = "AUTOLENS_JPEG_QUALITY", default_value_t = DEFAULT_JPEG_QUALITY, value_parser = parse_quality)]
  pub jpeg_quality: f32,

  /// 检测请求超时（秒）
  #[arg(long, env = "AUTOLENS_TIMEOUT_SECS", default_value_t = 30)]
  pub timeout_secs: u64,
}

impl PipelineArgs {
  pub fn endpoint(&self) -> Result<Url, DetectionError> {
    resolve_endpoint(
      self.profile,
      self.backend_url.as_deref(),
      self.endpoint.as_deref(),
    )
  }

  pub fn detection_client(&self) -> Result<DetectionClient, DetectionError> {
    DetectionClient::new(self.endpoint()?, Duration::from_secs(self.timeout_secs))
  }

  pub fn upload_validator(&self, previews: PreviewStore) -> UploadValidator {
    UploadValidator::new(previews).with_max_bytes(self.max_upload_bytes)
  }

  pub fn normalizer(&self, previews: PreviewStore) -> ImageNormalizer {
    ImageNormalizer::new(
      NormalizerConfig {
        resize_threshold: self.resize_threshold,
        max_dimension: self.max_dimension,
        jpeg_quality: self.jpeg_quality,
      },
      previews,
    )
  }
}
