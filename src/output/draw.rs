// 该文件是 AutoLens 项目的一部分。
// src/output/draw.rs - 检测结果可视化
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

use ab_glyph::{FontVec, PxScale};
use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_filled_rect_mut, draw_hollow_rect_mut, draw_text_mut};
use imageproc::rect::Rect;

use crate::detection::{ConfidenceTier, RankedDetection, RankingView};

// 文本渲染常量
const LABEL_FONT_SIZE: f32 = 20.0;
const LABEL_TEXT_HEIGHT: i32 = 24;
const LABEL_CHAR_WIDTH: f32 = 11.0; // 每字符平均宽度（粗略估计）
const LABEL_TEXT_VERTICAL_PADDING: i32 = 2;
const BOX_THICKNESS: i32 = 2;

pub fn tier_color(tier: ConfidenceTier) -> Rgb<u8> {
  match tier {
    ConfidenceTier::High => Rgb([34, 197, 94]),    // 绿
    ConfidenceTier::Medium => Rgb([59, 130, 246]), // 蓝
    ConfidenceTier::Low => Rgb([245, 158, 11]),    // 琥珀
  }
}

pub struct Draw {
  font_size: f32,
  label_text_height: i32,
  label_char_width: f32,
  font: Option<FontVec>,
}

impl Default for Draw {
  fn default() -> Self {
    Self {
      font_size: LABEL_FONT_SIZE,
      label_text_height: LABEL_TEXT_HEIGHT,
      label_char_width: LABEL_CHAR_WIDTH,
      font: None,
    }
  }
}

impl Draw {
  /// 从字体文件加载标签字体；不提供字体时只画框
  pub fn with_font_file(path: impl AsRef<Path>) -> Result<Self, DrawError> {
    let data = std::fs::read(path.as_ref())?;
    let font = FontVec::try_from_vec(data).map_err(|_| DrawError::InvalidFont)?;
    Ok(Self {
      font: Some(font),
      ..Self::default()
    })
  }

  pub fn has_font(&self) -> bool {
    self.font.is_some()
  }

  // bbox 为像素坐标 [x1, y1, x2, y2]
  fn draw_bbox_with_label(&self, image: &mut RgbImage, item: &RankedDetection) {
    let (w, h) = (image.width() as i32, image.height() as i32);
    if w == 0 || h == 0 {
      return;
    }
    let bbox = item.detection.bbox;

    let x_min = (bbox[0].min(bbox[2]).floor() as i32).clamp(0, w - 1);
    let y_min = (bbox[1].min(bbox[3]).floor() as i32).clamp(0, h - 1);
    let x_max = (bbox[0].max(bbox[2]).ceil() as i32).clamp(0, w - 1);
    let y_max = (bbox[1].max(bbox[3]).ceil() as i32).clamp(0, h - 1);

    if x_min >= x_max || y_min >= y_max {
      return;
    }

    let color = tier_color(item.tier);
    for thickness in 0..BOX_THICKNESS {
      let width = x_max - x_min + 1 - 2 * thickness;
      let height = y_max - y_min + 1 - 2 * thickness;
      if width <= 0 || height <= 0 {
        break;
      }
      let rect = Rect::at(x_min + thickness, y_min + thickness).of_size(width as u32, height as u32);
      draw_hollow_rect_mut(image, rect, color);
    }

    let Some(font) = self.font.as_ref() else {
      return;
    };

    let label = format!("{} {}%", item.detection.label, item.percent);
    let text_width = (label.chars().count() as f32 * self.label_char_width) as i32;
    let label_x = x_min;
    let label_y = (y_min - self.label_text_height).max(0);
    let label_width = text_width.min(w - label_x).max(0) as u32;

    if label_width > 0 {
      let rect = Rect::at(label_x, label_y).of_size(label_width, self.label_text_height as u32);
      draw_filled_rect_mut(image, rect, color);
      draw_text_mut(
        image,
        Rgb([255u8, 255u8, 255u8]),
        label_x,
        label_y + LABEL_TEXT_VERTICAL_PADDING,
        PxScale::from(self.font_size),
        font,
        &label,
      );
    }
  }

  /// 按排序后的顺序绘制，置信度最高的画在最上层
  pub fn draw_detections_on_image(&self, image: &mut RgbImage, view: &RankingView) {
    for item in view.items().iter().rev() {
      self.draw_bbox_with_label(image, item);
    }
  }
}

#[derive(thiserror::Error, Debug)]
pub enum DrawError {
  #[error("读取字体失败: {0}")]
  IoError(#[from] std::io::Error),
  #[error("无效的字体文件")]
  InvalidFont,
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::detection::{Detection, DetectionBatch};

  fn view(items: Vec<([f64; 4], f64)>) -> RankingView {
    let batch: DetectionBatch = items
      .into_iter()
      .map(|(bbox, confidence)| Detection {
        bbox,
        label: "part".into(),
        confidence,
      })
      .collect();
    RankingView::from(&batch)
  }

  #[test]
  fn boxes_use_tier_colours_in_pixel_space() {
    let mut image = RgbImage::new(100, 80);
    let draw = Draw::default();
    draw.draw_detections_on_image(
      &mut image,
      &view(vec![([10.0, 10.0, 40.0, 30.0], 0.95), ([50.0, 40.0, 90.0, 70.0], 0.4)]),
    );

    assert_eq!(*image.get_pixel(10, 10), tier_color(ConfidenceTier::High));
    assert_eq!(*image.get_pixel(40, 30), tier_color(ConfidenceTier::High));
    assert_eq!(*image.get_pixel(11, 20), tier_color(ConfidenceTier::High));
    assert_eq!(*image.get_pixel(25, 20), Rgb([0, 0, 0]));
    assert_eq!(*image.get_pixel(50, 55), tier_color(ConfidenceTier::Low));
  }

  #[test]
  fn boxes_outside_the_image_are_clamped_or_skipped() {
    let mut image = RgbImage::new(20, 20);
    let draw = Draw::default();
    draw.draw_detections_on_image(
      &mut image,
      &view(vec![([-5.0, -5.0, 100.0, 100.0], 0.75), ([30.0, 30.0, 40.0, 40.0], 0.8)]),
    );
    assert_eq!(*image.get_pixel(0, 0), tier_color(ConfidenceTier::Medium));
    assert_eq!(*image.get_pixel(19, 19), tier_color(ConfidenceTier::Medium));
    assert_eq!(*image.get_pixel(10, 10), Rgb([0, 0, 0]));
  }

  #[test]
  fn missing_font_file_is_an_error() {
    assert!(matches!(
      Draw::with_font_file("/nonexistent/autolens/font.ttf"),
      Err(DrawError::IoError(_))
    ));
  }
}
