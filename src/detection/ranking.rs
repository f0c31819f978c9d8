// 该文件是 AutoLens 项目的一部分。
// src/detection/ranking.rs - 检测结果排序与置信度分级
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

use std::fmt;

use super::{Detection, DetectionBatch};

const HIGH_TIER_PERCENT: u32 = 90;
const MEDIUM_TIER_PERCENT: u32 = 70;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConfidenceTier {
  High,
  Medium,
  Low,
}

impl ConfidenceTier {
  pub fn from_percent(percent: u32) -> Self {
    if percent >= HIGH_TIER_PERCENT {
      ConfidenceTier::High
    } else if percent >= MEDIUM_TIER_PERCENT {
      ConfidenceTier::Medium
    } else {
      ConfidenceTier::Low
    }
  }

  pub fn as_str(&self) -> &'static str {
    match self {
      ConfidenceTier::High => "high",
      ConfidenceTier::Medium => "medium",
      ConfidenceTier::Low => "low",
    }
  }
}

impl fmt::Display for ConfidenceTier {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

/// 置信度转百分比，四舍五入（半数向上）
pub fn confidence_percent(confidence: f64) -> u32 {
  (confidence * 100.0 + 0.5).floor() as u32
}

/// 按置信度降序稳定排序，原批次不变
pub fn rank(batch: &DetectionBatch) -> DetectionBatch {
  let mut items = batch.items().to_vec();
  items.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));
  DetectionBatch::new(items)
}

#[derive(Debug, Clone, PartialEq)]
pub struct RankedDetection {
  pub detection: Detection,
  pub percent: u32,
  pub tier: ConfidenceTier,
}

impl From<Detection> for RankedDetection {
  fn from(detection: Detection) -> Self {
    let percent = confidence_percent(detection.confidence);
    RankedDetection {
      detection,
      percent,
      tier: ConfidenceTier::from_percent(percent),
    }
  }
}

/// 供展示使用的结果视图
#[derive(Debug, Clone, PartialEq)]
pub enum RankingView {
  /// 没有检测到任何物体
  Empty,
  Ranked(Vec<RankedDetection>),
}

impl RankingView {
  pub const EMPTY_TITLE: &'static str = "No objects detected";
  pub const EMPTY_HINT: &'static str =
    "Please try again with a different picture or adjust the angle/lighting for better results";

  pub fn len(&self) -> usize {
    match self {
      RankingView::Empty => 0,
      RankingView::Ranked(items) => items.len(),
    }
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }

  pub fn items(&self) -> &[RankedDetection] {
    match self {
      RankingView::Empty => &[],
      RankingView::Ranked(items) => items,
    }
  }

  /// 例如 `1 item detected`、`3 items detected`
  pub fn summary(&self) -> String {
    let count = self.len();
    format!(
      "{} {} detected",
      count,
      if count == 1 { "item" } else { "items" }
    )
  }
}

impl From<&DetectionBatch> for RankingView {
  fn from(batch: &DetectionBatch) -> Self {
    if batch.is_empty() {
      return RankingView::Empty;
    }
    let ranked = rank(batch);
    RankingView::Ranked(
      ranked
        .items()
        .iter()
        .cloned()
        .map(RankedDetection::from)
        .collect(),
    )
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn detection(label: &str, confidence: f64) -> Detection {
    Detection {
      bbox: [0.0, 0.0, 1.0, 1.0],
      label: label.to_string(),
      confidence,
    }
  }

  fn labels(batch: &DetectionBatch) -> Vec<&str> {
    batch.items().iter().map(|d| d.label.as_str()).collect()
  }

  #[test]
  fn sorts_descending_and_keeps_ties_in_input_order() {
    let batch = DetectionBatch::new(vec![
      detection("a", 0.5),
      detection("b", 0.9),
      detection("c", 0.5),
      detection("d", 0.95),
      detection("e", 0.5),
    ]);
    let ranked = rank(&batch);
    assert_eq!(labels(&ranked), vec!["d", "b", "a", "c", "e"]);
    // 原批次不被修改
    assert_eq!(labels(&batch), vec!["a", "b", "c", "d", "e"]);
  }

  #[test]
  fn ranking_is_idempotent() {
    let batch = DetectionBatch::new(vec![
      detection("x", 0.1),
      detection("y", 0.7),
      detection("z", 0.7),
      detection("w", 0.3),
    ]);
    let once = rank(&batch);
    assert_eq!(rank(&once), once);
  }

  #[test]
  fn percent_rounds_half_up() {
    assert_eq!(confidence_percent(0.0), 0);
    assert_eq!(confidence_percent(0.004), 0);
    assert_eq!(confidence_percent(0.005), 1);
    assert_eq!(confidence_percent(0.5), 50);
    assert_eq!(confidence_percent(0.895), 90);
    assert_eq!(confidence_percent(0.93), 93);
    assert_eq!(confidence_percent(1.0), 100);
  }

  #[test]
  fn tiers_use_the_rounded_percent() {
    assert_eq!(ConfidenceTier::from_percent(100), ConfidenceTier::High);
    assert_eq!(ConfidenceTier::from_percent(90), ConfidenceTier::High);
    assert_eq!(ConfidenceTier::from_percent(89), ConfidenceTier::Medium);
    assert_eq!(ConfidenceTier::from_percent(70), ConfidenceTier::Medium);
    assert_eq!(ConfidenceTier::from_percent(69), ConfidenceTier::Low);
    assert_eq!(ConfidenceTier::from_percent(0), ConfidenceTier::Low);

    // 0.896 四舍五入为 90，归入 high
    assert_eq!(RankedDetection::from(detection("p", 0.896)).tier, ConfidenceTier::High);
    assert_eq!(RankedDetection::from(detection("q", 0.694)).tier, ConfidenceTier::Low);
    assert_eq!(RankedDetection::from(detection("r", 0.695)).tier, ConfidenceTier::Medium);
  }

  #[test]
  fn tier_matches_percent_across_the_unit_interval() {
    for step in 0..=1000 {
      let confidence = step as f64 / 1000.0;
      let ranked = RankedDetection::from(detection("s", confidence));
      assert_eq!(ranked.percent, (confidence * 100.0 + 0.5).floor() as u32);
      let expected = if ranked.percent >= 90 {
        ConfidenceTier::High
      } else if ranked.percent >= 70 {
        ConfidenceTier::Medium
      } else {
        ConfidenceTier::Low
      };
      assert_eq!(ranked.tier, expected);
    }
  }

  #[test]
  fn empty_batch_is_the_canonical_empty_view() {
    let view = RankingView::from(&DetectionBatch::default());
    assert_eq!(view, RankingView::Empty);
    assert!(view.items().is_empty());
    assert_eq!(view.summary(), "0 items detected");
  }

  #[test]
  fn view_carries_percent_and_tier() {
    let batch = DetectionBatch::new(vec![detection("bumper", 0.71), detection("headlight", 0.93)]);
    let view = RankingView::from(&batch);
    assert_eq!(view.summary(), "2 items detected");
    let items = view.items();
    assert_eq!(items[0].detection.label, "headlight");
    assert_eq!((items[0].percent, items[0].tier), (93, ConfidenceTier::High));
    assert_eq!((items[1].percent, items[1].tier), (71, ConfidenceTier::Medium));
  }
}
