// 该文件是 AutoLens 项目的一部分。
// src/output/console.rs - 控制台结果报告
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

use std::fmt::Write as _;
use std::io::Write;

use thiserror::Error;
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  detection::{RankedDetection, RankingView},
  output::Render,
  payload::ImagePayload,
  pipeline::ViewState,
};

const BAR_WIDTH: usize = 20;

#[derive(Error, Debug)]
pub enum ConsoleOutputError {
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("URI 方案不匹配: {0}")]
  SchemeMismatch(String),
}

/// 把结果以文本形式打印到标准输出
#[derive(Debug)]
pub struct ConsoleOutput {
  // `console:?bar=false` 关闭进度条
  bar: bool,
}

impl Default for ConsoleOutput {
  fn default() -> Self {
    Self { bar: true }
  }
}

impl FromUrlWithScheme for ConsoleOutput {
  const SCHEME: &'static str = "console";
}

impl FromUrl for ConsoleOutput {
  type Error = ConsoleOutputError;

  fn from_url(uri: &Url) -> Result<Self, Self::Error> {
    if uri.scheme() != Self::SCHEME {
      return Err(ConsoleOutputError::SchemeMismatch(format!(
        "期望输出方式 '{}', 实际输出方式 '{}'",
        Self::SCHEME,
        uri.scheme()
      )));
    }

    let bar = !uri
      .query_pairs()
      .any(|(k, v)| k == "bar" && (v == "false" || v == "0"));
    Ok(ConsoleOutput { bar })
  }
}

fn percent_bar(percent: u32) -> String {
  let filled = (percent.min(100) as usize * BAR_WIDTH + 50) / 100;
  let mut bar = String::with_capacity(BAR_WIDTH * 3 + 2);
  bar.push('[');
  bar.extend(std::iter::repeat_n('█', filled));
  bar.extend(std::iter::repeat_n('░', BAR_WIDTH - filled));
  bar.push(']');
  bar
}

impl ConsoleOutput {
  fn write_item(&self, report: &mut String, rank: usize, item: &RankedDetection) {
    let _ = write!(report, "{:>3}. {:<16}", rank, item.detection.label);
    if self.bar {
      let _ = write!(report, " {}", percent_bar(item.percent));
    }
    let _ = writeln!(report, " {:>3}% {}", item.percent, item.tier);
  }

  /// 生成报告文本
  pub fn report(&self, frame: &ImagePayload, state: &ViewState) -> String {
    let mut report = String::new();
    match state {
      ViewState::Idle => {}
      ViewState::Previewing => {
        let _ = writeln!(
          report,
          "{} ({}, {} bytes)",
          frame.name(),
          frame.mime(),
          frame.byte_len()
        );
      }
      ViewState::Submitting => {
        let _ = writeln!(report, "Detecting objects in {}...", frame.name());
      }
      ViewState::Results(RankingView::Empty) => {
        let _ = writeln!(report, "{}", RankingView::EMPTY_TITLE);
        let _ = writeln!(report, "{}", RankingView::EMPTY_HINT);
      }
      ViewState::Results(view) => {
        let _ = writeln!(report, "{}", view.summary());
        for (index, item) in view.items().iter().enumerate() {
          self.write_item(&mut report, index + 1, item);
        }
      }
      ViewState::Error(message) => {
        let _ = writeln!(report, "{}", message);
      }
    }
    report
  }
}

impl Render<ImagePayload, ViewState> for ConsoleOutput {
  type Error = ConsoleOutputError;

  fn render_result(&self, frame: &ImagePayload, result: &ViewState) -> Result<(), Self::Error> {
    let report = self.report(frame, result);
    if report.is_empty() {
      return Ok(());
    }
    let mut stdout = std::io::stdout().lock();
    stdout.write_all(report.as_bytes())?;
    stdout.flush()?;
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::detection::{Detection, DetectionBatch};
  use crate::payload::{ImageMime, PreviewStore};

  fn results(items: Vec<(&str, f64)>) -> ViewState {
    let batch: DetectionBatch = items
      .into_iter()
      .map(|(label, confidence)| Detection {
        bbox: [0.0, 0.0, 10.0, 10.0],
        label: label.to_string(),
        confidence,
      })
      .collect();
    ViewState::Results(RankingView::from(&batch))
  }

  #[test]
  fn bar_fills_in_proportion() {
    assert_eq!(percent_bar(0), format!("[{}]", "░".repeat(20)));
    assert_eq!(percent_bar(100), format!("[{}]", "█".repeat(20)));
    assert_eq!(
      percent_bar(93),
      format!("[{}{}]", "█".repeat(19), "░".repeat(1))
    );
  }

  #[test]
  fn report_lists_ranked_items() {
    let store = PreviewStore::new();
    let frame = ImagePayload::new("car.jpg", ImageMime::Jpeg, vec![0; 4], store.mint());
    let output = ConsoleOutput::from_url(&Url::parse("console:?bar=false").unwrap()).unwrap();

    let report = output.report(&frame, &results(vec![("wheel", 0.5), ("headlight", 0.93)]));
    let lines: Vec<&str> = report.lines().collect();
    assert_eq!(lines[0], "2 items detected");
    assert!(lines[1].contains("headlight"));
    assert!(lines[1].ends_with(" 93% high"));
    assert!(lines[2].contains("wheel"));
    assert!(lines[2].ends_with(" 50% low"));
  }

  #[test]
  fn empty_results_show_the_hint() {
    let store = PreviewStore::new();
    let frame = ImagePayload::new("wall.png", ImageMime::Png, vec![0; 4], store.mint());
    let report = ConsoleOutput::default().report(&frame, &results(Vec::new()));
    assert_eq!(
      report,
      format!("{}\n{}\n", RankingView::EMPTY_TITLE, RankingView::EMPTY_HINT)
    );
    assert!(ConsoleOutput::default().report(&frame, &ViewState::Idle).is_empty());
  }
}
