// 该文件是 Lvse （绿色分拣） 项目的一部分。
// src/report.rs - 分析报告
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

use std::{fmt::Write, path::Path};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::{
  classify::ClassifiedDetection,
  summary::{AnalysisSummary, ConfidenceBar, confidence_chart},
  task::AnalysisOutcome,
};

const BIODEGRADABLE_DISPOSAL: [&str; 4] = [
  "Compost bin or backyard composting",
  "Municipal organic waste collection",
  "Food waste recycling programs",
  "Worm composting (vermicomposting)",
];

const NON_BIODEGRADABLE_DISPOSAL: [&str; 4] = [
  "Clean and place in recycling bin",
  "Check local recycling guidelines",
  "Take to specialized recycling centers",
  "Reduce usage and reuse when possible",
];

pub const ECO_TIPS: [&str; 4] = [
  "Consider using reusable alternatives to reduce non-biodegradable waste",
  "Start a home compost for organic materials",
  "Check your local recycling guidelines for proper sorting",
  "Reduce single-use items to minimize environmental impact",
];

const CHART_WIDTH: usize = 30;

pub fn disposal_methods(biodegradable: bool) -> &'static [&'static str] {
  if biodegradable {
    &BIODEGRADABLE_DISPOSAL
  } else {
    &NON_BIODEGRADABLE_DISPOSAL
  }
}

#[derive(Error, Debug)]
pub enum ReportError {
  #[error("I/O 错误: {0}")]
  Io(#[from] std::io::Error),
  #[error("报告格式错误: {0}")]
  Json(#[from] serde_json::Error),
}

/// 分析报告，可保存后在结果页只读展示
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisReport {
  pub source: Option<String>,
  pub generated_at: DateTime<Utc>,
  pub analysis_time_ms: Option<u64>,
  pub detections: Vec<ClassifiedDetection>,
  pub summary: AnalysisSummary,
}

impl AnalysisReport {
  pub fn from_outcome(outcome: &AnalysisOutcome) -> Self {
    Self {
      source: Some(outcome.source.clone()),
      generated_at: Utc::now(),
      analysis_time_ms: Some(outcome.elapsed.as_millis() as u64),
      detections: outcome.detections.clone(),
      summary: outcome.summary.clone(),
    }
  }

  /// 读取已有报告，汇总沿用文件中的值，不重新计算
  pub fn load(path: &Path) -> Result<Self, ReportError> {
    let data = std::fs::read_to_string(path)?;
    let report = serde_json::from_str(&data)?;
    debug!("读取报告: {}", path.display());
    Ok(report)
  }

  pub fn save(&self, path: &Path) -> Result<(), ReportError> {
    if let Some(parent) = path.parent()
      && !parent.as_os_str().is_empty()
    {
      std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, serde_json::to_string_pretty(self)?)?;
    Ok(())
  }

  pub fn biodegradable(&self) -> impl Iterator<Item = &ClassifiedDetection> {
    self.detections.iter().filter(|d| d.is_biodegradable())
  }

  pub fn non_biodegradable(&self) -> impl Iterator<Item = &ClassifiedDetection> {
    self.detections.iter().filter(|d| !d.is_biodegradable())
  }

  pub fn confidence_chart(&self) -> Vec<ConfidenceBar> {
    confidence_chart(&self.detections)
  }

  /// 只返回本次结果中出现的类别的处理建议
  pub fn disposal_guidance(&self) -> Vec<(bool, &'static [&'static str])> {
    let mut guidance = Vec::new();
    if self.summary.biodegradable > 0 {
      guidance.push((true, disposal_methods(true)));
    }
    if self.summary.non_biodegradable > 0 {
      guidance.push((false, disposal_methods(false)));
    }
    guidance
  }

  /// 终端展示用的文本报告
  pub fn to_text(&self) -> String {
    let mut text = String::new();
    // 写入 String 不会失败
    let _ = self.write_text(&mut text);
    text
  }

  fn write_text(&self, text: &mut String) -> std::fmt::Result {
    let summary = &self.summary;
    writeln!(text, "Waste Analysis Results")?;
    writeln!(text, "======================")?;
    if let Some(source) = &self.source {
      writeln!(text, "Image: {}", source)?;
    }
    if let Some(ms) = self.analysis_time_ms {
      writeln!(text, "Analysis time: {:.1}s", ms as f64 / 1000.0)?;
    }
    writeln!(text)?;

    writeln!(text, "Total items:        {}", summary.total)?;
    writeln!(
      text,
      "Biodegradable:      {} ({:.1}% of total)",
      summary.biodegradable, summary.biodegradable_percentage
    )?;
    writeln!(
      text,
      "Non-biodegradable:  {} ({:.1}% of total)",
      summary.non_biodegradable,
      summary.non_biodegradable_percentage()
    )?;
    writeln!(text, "Eco score:          {}", summary.grade)?;
    writeln!(text)?;

    writeln!(text, "Biodegradable ({})", summary.biodegradable)?;
    for item in self.biodegradable() {
      writeln!(text, "  + {:<24} {:>3}%", item.label(), item.confidence_percent())?;
    }
    writeln!(text, "Non-biodegradable ({})", summary.non_biodegradable)?;
    for item in self.non_biodegradable() {
      writeln!(text, "  - {:<24} {:>3}%", item.label(), item.confidence_percent())?;
    }

    let chart = self.confidence_chart();
    if !chart.is_empty() {
      writeln!(text)?;
      writeln!(text, "Detection confidence")?;
      for bar in chart {
        let filled = (bar.confidence.clamp(0, 100) as usize * CHART_WIDTH) / 100;
        let mark = if bar.biodegradable { "#" } else { "x" };
        writeln!(
          text,
          "  {:<24} {}{} {:>3}%",
          bar.label,
          mark.repeat(filled),
          " ".repeat(CHART_WIDTH - filled),
          bar.confidence
        )?;
      }
    }

    let guidance = self.disposal_guidance();
    if !guidance.is_empty() {
      writeln!(text)?;
      writeln!(text, "Disposal guide")?;
      for (biodegradable, methods) in guidance {
        writeln!(
          text,
          "  {}",
          if biodegradable {
            "Biodegradable items"
          } else {
            "Non-biodegradable items"
          }
        )?;
        for method in methods {
          writeln!(text, "    * {}", method)?;
        }
      }
    }

    writeln!(text)?;
    writeln!(text, "Eco tips")?;
    for tip in ECO_TIPS {
      writeln!(text, "  * {}", tip)?;
    }
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::{
    model::{Detection, Region},
    summary::{Grade, summarize},
  };

  fn report(labels: &[(&str, f32)]) -> AnalysisReport {
    let detections: Vec<ClassifiedDetection> = labels
      .iter()
      .map(|(label, confidence)| {
        ClassifiedDetection::classify(Detection {
          label: label.to_string(),
          confidence: *confidence,
          region: Region {
            x: 0.0,
            y: 0.0,
            width: 10.0,
            height: 10.0,
          },
        })
      })
      .collect();
    let summary = summarize(&detections);
    AnalysisReport {
      source: Some("demo.jpg".to_string()),
      generated_at: Utc::now(),
      analysis_time_ms: Some(2300),
      detections,
      summary,
    }
  }

  #[test]
  fn saved_report_is_shown_without_recomputing() {
    let mut saved = report(&[("apple", 0.92), ("bottle", 0.88)]);
    // 保存的汇总即使与明细不一致，也按原样展示
    saved.summary.grade = Grade::A;

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested").join("report.json");
    saved.save(&path).unwrap();

    let loaded = AnalysisReport::load(&path).unwrap();
    assert_eq!(loaded.summary.grade, Grade::A);
    assert_eq!(loaded.detections.len(), 2);
    assert!(loaded.detections[0].is_biodegradable());
    assert!(loaded.to_text().contains("Eco score:          A"));
  }

  #[test]
  fn guidance_only_for_present_classes() {
    let only_bio = report(&[("banana", 0.95), ("orange peel", 0.89)]);
    assert_eq!(only_bio.disposal_guidance(), vec![(true, disposal_methods(true))]);

    let mixed = report(&[("banana", 0.95), ("plastic bag", 0.83)]);
    assert_eq!(mixed.disposal_guidance().len(), 2);

    let empty = report(&[]);
    assert!(empty.disposal_guidance().is_empty());
  }

  #[test]
  fn text_report_lists_items_and_percentages() {
    let text = report(&[
      ("apple", 0.92),
      ("bottle", 0.88),
      ("banana", 0.95),
      ("plastic bag", 0.83),
      ("orange peel", 0.89),
    ])
    .to_text();

    assert!(text.contains("Image: demo.jpg"));
    assert!(text.contains("Analysis time: 2.3s"));
    assert!(text.contains("(60.0% of total)"));
    assert!(text.contains("(40.0% of total)"));
    assert!(text.contains("Eco score:          B"));
    assert!(text.contains("plastic bag"));
    assert!(text.contains("92%"));
    assert!(text.contains("Compost bin or backyard composting"));
    assert!(text.contains("Take to specialized recycling centers"));
    assert!(text.contains(ECO_TIPS[1]));
  }

  #[test]
  fn empty_report_has_zero_percentages() {
    let text = report(&[]).to_text();
    assert!(text.contains("Total items:        0"));
    assert!(text.contains("0 (0.0% of total)"));
    assert!(text.contains("Eco score:          C"));
    assert!(!text.contains("Disposal guide"));
  }
}
