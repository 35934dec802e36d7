// 该文件是 Lvse （绿色分拣） 项目的一部分。
// src/summary.rs - 结果汇总
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

use serde::{Deserialize, Serialize};

use crate::classify::ClassifiedDetection;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Grade {
  A,
  B,
  C,
}

impl Grade {
  /// 阈值为严格大于，恰好 60 / 40 落入较低等级
  pub fn from_percentage(percentage: f64) -> Self {
    if percentage > 60.0 {
      Grade::A
    } else if percentage > 40.0 {
      Grade::B
    } else {
      Grade::C
    }
  }
}

impl fmt::Display for Grade {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let grade = match self {
      Grade::A => "A",
      Grade::B => "B",
      Grade::C => "C",
    };
    f.write_str(grade)
  }
}

/// 一次分析的汇总
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisSummary {
  pub total: usize,
  pub biodegradable: usize,
  pub non_biodegradable: usize,
  pub biodegradable_percentage: f64,
  pub grade: Grade,
}

impl AnalysisSummary {
  /// 没有检测结果时为 0，而不是 100
  pub fn non_biodegradable_percentage(&self) -> f64 {
    if self.total == 0 {
      0.0
    } else {
      100.0 - self.biodegradable_percentage
    }
  }

  /// 饼图数据
  pub fn breakdown(&self) -> [BreakdownSlice; 2] {
    [
      BreakdownSlice {
        biodegradable: true,
        count: self.biodegradable,
        percentage: self.biodegradable_percentage,
      },
      BreakdownSlice {
        biodegradable: false,
        count: self.non_biodegradable,
        percentage: self.non_biodegradable_percentage(),
      },
    ]
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct BreakdownSlice {
  pub biodegradable: bool,
  pub count: usize,
  pub percentage: f64,
}

/// 柱状图数据，每个检测结果一项
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConfidenceBar {
  pub label: String,
  pub confidence: i64,
  pub biodegradable: bool,
}

pub fn summarize(detections: &[ClassifiedDetection]) -> AnalysisSummary {
  let total = detections.len();
  let biodegradable = detections.iter().filter(|d| d.is_biodegradable()).count();
  let biodegradable_percentage = if total == 0 {
    0.0
  } else {
    // 先乘后除，整百分比不会产生舍入误差
    biodegradable as f64 * 100.0 / total as f64
  };

  AnalysisSummary {
    total,
    biodegradable,
    non_biodegradable: total - biodegradable,
    biodegradable_percentage,
    grade: Grade::from_percentage(biodegradable_percentage),
  }
}

pub fn confidence_chart(detections: &[ClassifiedDetection]) -> Vec<ConfidenceBar> {
  detections
    .iter()
    .map(|d| ConfidenceBar {
      label: d.label().to_string(),
      confidence: d.confidence_percent(),
      biodegradable: d.is_biodegradable(),
    })
    .collect()
}
