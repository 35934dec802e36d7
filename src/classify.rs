// 该文件是 Lvse （绿色分拣） 项目的一部分。
// src/classify.rs - 可降解判定
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

use serde::{Deserialize, Serialize};

use crate::model::Detection;

/// 可降解物的关键词，全部小写
pub const BIODEGRADABLE_TERMS: [&str; 18] = [
  "apple",
  "banana",
  "orange",
  "carrot",
  "broccoli",
  "lettuce",
  "tomato",
  "food",
  "fruit",
  "vegetable",
  "bread",
  "paper",
  "cardboard",
  "wood",
  "leaves",
  "flowers",
  "plant",
  "organic",
];

/// 固定的关键词表
#[derive(Debug, Clone, Copy)]
pub struct Vocabulary {
  terms: &'static [&'static str],
}

/// 内置词表，进程内不可变
pub static VOCABULARY: Vocabulary = Vocabulary::new(&BIODEGRADABLE_TERMS);

impl Vocabulary {
  pub const fn new(terms: &'static [&'static str]) -> Self {
    Self { terms }
  }

  pub fn terms(&self) -> &'static [&'static str] {
    self.terms
  }

  /// 标签与任一词条互为子串即判定为可降解
  ///
  /// 空标签是任何字符串的子串，这里直接判定为不可降解。
  pub fn matches(&self, label: &str) -> bool {
    if label.is_empty() {
      return false;
    }

    let label = label.to_lowercase();
    self
      .terms
      .iter()
      .any(|term| label.contains(term) || term.contains(label.as_str()))
  }
}

pub fn classify(label: &str) -> bool {
  VOCABULARY.matches(label)
}

/// 带可降解判定的检测结果，创建后不再修改
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassifiedDetection {
  #[serde(flatten)]
  detection: Detection,
  #[serde(rename = "isBiodegradable")]
  biodegradable: bool,
}

impl ClassifiedDetection {
  pub fn classify(detection: Detection) -> Self {
    Self::with_vocabulary(detection, &VOCABULARY)
  }

  pub fn with_vocabulary(detection: Detection, vocabulary: &Vocabulary) -> Self {
    let biodegradable = vocabulary.matches(&detection.label);
    Self {
      detection,
      biodegradable,
    }
  }

  pub fn detection(&self) -> &Detection {
    &self.detection
  }

  pub fn label(&self) -> &str {
    &self.detection.label
  }

  pub fn confidence(&self) -> f32 {
    self.detection.confidence
  }

  /// 置信度百分比，四舍五入
  pub fn confidence_percent(&self) -> i64 {
    (self.detection.confidence as f64 * 100.0).round() as i64
  }

  pub fn is_biodegradable(&self) -> bool {
    self.biodegradable
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::model::Region;

  #[test]
  fn known_labels() {
    assert!(classify("apple"));
    assert!(!classify("plastic bottle"));
    assert!(classify("Banana Peel"));
    assert!(!classify("bottle"));
  }

  #[test]
  fn empty_label_is_not_biodegradable() {
    assert!(!classify(""));
  }

  #[test]
  fn containment_works_both_ways() {
    // 标签包含词条
    assert!(classify("red apple"));
    assert!(classify("cardboard box"));
    // 词条包含标签
    assert!(classify("app"));
    assert!(classify("leave"));
    assert!(!classify("plastic"));
  }

  #[test]
  fn verdict_is_deterministic() {
    for label in ["apple", "cell phone", "potted plant", "", "WOOD", "tv"] {
      assert_eq!(classify(label), classify(label));
    }
  }

  #[test]
  fn custom_vocabulary_is_respected() {
    static TERMS: [&str; 1] = ["glass"];
    let vocabulary = Vocabulary::new(&TERMS);
    assert!(vocabulary.matches("wine glass"));
    assert!(!vocabulary.matches("apple"));
  }

  #[test]
  fn classified_detection_serializes_flat() {
    let detection = Detection {
      label: "apple".to_string(),
      confidence: 0.92,
      region: Region {
        x: 10.0,
        y: 15.0,
        width: 30.0,
        height: 35.0,
      },
    };
    let classified = ClassifiedDetection::classify(detection);
    assert!(classified.is_biodegradable());
    assert_eq!(classified.confidence_percent(), 92);

    let value = serde_json::to_value(&classified).unwrap();
    assert_eq!(value["label"], "apple");
    assert_eq!(value["isBiodegradable"], true);
    assert_eq!(value["box"]["width"], 30.0);
  }
}
