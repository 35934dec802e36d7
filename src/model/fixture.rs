// 该文件是 Lvse （绿色分拣） 项目的一部分。
// src/model/fixture.rs - 录制的检测结果
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

use std::path::PathBuf;

use tracing::{debug, error};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme, url_to_path,
  input::ImageInput,
  model::{Detector, DetectorError, RawDetection},
  progress::Progress,
};

/// 从 JSON 文件读取预先录制的检测器输出
///
/// 每次检测都重新读取文件，与输入图像无关，用于离线演示和测试。
pub struct FixtureDetector {
  path: PathBuf,
}

impl FixtureDetector {
  pub fn new(path: impl Into<PathBuf>) -> Self {
    Self { path: path.into() }
  }
}

impl FromUrlWithScheme for FixtureDetector {
  const SCHEME: &'static str = "fixture";
}

impl FromUrl for FixtureDetector {
  type Error = DetectorError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      error!(
        "URI scheme mismatch: expected '{}', found '{}'",
        Self::SCHEME,
        url.scheme()
      );
      return Err(DetectorError::SchemeMismatch(url.scheme().to_string()));
    }

    Ok(FixtureDetector::new(url_to_path(url)))
  }
}

impl Detector for FixtureDetector {
  fn name(&self) -> &'static str {
    "fixture"
  }

  fn detect(
    &self,
    input: &ImageInput,
    _progress: &dyn Progress,
  ) -> Result<Vec<RawDetection>, DetectorError> {
    debug!(
      "读取录制的检测结果: {} (输入 {})",
      self.path.display(),
      input.source()
    );
    let data = std::fs::read_to_string(&self.path)?;
    let detections: Vec<RawDetection> = serde_json::from_str(&data)?;
    Ok(detections)
  }
}
