// 该文件是 Lvse （绿色分拣） 项目的一部分。
// src/model.rs - 检测模型
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

use std::sync::OnceLock;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};
use url::Url;

use crate::{FromUrl, input::ImageInput, progress::Progress};

/// 检测器输出的边框，像素坐标 [x_min, y_min, x_max, y_max]
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
  pub xmin: f32,
  pub ymin: f32,
  pub xmax: f32,
  pub ymax: f32,
}

/// 检测器原始输出的一项
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawDetection {
  pub label: String,
  pub score: f32,
  #[serde(rename = "box")]
  pub bbox: BoundingBox,
}

/// 左上角 + 宽高形式的区域，不做裁剪，退化边框的宽高可能为负
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Region {
  pub x: f32,
  pub y: f32,
  pub width: f32,
  pub height: f32,
}

impl From<BoundingBox> for Region {
  fn from(bbox: BoundingBox) -> Self {
    Region {
      x: bbox.xmin,
      y: bbox.ymin,
      width: bbox.xmax - bbox.xmin,
      height: bbox.ymax - bbox.ymin,
    }
  }
}

/// 流水线内部使用的检测结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
  pub label: String,
  pub confidence: f32,
  #[serde(rename = "box")]
  pub region: Region,
}

impl From<RawDetection> for Detection {
  fn from(raw: RawDetection) -> Self {
    Detection {
      label: raw.label,
      confidence: raw.score,
      region: raw.bbox.into(),
    }
  }
}

#[derive(Error, Debug)]
pub enum DetectorError {
  #[error("模型加载错误: {0}")]
  ModelLoad(String),
  #[error("不支持的输入或后端: {0}")]
  Unsupported(String),
  #[error("推理错误: {0}")]
  Inference(String),
  #[error("I/O 错误: {0}")]
  Io(#[from] std::io::Error),
  #[error("检测结果解析错误: {0}")]
  Json(#[from] serde_json::Error),
  #[error("URI 方案不匹配: {0}")]
  SchemeMismatch(String),
}

/// 目标检测器
///
/// 检测器是流水线中唯一耗时的步骤。实现可以通过 `progress` 报告真实进度，
/// 此时需要让 [`Detector::reports_progress`] 返回 `true`，流水线便不会再启动模拟进度。
pub trait Detector: Send + Sync {
  fn name(&self) -> &'static str;

  fn detect(
    &self,
    input: &ImageInput,
    progress: &dyn Progress,
  ) -> Result<Vec<RawDetection>, DetectorError>;

  fn reports_progress(&self) -> bool {
    false
  }
}

impl<D: Detector + ?Sized> Detector for &D {
  fn name(&self) -> &'static str {
    (**self).name()
  }

  fn detect(
    &self,
    input: &ImageInput,
    progress: &dyn Progress,
  ) -> Result<Vec<RawDetection>, DetectorError> {
    (**self).detect(input, progress)
  }

  fn reports_progress(&self) -> bool {
    (**self).reports_progress()
  }
}

mod fixture;
pub use self::fixture::FixtureDetector;

#[cfg(feature = "model_remote")]
mod remote;
#[cfg(feature = "model_remote")]
pub use self::remote::{RemoteDetector, RemoteDetectorBuilder};

#[cfg(feature = "model_detr")]
mod coco;
#[cfg(feature = "model_detr")]
mod detr;
#[cfg(feature = "model_detr")]
pub use self::detr::{DetrDetector, DetrDetectorBuilder};

/// 根据 URL 方案选择检测后端
pub enum DetectorWrapper {
  Fixture(FixtureDetector),
  #[cfg(feature = "model_remote")]
  Remote(RemoteDetector),
  #[cfg(feature = "model_detr")]
  Detr(DetrDetector),
}

impl FromUrl for DetectorWrapper {
  type Error = DetectorError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    DetectorWrapper::from_url_with(url, &DetectorSettings::default())
  }
}

/// 检测后端的可调参数，来自配置文件或命令行
#[derive(Debug, Clone)]
pub struct DetectorSettings {
  pub threshold: f32,
  pub token_env: Option<String>,
  pub timeout_secs: u64,
  pub input_size: u32,
}

impl Default for DetectorSettings {
  fn default() -> Self {
    Self {
      threshold: 0.9,
      token_env: None,
      timeout_secs: 60,
      input_size: 800,
    }
  }
}

impl DetectorWrapper {
  pub fn from_url_with(url: &Url, settings: &DetectorSettings) -> Result<Self, DetectorError> {
    use crate::FromUrlWithScheme;

    if url.scheme() == FixtureDetector::SCHEME {
      return Ok(DetectorWrapper::Fixture(FixtureDetector::from_url(url)?));
    }
    #[cfg(feature = "model_remote")]
    {
      if url.scheme() == "http" || url.scheme() == "https" {
        let detector = RemoteDetectorBuilder::from_url(url)?
          .token_env(settings.token_env.clone())
          .timeout_secs(settings.timeout_secs)
          .build()?;
        return Ok(DetectorWrapper::Remote(detector));
      }
    }
    #[cfg(feature = "model_detr")]
    {
      if url.scheme() == DetrDetectorBuilder::SCHEME {
        let detector = DetrDetectorBuilder::from_url(url)?
          .threshold(settings.threshold)
          .input_size(settings.input_size)
          .build()?;
        return Ok(DetectorWrapper::Detr(detector));
      }
    }
    let _ = settings;
    Err(DetectorError::SchemeMismatch(url.scheme().to_string()))
  }

  fn inner(&self) -> &dyn Detector {
    match self {
      DetectorWrapper::Fixture(detector) => detector,
      #[cfg(feature = "model_remote")]
      DetectorWrapper::Remote(detector) => detector,
      #[cfg(feature = "model_detr")]
      DetectorWrapper::Detr(detector) => detector,
    }
  }
}

impl Detector for DetectorWrapper {
  fn name(&self) -> &'static str {
    self.inner().name()
  }

  fn detect(
    &self,
    input: &ImageInput,
    progress: &dyn Progress,
  ) -> Result<Vec<RawDetection>, DetectorError> {
    self.inner().detect(input, progress)
  }

  fn reports_progress(&self) -> bool {
    self.inner().reports_progress()
  }
}

static SHARED_DETECTOR: OnceLock<(Url, DetectorWrapper)> = OnceLock::new();

/// 进程级共享检测器
///
/// 模型加载代价高，首次调用时按 `url` 初始化，之后所有调用复用同一个实例，
/// 进程退出前不会释放。初始化之后再传入不同的 `url` 只会给出警告。
pub fn shared_detector(
  url: &Url,
  settings: &DetectorSettings,
) -> Result<&'static DetectorWrapper, DetectorError> {
  if let Some((loaded, detector)) = SHARED_DETECTOR.get() {
    if loaded != url {
      warn!("共享检测器已从 {} 加载，忽略 {}", loaded, url);
    }
    return Ok(detector);
  }

  info!("初始化共享检测器: {}", url);
  let detector = DetectorWrapper::from_url_with(url, settings)?;
  // 并发初始化时只保留先写入的实例
  let (_, detector) = SHARED_DETECTOR.get_or_init(|| (url.clone(), detector));
  Ok(detector)
}
