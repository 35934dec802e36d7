// 该文件是 Lvse （绿色分拣） 项目的一部分。
// src/config.rs - 配置文件
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

use std::{
  path::{Path, PathBuf},
  time::Duration,
};

use serde::Deserialize;
use thiserror::Error;
use tracing::debug;
use url::Url;

use crate::{model::DetectorSettings, progress::SimulatedSettings};

const DEFAULT_FONT_SIZE: f32 = 16.0;

#[derive(Error, Debug)]
pub enum ConfigError {
  #[error("读取配置文件 {0} 失败: {1}")]
  Io(PathBuf, std::io::Error),
  #[error("配置文件格式错误: {0}")]
  Toml(#[from] toml::de::Error),
  #[error("检测器地址无效: {0}")]
  InvalidUrl(#[from] url::ParseError),
  #[error("配置值无效: {0}")]
  Invalid(String),
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct ConfigFile {
  detector: Option<DetectorConfigFile>,
  render: Option<RenderConfigFile>,
  progress: Option<ProgressConfigFile>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct DetectorConfigFile {
  url: Option<String>,
  threshold: Option<f32>,
  token_env: Option<String>,
  timeout_secs: Option<u64>,
  input_size: Option<u32>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct RenderConfigFile {
  font: Option<PathBuf>,
  font_size: Option<f32>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct ProgressConfigFile {
  simulated: Option<bool>,
  interval_ms: Option<u64>,
}

/// 合并后的运行配置
#[derive(Debug, Clone)]
pub struct AppConfig {
  pub detector_url: Option<Url>,
  pub detector: DetectorSettings,
  pub font: Option<PathBuf>,
  pub font_size: f32,
  pub simulated_progress: Option<SimulatedSettings>,
}

impl Default for AppConfig {
  fn default() -> Self {
    Self {
      detector_url: None,
      detector: DetectorSettings::default(),
      font: None,
      font_size: DEFAULT_FONT_SIZE,
      simulated_progress: Some(SimulatedSettings::default()),
    }
  }
}

impl AppConfig {
  /// 未指定文件时使用默认配置
  pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
    match path {
      Some(path) => {
        let data =
          std::fs::read_to_string(path).map_err(|e| ConfigError::Io(path.to_path_buf(), e))?;
        debug!("读取配置文件: {}", path.display());
        Self::from_toml(&data)
      }
      None => Ok(Self::default()),
    }
  }

  pub fn from_toml(data: &str) -> Result<Self, ConfigError> {
    let file: ConfigFile = toml::from_str(data)?;
    let mut config = Self::default();

    if let Some(detector) = file.detector {
      if let Some(url) = detector.url {
        config.detector_url = Some(Url::parse(&url)?);
      }
      if let Some(threshold) = detector.threshold {
        config.set_threshold(threshold)?;
      }
      if detector.token_env.is_some() {
        config.detector.token_env = detector.token_env;
      }
      if let Some(timeout) = detector.timeout_secs {
        config.detector.timeout_secs = timeout;
      }
      if let Some(size) = detector.input_size {
        if size == 0 {
          return Err(ConfigError::Invalid("detector.input_size 不能为 0".to_string()));
        }
        config.detector.input_size = size;
      }
    }

    if let Some(render) = file.render {
      config.font = render.font;
      if let Some(size) = render.font_size {
        if size <= 0.0 {
          return Err(ConfigError::Invalid(format!(
            "render.font_size 必须大于 0，实际为 {}",
            size
          )));
        }
        config.font_size = size;
      }
    }

    if let Some(progress) = file.progress {
      if progress.simulated == Some(false) {
        config.simulated_progress = None;
      } else if let Some(interval) = progress.interval_ms {
        if interval == 0 {
          return Err(ConfigError::Invalid("progress.interval_ms 不能为 0".to_string()));
        }
        config.simulated_progress = Some(SimulatedSettings {
          interval: Duration::from_millis(interval),
          ..SimulatedSettings::default()
        });
      }
    }

    Ok(config)
  }

  /// 配置文件与命令行共用的阈值检查
  pub fn set_threshold(&mut self, threshold: f32) -> Result<(), ConfigError> {
    if !(0.0..=1.0).contains(&threshold) {
      return Err(ConfigError::Invalid(format!(
        "threshold 必须在 0 到 1 之间，实际为 {}",
        threshold
      )));
    }
    self.detector.threshold = threshold;
    Ok(())
  }
}
