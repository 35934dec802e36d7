// 该文件是 Lvse （绿色分拣） 项目的一部分。
// src/model/remote.rs - 远程推理服务
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

use serde::Deserialize;
use tracing::{debug, info};
use url::Url;

use crate::{
  FromUrl,
  input::ImageInput,
  model::{Detector, DetectorError, RawDetection},
  progress::Progress,
};

/// 推理服务的应答，可能是检测结果，也可能是错误描述
#[derive(Deserialize)]
#[serde(untagged)]
enum InferenceResponse {
  Detections(Vec<RawDetection>),
  Failure { error: String },
}

/// 通过 HTTP 调用的目标检测服务
///
/// 以原始图像字节作为请求体 POST 到服务地址，应答为
/// `[{"label", "score", "box": {"xmin", "ymin", "xmax", "ymax"}}]`。
pub struct RemoteDetector {
  agent: ureq::Agent,
  endpoint: Url,
  token: Option<String>,
}

pub struct RemoteDetectorBuilder {
  endpoint: Url,
  token_env: Option<String>,
  timeout: Duration,
}

impl FromUrl for RemoteDetectorBuilder {
  type Error = DetectorError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != "http" && url.scheme() != "https" {
      return Err(DetectorError::SchemeMismatch(format!(
        "远程推理服务必须使用 http 或 https，实际为 {}",
        url.scheme()
      )));
    }

    Ok(RemoteDetectorBuilder {
      endpoint: url.clone(),
      token_env: None,
      timeout: Duration::from_secs(60),
    })
  }
}

impl RemoteDetectorBuilder {
  pub fn token_env(mut self, token_env: Option<String>) -> Self {
    self.token_env = token_env;
    self
  }

  pub fn timeout_secs(mut self, secs: u64) -> Self {
    self.timeout = Duration::from_secs(secs);
    self
  }

  pub fn build(self) -> Result<RemoteDetector, DetectorError> {
    let token = match &self.token_env {
      Some(name) => {
        let token = std::env::var(name).map_err(|_| {
          DetectorError::ModelLoad(format!("环境变量 {} 中没有访问令牌", name))
        })?;
        Some(token)
      }
      None => None,
    };

    info!("使用远程推理服务: {}", self.endpoint);
    let agent = ureq::AgentBuilder::new().timeout(self.timeout).build();

    Ok(RemoteDetector {
      agent,
      endpoint: self.endpoint,
      token,
    })
  }
}

impl Detector for RemoteDetector {
  fn name(&self) -> &'static str {
    "remote"
  }

  fn detect(
    &self,
    input: &ImageInput,
    _progress: &dyn Progress,
  ) -> Result<Vec<RawDetection>, DetectorError> {
    let mut request = self
      .agent
      .post(self.endpoint.as_str())
      .set("Content-Type", input.mime_type());
    if let Some(token) = &self.token {
      request = request.set("Authorization", &format!("Bearer {}", token));
    }

    debug!("发送 {} 字节到 {}", input.bytes().len(), self.endpoint);
    let body = match request.send_bytes(input.bytes()) {
      Ok(response) => response.into_string()?,
      Err(ureq::Error::Status(code, response)) => {
        let body = response.into_string().unwrap_or_default();
        return Err(DetectorError::Inference(format!(
          "推理服务返回状态码 {}: {}",
          code, body
        )));
      }
      Err(e) => {
        return Err(DetectorError::Inference(format!(
          "连接推理服务失败: {}",
          e
        )));
      }
    };

    parse_response(&body)
  }
}

fn parse_response(body: &str) -> Result<Vec<RawDetection>, DetectorError> {
  match serde_json::from_str::<InferenceResponse>(body)? {
    InferenceResponse::Detections(detections) => Ok(detections),
    InferenceResponse::Failure { error } => Err(DetectorError::Inference(error)),
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn parses_detection_list() {
    let body = r#"[{"score":0.5,"label":"cup","box":{"xmin":0,"ymin":0,"xmax":5,"ymax":5}}]"#;
    let detections = parse_response(body).unwrap();
    assert_eq!(detections[0].label, "cup");
  }

  #[test]
  fn error_body_becomes_inference_error() {
    let body = r#"{"error": "Model is currently loading"}"#;
    match parse_response(body) {
      Err(DetectorError::Inference(message)) => assert!(message.contains("loading")),
      other => panic!("unexpected result: {:?}", other.map(|d| d.len())),
    }
  }

  #[test]
  fn rejects_non_http_scheme() {
    let url = Url::parse("fixture:///tmp/a.json").unwrap();
    assert!(RemoteDetectorBuilder::from_url(&url).is_err());
  }
}
