// 该文件是 Lvse （绿色分拣） 项目的一部分。
// src/output/report_file.rs - 保存分析报告
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

use thiserror::Error;
use tracing::info;
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme, url_to_path,
  output::Render,
  report::{AnalysisReport, ReportError},
  task::AnalysisOutcome,
};

#[derive(Error, Debug)]
pub enum ReportFileError {
  #[error("报告错误: {0}")]
  Report(#[from] ReportError),
  #[error("URI 方案不匹配")]
  SchemeMismatch,
}

/// 以 JSON 保存分析报告
pub struct ReportFileOutput {
  path: PathBuf,
}

impl FromUrlWithScheme for ReportFileOutput {
  const SCHEME: &'static str = "report";
}

impl FromUrl for ReportFileOutput {
  type Error = ReportFileError;

  fn from_url(uri: &Url) -> Result<Self, Self::Error> {
    if uri.scheme() != Self::SCHEME {
      return Err(ReportFileError::SchemeMismatch);
    }
    Ok(ReportFileOutput {
      path: url_to_path(uri),
    })
  }
}

impl Render<AnalysisOutcome> for ReportFileOutput {
  type Error = ReportFileError;

  fn render_result(&self, result: &AnalysisOutcome) -> Result<(), Self::Error> {
    AnalysisReport::from_outcome(result).save(&self.path)?;
    info!("保存报告到文件: {}", self.path.display());
    Ok(())
  }
}
