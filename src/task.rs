// 该文件是 Lvse （绿色分拣） 项目的一部分。
// src/task.rs - 分析流水线与任务
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
  sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
  },
  time::{Duration, Instant},
};

use thiserror::Error;
use tracing::{error, info, warn};

use crate::{
  classify::ClassifiedDetection,
  input::{ImageInput, InputError},
  model::{Detection, Detector, DetectorError, RawDetection},
  output::{AnnotatedImage, Annotator, Render, RenderError},
  progress::{NoProgress, Progress, SimulatedProgress, SimulatedSettings},
  report::AnalysisReport,
  summary::{AnalysisSummary, summarize},
};

#[derive(Error, Debug)]
pub enum AnalysisError {
  #[error("没有选择图像")]
  NoImageSelected,
  #[error("检测失败: {0}")]
  DetectionFailed(#[source] DetectorError),
  #[error("已有分析正在进行")]
  Busy,
}

/// 一次分析的完整结果
#[derive(Debug)]
pub struct AnalysisOutcome {
  pub source: String,
  pub detections: Vec<ClassifiedDetection>,
  pub summary: AnalysisSummary,
  /// 标注失败不影响其余结果
  pub annotated: Result<AnnotatedImage, RenderError>,
  pub elapsed: Duration,
}

impl AnalysisOutcome {
  pub fn is_empty(&self) -> bool {
    self.detections.is_empty()
  }

  pub fn annotated_image(&self) -> Option<&AnnotatedImage> {
    self.annotated.as_ref().ok()
  }
}

/// 检测 → 判定 → 标注 / 汇总
pub struct Pipeline<D> {
  detector: D,
  annotator: Annotator,
  progress: Arc<dyn Progress>,
  simulated: Option<SimulatedSettings>,
}

impl<D: Detector> Pipeline<D> {
  pub fn new(detector: D) -> Self {
    Self {
      detector,
      annotator: Annotator::default(),
      progress: Arc::new(NoProgress),
      simulated: None,
    }
  }

  pub fn with_annotator(mut self, annotator: Annotator) -> Self {
    self.annotator = annotator;
    self
  }

  pub fn with_progress(mut self, progress: Arc<dyn Progress>) -> Self {
    self.progress = progress;
    self
  }

  /// 检测器不报告进度时使用模拟进度
  pub fn with_simulated_progress(mut self, settings: Option<SimulatedSettings>) -> Self {
    self.simulated = settings;
    self
  }

  pub fn detector(&self) -> &D {
    &self.detector
  }

  pub fn analyze(&self, input: Option<&ImageInput>) -> Result<AnalysisOutcome, AnalysisError> {
    let input = input.ok_or(AnalysisError::NoImageSelected)?;
    info!("开始分析: {} (检测器 {})", input.source(), self.detector.name());
    self.progress.set(0);

    let now = Instant::now();
    let raw = self.run_detector(input)?;
    info!("检测完成，耗时: {:.2?}，共 {} 个目标", now.elapsed(), raw.len());

    let detections: Vec<ClassifiedDetection> = raw
      .into_iter()
      .map(Detection::from)
      .map(ClassifiedDetection::classify)
      .collect();
    let summary = summarize(&detections);

    let annotated = input
      .decode()
      .map_err(|e| RenderError::Decode(e.to_string()))
      .and_then(|base| self.annotator.render(&base, &detections));
    if let Err(e) = &annotated {
      warn!("标注不可用: {}", e);
    }

    self.progress.set(100);
    let elapsed = now.elapsed();
    info!(
      "分析完成: 可降解 {} / 不可降解 {}，评级 {}，耗时: {:.2?}",
      summary.biodegradable, summary.non_biodegradable, summary.grade, elapsed
    );

    Ok(AnalysisOutcome {
      source: input.source().to_string(),
      detections,
      summary,
      annotated,
      elapsed,
    })
  }

  fn run_detector(&self, input: &ImageInput) -> Result<Vec<RawDetection>, AnalysisError> {
    let simulated = match self.simulated {
      Some(settings) if !self.detector.reports_progress() => {
        Some(SimulatedProgress::start(self.progress.clone(), settings))
      }
      _ => None,
    };

    let result = self.detector.detect(input, self.progress.as_ref());
    if let Some(simulated) = simulated {
      simulated.stop();
    }

    result.map_err(|e| {
      error!("检测失败: {}", e);
      AnalysisError::DetectionFailed(e)
    })
  }
}

/// 同一会话同一时间只允许一次分析
#[derive(Debug, Default)]
pub struct Session {
  processing: AtomicBool,
}

pub struct ProcessingGuard<'a> {
  session: &'a Session,
}

impl Drop for ProcessingGuard<'_> {
  fn drop(&mut self) {
    self.session.processing.store(false, Ordering::Release);
  }
}

impl Session {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn is_processing(&self) -> bool {
    self.processing.load(Ordering::Acquire)
  }

  pub fn begin(&self) -> Result<ProcessingGuard<'_>, AnalysisError> {
    self
      .processing
      .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
      .map_err(|_| AnalysisError::Busy)?;
    Ok(ProcessingGuard { session: self })
  }

  pub fn analyze<D: Detector>(
    &self,
    pipeline: &Pipeline<D>,
    input: Option<&ImageInput>,
  ) -> Result<AnalysisOutcome, AnalysisError> {
    let _guard = self.begin()?;
    pipeline.analyze(input)
  }
}

#[derive(Debug, Default)]
pub struct TaskSummary {
  pub reports: Vec<AnalysisReport>,
  pub failed: usize,
}

pub trait Task<I, D, O>: Sized {
  type Error;
  fn run_task(self, input: I, pipeline: &Pipeline<D>, outputs: &[O]) -> Result<TaskSummary, Self::Error>;
}

fn render_all<O, RE>(outputs: &[O], outcome: &AnalysisOutcome) -> Result<(), RE>
where
  O: Render<AnalysisOutcome, Error = RE>,
{
  for output in outputs {
    output.render_result(outcome)?;
  }
  Ok(())
}

/// 分析单张图像
pub struct OneShotTask<'s> {
  session: &'s Session,
}

impl<'s> OneShotTask<'s> {
  pub fn new(session: &'s Session) -> Self {
    Self { session }
  }
}

impl<
  I: IntoIterator<Item = Result<ImageInput, InputError>>,
  D: Detector,
  RE: std::error::Error + Sync + Send + 'static,
  O: Render<AnalysisOutcome, Error = RE>,
> Task<I, D, O> for OneShotTask<'_>
{
  type Error = anyhow::Error;

  fn run_task(self, input: I, pipeline: &Pipeline<D>, outputs: &[O]) -> Result<TaskSummary, Self::Error> {
    info!("开始任务...");
    let input = input.into_iter().next().transpose()?;
    let outcome = self.session.analyze(pipeline, input.as_ref())?;
    render_all(outputs, &outcome)?;
    info!("输出完成");

    Ok(TaskSummary {
      reports: vec![AnalysisReport::from_outcome(&outcome)],
      failed: 0,
    })
  }
}

/// 逐张分析多张图像，各次分析互不影响，单张失败不会中止任务
pub struct BatchTask<'s> {
  session: &'s Session,
}

impl<'s> BatchTask<'s> {
  pub fn new(session: &'s Session) -> Self {
    Self { session }
  }
}

impl<
  I: IntoIterator<Item = Result<ImageInput, InputError>>,
  D: Detector,
  RE: std::error::Error + Sync + Send + 'static,
  O: Render<AnalysisOutcome, Error = RE>,
> Task<I, D, O> for BatchTask<'_>
{
  type Error = anyhow::Error;

  fn run_task(self, input: I, pipeline: &Pipeline<D>, outputs: &[O]) -> Result<TaskSummary, Self::Error> {
    info!("开始批量任务...");
    let mut summary = TaskSummary::default();

    for (index, input) in input.into_iter().enumerate() {
      let input = match input {
        Ok(input) => input,
        Err(e) => {
          error!("({}) 读取输入失败: {}", index, e);
          summary.failed += 1;
          continue;
        }
      };

      let outcome = match self.session.analyze(pipeline, Some(&input)) {
        Ok(outcome) => outcome,
        Err(e) => {
          error!("({}) 分析 {} 失败: {}", index, input.source(), e);
          summary.failed += 1;
          continue;
        }
      };

      if let Err(e) = render_all(outputs, &outcome) {
        error!("({}) 输出 {} 失败: {}", index, input.source(), e);
        summary.failed += 1;
        continue;
      }
      summary.reports.push(AnalysisReport::from_outcome(&outcome));
    }

    if summary.failed > 0 {
      warn!("{} 张图像处理失败", summary.failed);
    }
    info!("批量任务完成: 成功 {}", summary.reports.len());
    Ok(summary)
  }
}
