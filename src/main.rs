// 该文件是 Lvse （绿色分拣） 项目的一部分。
// src/main.rs - 项目主程序
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

mod args;

use std::{path::Path, sync::Arc};

use anyhow::{Context, Result, bail};
use clap::Parser;
use tracing::info;

use lvse::{
  FromUrl,
  classify::VOCABULARY,
  config::AppConfig,
  input::ImageInput,
  model::shared_detector,
  output::{Annotator, OutputWrapper},
  progress::{LogProgress, Progress, ProgressBarSink},
  report::AnalysisReport,
  task::{BatchTask, OneShotTask, Pipeline, Session, Task, TaskSummary},
};

use args::{AnalyzeArgs, Cli, Command};

fn main() -> Result<()> {
  tracing_subscriber::fmt::init();

  let cli = Cli::parse();
  match cli.command {
    Command::Analyze(args) => analyze(args),
    Command::Report { file } => show_report(&file),
    Command::Vocabulary => {
      for term in VOCABULARY.terms() {
        println!("{}", term);
      }
      Ok(())
    }
  }
}

fn analyze(args: AnalyzeArgs) -> Result<()> {
  let mut config = AppConfig::load(args.config.as_deref())?;
  if let Some(threshold) = args.threshold {
    config.set_threshold(threshold)?;
  }
  if args.font.is_some() {
    config.font = args.font.clone();
  }

  let model = match args.model.or(config.detector_url.clone()) {
    Some(model) => model,
    None => bail!("未指定检测模型，请使用 --model 或在配置文件中设置 detector.url"),
  };

  info!("模型地址: {}", model);
  for input in &args.input {
    info!("输入来源: {}", input);
  }
  for output in &args.output {
    info!("输出路径: {}", output);
  }

  let detector = shared_detector(&model, &config.detector)
    .with_context(|| format!("加载检测模型 {} 失败", model))?;
  let annotator = Annotator::new(config.font.as_deref())?.with_font_size(config.font_size);

  let bar = (!args.no_progress).then(|| Arc::new(ProgressBarSink::new()));
  let progress: Arc<dyn Progress> = match &bar {
    Some(bar) => bar.clone(),
    None => Arc::new(LogProgress),
  };

  let pipeline = Pipeline::new(detector)
    .with_annotator(annotator)
    .with_progress(progress)
    .with_simulated_progress(config.simulated_progress);

  let outputs = args
    .output
    .iter()
    .map(OutputWrapper::from_url)
    .collect::<Result<Vec<_>, _>>()?;
  let inputs = args.input.iter().map(ImageInput::from_url);

  let session = Session::new();
  let single = args.input.len() == 1;
  let run = || -> Result<TaskSummary> {
    if single {
      OneShotTask::new(&session).run_task(inputs, &pipeline, &outputs)
    } else {
      BatchTask::new(&session).run_task(inputs, &pipeline, &outputs)
    }
  };
  let summary = match &bar {
    Some(bar) => bar.run(run)?,
    None => run()?,
  };

  for report in &summary.reports {
    println!("{}", report.to_text());
  }
  if summary.failed > 0 {
    bail!("{} 张图像处理失败", summary.failed);
  }

  Ok(())
}

fn show_report(path: &Path) -> Result<()> {
  let report =
    AnalysisReport::load(path).with_context(|| format!("读取报告 {} 失败", path.display()))?;
  println!("{}", report.to_text());
  Ok(())
}
