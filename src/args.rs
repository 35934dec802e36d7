// 该文件是 Lvse （绿色分拣） 项目的一部分。
// src/args.rs - 命令行参数
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

use clap::{Args, Parser, Subcommand};
use url::Url;

/// Lvse 垃圾可降解性分析
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
  #[command(subcommand)]
  pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
  /// 分析图像中的物品并输出标注图像与报告
  Analyze(AnalyzeArgs),
  /// 展示已保存的分析报告
  Report {
    /// JSON 报告文件
    #[arg(value_name = "FILE")]
    file: PathBuf,
  },
  /// 列出可降解物品词表
  Vocabulary,
}

#[derive(Args, Debug)]
pub struct AnalyzeArgs {
  /// 检测模型地址
  /// 支持格式:
  /// - fixture:///path/to/detections.json
  /// - https://host/models/facebook/detr-resnet-50
  /// - detr:///path/to/detr-resnet-50.onnx
  #[arg(long, value_name = "MODEL")]
  pub model: Option<Url>,

  /// 输入图像，例如 image:///path/to/photo.jpg，可重复
  #[arg(long, value_name = "SOURCE", required = true)]
  pub input: Vec<Url>,

  /// 输出地址，可重复
  /// 支持格式:
  /// - image:///path/to/annotated.png
  /// - report:///path/to/report.json
  /// - folder:///path/to/records[?always]
  #[arg(long, value_name = "OUTPUT")]
  pub output: Vec<Url>,

  /// TOML 配置文件
  #[arg(long, value_name = "FILE")]
  pub config: Option<PathBuf>,

  /// 标签字体文件
  #[arg(long, value_name = "FILE")]
  pub font: Option<PathBuf>,

  /// 置信度阈值 (0.0 - 1.0)，仅对本地模型有效
  #[arg(long, value_name = "THRESHOLD")]
  pub threshold: Option<f32>,

  /// 不显示进度条
  #[arg(long)]
  pub no_progress: bool,
}
