// 该文件是 Lvse （绿色分拣） 项目的一部分。
// tests/pipeline.rs - 端到端分析测试
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

use std::path::{Path, PathBuf};

use image::{Rgb, RgbImage};
use url::Url;

use lvse::{
  FromUrl,
  input::{ImageInput, InputError},
  model::DetectorWrapper,
  output::{Annotator, OutputWrapper},
  report::AnalysisReport,
  summary::Grade,
  task::{BatchTask, OneShotTask, Pipeline, Session, Task},
};

const DETECTIONS: &str = r#"[
  {"label": "apple", "score": 0.92, "box": {"xmin": 10, "ymin": 40, "xmax": 60, "ymax": 90}},
  {"label": "bottle", "score": 0.88, "box": {"xmin": 80, "ymin": 50, "xmax": 120, "ymax": 110}},
  {"label": "banana", "score": 0.95, "box": {"xmin": 20, "ymin": 120, "xmax": 70, "ymax": 150}},
  {"label": "plastic bag", "score": 0.83, "box": {"xmin": 130, "ymin": 30, "xmax": 180, "ymax": 90}},
  {"label": "orange peel", "score": 0.89, "box": {"xmin": 140, "ymin": 110, "xmax": 190, "ymax": 150}}
]"#;

fn url(scheme: &str, path: &Path) -> Url {
  Url::parse(&format!("{}://{}", scheme, path.display())).unwrap()
}

fn prepare(dir: &Path) -> (PathBuf, PathBuf) {
  let fixture = dir.join("detections.json");
  std::fs::write(&fixture, DETECTIONS).unwrap();

  let image = dir.join("photo.png");
  RgbImage::from_pixel(200, 160, Rgb([200, 200, 200]))
    .save(&image)
    .unwrap();

  (fixture, image)
}

fn files_with_extension(dir: &Path, extension: &str) -> Vec<PathBuf> {
  let mut found = Vec::new();
  for entry in std::fs::read_dir(dir).unwrap() {
    let path = entry.unwrap().path();
    if path.is_dir() {
      found.extend(files_with_extension(&path, extension));
    } else if path.extension().is_some_and(|e| e == extension) {
      found.push(path);
    }
  }
  found
}

#[test]
fn one_shot_writes_every_output() {
  let dir = tempfile::tempdir().unwrap();
  let (fixture, image) = prepare(dir.path());

  let detector = DetectorWrapper::from_url(&url("fixture", &fixture)).unwrap();
  let pipeline = Pipeline::new(detector)
    .with_annotator(Annotator::default())
    .with_simulated_progress(None);

  let annotated = dir.path().join("out").join("annotated.png");
  let report = dir.path().join("out").join("report.json");
  let records = dir.path().join("records");
  let outputs = [
    url("image", &annotated),
    url("report", &report),
    Url::parse(&format!("folder://{}?always", records.display())).unwrap(),
  ]
  .iter()
  .map(OutputWrapper::from_url)
  .collect::<Result<Vec<_>, _>>()
  .unwrap();

  let session = Session::new();
  let inputs = [ImageInput::from_url(&url("image", &image))];
  let summary = OneShotTask::new(&session)
    .run_task(inputs, &pipeline, &outputs)
    .unwrap();

  assert_eq!(summary.failed, 0);
  assert_eq!(summary.reports.len(), 1);
  assert!(!session.is_processing());

  let saved = AnalysisReport::load(&report).unwrap();
  assert_eq!(saved.summary.total, 5);
  assert_eq!(saved.summary.biodegradable, 3);
  assert_eq!(saved.summary.non_biodegradable, 2);
  assert_eq!(saved.summary.biodegradable_percentage, 60.0);
  assert_eq!(saved.summary.grade, Grade::B);
  assert_eq!(saved.detections[0].label(), "apple");
  assert!(saved.detections[0].is_biodegradable());
  assert!(!saved.detections[1].is_biodegradable());

  let rendered = image::open(&annotated).unwrap().to_rgb8();
  assert_eq!(rendered.dimensions(), (200, 160));
  assert_ne!(rendered, RgbImage::from_pixel(200, 160, Rgb([200, 200, 200])));

  assert_eq!(files_with_extension(&records, "png").len(), 1);
  assert_eq!(files_with_extension(&records, "json").len(), 1);
}

#[test]
fn batch_continues_after_unreadable_input() {
  let dir = tempfile::tempdir().unwrap();
  let (fixture, image) = prepare(dir.path());

  let detector = DetectorWrapper::from_url(&url("fixture", &fixture)).unwrap();
  let pipeline = Pipeline::new(detector).with_simulated_progress(None);
  let records = dir.path().join("records");
  let outputs = vec![OutputWrapper::from_url(&url("folder", &records)).unwrap()];

  let inputs: Vec<Result<ImageInput, InputError>> = vec![
    ImageInput::from_url(&url("image", &image)),
    ImageInput::from_url(&url("image", &dir.path().join("missing.png"))),
    ImageInput::from_url(&url("image", &image)),
  ];

  let session = Session::new();
  let summary = BatchTask::new(&session)
    .run_task(inputs, &pipeline, &outputs)
    .unwrap();

  assert_eq!(summary.failed, 1);
  assert_eq!(summary.reports.len(), 2);
  assert_eq!(files_with_extension(&records, "json").len(), 2);
}

#[test]
fn broken_detector_output_fails_the_analysis() {
  let dir = tempfile::tempdir().unwrap();
  let (_, image) = prepare(dir.path());
  let broken = dir.path().join("broken.json");
  std::fs::write(&broken, "{ not json").unwrap();

  let detector = DetectorWrapper::from_url(&url("fixture", &broken)).unwrap();
  let pipeline = Pipeline::new(detector).with_simulated_progress(None);

  let session = Session::new();
  let input = ImageInput::open(&image).unwrap();
  let result = session.analyze(&pipeline, Some(&input));
  assert!(matches!(
    result,
    Err(lvse::task::AnalysisError::DetectionFailed(_))
  ));
  assert!(!session.is_processing());
}

#[test]
fn paths_with_spaces_work_end_to_end() {
  let dir = tempfile::tempdir().unwrap();
  let workspace = dir.path().join("sorting bench");
  std::fs::create_dir_all(&workspace).unwrap();
  let (fixture, image) = prepare(&workspace);

  let detector = DetectorWrapper::from_url(&url("fixture", &fixture)).unwrap();
  let pipeline = Pipeline::new(detector).with_simulated_progress(None);

  let annotated = workspace.join("annotated photo.png");
  let report = workspace.join("my report.json");
  let outputs = [url("image", &annotated), url("report", &report)]
    .iter()
    .map(OutputWrapper::from_url)
    .collect::<Result<Vec<_>, _>>()
    .unwrap();

  let session = Session::new();
  let inputs = [ImageInput::from_url(&url("image", &image))];
  OneShotTask::new(&session)
    .run_task(inputs, &pipeline, &outputs)
    .unwrap();

  assert!(annotated.is_file());
  assert_eq!(AnalysisReport::load(&report).unwrap().summary.total, 5);
}
