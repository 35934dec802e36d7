// 该文件是 Lvse （绿色分拣） 项目的一部分。
// src/model/detr.rs - 本地 DETR 模型
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

use image::imageops::FilterType;
use tracing::{debug, error, info};
use tract_onnx::prelude::*;
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme, url_to_path,
  input::ImageInput,
  model::{BoundingBox, Detector, DetectorError, RawDetection, coco},
  progress::Progress,
};

const DETR_MEAN: [f32; 3] = [0.485, 0.456, 0.406];
const DETR_STD: [f32; 3] = [0.229, 0.224, 0.225];
const DETR_BOX_SIZE: usize = 4;

/// 基于 tract 的 DETR (ResNet-50) 目标检测
pub struct DetrDetector {
  model: TypedRunnableModel<TypedModel>,
  input_size: u32,
  threshold: f32,
  with_mask: bool,
}

pub struct DetrDetectorBuilder {
  model_path: PathBuf,
  threshold: f32,
  input_size: u32,
}

impl FromUrlWithScheme for DetrDetectorBuilder {
  const SCHEME: &'static str = "detr";
}

impl FromUrl for DetrDetectorBuilder {
  type Error = DetectorError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(DetectorError::SchemeMismatch(format!(
        "模型路径必须使用 {} 方案",
        Self::SCHEME
      )));
    }

    Ok(DetrDetectorBuilder {
      model_path: url_to_path(url),
      threshold: 0.9,
      input_size: 800,
    })
  }
}

fn load_error(e: TractError) -> DetectorError {
  DetectorError::ModelLoad(format!("{:#}", e))
}

impl DetrDetectorBuilder {
  pub fn threshold(mut self, threshold: f32) -> Self {
    self.threshold = threshold;
    self
  }

  pub fn input_size(mut self, input_size: u32) -> Self {
    self.input_size = input_size;
    self
  }

  pub fn build(self) -> Result<DetrDetector, DetectorError> {
    info!("加载模型文件: {}", self.model_path.display());
    let size = self.input_size as usize;

    let model = tract_onnx::onnx()
      .model_for_path(&self.model_path)
      .map_err(load_error)?;
    let num_inputs = model.input_outlets().map_err(load_error)?.len();
    debug!("模型输入数量: {}", num_inputs);

    let mut model = model
      .with_input_fact(
        0,
        InferenceFact::dt_shape(f32::datum_type(), tvec!(1, 3, size, size)),
      )
      .map_err(load_error)?;
    // 导出的 DETR 可能额外需要 pixel_mask 输入
    let with_mask = num_inputs > 1;
    if with_mask {
      model = model
        .with_input_fact(
          1,
          InferenceFact::dt_shape(i64::datum_type(), tvec!(1, size, size)),
        )
        .map_err(load_error)?;
    }

    let model = model
      .into_optimized()
      .map_err(load_error)?
      .into_runnable()
      .map_err(load_error)?;
    info!("模型加载完成");

    Ok(DetrDetector {
      model,
      input_size: self.input_size,
      threshold: self.threshold,
      with_mask,
    })
  }
}

impl DetrDetector {
  fn build_inputs(&self, input: &ImageInput) -> Result<(TVec<TValue>, u32, u32), DetectorError> {
    let image = input
      .decode()
      .map_err(|e| DetectorError::Unsupported(e.to_string()))?;
    let (width, height) = image.dimensions();
    let size = self.input_size;
    let resized = image::imageops::resize(&image, size, size, FilterType::Triangle);

    let size = size as usize;
    let pixels = tract_ndarray::Array4::from_shape_fn((1, 3, size, size), |(_, c, y, x)| {
      let value = resized.get_pixel(x as u32, y as u32)[c] as f32 / 255.0;
      (value - DETR_MEAN[c]) / DETR_STD[c]
    });

    let mut inputs: TVec<TValue> = tvec!(pixels.into_tensor().into());
    if self.with_mask {
      let mask = tract_ndarray::Array3::<i64>::ones((1, size, size));
      inputs.push(mask.into_tensor().into());
    }
    Ok((inputs, width, height))
  }
}

impl Detector for DetrDetector {
  fn name(&self) -> &'static str {
    "detr"
  }

  fn detect(
    &self,
    input: &ImageInput,
    progress: &dyn Progress,
  ) -> Result<Vec<RawDetection>, DetectorError> {
    progress.message("预处理图像");
    progress.set(10);
    let (inputs, width, height) = self.build_inputs(input)?;

    progress.message("模型推理");
    progress.set(30);
    let outputs = self
      .model
      .run(inputs)
      .map_err(|e| DetectorError::Inference(format!("{:#}", e)))?;

    progress.message("后处理");
    progress.set(80);
    let mut logits = None;
    let mut boxes = None;
    for output in outputs.iter() {
      match output.shape().last() {
        Some(&DETR_BOX_SIZE) => boxes = Some(output),
        Some(_) => logits = Some(output),
        None => {}
      }
    }
    let (Some(logits), Some(boxes)) = (logits, boxes) else {
      error!("模型输出数量不符: {}", outputs.len());
      return Err(DetectorError::Inference("模型缺少 logits 或 pred_boxes 输出".to_string()));
    };

    let num_classes = logits.shape().last().copied().unwrap_or(0);
    let logits = logits
      .as_slice::<f32>()
      .map_err(|e| DetectorError::Inference(format!("{:#}", e)))?;
    let boxes = boxes
      .as_slice::<f32>()
      .map_err(|e| DetectorError::Inference(format!("{:#}", e)))?;

    let detections = postprocess(
      logits,
      boxes,
      num_classes,
      self.threshold,
      width as f32,
      height as f32,
    );
    debug!("检测到 {} 个目标", detections.len());
    Ok(detections)
  }

  fn reports_progress(&self) -> bool {
    true
  }
}

/// 将 DETR 的查询输出转换为像素坐标的检测结果
///
/// 每个查询对所有类别做 softmax，最后一类为“无目标”，不参与取最大值。
/// 边框为相对图像尺寸的 [cx, cy, w, h]，按原图尺寸换算。
fn postprocess(
  logits: &[f32],
  boxes: &[f32],
  num_classes: usize,
  threshold: f32,
  width: f32,
  height: f32,
) -> Vec<RawDetection> {
  if num_classes < 2 {
    return Vec::new();
  }

  let mut detections = Vec::new();
  for (row, bbox) in logits
    .chunks_exact(num_classes)
    .zip(boxes.chunks_exact(DETR_BOX_SIZE))
  {
    let max = row.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let exps: Vec<f32> = row.iter().map(|v| (v - max).exp()).collect();
    let sum: f32 = exps.iter().sum();

    let Some((class_id, prob)) = exps[..num_classes - 1]
      .iter()
      .enumerate()
      .max_by(|a, b| a.1.total_cmp(b.1))
    else {
      continue;
    };
    let score = prob / sum;
    if score <= threshold {
      continue;
    }

    let (cx, cy, w, h) = (bbox[0], bbox[1], bbox[2], bbox[3]);
    detections.push(RawDetection {
      label: coco::label_of(class_id).to_string(),
      score,
      bbox: BoundingBox {
        xmin: (cx - w / 2.0) * width,
        ymin: (cy - h / 2.0) * height,
        xmax: (cx + w / 2.0) * width,
        ymax: (cy + h / 2.0) * height,
      },
    });
  }
  detections
}
