// 该文件是 Lvse （绿色分拣） 项目的一部分。
// src/output/draw.rs - 检测结果标注
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

use ab_glyph::{FontVec, PxScale};
use image::{ImageFormat, Rgb, RgbImage};
use imageproc::{
  drawing::{
    draw_filled_circle_mut, draw_filled_rect_mut, draw_hollow_circle_mut, draw_line_segment_mut,
    draw_text_mut, text_size,
  },
  rect::Rect,
};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::classify::ClassifiedDetection;

// 文本渲染常量
const LABEL_FONT_SIZE: f32 = 16.0;
const LABEL_TAG_HEIGHT: i32 = 25;
const LABEL_TAG_PADDING: i32 = 5;
const LABEL_CHAR_WIDTH: f32 = 0.6; // 无字体时按字号估算字符宽度
const BOX_STROKE_WIDTH: i32 = 3;
const GLYPH_RADIUS: i32 = 9;
const BIODEGRADABLE_COLOR: [u8; 3] = [0x22, 0xc5, 0x5e]; // 绿色
const NON_BIODEGRADABLE_COLOR: [u8; 3] = [0xef, 0x44, 0x44]; // 红色
const TEXT_COLOR: [u8; 3] = [255, 255, 255];

/// 画布的最大边长与面积
pub const MAX_SURFACE_SIDE: u32 = 16384;
pub const MAX_SURFACE_AREA: u64 = 268_435_456;

/// 标签与标记的锚点坐标范围，超出的检测坐标先截断再取整
const ANCHOR_LIMIT: f32 = (1 << 24) as f32;

/// 未指定字体时依次尝试的系统字体
const FALLBACK_FONTS: [&str; 4] = [
  "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf",
  "/usr/share/fonts/dejavu/DejaVuSans.ttf",
  "/usr/share/fonts/TTF/DejaVuSans.ttf",
  "/System/Library/Fonts/Supplemental/Arial.ttf",
];

#[derive(Error, Debug)]
pub enum RenderError {
  #[error("无法获取 {width}x{height} 的画布")]
  SurfaceUnavailable { width: u32, height: u32 },
  #[error("源图像解码失败: {0}")]
  Decode(String),
  #[error("图像编码错误: {0}")]
  Encode(#[from] image::ImageError),
  #[error("字体加载错误: {0}")]
  Font(String),
  #[error("I/O 错误: {0}")]
  Io(#[from] std::io::Error),
}

/// 标注后的图像
#[derive(Debug, Clone, PartialEq)]
pub struct AnnotatedImage {
  image: RgbImage,
}

impl AnnotatedImage {
  pub fn image(&self) -> &RgbImage {
    &self.image
  }

  pub fn into_image(self) -> RgbImage {
    self.image
  }

  pub fn encode_png(&self) -> Result<Vec<u8>, RenderError> {
    let mut bytes = Vec::new();
    self
      .image
      .write_to(&mut std::io::Cursor::new(&mut bytes), ImageFormat::Png)?;
    Ok(bytes)
  }

  pub fn save(&self, path: &Path) -> Result<(), RenderError> {
    self.image.save(path)?;
    Ok(())
  }
}

/// 绘制用的画布，复制自源图像
struct Surface {
  canvas: RgbImage,
}

impl Surface {
  fn acquire(base: &RgbImage) -> Result<Self, RenderError> {
    let (width, height) = base.dimensions();
    let area = width as u64 * height as u64;
    if width == 0
      || height == 0
      || width > MAX_SURFACE_SIDE
      || height > MAX_SURFACE_SIDE
      || area > MAX_SURFACE_AREA
    {
      return Err(RenderError::SurfaceUnavailable { width, height });
    }

    Ok(Surface {
      canvas: base.clone(),
    })
  }
}

pub struct Annotator {
  font: Option<FontVec>,
  font_size: f32,
  tag_height: i32,
  tag_padding: i32,
  stroke_width: i32,
  biodegradable_color: [u8; 3],
  non_biodegradable_color: [u8; 3],
  text_color: [u8; 3],
}

impl Default for Annotator {
  fn default() -> Self {
    Self {
      font: None,
      font_size: LABEL_FONT_SIZE,
      tag_height: LABEL_TAG_HEIGHT,
      tag_padding: LABEL_TAG_PADDING,
      stroke_width: BOX_STROKE_WIDTH,
      biodegradable_color: BIODEGRADABLE_COLOR,
      non_biodegradable_color: NON_BIODEGRADABLE_COLOR,
      text_color: TEXT_COLOR,
    }
  }
}

fn anchor(v: f32) -> i32 {
  v.clamp(-ANCHOR_LIMIT, ANCHOR_LIMIT).round() as i32
}

pub fn load_font(path: &Path) -> Result<FontVec, RenderError> {
  let data = std::fs::read(path)?;
  FontVec::try_from_vec(data).map_err(|e| RenderError::Font(format!("{}: {}", path.display(), e)))
}

impl Annotator {
  /// 使用指定字体，未指定时搜索系统字体；都找不到时只绘制标签底色
  pub fn new(font_path: Option<&Path>) -> Result<Self, RenderError> {
    let font = match font_path {
      Some(path) => Some(load_font(path)?),
      None => FALLBACK_FONTS
        .iter()
        .map(PathBuf::from)
        .filter(|path| path.exists())
        .find_map(|path| load_font(&path).ok()),
    };

    if font.is_none() {
      warn!("未找到可用字体，标签将不绘制文字");
    } else {
      debug!("字体加载完成");
    }

    Ok(Self {
      font,
      ..Self::default()
    })
  }

  pub fn with_font(mut self, font: FontVec) -> Self {
    self.font = Some(font);
    self
  }

  pub fn with_font_size(mut self, font_size: f32) -> Self {
    self.font_size = font_size;
    self
  }

  pub fn has_font(&self) -> bool {
    self.font.is_some()
  }

  fn color_of(&self, biodegradable: bool) -> Rgb<u8> {
    if biodegradable {
      Rgb(self.biodegradable_color)
    } else {
      Rgb(self.non_biodegradable_color)
    }
  }

  /// 在源图像副本上按顺序绘制所有检测结果，源图像不会被修改
  pub fn render(
    &self,
    base: &RgbImage,
    detections: &[ClassifiedDetection],
  ) -> Result<AnnotatedImage, RenderError> {
    let mut surface = Surface::acquire(base)?;
    for detection in detections {
      self.draw_detection(&mut surface.canvas, detection);
    }
    info!("标注完成: {} 个目标", detections.len());
    Ok(AnnotatedImage {
      image: surface.canvas,
    })
  }

  fn draw_detection(&self, image: &mut RgbImage, detection: &ClassifiedDetection) {
    let color = self.color_of(detection.is_biodegradable());
    let region = detection.detection().region;

    // 退化边框按画布 strokeRect 的方式归一化
    let (x, width) = if region.width < 0.0 {
      (region.x + region.width, -region.width)
    } else {
      (region.x, region.width)
    };
    let (y, height) = if region.height < 0.0 {
      (region.y + region.height, -region.height)
    } else {
      (region.y, region.height)
    };

    self.draw_stroke(image, x, y, width, height, color);

    let label = format!(
      "{} ({}%)",
      detection.label(),
      detection.confidence_percent()
    );
    self.draw_label(image, region.x, region.y, &label, color);
    self.draw_glyph(
      image,
      region.x + region.width,
      region.y,
      detection.is_biodegradable(),
      color,
    );
  }

  fn draw_stroke(&self, image: &mut RgbImage, x: f32, y: f32, width: f32, height: f32, color: Rgb<u8>) {
    // 边都是水平或竖直的，端点截断到画布外一像素不改变可见部分
    let (max_x, max_y) = (image.width() as f32, image.height() as f32);
    let clip_x = |v: f32| v.clamp(-1.0, max_x);
    let clip_y = |v: f32| v.clamp(-1.0, max_y);

    let half = self.stroke_width / 2;
    for offset in -half..=(self.stroke_width - 1 - half) {
      let o = offset as f32;
      let (left, top) = (clip_x(x - o), clip_y(y - o));
      let (right, bottom) = (clip_x(x + width + o), clip_y(y + height + o));
      draw_line_segment_mut(image, (left, top), (right, top), color);
      draw_line_segment_mut(image, (left, bottom), (right, bottom), color);
      draw_line_segment_mut(image, (left, top), (left, bottom), color);
      draw_line_segment_mut(image, (right, top), (right, bottom), color);
    }
  }

  fn measure(&self, text: &str) -> u32 {
    let scale = PxScale::from(self.font_size);
    match &self.font {
      Some(font) => text_size(scale, font, text).0,
      None => (text.chars().count() as f32 * self.font_size * LABEL_CHAR_WIDTH).ceil() as u32,
    }
  }

  /// 标签底色紧贴边框上沿，宽度随文字宽度扩展
  fn draw_label(&self, image: &mut RgbImage, x: f32, y: f32, text: &str, color: Rgb<u8>) {
    let text_width = self.measure(text);
    let tag_x = anchor(x);
    let tag_y = anchor(y) - self.tag_height;
    let tag_width = text_width + 2 * self.tag_padding as u32;

    let rect = Rect::at(tag_x, tag_y).of_size(tag_width, self.tag_height as u32);
    draw_filled_rect_mut(image, rect, color);

    if let Some(font) = &self.font {
      let text_top = tag_y + (self.tag_height - self.font_size as i32) / 2;
      draw_text_mut(
        image,
        Rgb(self.text_color),
        tag_x + self.tag_padding,
        text_top,
        PxScale::from(self.font_size),
        font,
        text,
      );
    }
  }

  /// 在边框右上角内侧绘制判定标记：可降解为实心圆加对勾，不可降解为圆圈加斜线
  fn draw_glyph(&self, image: &mut RgbImage, right: f32, top: f32, biodegradable: bool, color: Rgb<u8>) {
    let cx = anchor(right) - 20;
    let cy = anchor(top) + 15;
    let r = GLYPH_RADIUS as f32;
    let (fx, fy) = (cx as f32, cy as f32);

    if biodegradable {
      draw_filled_circle_mut(image, (cx, cy), GLYPH_RADIUS, color);
      let white = Rgb(self.text_color);
      for d in [0.0, 1.0] {
        draw_line_segment_mut(image, (fx - r * 0.5, fy + d), (fx - r * 0.1, fy + r * 0.4 + d), white);
        draw_line_segment_mut(image, (fx - r * 0.1, fy + r * 0.4 + d), (fx + r * 0.55, fy - r * 0.4 + d), white);
      }
    } else {
      for dr in 0..2 {
        draw_hollow_circle_mut(image, (cx, cy), GLYPH_RADIUS - dr, color);
      }
      let k = r * std::f32::consts::FRAC_1_SQRT_2;
      for d in [0.0, 1.0] {
        draw_line_segment_mut(image, (fx - k + d, fy - k), (fx + k + d, fy + k), color);
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::model::{Detection, Region};

  fn classified(label: &str, x: f32, y: f32, width: f32, height: f32) -> ClassifiedDetection {
    ClassifiedDetection::classify(Detection {
      label: label.to_string(),
      confidence: 0.9,
      region: Region {
        x,
        y,
        width,
        height,
      },
    })
  }

  fn gray(width: u32, height: u32) -> RgbImage {
    RgbImage::from_pixel(width, height, Rgb([128, 128, 128]))
  }

  #[test]
  fn empty_detection_list_leaves_image_untouched() {
    let base = gray(64, 48);
    let annotated = Annotator::default().render(&base, &[]).unwrap();
    assert_eq!(annotated.image(), &base);
  }

  #[test]
  fn detections_change_the_image_but_not_the_source() {
    let base = gray(200, 150);
    let source = base.clone();
    let detections = [
      classified("apple", 10.0, 40.0, 100.0, 80.0),
      classified("bottle", 120.0, 60.0, 50.0, 60.0),
    ];

    let annotated = Annotator::default().render(&base, &detections).unwrap();

    assert_eq!(base, source);
    assert_ne!(annotated.image(), &base);
  }

  #[test]
  fn stroke_color_follows_verdict() {
    let base = gray(200, 150);
    let annotator = Annotator::default();

    let bio = annotator
      .render(&base, &[classified("banana", 10.0, 40.0, 100.0, 80.0)])
      .unwrap();
    assert_eq!(bio.image().get_pixel(10, 90), &Rgb(BIODEGRADABLE_COLOR));

    let non_bio = annotator
      .render(&base, &[classified("cell phone", 10.0, 40.0, 100.0, 80.0)])
      .unwrap();
    assert_eq!(non_bio.image().get_pixel(10, 90), &Rgb(NON_BIODEGRADABLE_COLOR));
  }

  #[test]
  fn label_tag_sits_above_box_and_grows_with_text() {
    let base = gray(400, 150);
    let annotator = Annotator::default();

    let short = annotator
      .render(&base, &[classified("cup", 10.0, 60.0, 40.0, 40.0)])
      .unwrap();
    let long = annotator
      .render(
        &base,
        &[classified("a rather long detector label", 10.0, 60.0, 40.0, 40.0)],
      )
      .unwrap();

    // 标签底色位于边框上方
    assert_eq!(short.image().get_pixel(12, 45), &Rgb(NON_BIODEGRADABLE_COLOR));
    // 长标签的底色超出边框宽度，不会被截断
    assert_eq!(short.image().get_pixel(200, 45), &Rgb([128, 128, 128]));
    assert_eq!(long.image().get_pixel(200, 45), &Rgb(NON_BIODEGRADABLE_COLOR));
  }

  #[test]
  fn later_detections_paint_over_earlier_ones() {
    let base = gray(200, 150);
    let annotator = Annotator::default();
    let detections = [
      classified("apple", 10.0, 40.0, 100.0, 80.0),
      classified("bottle", 10.0, 40.0, 100.0, 80.0),
    ];
    let annotated = annotator.render(&base, &detections).unwrap();
    assert_eq!(annotated.image().get_pixel(10, 90), &Rgb(NON_BIODEGRADABLE_COLOR));
  }

  #[test]
  fn out_of_bounds_and_degenerate_boxes_do_not_panic() {
    let base = gray(50, 50);
    let detections = [
      classified("apple", -30.0, -30.0, 200.0, 200.0),
      classified("bottle", 40.0, 40.0, -20.0, -10.0),
      classified("paper", 1000.0, 1000.0, 0.0, 0.0),
    ];
    assert!(Annotator::default().render(&base, &detections).is_ok());
  }

  #[test]
  fn far_away_coordinates_are_tolerated() {
    let base = gray(50, 50);
    let detections = [
      classified("apple", -3e9, -3e9, 10.0, 10.0),
      classified("bottle", 3e9, 3e9, 10.0, 10.0),
      classified("banana", -3e9, 20.0, 6e9, 10.0),
    ];
    let annotated = Annotator::default().render(&base, &detections).unwrap();

    // 只有横跨画布的香蕉边框可见
    assert_eq!(
      annotated.image().get_pixel(25, 20),
      &Rgb(BIODEGRADABLE_COLOR)
    );
    assert_eq!(annotated.image().get_pixel(25, 40), &Rgb([128, 128, 128]));
  }

  #[test]
  fn zero_sized_surface_is_unavailable() {
    let base = RgbImage::new(0, 0);
    let detections = [classified("apple", 0.0, 0.0, 1.0, 1.0)];
    assert!(matches!(
      Annotator::default().render(&base, &detections),
      Err(RenderError::SurfaceUnavailable { .. })
    ));
  }

  #[test]
  fn annotated_image_encodes_to_png() {
    let base = gray(16, 16);
    let annotated = Annotator::default().render(&base, &[]).unwrap();
    let png = annotated.encode_png().unwrap();
    assert_eq!(image::guess_format(&png).unwrap(), ImageFormat::Png);
  }
}
