// 该文件是 Lvse （绿色分拣） 项目的一部分。
// src/input.rs - 图像输入
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

use std::path::Path;

use image::{ImageFormat, RgbImage};
use thiserror::Error;
use tracing::{debug, error};
use url::Url;

use crate::{FromUrl, FromUrlWithScheme, url_to_path};

#[derive(Error, Debug)]
pub enum InputError {
  #[error("URI scheme mismatch")]
  SchemeMismatch,
  #[error("I/O error: {0}")]
  IoError(#[from] std::io::Error),
  #[error("Image decoding error: {0}")]
  ImageDecodeError(#[from] image::ImageError),
}

/// 待分析的图像，保留原始字节
///
/// 检测器拿到的是原始字节，渲染时才解码。
#[derive(Debug, Clone)]
pub struct ImageInput {
  source: String,
  bytes: Vec<u8>,
  format: Option<ImageFormat>,
}

impl FromUrlWithScheme for ImageInput {
  const SCHEME: &'static str = "image";
}

impl FromUrl for ImageInput {
  type Error = InputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      error!(
        "URI scheme mismatch: expected '{}', found '{}'",
        Self::SCHEME,
        url.scheme()
      );
      return Err(InputError::SchemeMismatch);
    }

    ImageInput::open(url_to_path(url))
  }
}

impl ImageInput {
  pub fn open(path: impl AsRef<Path>) -> Result<Self, InputError> {
    let path = path.as_ref();
    let bytes = std::fs::read(path)?;
    debug!("读取图像文件 {}: {} 字节", path.display(), bytes.len());
    // 以文件内容为准，扩展名只作后备
    let format = image::guess_format(&bytes)
      .ok()
      .or_else(|| ImageFormat::from_path(path).ok());

    Ok(ImageInput {
      source: path.display().to_string(),
      bytes,
      format,
    })
  }

  pub fn from_bytes(source: impl Into<String>, bytes: Vec<u8>) -> Self {
    let format = image::guess_format(&bytes).ok();
    ImageInput {
      source: source.into(),
      bytes,
      format,
    }
  }

  /// 从已解码的图像构造输入，按 PNG 编码
  pub fn from_image(source: impl Into<String>, image: &RgbImage) -> Result<Self, InputError> {
    let mut bytes = Vec::new();
    image.write_to(&mut std::io::Cursor::new(&mut bytes), ImageFormat::Png)?;
    Ok(ImageInput {
      source: source.into(),
      bytes,
      format: Some(ImageFormat::Png),
    })
  }

  pub fn source(&self) -> &str {
    &self.source
  }

  pub fn bytes(&self) -> &[u8] {
    &self.bytes
  }

  pub fn format(&self) -> Option<ImageFormat> {
    self.format
  }

  pub fn mime_type(&self) -> &'static str {
    self
      .format
      .map(|format| format.to_mime_type())
      .unwrap_or("application/octet-stream")
  }

  /// 完整解码图像，解码完成前不会返回
  pub fn decode(&self) -> Result<RgbImage, InputError> {
    let image = match self.format {
      Some(format) => image::load_from_memory_with_format(&self.bytes, format)?,
      None => image::load_from_memory(&self.bytes)?,
    };
    Ok(image.into_rgb8())
  }
}

#[cfg(test)]
mod tests {
  use image::Rgb;

  use super::*;

  #[test]
  fn in_memory_png_round_trips_through_decode() {
    let image = RgbImage::from_pixel(4, 3, Rgb([10, 20, 30]));
    let input = ImageInput::from_image("memory", &image).unwrap();

    assert_eq!(input.format(), Some(ImageFormat::Png));
    assert_eq!(input.mime_type(), "image/png");
    let decoded = input.decode().unwrap();
    assert_eq!(decoded.dimensions(), (4, 3));
    assert_eq!(decoded.get_pixel(1, 1), &Rgb([10, 20, 30]));
  }

  #[test]
  fn garbage_bytes_fail_to_decode() {
    let input = ImageInput::from_bytes("memory", b"definitely not an image".to_vec());
    assert_eq!(input.format(), None);
    assert_eq!(input.mime_type(), "application/octet-stream");
    assert!(matches!(
      input.decode(),
      Err(InputError::ImageDecodeError(_))
    ));
  }

  #[test]
  fn wrong_scheme_is_rejected() {
    let url = Url::parse("fixture:///tmp/a.png").unwrap();
    assert!(matches!(
      ImageInput::from_url(&url),
      Err(InputError::SchemeMismatch)
    ));
  }

  #[test]
  fn format_follows_content_not_extension() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("really a jpeg.png");
    RgbImage::from_pixel(8, 8, Rgb([10, 200, 30]))
      .save_with_format(&path, ImageFormat::Jpeg)
      .unwrap();

    let input = ImageInput::open(&path).unwrap();
    assert_eq!(input.format(), Some(ImageFormat::Jpeg));
    assert_eq!(input.mime_type(), "image/jpeg");
    assert_eq!(input.decode().unwrap().dimensions(), (8, 8));
  }

  #[test]
  fn opens_paths_with_spaces_from_url() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("my photo.png");
    RgbImage::from_pixel(4, 4, Rgb([1, 2, 3])).save(&path).unwrap();

    let url = Url::parse(&format!("image://{}", path.display())).unwrap();
    assert!(url.path().contains("%20"));
    let input = ImageInput::from_url(&url).unwrap();
    assert_eq!(input.source(), path.display().to_string());
    assert_eq!(input.format(), Some(ImageFormat::Png));
  }
}
