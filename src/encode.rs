//! Final bitmap encoding. The format is caller-chosen input; encoding
//! failure is fatal with no fallback.

use std::io::Cursor;

use crate::error::{MatchcardError, MatchcardResult};
use crate::model::Color;
use crate::render::Bitmap;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageFormat {
    #[default]
    Png,
    Jpeg,
    Webp,
}

impl ImageFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            ImageFormat::Png => "png",
            ImageFormat::Jpeg => "jpg",
            ImageFormat::Webp => "webp",
        }
    }

    pub fn media_type(&self) -> &'static str {
        match self {
            ImageFormat::Png => "image/png",
            ImageFormat::Jpeg => "image/jpeg",
            ImageFormat::Webp => "image/webp",
        }
    }
}

impl std::str::FromStr for ImageFormat {
    type Err = MatchcardError;

    fn from_str(s: &str) -> MatchcardResult<ImageFormat> {
        match s.to_ascii_lowercase().as_str() {
            "png" => Ok(ImageFormat::Png),
            "jpg" | "jpeg" => Ok(ImageFormat::Jpeg),
            "webp" => Ok(ImageFormat::Webp),
            other => Err(MatchcardError::validation(format!(
                "unknown image format: {other}"
            ))),
        }
    }
}

/// Encode the bitmap. JPEG carries no alpha channel, so the pixels are
/// flattened over `background` first.
pub fn encode(bitmap: &Bitmap, format: ImageFormat, background: Color) -> MatchcardResult<Vec<u8>> {
    let expected = bitmap.width as usize * bitmap.height as usize * 4;
    if bitmap.rgba8.len() != expected {
        return Err(MatchcardError::encode("bitmap byte length mismatch"));
    }

    let mut out = Cursor::new(Vec::new());
    match format {
        ImageFormat::Png | ImageFormat::Webp => {
            let img = image::RgbaImage::from_raw(bitmap.width, bitmap.height, bitmap.rgba8.clone())
                .ok_or_else(|| MatchcardError::encode("bitmap buffer construction failed"))?;
            let fmt = if format == ImageFormat::Png {
                image::ImageFormat::Png
            } else {
                image::ImageFormat::WebP
            };
            image::DynamicImage::ImageRgba8(img)
                .write_to(&mut out, fmt)
                .map_err(|e| MatchcardError::encode(format!("{fmt:?}: {e}")))?;
        }
        ImageFormat::Jpeg => {
            let mut rgb = Vec::with_capacity(bitmap.width as usize * bitmap.height as usize * 3);
            for px in bitmap.rgba8.chunks_exact(4) {
                let a = px[3] as u16;
                let inv = 255 - a;
                rgb.push(((px[0] as u16 * a + background.r as u16 * inv) / 255) as u8);
                rgb.push(((px[1] as u16 * a + background.g as u16 * inv) / 255) as u8);
                rgb.push(((px[2] as u16 * a + background.b as u16 * inv) / 255) as u8);
            }
            let img = image::RgbImage::from_raw(bitmap.width, bitmap.height, rgb)
                .ok_or_else(|| MatchcardError::encode("bitmap buffer construction failed"))?;
            image::DynamicImage::ImageRgb8(img)
                .write_to(&mut out, image::ImageFormat::Jpeg)
                .map_err(|e| MatchcardError::encode(format!("jpeg: {e}")))?;
        }
    }
    Ok(out.into_inner())
}
