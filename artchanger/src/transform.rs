use std::io::Cursor;

use anyhow::{Context, Result};
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{DynamicImage, ImageFormat};

use crate::sources::ImageFormatTag;

/// Adapts raw image bytes to what the display shows.
pub trait ImageTransform: Send + Sync {
    /// Return display-ready bytes, encoded in `format`.
    fn transform(&self, bytes: &[u8], format: ImageFormatTag) -> Result<Vec<u8>>;
}

/// Scale to cover the panel and crop the overflow, centered.
#[derive(Debug, Clone, Copy)]
pub struct CoverCrop {
    pub width: u32,
    pub height: u32,
    pub jpeg_quality: u8,
}

impl ImageTransform for CoverCrop {
    fn transform(&self, bytes: &[u8], format: ImageFormatTag) -> Result<Vec<u8>> {
        let mut img = image::load_from_memory(bytes).context("decoding image")?;
        if let Some(tag) = extract_exif_orientation(bytes) {
            img = apply_exif_orientation(img, tag);
        }
        let resized = img.resize_to_fill(self.width, self.height, FilterType::Lanczos3);
        tracing::debug!(
            src_w = img.width(),
            src_h = img.height(),
            out_w = resized.width(),
            out_h = resized.height(),
            "resized and cropped image"
        );
        encode(&resized, format, self.jpeg_quality)
    }
}

fn encode(img: &DynamicImage, format: ImageFormatTag, jpeg_quality: u8) -> Result<Vec<u8>> {
    let mut bytes = Vec::new();
    match format {
        ImageFormatTag::Jpeg => {
            // JPEG has no alpha channel.
            let rgb = DynamicImage::ImageRgb8(img.to_rgb8());
            let encoder = JpegEncoder::new_with_quality(&mut bytes, jpeg_quality);
            rgb.write_with_encoder(encoder)
                .map_err(|e| anyhow::anyhow!("jpeg encode failed: {e}"))?;
        }
        ImageFormatTag::Png => {
            img.write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
                .map_err(|e| anyhow::anyhow!("png encode failed: {e}"))?;
        }
    }
    Ok(bytes)
}

/// Parse EXIF orientation (1..=8) from raw image bytes, if present.
fn extract_exif_orientation(bytes: &[u8]) -> Option<u16> {
    let mut cursor = Cursor::new(bytes);
    let reader = exif::Reader::new().read_from_container(&mut cursor).ok()?;
    let field = reader.get_field(exif::Tag::Orientation, exif::In::PRIMARY)?;
    match field.value {
        exif::Value::Short(ref v) => v.first().copied(),
        _ => field.display_value().to_string().trim().parse::<u16>().ok(),
    }
}

/// Rotate into view coordinates. Mirrored tags (2,4,5,7) are left as-is.
fn apply_exif_orientation(img: DynamicImage, tag: u16) -> DynamicImage {
    match tag {
        3 => DynamicImage::ImageRgba8(image::imageops::rotate180(&img)),
        6 => DynamicImage::ImageRgba8(image::imageops::rotate90(&img)),
        8 => DynamicImage::ImageRgba8(image::imageops::rotate270(&img)),
        _ => img,
    }
}
