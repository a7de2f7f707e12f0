//! Resize, watermark and re-encode images.
//!
//! Everything here is CPU-bound; async callers run [`render`] on the
//! blocking pool.

use std::io::Cursor;

use image::codecs::jpeg::JpegEncoder;
use image::imageops::{self, FilterType};
use image::{DynamicImage, ImageFormat, Rgba, RgbaImage};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::{MediaError, MediaResult};

pub const MAX_DIMENSION: u32 = 4000;
pub const DEFAULT_QUALITY: u8 = 82;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Fit {
    /// Fill the box, cropping the overflow around the centre
    Cover,
    /// Fit inside the box, keeping aspect ratio, never upscaling
    #[default]
    Contain,
    /// Stretch to the exact box
    Fill,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    Jpeg,
    Png,
    Webp,
}

impl OutputFormat {
    pub fn content_type(&self) -> &'static str {
        match self {
            OutputFormat::Jpeg => "image/jpeg",
            OutputFormat::Png => "image/png",
            OutputFormat::Webp => "image/webp",
        }
    }

    /// Keep the source format where we can encode it; GIFs become PNGs.
    pub fn for_source(format: ImageFormat) -> Self {
        match format {
            ImageFormat::Jpeg => OutputFormat::Jpeg,
            ImageFormat::WebP => OutputFormat::Webp,
            _ => OutputFormat::Png,
        }
    }
}

/// Raw query string form: `?w=800&h=600&fit=cover&q=70&format=webp&wm=true`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TransformQuery {
    pub w: Option<u32>,
    pub h: Option<u32>,
    pub fit: Option<Fit>,
    pub q: Option<u8>,
    pub format: Option<OutputFormat>,
    pub wm: Option<bool>,
}

impl TransformQuery {
    pub fn is_empty(&self) -> bool {
        self.w.is_none() && self.h.is_none() && self.fit.is_none() && self.q.is_none() && self.format.is_none() && self.wm.is_none()
    }

    pub fn validate(self) -> MediaResult<TransformParams> {
        for (name, value) in [("w", self.w), ("h", self.h)] {
            if let Some(v) = value {
                if v == 0 || v > MAX_DIMENSION {
                    return Err(MediaError::Invalid(format!("{} must be between 1 and {}", name, MAX_DIMENSION)));
                }
            }
        }
        let quality = self.q.unwrap_or(DEFAULT_QUALITY);
        if !(1..=100).contains(&quality) {
            return Err(MediaError::Invalid("q must be between 1 and 100".into()));
        }
        Ok(TransformParams {
            width: self.w,
            height: self.h,
            fit: self.fit.unwrap_or_default(),
            quality,
            format: self.format,
            watermark: self.wm.unwrap_or(false),
        })
    }
}

/// Validated rendition request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransformParams {
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub fit: Fit,
    pub quality: u8,
    pub format: Option<OutputFormat>,
    pub watermark: bool,
}

impl TransformParams {
    /// Stable cache key for the rendition of a given source under the
    /// configured watermark.
    pub fn cache_key(&self, source: ImageFormat, watermark: Option<&Watermark>) -> String {
        let output = self.format.unwrap_or_else(|| OutputFormat::for_source(source));
        // Only the JPEG encoder takes a quality.
        let quality = match output {
            OutputFormat::Jpeg => self.quality.to_string(),
            OutputFormat::Png | OutputFormat::Webp => "-".to_string(),
        };
        let mark = match (self.watermark, watermark) {
            (true, Some(mark)) => mark.fingerprint(),
            _ => "none".to_string(),
        };
        let canonical = format!(
            "w={:?};h={:?};fit={:?};q={};f={:?};wm={}",
            self.width, self.height, self.fit, quality, output, mark
        );
        hex::encode(Sha256::digest(canonical.as_bytes()))
    }

    /// Output size for a `src_w` x `src_h` source.
    pub fn target_size(&self, src_w: u32, src_h: u32) -> (u32, u32) {
        let ratio = src_w as f64 / src_h as f64;
        match (self.width, self.height) {
            (None, None) => (src_w, src_h),
            (Some(w), None) => {
                let w = w.min(src_w);
                (w, ((w as f64 / ratio).round() as u32).max(1))
            }
            (None, Some(h)) => {
                let h = h.min(src_h);
                (((h as f64 * ratio).round() as u32).max(1), h)
            }
            (Some(w), Some(h)) => match self.fit {
                Fit::Cover | Fit::Fill => (w, h),
                Fit::Contain => {
                    let scale = (w as f64 / src_w as f64).min(h as f64 / src_h as f64).min(1.0);
                    (
                        ((src_w as f64 * scale).round() as u32).max(1),
                        ((src_h as f64 * scale).round() as u32).max(1),
                    )
                }
            },
        }
    }
}

/// What gets stamped onto protected renditions
#[derive(Debug, Clone)]
pub enum Watermark {
    /// A logo, scaled to a fraction of the output width, bottom-right
    Logo { image: RgbaImage, digest: String, opacity: f32, width_ratio: f32 },
    /// Diagonal light bands across the whole image
    Bands { opacity: f32 },
}

impl Watermark {
    pub fn logo(bytes: &[u8], opacity: f32) -> MediaResult<Self> {
        let image = image::load_from_memory(bytes)?.to_rgba8();
        let digest = hex::encode(Sha256::digest(bytes));
        Ok(Watermark::Logo { image, digest, opacity: opacity.clamp(0.0, 1.0), width_ratio: 0.25 })
    }

    pub fn bands(opacity: f32) -> Self {
        Watermark::Bands { opacity: opacity.clamp(0.0, 1.0) }
    }

    /// Identifies the rendered look, so cached renditions follow config changes.
    pub fn fingerprint(&self) -> String {
        match self {
            Watermark::Logo { digest, opacity, width_ratio, .. } => {
                format!("logo:{}:{:.3}:{:.3}", digest, opacity, width_ratio)
            }
            Watermark::Bands { opacity } => format!("bands:{:.3}", opacity),
        }
    }

    fn apply(&self, base: &mut RgbaImage) {
        let (w, h) = base.dimensions();
        match self {
            Watermark::Logo { image, opacity, width_ratio, .. } => {
                let target_w = ((w as f32 * width_ratio).round() as u32).clamp(1, w);
                let target_h = ((image.height() as f32 * target_w as f32 / image.width() as f32).round() as u32).clamp(1, h);
                let mut logo = imageops::resize(image, target_w, target_h, FilterType::Triangle);
                for px in logo.pixels_mut() {
                    px.0[3] = (px.0[3] as f32 * opacity).round() as u8;
                }
                let margin = (w.min(h) / 40) as i64;
                let x = (w as i64 - target_w as i64 - margin).max(0);
                let y = (h as i64 - target_h as i64 - margin).max(0);
                imageops::overlay(base, &logo, x, y);
            }
            Watermark::Bands { opacity } => {
                let period = (w.max(h) / 8).max(16);
                let band = (period / 6).max(2);
                for (x, y, px) in base.enumerate_pixels_mut() {
                    if (x + y) % period < band {
                        blend_white(px, *opacity);
                    }
                }
            }
        }
    }
}

fn blend_white(px: &mut Rgba<u8>, alpha: f32) {
    for c in 0..3 {
        let v = px.0[c] as f32 * (1.0 - alpha) + 255.0 * alpha;
        px.0[c] = v.round().clamp(0.0, 255.0) as u8;
    }
}

/// Encoded output of [`render`]
#[derive(Debug, Clone)]
pub struct Rendition {
    pub bytes: Vec<u8>,
    pub content_type: &'static str,
    pub width: u32,
    pub height: u32,
}

/// Decode `source`, resize, optionally watermark, and encode.
pub fn render(source: &[u8], params: &TransformParams, watermark: Option<&Watermark>) -> MediaResult<Rendition> {
    let source_format = image::guess_format(source)
        .map_err(|_| MediaError::UnsupportedType("unrecognised image data".into()))?;
    let img = image::load_from_memory_with_format(source, source_format)?;

    let (tw, th) = params.target_size(img.width(), img.height());
    let resized = if (tw, th) == (img.width(), img.height()) {
        img
    } else {
        match params.fit {
            Fit::Cover if params.width.is_some() && params.height.is_some() => img.resize_to_fill(tw, th, FilterType::Lanczos3),
            Fit::Fill if params.width.is_some() && params.height.is_some() => img.resize_exact(tw, th, FilterType::Lanczos3),
            _ => img.resize(tw, th, FilterType::Lanczos3),
        }
    };

    let output = match (params.watermark, watermark) {
        (true, Some(mark)) => {
            let mut canvas = resized.to_rgba8();
            mark.apply(&mut canvas);
            DynamicImage::ImageRgba8(canvas)
        }
        _ => resized,
    };

    let format = params.format.unwrap_or_else(|| OutputFormat::for_source(source_format));
    let bytes = encode(&output, format, params.quality)?;

    Ok(Rendition {
        bytes,
        content_type: format.content_type(),
        width: output.width(),
        height: output.height(),
    })
}

fn encode(img: &DynamicImage, format: OutputFormat, quality: u8) -> MediaResult<Vec<u8>> {
    let mut out = Cursor::new(Vec::new());
    match format {
        OutputFormat::Jpeg => {
            // JPEG has no alpha channel.
            let rgb = DynamicImage::ImageRgb8(img.to_rgb8());
            rgb.write_with_encoder(JpegEncoder::new_with_quality(&mut out, quality))?;
        }
        OutputFormat::Png => img.write_to(&mut out, ImageFormat::Png)?,
        OutputFormat::Webp => DynamicImage::ImageRgba8(img.to_rgba8()).write_to(&mut out, ImageFormat::WebP)?,
    }
    Ok(out.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::asset::tests::png_bytes;

    fn params(query: TransformQuery) -> TransformParams {
        query.validate().unwrap()
    }

    #[test]
    fn test_query_validation() {
        assert!(TransformQuery { w: Some(0), ..Default::default() }.validate().is_err());
        assert!(TransformQuery { h: Some(MAX_DIMENSION + 1), ..Default::default() }.validate().is_err());
        assert!(TransformQuery { q: Some(0), ..Default::default() }.validate().is_err());
        let p = params(TransformQuery::default());
        assert_eq!(p.quality, DEFAULT_QUALITY);
        assert_eq!(p.fit, Fit::Contain);
        assert!(TransformQuery::default().is_empty());
    }

    #[test]
    fn test_target_size() {
        let contain = params(TransformQuery { w: Some(100), h: Some(100), ..Default::default() });
        assert_eq!(contain.target_size(400, 200), (100, 50));
        // Contain never upscales.
        assert_eq!(contain.target_size(50, 20), (50, 20));

        let cover = params(TransformQuery { w: Some(100), h: Some(100), fit: Some(Fit::Cover), ..Default::default() });
        assert_eq!(cover.target_size(400, 200), (100, 100));

        let width_only = params(TransformQuery { w: Some(200), ..Default::default() });
        assert_eq!(width_only.target_size(400, 300), (200, 150));
        assert_eq!(width_only.target_size(100, 100), (100, 100));
    }

    fn white_logo() -> Vec<u8> {
        let logo = RgbaImage::from_pixel(40, 10, Rgba([255, 255, 255, 255]));
        let mut out = Cursor::new(Vec::new());
        DynamicImage::ImageRgba8(logo).write_to(&mut out, ImageFormat::Png).unwrap();
        out.into_inner()
    }

    #[test]
    fn test_cache_key_is_stable_and_distinct() {
        let a = params(TransformQuery { w: Some(300), ..Default::default() });
        let b = params(TransformQuery { w: Some(300), format: Some(OutputFormat::Png), ..Default::default() });
        assert_eq!(a.cache_key(ImageFormat::Png, None), a.cache_key(ImageFormat::Png, None));
        // Explicit PNG and implicit PNG for a PNG source are the same rendition.
        assert_eq!(a.cache_key(ImageFormat::Png, None), b.cache_key(ImageFormat::Png, None));
        assert_ne!(a.cache_key(ImageFormat::Jpeg, None), b.cache_key(ImageFormat::Jpeg, None));
        assert_eq!(a.cache_key(ImageFormat::Png, None).len(), 64);
    }

    #[test]
    fn test_cache_key_ignores_quality_for_lossless_output() {
        let png_q = params(TransformQuery { w: Some(300), q: Some(40), format: Some(OutputFormat::Png), ..Default::default() });
        let png = params(TransformQuery { w: Some(300), format: Some(OutputFormat::Png), ..Default::default() });
        assert_eq!(png_q.cache_key(ImageFormat::Png, None), png.cache_key(ImageFormat::Png, None));

        let jpeg_q = TransformParams { format: Some(OutputFormat::Jpeg), ..png_q };
        let jpeg = TransformParams { format: Some(OutputFormat::Jpeg), ..png };
        assert_ne!(jpeg_q.cache_key(ImageFormat::Png, None), jpeg.cache_key(ImageFormat::Png, None));
    }

    #[test]
    fn test_cache_key_follows_watermark_config() {
        let marked = TransformParams { watermark: true, ..params(TransformQuery { w: Some(300), ..Default::default() }) };
        let faint = Watermark::bands(0.2);
        let strong = Watermark::bands(0.6);
        let logo = Watermark::logo(&white_logo(), 0.6).unwrap();

        let key = |mark: &Watermark| marked.cache_key(ImageFormat::Png, Some(mark));
        assert_eq!(key(&faint), key(&Watermark::bands(0.2)));
        assert_ne!(key(&faint), key(&strong));
        assert_ne!(key(&strong), key(&logo));

        // Unmarked renditions do not depend on the watermark at all.
        let plain = TransformParams { watermark: false, ..marked };
        assert_eq!(plain.cache_key(ImageFormat::Png, Some(&faint)), plain.cache_key(ImageFormat::Png, None));
    }

    #[test]
    fn test_render_resizes_and_converts() {
        let source = png_bytes(400, 200);
        let p = params(TransformQuery { w: Some(100), format: Some(OutputFormat::Jpeg), q: Some(60), ..Default::default() });
        let out = render(&source, &p, None).unwrap();
        assert_eq!(out.content_type, "image/jpeg");
        assert_eq!((out.width, out.height), (100, 50));
        assert_eq!(image::guess_format(&out.bytes).unwrap(), ImageFormat::Jpeg);
    }

    #[test]
    fn test_render_cover_crops() {
        let source = png_bytes(400, 200);
        let p = params(TransformQuery { w: Some(80), h: Some(80), fit: Some(Fit::Cover), ..Default::default() });
        let out = render(&source, &p, None).unwrap();
        assert_eq!((out.width, out.height), (80, 80));
        assert_eq!(out.content_type, "image/png");
    }

    #[test]
    fn test_watermark_changes_pixels() {
        let source = png_bytes(120, 120);
        let plain = params(TransformQuery { format: Some(OutputFormat::Png), ..Default::default() });
        let marked = TransformParams { watermark: true, ..plain };

        let a = render(&source, &plain, Some(&Watermark::bands(0.5))).unwrap();
        let b = render(&source, &marked, Some(&Watermark::bands(0.5))).unwrap();
        assert_ne!(a.bytes, b.bytes);

        let logo = Watermark::logo(&white_logo(), 0.8).unwrap();
        let c = render(&source, &marked, Some(&logo)).unwrap();
        let unmarked = image::load_from_memory(&a.bytes).unwrap().to_rgba8();
        let decoded = image::load_from_memory(&c.bytes).unwrap().to_rgba8();
        assert_eq!(decoded.dimensions(), (120, 120));

        // The logo lands bottom-right (x 87..117, y 109..117) and lightens it.
        let before = unmarked.get_pixel(100, 112);
        let after = decoded.get_pixel(100, 112);
        assert_ne!(before, after);
        assert!(after.0[1] > before.0[1] + 100);
        // The opposite corner is untouched.
        assert_eq!(unmarked.get_pixel(5, 5), decoded.get_pixel(5, 5));
        assert!(render(&source, &marked, None).is_ok());
    }

    #[test]
    fn test_webp_output() {
        let source = png_bytes(32, 32);
        let p = params(TransformQuery { format: Some(OutputFormat::Webp), ..Default::default() });
        let out = render(&source, &p, None).unwrap();
        assert_eq!(image::guess_format(&out.bytes).unwrap(), ImageFormat::WebP);
    }
}
