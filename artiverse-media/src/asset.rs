use std::io::Cursor;

use chrono::{DateTime, Utc};
use image::ImageFormat;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{MediaError, MediaResult};

/// Stored metadata for an uploaded image
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaAsset {
    pub id: Uuid,
    pub filename: String,
    pub content_type: String,
    pub size_bytes: i64,
    pub width: u32,
    pub height: u32,
    pub storage_key: String,
    pub alt_text: Option<String>,
    pub uploaded_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

impl MediaAsset {
    pub fn new(info: &ImageInfo, filename: &str, size_bytes: usize, alt_text: Option<String>, uploaded_by: Option<Uuid>) -> Self {
        let id = Uuid::new_v4();
        Self {
            id,
            filename: sanitize_filename(filename),
            content_type: info.content_type.clone(),
            size_bytes: size_bytes as i64,
            width: info.width,
            height: info.height,
            storage_key: original_key(id, &info.extension),
            alt_text: alt_text.filter(|a| !a.trim().is_empty()),
            uploaded_by,
            created_at: Utc::now(),
        }
    }

    /// Directory holding every cached rendition of this asset
    pub fn variant_prefix(&self) -> String {
        format!("variants/{}", self.id)
    }

    pub fn variant_key(&self, params_hash: &str) -> String {
        format!("variants/{}/{}", self.id, params_hash)
    }

    pub fn source_format(&self) -> Option<ImageFormat> {
        ImageFormat::from_mime_type(&self.content_type)
    }
}

pub fn original_key(id: Uuid, extension: &str) -> String {
    format!("originals/{}.{}", id, extension)
}

/// Keep the last path segment and a conservative character set.
pub fn sanitize_filename(name: &str) -> String {
    let base = name.rsplit(['/', '\\']).next().unwrap_or(name);
    let cleaned: String = base
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') { c } else { '_' })
        .take(120)
        .collect();
    let cleaned = cleaned.trim_start_matches('.').to_string();
    if cleaned.is_empty() {
        "upload".to_string()
    } else {
        cleaned
    }
}

/// Accepted uploads
#[derive(Debug, Clone)]
pub struct UploadPolicy {
    pub max_bytes: usize,
    pub allowed: Vec<ImageFormat>,
}

impl Default for UploadPolicy {
    fn default() -> Self {
        Self {
            max_bytes: 20 * 1024 * 1024,
            allowed: vec![ImageFormat::Jpeg, ImageFormat::Png, ImageFormat::WebP, ImageFormat::Gif],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageInfo {
    pub format: ImageFormat,
    pub content_type: String,
    pub extension: String,
    pub width: u32,
    pub height: u32,
}

/// Validate an upload against the policy. The format is sniffed from the
/// bytes, never trusted from the client's content type.
pub fn inspect(bytes: &[u8], policy: &UploadPolicy) -> MediaResult<ImageInfo> {
    if bytes.is_empty() {
        return Err(MediaError::Invalid("empty file".into()));
    }
    if bytes.len() > policy.max_bytes {
        return Err(MediaError::TooLarge { size: bytes.len(), limit: policy.max_bytes });
    }

    let format = image::guess_format(bytes)
        .map_err(|_| MediaError::UnsupportedType("unrecognised image data".into()))?;
    if !policy.allowed.contains(&format) {
        return Err(MediaError::UnsupportedType(format!("{:?}", format)));
    }

    let (width, height) = image::ImageReader::with_format(Cursor::new(bytes), format).into_dimensions()?;
    if width == 0 || height == 0 {
        return Err(MediaError::Invalid("image has no pixels".into()));
    }

    Ok(ImageInfo {
        format,
        content_type: format.to_mime_type().to_string(),
        extension: format.extensions_str().first().copied().unwrap_or("bin").to_string(),
        width,
        height,
    })
}
