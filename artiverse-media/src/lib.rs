//! Uploaded images and their on-the-fly renditions.

pub mod asset;
pub mod storage;
pub mod transform;

pub use asset::{inspect, ImageInfo, MediaAsset, UploadPolicy};
pub use storage::{LocalStorage, MediaStorage};
pub use transform::{render, Fit, OutputFormat, Rendition, TransformParams, TransformQuery, Watermark};

#[derive(Debug, thiserror::Error)]
pub enum MediaError {
    #[error("Invalid media: {0}")]
    Invalid(String),

    #[error("File too large: {size} bytes (limit {limit})")]
    TooLarge { size: usize, limit: usize },

    #[error("Unsupported media type: {0}")]
    UnsupportedType(String),

    #[error("Invalid storage key: {0}")]
    InvalidKey(String),

    #[error("Image processing failed: {0}")]
    Image(#[from] image::ImageError),

    #[error("Storage I/O failed: {0}")]
    Io(#[from] std::io::Error),
}

pub type MediaResult<T> = Result<T, MediaError>;
