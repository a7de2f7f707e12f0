pub mod analytics;
pub mod events;
pub mod identity;
pub mod notification;
pub mod payment;
pub mod ratelimit;
pub mod repository;

use artiverse_catalog::{CatalogError, InventoryError};
use artiverse_media::MediaError;
use artiverse_order::OrderError;
use uuid::Uuid;

#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("Validation failed: {0}")]
    Validation(String),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Conflict: {0}")]
    Conflict(String),
    #[error("Insufficient stock for artwork {artwork_id}")]
    InsufficientStock { artwork_id: Uuid },
    #[error("Authentication failed: {0}")]
    Authentication(String),
    #[error("Storage error: {0}")]
    Storage(String),
    #[error("Internal service error: {0}")]
    Internal(String),
}

pub type CoreResult<T> = Result<T, CoreError>;

impl From<CatalogError> for CoreError {
    fn from(err: CatalogError) -> Self {
        match err {
            CatalogError::Validation(msg) => CoreError::Validation(msg),
            CatalogError::NotFound(msg) => CoreError::NotFound(msg),
            CatalogError::Conflict(msg) => CoreError::Conflict(msg),
        }
    }
}

impl From<InventoryError> for CoreError {
    fn from(err: InventoryError) -> Self {
        match err {
            InventoryError::NotFound(id) => CoreError::NotFound(format!("artwork {}", id)),
            InventoryError::InsufficientStock { artwork_id, .. } => CoreError::InsufficientStock { artwork_id },
        }
    }
}

impl From<MediaError> for CoreError {
    fn from(err: MediaError) -> Self {
        match err {
            MediaError::Io(e) => CoreError::Storage(e.to_string()),
            MediaError::Image(e) => CoreError::Validation(format!("image could not be processed: {}", e)),
            other => CoreError::Validation(other.to_string()),
        }
    }
}

impl From<serde_json::Error> for CoreError {
    fn from(err: serde_json::Error) -> Self {
        CoreError::Internal(format!("serialization failed: {}", err))
    }
}

/// Order errors carry domain meaning the API renders itself; this
/// conversion only serves repository plumbing.
impl From<OrderError> for CoreError {
    fn from(err: OrderError) -> Self {
        match err {
            OrderError::NotFound(msg) => CoreError::NotFound(msg),
            OrderError::InsufficientStock { artwork_id } => CoreError::InsufficientStock { artwork_id },
            OrderError::InvalidTransition { .. } | OrderError::NotCancellable(_) => CoreError::Conflict(err.to_string()),
            OrderError::Validation(msg) => CoreError::Validation(msg),
            OrderError::CartNotReady(_) => CoreError::Validation(err.to_string()),
        }
    }
}
