pub mod models;
pub mod money;
pub mod pii;
pub mod slug;

pub use models::events::{AnalyticsEvent, EventKind, GalleryEvent};
pub use pii::Masked;
