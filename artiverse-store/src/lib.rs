pub mod analytics_repo;
pub mod app_config;
pub mod catalog_repo;
pub mod database;
pub mod events;
pub mod mailer;
pub mod media_repo;
pub mod memory;
pub mod order_repo;
pub mod redis_repo;
pub mod user_repo;

pub use analytics_repo::PgAnalyticsRepository;
pub use catalog_repo::{PgArtistRepository, PgArtworkRepository};
pub use database::DbClient;
pub use events::EventProducer;
pub use mailer::HttpMailer;
pub use media_repo::PgMediaRepository;
pub use memory::MemoryStore;
pub use order_repo::PgOrderRepository;
pub use redis_repo::RedisClient;
pub use user_repo::PgUserRepository;

use artiverse_core::CoreError;

/// Map driver errors onto the domain error, keeping constraint violations
/// distinguishable.
pub(crate) fn db_err(err: sqlx::Error) -> CoreError {
    if let Some(db) = err.as_database_error() {
        match db.code().as_deref() {
            Some("23505") => return CoreError::Conflict(db.message().to_string()),
            Some("23503") => return CoreError::Validation(format!("referenced record does not exist: {}", db.message())),
            Some("23514") => return CoreError::Validation(db.message().to_string()),
            _ => {}
        }
    }
    tracing::error!("Database error: {}", err);
    CoreError::Storage(err.to_string())
}
