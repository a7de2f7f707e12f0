use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use artiverse_catalog::{Artist, ArtistQuery, Artwork, ArtworkQuery, Page};
use artiverse_media::MediaAsset;
use artiverse_order::{Order, OrderChange, OrderStatus, SalesReport};
use artiverse_shared::AnalyticsEvent;

use crate::analytics::EventStats;
use crate::identity::User;
use crate::CoreResult;

/// Repository trait for artwork data access
#[async_trait]
pub trait ArtworkRepository: Send + Sync {
    /// Persist a new artwork. The stored slug may gain a numeric suffix.
    async fn create(&self, artwork: Artwork) -> CoreResult<Artwork>;

    async fn get(&self, id: Uuid) -> CoreResult<Option<Artwork>>;

    async fn get_by_slug(&self, slug: &str) -> CoreResult<Option<Artwork>>;

    async fn get_many(&self, ids: &[Uuid]) -> CoreResult<Vec<Artwork>>;

    /// Overwrite an existing artwork, resolving slug collisions like `create`.
    /// Stock is not written; the returned artwork carries the stored count.
    async fn update(&self, artwork: Artwork) -> CoreResult<Artwork>;

    /// Admin correction of the available count.
    async fn set_stock(&self, id: Uuid, stock: i32) -> CoreResult<Artwork>;

    async fn search(&self, query: &ArtworkQuery) -> CoreResult<Page<Artwork>>;

    /// Published or draft artworks at or below `threshold` units
    async fn low_stock(&self, threshold: i32) -> CoreResult<Vec<Artwork>>;

    /// Artworks referencing the artist, excluding archived ones
    async fn count_by_artist(&self, artist_id: Uuid) -> CoreResult<u64>;

    /// Drop a deleted media id from every artwork gallery.
    async fn detach_media(&self, media_id: Uuid) -> CoreResult<()>;
}

/// Repository trait for artist profiles
#[async_trait]
pub trait ArtistRepository: Send + Sync {
    async fn create(&self, artist: Artist) -> CoreResult<Artist>;

    async fn get(&self, id: Uuid) -> CoreResult<Option<Artist>>;

    async fn get_by_slug(&self, slug: &str) -> CoreResult<Option<Artist>>;

    async fn get_many(&self, ids: &[Uuid]) -> CoreResult<Vec<Artist>>;

    async fn update(&self, artist: Artist) -> CoreResult<Artist>;

    async fn delete(&self, id: Uuid) -> CoreResult<bool>;

    async fn list(&self, query: &ArtistQuery) -> CoreResult<Page<Artist>>;
}

/// Admin order listing filter
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OrderFilter {
    pub status: Option<OrderStatus>,
    pub user_id: Option<Uuid>,
    pub page: Option<u32>,
    pub per_page: Option<u32>,
}

impl OrderFilter {
    pub fn page(&self) -> u32 {
        self.page.unwrap_or(1).max(1)
    }

    pub fn per_page(&self) -> u32 {
        self.per_page.unwrap_or(20).clamp(1, 100)
    }

    pub fn offset(&self) -> u64 {
        u64::from(self.page() - 1) * u64::from(self.per_page())
    }

    pub fn matches(&self, order: &Order) -> bool {
        self.status.map_or(true, |s| order.status == s) && self.user_id.map_or(true, |u| order.user_id == Some(u))
    }
}

/// Repository trait for order data access
#[async_trait]
pub trait OrderRepository: Send + Sync {
    /// Insert the order and its items while taking stock for every line.
    /// All-or-nothing: fails with `CoreError::InsufficientStock` and writes
    /// nothing when any line cannot be covered.
    async fn create(&self, order: &Order) -> CoreResult<()>;

    async fn get(&self, id: Uuid) -> CoreResult<Option<Order>>;

    async fn get_by_number(&self, order_number: &str) -> CoreResult<Option<Order>>;

    /// Save status and payment fields, append the audit record when given,
    /// and put the order's stock back when `restock` is set.
    ///
    /// Only applies while the stored order is still in `expected` status;
    /// otherwise fails with `CoreError::Conflict` and writes nothing.
    async fn update(
        &self,
        order: &Order,
        expected: OrderStatus,
        change: Option<&OrderChange>,
        restock: bool,
    ) -> CoreResult<()>;

    /// Newest first
    async fn list(&self, filter: &OrderFilter) -> CoreResult<Page<Order>>;

    /// Sales figures for orders created since `since`, aggregated by the store
    async fn sales_report(&self, since: DateTime<Utc>) -> CoreResult<SalesReport>;

    async fn history(&self, order_id: Uuid) -> CoreResult<Vec<OrderChange>>;

    /// Pending orders created before `cutoff`
    async fn stale_pending(&self, cutoff: DateTime<Utc>) -> CoreResult<Vec<Order>>;
}

/// Repository trait for accounts
#[async_trait]
pub trait UserRepository: Send + Sync {
    /// Fails with `CoreError::Conflict` when the email is taken.
    async fn create(&self, user: &User) -> CoreResult<()>;

    async fn get(&self, id: Uuid) -> CoreResult<Option<User>>;

    async fn get_by_email(&self, email: &str) -> CoreResult<Option<User>>;

    async fn update(&self, user: &User) -> CoreResult<()>;

    async fn list(&self, page: u32, per_page: u32) -> CoreResult<Page<User>>;
}

/// Repository trait for uploaded media metadata
#[async_trait]
pub trait MediaRepository: Send + Sync {
    async fn create(&self, asset: &MediaAsset) -> CoreResult<()>;

    async fn get(&self, id: Uuid) -> CoreResult<Option<MediaAsset>>;

    async fn list(&self, page: u32, per_page: u32) -> CoreResult<Page<MediaAsset>>;

    async fn delete(&self, id: Uuid) -> CoreResult<bool>;
}

/// Repository trait for tracked storefront events
#[async_trait]
pub trait AnalyticsRepository: Send + Sync {
    async fn record(&self, event: &AnalyticsEvent) -> CoreResult<()>;

    /// Counts, sessions and the `top` most viewed artworks since `since`
    async fn stats_since(&self, since: DateTime<Utc>, top: usize) -> CoreResult<EventStats>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_order_filter_paging() {
        let filter = OrderFilter { page: Some(0), per_page: Some(500), ..Default::default() };
        assert_eq!(filter.page(), 1);
        assert_eq!(filter.per_page(), 100);
        assert_eq!(filter.offset(), 0);

        let filter = OrderFilter { page: Some(3), per_page: Some(10), ..Default::default() };
        assert_eq!(filter.offset(), 20);
    }
}
