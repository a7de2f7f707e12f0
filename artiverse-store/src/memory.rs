//! Process-local store used for development and tests.
//!
//! Every table sits behind one lock so multi-table writes (checkout taking
//! stock, cancellation restocking) stay atomic.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use artiverse_catalog::{
    Artist, ArtistQuery, Artwork, ArtworkQuery, ArtworkStatus, InventoryManager, Page,
};
use artiverse_core::analytics::EventStats;
use artiverse_core::identity::User;
use artiverse_core::repository::{
    AnalyticsRepository, ArtistRepository, ArtworkRepository, MediaRepository, OrderFilter, OrderRepository,
    UserRepository,
};
use artiverse_core::{CoreError, CoreResult};
use artiverse_media::MediaAsset;
use artiverse_order::{Order, OrderChange, OrderStatus, SalesReport};
use artiverse_shared::slug::unique_slug;
use artiverse_shared::AnalyticsEvent;

#[derive(Default)]
struct Tables {
    artworks: HashMap<Uuid, Artwork>,
    artists: HashMap<Uuid, Artist>,
    inventory: InventoryManager,
    orders: HashMap<Uuid, Order>,
    changes: Vec<OrderChange>,
    users: HashMap<Uuid, User>,
    media: HashMap<Uuid, MediaAsset>,
    events: Vec<AnalyticsEvent>,
}

impl Tables {
    fn sync_stock(&mut self, artwork_id: &Uuid) {
        let available = self.inventory.available(artwork_id);
        if let Some(artwork) = self.artworks.get_mut(artwork_id) {
            artwork.stock = available;
        }
    }

    fn artwork_slug(&self, base: &str, id: Uuid) -> String {
        unique_slug(base, |s| self.artworks.values().any(|a| a.id != id && a.slug == s))
    }

    fn artist_slug(&self, base: &str, id: Uuid) -> String {
        unique_slug(base, |s| self.artists.values().any(|a| a.id != id && a.slug == s))
    }
}

#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ArtworkRepository for MemoryStore {
    async fn create(&self, mut artwork: Artwork) -> CoreResult<Artwork> {
        let mut t = self.tables.write().await;
        artwork.slug = t.artwork_slug(&artwork.slug, artwork.id);
        t.inventory.initialize(artwork.id, artwork.stock);
        t.artworks.insert(artwork.id, artwork.clone());
        Ok(artwork)
    }

    async fn get(&self, id: Uuid) -> CoreResult<Option<Artwork>> {
        Ok(self.tables.read().await.artworks.get(&id).cloned())
    }

    async fn get_by_slug(&self, slug: &str) -> CoreResult<Option<Artwork>> {
        Ok(self.tables.read().await.artworks.values().find(|a| a.slug == slug).cloned())
    }

    async fn get_many(&self, ids: &[Uuid]) -> CoreResult<Vec<Artwork>> {
        let t = self.tables.read().await;
        Ok(ids.iter().filter_map(|id| t.artworks.get(id).cloned()).collect())
    }

    async fn update(&self, mut artwork: Artwork) -> CoreResult<Artwork> {
        let mut t = self.tables.write().await;
        if !t.artworks.contains_key(&artwork.id) {
            return Err(CoreError::NotFound(format!("artwork {}", artwork.id)));
        }
        artwork.slug = t.artwork_slug(&artwork.slug, artwork.id);
        artwork.stock = t.inventory.available(&artwork.id);
        t.artworks.insert(artwork.id, artwork.clone());
        Ok(artwork)
    }

    async fn set_stock(&self, id: Uuid, stock: i32) -> CoreResult<Artwork> {
        let mut t = self.tables.write().await;
        if !t.artworks.contains_key(&id) {
            return Err(CoreError::NotFound(format!("artwork {}", id)));
        }
        t.inventory.set(id, stock);
        t.sync_stock(&id);
        let artwork = t
            .artworks
            .get_mut(&id)
            .ok_or_else(|| CoreError::NotFound(format!("artwork {}", id)))?;
        artwork.updated_at = Utc::now();
        Ok(artwork.clone())
    }

    async fn search(&self, query: &ArtworkQuery) -> CoreResult<Page<Artwork>> {
        let t = self.tables.read().await;
        Ok(query.apply(t.artworks.values().cloned()))
    }

    async fn low_stock(&self, threshold: i32) -> CoreResult<Vec<Artwork>> {
        let t = self.tables.read().await;
        let mut hits: Vec<Artwork> = t
            .artworks
            .values()
            .filter(|a| matches!(a.status, ArtworkStatus::Published | ArtworkStatus::Draft) && a.stock <= threshold)
            .cloned()
            .collect();
        hits.sort_by(|a, b| a.stock.cmp(&b.stock).then_with(|| a.title.cmp(&b.title)));
        Ok(hits)
    }

    async fn count_by_artist(&self, artist_id: Uuid) -> CoreResult<u64> {
        let t = self.tables.read().await;
        Ok(t.artworks
            .values()
            .filter(|a| a.artist_id == artist_id && a.status != ArtworkStatus::Archived)
            .count() as u64)
    }

    async fn detach_media(&self, media_id: Uuid) -> CoreResult<()> {
        let mut t = self.tables.write().await;
        let now = Utc::now();
        for artwork in t.artworks.values_mut() {
            if artwork.image_ids.contains(&media_id) {
                artwork.image_ids.retain(|id| *id != media_id);
                artwork.updated_at = now;
            }
        }
        Ok(())
    }
}

#[async_trait]
impl ArtistRepository for MemoryStore {
    async fn create(&self, mut artist: Artist) -> CoreResult<Artist> {
        let mut t = self.tables.write().await;
        artist.slug = t.artist_slug(&artist.slug, artist.id);
        t.artists.insert(artist.id, artist.clone());
        Ok(artist)
    }

    async fn get(&self, id: Uuid) -> CoreResult<Option<Artist>> {
        Ok(self.tables.read().await.artists.get(&id).cloned())
    }

    async fn get_by_slug(&self, slug: &str) -> CoreResult<Option<Artist>> {
        Ok(self.tables.read().await.artists.values().find(|a| a.slug == slug).cloned())
    }

    async fn get_many(&self, ids: &[Uuid]) -> CoreResult<Vec<Artist>> {
        let t = self.tables.read().await;
        Ok(ids.iter().filter_map(|id| t.artists.get(id).cloned()).collect())
    }

    async fn update(&self, mut artist: Artist) -> CoreResult<Artist> {
        let mut t = self.tables.write().await;
        if !t.artists.contains_key(&artist.id) {
            return Err(CoreError::NotFound(format!("artist {}", artist.id)));
        }
        artist.slug = t.artist_slug(&artist.slug, artist.id);
        t.artists.insert(artist.id, artist.clone());
        Ok(artist)
    }

    async fn delete(&self, id: Uuid) -> CoreResult<bool> {
        Ok(self.tables.write().await.artists.remove(&id).is_some())
    }

    async fn list(&self, query: &ArtistQuery) -> CoreResult<Page<Artist>> {
        let t = self.tables.read().await;
        Ok(query.apply(t.artists.values().cloned()))
    }
}

#[async_trait]
impl OrderRepository for MemoryStore {
    async fn create(&self, order: &Order) -> CoreResult<()> {
        let mut t = self.tables.write().await;
        if t.orders.contains_key(&order.id) {
            return Err(CoreError::Conflict(format!("order {} already exists", order.id)));
        }
        let lines = order.stock_lines();
        t.inventory.reserve_all(&lines)?;
        for (artwork_id, _) in &lines {
            t.sync_stock(artwork_id);
        }
        t.orders.insert(order.id, order.clone());
        Ok(())
    }

    async fn get(&self, id: Uuid) -> CoreResult<Option<Order>> {
        Ok(self.tables.read().await.orders.get(&id).cloned())
    }

    async fn get_by_number(&self, order_number: &str) -> CoreResult<Option<Order>> {
        let number = order_number.trim();
        let t = self.tables.read().await;
        Ok(t.orders.values().find(|o| o.order_number.eq_ignore_ascii_case(number)).cloned())
    }

    async fn update(
        &self,
        order: &Order,
        expected: OrderStatus,
        change: Option<&OrderChange>,
        restock: bool,
    ) -> CoreResult<()> {
        let mut t = self.tables.write().await;
        let current = t
            .orders
            .get(&order.id)
            .map(|o| o.status)
            .ok_or_else(|| CoreError::NotFound(format!("order {}", order.id)))?;
        if current != expected {
            return Err(CoreError::Conflict(format!(
                "order {} is {}, not {}",
                order.order_number,
                current.as_str(),
                expected.as_str()
            )));
        }
        if restock {
            for (artwork_id, quantity) in order.stock_lines() {
                // Artworks deleted since checkout have nothing to restock.
                if t.inventory.release(&artwork_id, quantity).is_ok() {
                    t.sync_stock(&artwork_id);
                }
            }
        }
        if let Some(change) = change {
            t.changes.push(change.clone());
        }
        t.orders.insert(order.id, order.clone());
        Ok(())
    }

    async fn list(&self, filter: &OrderFilter) -> CoreResult<Page<Order>> {
        let t = self.tables.read().await;
        let mut hits: Vec<Order> = t.orders.values().filter(|o| filter.matches(o)).cloned().collect();
        hits.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(Page::slice(hits, filter.page(), filter.per_page()))
    }

    async fn sales_report(&self, since: DateTime<Utc>) -> CoreResult<SalesReport> {
        let t = self.tables.read().await;
        Ok(SalesReport::from_orders(t.orders.values(), Some(since)))
    }

    async fn history(&self, order_id: Uuid) -> CoreResult<Vec<OrderChange>> {
        let t = self.tables.read().await;
        Ok(t.changes.iter().filter(|c| c.order_id == order_id).cloned().collect())
    }

    async fn stale_pending(&self, cutoff: DateTime<Utc>) -> CoreResult<Vec<Order>> {
        let t = self.tables.read().await;
        let mut hits: Vec<Order> = t
            .orders
            .values()
            .filter(|o| o.status == OrderStatus::Pending && o.created_at < cutoff)
            .cloned()
            .collect();
        hits.sort_by_key(|o| o.created_at);
        Ok(hits)
    }
}

#[async_trait]
impl UserRepository for MemoryStore {
    async fn create(&self, user: &User) -> CoreResult<()> {
        let mut t = self.tables.write().await;
        if t.users.values().any(|u| u.email == user.email) {
            return Err(CoreError::Conflict("email is already registered".into()));
        }
        t.users.insert(user.id, user.clone());
        Ok(())
    }

    async fn get(&self, id: Uuid) -> CoreResult<Option<User>> {
        Ok(self.tables.read().await.users.get(&id).cloned())
    }

    async fn get_by_email(&self, email: &str) -> CoreResult<Option<User>> {
        Ok(self.tables.read().await.users.values().find(|u| u.email == email).cloned())
    }

    async fn update(&self, user: &User) -> CoreResult<()> {
        let mut t = self.tables.write().await;
        if !t.users.contains_key(&user.id) {
            return Err(CoreError::NotFound(format!("user {}", user.id)));
        }
        if t.users.values().any(|u| u.id != user.id && u.email == user.email) {
            return Err(CoreError::Conflict("email is already registered".into()));
        }
        t.users.insert(user.id, user.clone());
        Ok(())
    }

    async fn list(&self, page: u32, per_page: u32) -> CoreResult<Page<User>> {
        let t = self.tables.read().await;
        let mut users: Vec<User> = t.users.values().cloned().collect();
        users.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(Page::slice(users, page.max(1), per_page.clamp(1, 100)))
    }
}

#[async_trait]
impl MediaRepository for MemoryStore {
    async fn create(&self, asset: &MediaAsset) -> CoreResult<()> {
        self.tables.write().await.media.insert(asset.id, asset.clone());
        Ok(())
    }

    async fn get(&self, id: Uuid) -> CoreResult<Option<MediaAsset>> {
        Ok(self.tables.read().await.media.get(&id).cloned())
    }

    async fn list(&self, page: u32, per_page: u32) -> CoreResult<Page<MediaAsset>> {
        let t = self.tables.read().await;
        let mut assets: Vec<MediaAsset> = t.media.values().cloned().collect();
        assets.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(Page::slice(assets, page.max(1), per_page.clamp(1, 100)))
    }

    async fn delete(&self, id: Uuid) -> CoreResult<bool> {
        Ok(self.tables.write().await.media.remove(&id).is_some())
    }
}

#[async_trait]
impl AnalyticsRepository for MemoryStore {
    async fn record(&self, event: &AnalyticsEvent) -> CoreResult<()> {
        self.tables.write().await.events.push(event.clone());
        Ok(())
    }

    async fn stats_since(&self, since: DateTime<Utc>, top: usize) -> CoreResult<EventStats> {
        let t = self.tables.read().await;
        Ok(EventStats::from_events(&t.events, since, top))
    }
}
