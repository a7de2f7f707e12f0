use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::artist::Artist;
use crate::product::{Artwork, ArtworkStatus, Medium};

pub const DEFAULT_PER_PAGE: u32 = 24;
pub const MAX_PER_PAGE: u32 = 100;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum ArtworkSort {
    #[default]
    Newest,
    Oldest,
    PriceAsc,
    PriceDesc,
    Title,
}

impl ArtworkSort {
    /// Unknown keys fall back to newest-first.
    pub fn parse(s: &str) -> Self {
        match s {
            "oldest" => ArtworkSort::Oldest,
            "price_asc" => ArtworkSort::PriceAsc,
            "price_desc" => ArtworkSort::PriceDesc,
            "title" => ArtworkSort::Title,
            _ => ArtworkSort::Newest,
        }
    }
}

/// Catalog filter, as received on `GET /v1/artworks`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ArtworkQuery {
    pub q: Option<String>,
    pub artist_id: Option<Uuid>,
    pub medium: Option<Medium>,
    pub category: Option<String>,
    pub tag: Option<String>,
    pub min_price_cents: Option<i64>,
    pub max_price_cents: Option<i64>,
    pub featured: Option<bool>,
    pub on_sale: Option<bool>,
    pub in_stock: Option<bool>,
    pub status: Option<ArtworkStatus>,
    pub sort: Option<String>,
    pub page: Option<u32>,
    pub per_page: Option<u32>,
}

impl ArtworkQuery {
    /// Storefront view: only published artworks are visible.
    pub fn public(mut self) -> Self {
        self.status = Some(ArtworkStatus::Published);
        self
    }

    pub fn sort(&self) -> ArtworkSort {
        self.sort.as_deref().map(ArtworkSort::parse).unwrap_or_default()
    }

    pub fn page(&self) -> u32 {
        self.page.unwrap_or(1).max(1)
    }

    pub fn per_page(&self) -> u32 {
        self.per_page.unwrap_or(DEFAULT_PER_PAGE).clamp(1, MAX_PER_PAGE)
    }

    pub fn offset(&self) -> u64 {
        u64::from(self.page() - 1) * u64::from(self.per_page())
    }

    /// Lowercased, trimmed search text, if any
    pub fn text(&self) -> Option<String> {
        self.q
            .as_deref()
            .map(|q| q.trim().to_lowercase())
            .filter(|q| !q.is_empty())
    }

    pub fn matches(&self, artwork: &Artwork) -> bool {
        if let Some(status) = self.status {
            if artwork.status != status {
                return false;
            }
        }
        if let Some(artist_id) = self.artist_id {
            if artwork.artist_id != artist_id {
                return false;
            }
        }
        if let Some(medium) = self.medium {
            if artwork.medium != medium {
                return false;
            }
        }
        if let Some(category) = &self.category {
            if !artwork.category.as_deref().is_some_and(|c| c.eq_ignore_ascii_case(category)) {
                return false;
            }
        }
        if let Some(tag) = &self.tag {
            let tag = tag.trim().to_lowercase();
            if !artwork.tags.iter().any(|t| *t == tag) {
                return false;
            }
        }
        let price = artwork.effective_price_cents();
        if self.min_price_cents.is_some_and(|min| price < min) {
            return false;
        }
        if self.max_price_cents.is_some_and(|max| price > max) {
            return false;
        }
        if let Some(featured) = self.featured {
            if artwork.featured != featured {
                return false;
            }
        }
        if let Some(on_sale) = self.on_sale {
            if artwork.is_on_sale() != on_sale {
                return false;
            }
        }
        if let Some(in_stock) = self.in_stock {
            if (artwork.stock > 0) != in_stock {
                return false;
            }
        }
        if let Some(text) = self.text() {
            let in_title = artwork.title.to_lowercase().contains(&text);
            let in_description = artwork
                .description
                .as_deref()
                .is_some_and(|d| d.to_lowercase().contains(&text));
            let in_tags = artwork.tags.iter().any(|t| t.contains(&text));
            if !(in_title || in_description || in_tags) {
                return false;
            }
        }
        true
    }

    /// Filter, sort and paginate an in-memory collection.
    pub fn apply(&self, artworks: impl IntoIterator<Item = Artwork>) -> Page<Artwork> {
        let mut hits: Vec<Artwork> = artworks.into_iter().filter(|a| self.matches(a)).collect();

        match self.sort() {
            ArtworkSort::Newest => hits.sort_by(|a, b| b.created_at.cmp(&a.created_at)),
            ArtworkSort::Oldest => hits.sort_by(|a, b| a.created_at.cmp(&b.created_at)),
            ArtworkSort::PriceAsc => hits.sort_by_key(|a| a.effective_price_cents()),
            ArtworkSort::PriceDesc => hits.sort_by_key(|a| std::cmp::Reverse(a.effective_price_cents())),
            ArtworkSort::Title => hits.sort_by(|a, b| a.title.to_lowercase().cmp(&b.title.to_lowercase())),
        }

        Page::slice(hits, self.page(), self.per_page())
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ArtistQuery {
    pub q: Option<String>,
    pub featured: Option<bool>,
    pub page: Option<u32>,
    pub per_page: Option<u32>,
}

impl ArtistQuery {
    pub fn page(&self) -> u32 {
        self.page.unwrap_or(1).max(1)
    }

    pub fn per_page(&self) -> u32 {
        self.per_page.unwrap_or(DEFAULT_PER_PAGE).clamp(1, MAX_PER_PAGE)
    }

    pub fn offset(&self) -> u64 {
        u64::from(self.page() - 1) * u64::from(self.per_page())
    }

    pub fn matches(&self, artist: &Artist) -> bool {
        if let Some(featured) = self.featured {
            if artist.featured != featured {
                return false;
            }
        }
        match self.q.as_deref().map(|q| q.trim().to_lowercase()).filter(|q| !q.is_empty()) {
            Some(q) => artist.name.to_lowercase().contains(&q),
            None => true,
        }
    }

    pub fn apply(&self, artists: impl IntoIterator<Item = Artist>) -> Page<Artist> {
        let mut hits: Vec<Artist> = artists.into_iter().filter(|a| self.matches(a)).collect();
        hits.sort_by(|a, b| a.name.to_lowercase().cmp(&b.name.to_lowercase()));
        Page::slice(hits, self.page(), self.per_page())
    }
}

/// One page of results
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: u64,
    pub page: u32,
    pub per_page: u32,
    pub total_pages: u32,
}

impl<T> Page<T> {
    pub fn new(items: Vec<T>, total: u64, page: u32, per_page: u32) -> Self {
        let per_page = per_page.max(1);
        let total_pages = total.div_ceil(u64::from(per_page)) as u32;
        Self { items, total, page, per_page, total_pages }
    }

    /// Cut `page` out of a fully materialised result set.
    pub fn slice(all: Vec<T>, page: u32, per_page: u32) -> Self {
        let total = all.len() as u64;
        let start = (page.saturating_sub(1) as usize).saturating_mul(per_page as usize);
        let items = all.into_iter().skip(start).take(per_page as usize).collect();
        Self::new(items, total, page, per_page)
    }

    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page {
            items: self.items.into_iter().map(f).collect(),
            total: self.total,
            page: self.page,
            per_page: self.per_page,
            total_pages: self.total_pages,
        }
    }
}
