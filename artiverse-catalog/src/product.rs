use chrono::{DateTime, Datelike, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use artiverse_shared::slug::slugify;

pub const MAX_TITLE_LEN: usize = 200;
pub const DEFAULT_CURRENCY: &str = "USD";

/// Artwork mediums in the catalog
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Medium {
    Painting,
    Sculpture,
    Photography,
    DigitalArt,
    Print,
    Drawing,
    MixedMedia,
}

impl Medium {
    pub fn as_str(&self) -> &'static str {
        match self {
            Medium::Painting => "PAINTING",
            Medium::Sculpture => "SCULPTURE",
            Medium::Photography => "PHOTOGRAPHY",
            Medium::DigitalArt => "DIGITAL_ART",
            Medium::Print => "PRINT",
            Medium::Drawing => "DRAWING",
            Medium::MixedMedia => "MIXED_MEDIA",
        }
    }
}

impl std::str::FromStr for Medium {
    type Err = CatalogError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "PAINTING" => Ok(Medium::Painting),
            "SCULPTURE" => Ok(Medium::Sculpture),
            "PHOTOGRAPHY" => Ok(Medium::Photography),
            "DIGITAL_ART" => Ok(Medium::DigitalArt),
            "PRINT" => Ok(Medium::Print),
            "DRAWING" => Ok(Medium::Drawing),
            "MIXED_MEDIA" => Ok(Medium::MixedMedia),
            other => Err(CatalogError::Validation(format!("unknown medium: {}", other))),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ArtworkStatus {
    Draft,
    Published,
    Sold,
    Archived,
}

impl ArtworkStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ArtworkStatus::Draft => "DRAFT",
            ArtworkStatus::Published => "PUBLISHED",
            ArtworkStatus::Sold => "SOLD",
            ArtworkStatus::Archived => "ARCHIVED",
        }
    }
}

impl std::str::FromStr for ArtworkStatus {
    type Err = CatalogError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "DRAFT" => Ok(ArtworkStatus::Draft),
            "PUBLISHED" => Ok(ArtworkStatus::Published),
            "SOLD" => Ok(ArtworkStatus::Sold),
            "ARCHIVED" => Ok(ArtworkStatus::Archived),
            other => Err(CatalogError::Validation(format!("unknown artwork status: {}", other))),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Dimensions {
    pub width_cm: f64,
    pub height_cm: f64,
    pub depth_cm: Option<f64>,
}

/// A sellable art piece
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Artwork {
    pub id: Uuid,
    pub slug: String,
    pub title: String,
    pub description: Option<String>,
    pub artist_id: Uuid,
    pub medium: Medium,
    pub category: Option<String>,
    pub dimensions: Option<Dimensions>,
    pub year: Option<i32>,
    pub price_cents: i64,
    pub sale_price_cents: Option<i64>,
    pub currency: String,
    pub stock: i32,
    pub status: ArtworkStatus,
    pub featured: bool,
    pub image_ids: Vec<Uuid>,
    pub tags: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Artwork {
    /// Build a catalog entry from validated admin input.
    pub fn from_new(input: NewArtwork) -> Result<Self, CatalogError> {
        input.validate()?;
        let now = Utc::now();
        Ok(Self {
            id: Uuid::new_v4(),
            slug: slugify(&input.title),
            title: input.title.trim().to_string(),
            description: input.description,
            artist_id: input.artist_id,
            medium: input.medium,
            category: input.category,
            dimensions: input.dimensions,
            year: input.year,
            price_cents: input.price_cents,
            sale_price_cents: input.sale_price_cents,
            currency: input.currency.unwrap_or_else(|| DEFAULT_CURRENCY.to_string()).to_ascii_uppercase(),
            stock: input.stock,
            status: input.status.unwrap_or(ArtworkStatus::Draft),
            featured: input.featured,
            image_ids: input.image_ids,
            tags: normalize_tags(input.tags),
            created_at: now,
            updated_at: now,
        })
    }

    /// Price a buyer pays today, before cart-level rules.
    pub fn effective_price_cents(&self) -> i64 {
        self.sale_price_cents.unwrap_or(self.price_cents)
    }

    pub fn is_on_sale(&self) -> bool {
        self.sale_price_cents.is_some()
    }

    pub fn is_purchasable(&self) -> bool {
        self.status == ArtworkStatus::Published && self.stock > 0
    }

    /// Apply a partial update. The title change regenerates the slug base;
    /// the store is responsible for making it unique.
    pub fn apply_patch(&mut self, patch: ArtworkPatch) -> Result<(), CatalogError> {
        let mut draft = NewArtwork {
            title: patch.title.unwrap_or_else(|| self.title.clone()),
            description: patch.description.or_else(|| self.description.clone()),
            artist_id: patch.artist_id.unwrap_or(self.artist_id),
            medium: patch.medium.unwrap_or(self.medium),
            category: patch.category.or_else(|| self.category.clone()),
            dimensions: patch.dimensions.or(self.dimensions),
            year: patch.year.or(self.year),
            price_cents: patch.price_cents.unwrap_or(self.price_cents),
            sale_price_cents: self.sale_price_cents,
            currency: Some(patch.currency.unwrap_or_else(|| self.currency.clone())),
            stock: patch.stock.unwrap_or(self.stock),
            status: Some(patch.status.unwrap_or(self.status)),
            featured: patch.featured.unwrap_or(self.featured),
            image_ids: patch.image_ids.unwrap_or_else(|| self.image_ids.clone()),
            tags: patch.tags.unwrap_or_else(|| self.tags.clone()),
        };
        // `Some(None)` clears the sale price, `None` leaves it alone.
        if let Some(sale) = patch.sale_price_cents {
            draft.sale_price_cents = sale;
        }
        draft.validate()?;

        let title = draft.title.trim().to_string();
        if title != self.title {
            self.slug = slugify(&title);
        }
        self.title = title;
        self.description = draft.description;
        self.artist_id = draft.artist_id;
        self.medium = draft.medium;
        self.category = draft.category;
        self.dimensions = draft.dimensions;
        self.year = draft.year;
        self.price_cents = draft.price_cents;
        self.sale_price_cents = draft.sale_price_cents;
        self.currency = draft.currency.unwrap_or_else(|| DEFAULT_CURRENCY.to_string()).to_ascii_uppercase();
        self.stock = draft.stock;
        self.status = draft.status.unwrap_or(self.status);
        self.featured = draft.featured;
        self.image_ids = draft.image_ids;
        self.tags = normalize_tags(draft.tags);
        self.updated_at = Utc::now();
        Ok(())
    }
}

/// Admin input for a new artwork
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewArtwork {
    pub title: String,
    pub description: Option<String>,
    pub artist_id: Uuid,
    pub medium: Medium,
    pub category: Option<String>,
    pub dimensions: Option<Dimensions>,
    pub year: Option<i32>,
    pub price_cents: i64,
    pub sale_price_cents: Option<i64>,
    pub currency: Option<String>,
    #[serde(default)]
    pub stock: i32,
    pub status: Option<ArtworkStatus>,
    #[serde(default)]
    pub featured: bool,
    #[serde(default)]
    pub image_ids: Vec<Uuid>,
    #[serde(default)]
    pub tags: Vec<String>,
}

impl NewArtwork {
    pub fn validate(&self) -> Result<(), CatalogError> {
        let title = self.title.trim();
        if title.is_empty() {
            return Err(CatalogError::Validation("title is required".into()));
        }
        if title.chars().count() > MAX_TITLE_LEN {
            return Err(CatalogError::Validation(format!(
                "title must be at most {} characters",
                MAX_TITLE_LEN
            )));
        }
        if self.price_cents <= 0 {
            return Err(CatalogError::Validation("price must be positive".into()));
        }
        if let Some(sale) = self.sale_price_cents {
            if sale <= 0 || sale >= self.price_cents {
                return Err(CatalogError::Validation(
                    "sale price must be positive and below the regular price".into(),
                ));
            }
        }
        if self.stock < 0 {
            return Err(CatalogError::Validation("stock cannot be negative".into()));
        }
        if let Some(year) = self.year {
            if year > Utc::now().year() {
                return Err(CatalogError::Validation("year cannot be in the future".into()));
            }
        }
        if let Some(currency) = &self.currency {
            if currency.len() != 3 || !currency.chars().all(|c| c.is_ascii_alphabetic()) {
                return Err(CatalogError::Validation("currency must be a 3-letter code".into()));
            }
        }
        if let Some(d) = &self.dimensions {
            if d.width_cm <= 0.0 || d.height_cm <= 0.0 || d.depth_cm.is_some_and(|v| v <= 0.0) {
                return Err(CatalogError::Validation("dimensions must be positive".into()));
            }
        }
        Ok(())
    }
}

/// Partial update; absent fields keep their current value.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ArtworkPatch {
    pub title: Option<String>,
    pub description: Option<String>,
    pub artist_id: Option<Uuid>,
    pub medium: Option<Medium>,
    pub category: Option<String>,
    pub dimensions: Option<Dimensions>,
    pub year: Option<i32>,
    pub price_cents: Option<i64>,
    #[serde(default, with = "double_option")]
    pub sale_price_cents: Option<Option<i64>>,
    pub currency: Option<String>,
    pub stock: Option<i32>,
    pub status: Option<ArtworkStatus>,
    pub featured: Option<bool>,
    pub image_ids: Option<Vec<Uuid>>,
    pub tags: Option<Vec<String>>,
}

mod double_option {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S, T>(value: &Option<Option<T>>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
        T: Serialize,
    {
        match value {
            Some(inner) => inner.serialize(serializer),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
    where
        D: Deserializer<'de>,
        T: Deserialize<'de>,
    {
        Option::<T>::deserialize(deserializer).map(Some)
    }
}

fn normalize_tags(tags: Vec<String>) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(tags.len());
    for tag in tags {
        let tag = tag.trim().to_lowercase();
        if !tag.is_empty() && !out.contains(&tag) {
            out.push(tag);
        }
    }
    out
}

/// Catalog-related errors
#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> NewArtwork {
        NewArtwork {
            title: "Harbour at Dusk".to_string(),
            description: Some("Oil on linen".to_string()),
            artist_id: Uuid::new_v4(),
            medium: Medium::Painting,
            category: Some("Landscape".to_string()),
            dimensions: Some(Dimensions { width_cm: 60.0, height_cm: 40.0, depth_cm: None }),
            year: Some(2021),
            price_cents: 250_000,
            sale_price_cents: None,
            currency: None,
            stock: 1,
            status: Some(ArtworkStatus::Published),
            featured: false,
            image_ids: vec![],
            tags: vec![" Sea ".to_string(), "sea".to_string(), "Dusk".to_string()],
        }
    }

    #[test]
    fn test_from_new_normalizes() {
        let artwork = Artwork::from_new(sample()).unwrap();
        assert_eq!(artwork.slug, "harbour-at-dusk");
        assert_eq!(artwork.currency, "USD");
        assert_eq!(artwork.tags, vec!["sea".to_string(), "dusk".to_string()]);
        assert!(artwork.is_purchasable());
        assert!(!artwork.is_on_sale());
    }

    #[test]
    fn test_validation_rules() {
        let mut input = sample();
        input.sale_price_cents = Some(300_000);
        assert!(matches!(input.validate(), Err(CatalogError::Validation(_))));

        let mut input = sample();
        input.title = "   ".to_string();
        assert!(input.validate().is_err());

        let mut input = sample();
        input.year = Some(Utc::now().year() + 1);
        assert!(input.validate().is_err());

        let mut input = sample();
        input.currency = Some("US".to_string());
        assert!(input.validate().is_err());
    }

    #[test]
    fn test_patch_updates_and_clears_sale() {
        let mut artwork = Artwork::from_new(NewArtwork { sale_price_cents: Some(200_000), ..sample() }).unwrap();
        assert_eq!(artwork.effective_price_cents(), 200_000);

        let patch: ArtworkPatch =
            serde_json::from_value(serde_json::json!({"title": "Harbour at Dawn", "sale_price_cents": null})).unwrap();
        artwork.apply_patch(patch).unwrap();

        assert_eq!(artwork.slug, "harbour-at-dawn");
        assert_eq!(artwork.sale_price_cents, None);
        assert_eq!(artwork.effective_price_cents(), 250_000);
    }

    #[test]
    fn test_patch_rejects_invalid_result() {
        let mut artwork = Artwork::from_new(sample()).unwrap();
        let patch = ArtworkPatch { price_cents: Some(0), ..Default::default() };
        assert!(artwork.apply_patch(patch).is_err());
        assert_eq!(artwork.price_cents, 250_000);
    }

    #[test]
    fn test_status_parsing() {
        assert_eq!("published".parse::<ArtworkStatus>().unwrap(), ArtworkStatus::Published);
        assert_eq!("DIGITAL_ART".parse::<Medium>().unwrap(), Medium::DigitalArt);
        assert!("oil".parse::<Medium>().is_err());
    }
}
