//! The cart lives on the client; the server only normalizes and prices it.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use artiverse_catalog::pricing::QuoteLine;
use artiverse_catalog::{Artwork, ArtworkStatus};

pub const MAX_QUANTITY_PER_LINE: u32 = 10;
pub const MAX_LINES: usize = 50;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct CartLine {
    pub artwork_id: Uuid,
    pub quantity: u32,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Cart {
    #[serde(default)]
    pub items: Vec<CartLine>,
}

impl Cart {
    /// Merge duplicates (first position wins), drop empty lines, apply caps.
    pub fn normalized(&self) -> Cart {
        let mut items: Vec<CartLine> = Vec::with_capacity(self.items.len());
        for line in &self.items {
            if line.quantity == 0 {
                continue;
            }
            match items.iter_mut().find(|l| l.artwork_id == line.artwork_id) {
                Some(existing) => {
                    existing.quantity = existing.quantity.saturating_add(line.quantity);
                }
                None => items.push(*line),
            }
        }
        for line in &mut items {
            line.quantity = line.quantity.min(MAX_QUANTITY_PER_LINE);
        }
        items.truncate(MAX_LINES);
        Cart { items }
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn artwork_ids(&self) -> Vec<Uuid> {
        self.items.iter().map(|l| l.artwork_id).collect()
    }
}

/// Why a cart line cannot be bought as requested
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CartIssue {
    NotFound { artwork_id: Uuid },
    Unavailable { artwork_id: Uuid },
    OutOfStock { artwork_id: Uuid },
    QuantityReduced { artwork_id: Uuid, requested: u32, available: u32 },
    CurrencyMismatch { artwork_id: Uuid, currency: String },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PricedLine {
    pub artwork_id: Uuid,
    pub slug: String,
    pub title: String,
    pub artist_id: Uuid,
    pub image_id: Option<Uuid>,
    pub unit_price_cents: i64,
    pub regular_price_cents: i64,
    pub quantity: u32,
    pub line_total_cents: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PricedCart {
    pub lines: Vec<PricedLine>,
    pub issues: Vec<CartIssue>,
    pub currency: String,
}

impl PricedCart {
    pub fn is_checkout_ready(&self) -> bool {
        self.issues.is_empty() && !self.lines.is_empty()
    }

    pub fn quote_lines(&self) -> Vec<QuoteLine> {
        self.lines
            .iter()
            .map(|l| QuoteLine { unit_price_cents: l.unit_price_cents, quantity: l.quantity })
            .collect()
    }
}

/// Resolve each line against the catalog. Lines that can still be bought
/// (possibly with a reduced quantity) end up in `lines`; every deviation
/// from the request is reported in `issues`.
pub fn price_cart<'a>(
    cart: &Cart,
    default_currency: &str,
    lookup: impl Fn(&Uuid) -> Option<&'a Artwork>,
) -> PricedCart {
    let cart = cart.normalized();
    let mut lines = Vec::with_capacity(cart.items.len());
    let mut issues = Vec::new();
    let mut currency: Option<String> = None;

    for line in &cart.items {
        let Some(artwork) = lookup(&line.artwork_id) else {
            issues.push(CartIssue::NotFound { artwork_id: line.artwork_id });
            continue;
        };

        if artwork.status != ArtworkStatus::Published {
            issues.push(CartIssue::Unavailable { artwork_id: artwork.id });
            continue;
        }

        if artwork.stock <= 0 {
            issues.push(CartIssue::OutOfStock { artwork_id: artwork.id });
            continue;
        }

        match &currency {
            Some(c) if *c != artwork.currency => {
                issues.push(CartIssue::CurrencyMismatch {
                    artwork_id: artwork.id,
                    currency: artwork.currency.clone(),
                });
                continue;
            }
            Some(_) => {}
            None => currency = Some(artwork.currency.clone()),
        }

        let available = artwork.stock as u32;
        let quantity = if line.quantity > available {
            issues.push(CartIssue::QuantityReduced {
                artwork_id: artwork.id,
                requested: line.quantity,
                available,
            });
            available
        } else {
            line.quantity
        };

        let unit = artwork.effective_price_cents();
        lines.push(PricedLine {
            artwork_id: artwork.id,
            slug: artwork.slug.clone(),
            title: artwork.title.clone(),
            artist_id: artwork.artist_id,
            image_id: artwork.image_ids.first().copied(),
            unit_price_cents: unit,
            regular_price_cents: artwork.price_cents,
            quantity,
            line_total_cents: unit * i64::from(quantity),
        });
    }

    PricedCart {
        lines,
        issues,
        currency: currency.unwrap_or_else(|| default_currency.to_string()),
    }
}
