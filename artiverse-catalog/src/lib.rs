pub mod artist;
pub mod inventory;
pub mod pricing;
pub mod product;
pub mod search;

pub use artist::{Artist, ArtistPatch, NewArtist};
pub use inventory::{InventoryError, InventoryManager};
pub use pricing::{PriceBreakdown, PricingConfig, PricingEngine};
pub use product::{Artwork, ArtworkPatch, ArtworkStatus, CatalogError, Dimensions, Medium, NewArtwork};
pub use search::{ArtistQuery, ArtworkQuery, ArtworkSort, Page};
