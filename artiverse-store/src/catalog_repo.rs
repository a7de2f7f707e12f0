use std::collections::HashSet;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, QueryBuilder};
use uuid::Uuid;

use artiverse_catalog::{Artist, ArtistQuery, Artwork, ArtworkQuery, ArtworkSort, Dimensions, Page};
use artiverse_core::repository::{ArtistRepository, ArtworkRepository};
use artiverse_core::{CoreError, CoreResult};
use artiverse_shared::slug::unique_slug;

use crate::db_err;

pub struct PgArtworkRepository {
    pool: PgPool,
}

impl PgArtworkRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn free_slug(&self, base: &str, id: Uuid) -> CoreResult<String> {
        let taken: HashSet<String> = sqlx::query_scalar::<_, String>(
            "SELECT slug FROM artworks WHERE (slug = $1 OR slug LIKE $1 || '-%') AND id <> $2",
        )
        .bind(base)
        .bind(id)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?
        .into_iter()
        .collect();
        Ok(unique_slug(base, |s| taken.contains(s)))
    }
}

const ARTWORK_COLUMNS: &str = "id, slug, title, description, artist_id, medium, category, width_cm, height_cm, depth_cm, \
     year, price_cents, sale_price_cents, currency, stock, status, featured, image_ids, tags, created_at, updated_at";

#[derive(sqlx::FromRow)]
struct ArtworkRow {
    id: Uuid,
    slug: String,
    title: String,
    description: Option<String>,
    artist_id: Uuid,
    medium: String,
    category: Option<String>,
    width_cm: Option<f64>,
    height_cm: Option<f64>,
    depth_cm: Option<f64>,
    year: Option<i32>,
    price_cents: i64,
    sale_price_cents: Option<i64>,
    currency: String,
    stock: i32,
    status: String,
    featured: bool,
    image_ids: Vec<Uuid>,
    tags: Vec<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<ArtworkRow> for Artwork {
    type Error = CoreError;

    fn try_from(row: ArtworkRow) -> Result<Self, Self::Error> {
        let dimensions = match (row.width_cm, row.height_cm) {
            (Some(width_cm), Some(height_cm)) => Some(Dimensions { width_cm, height_cm, depth_cm: row.depth_cm }),
            _ => None,
        };
        Ok(Artwork {
            id: row.id,
            slug: row.slug,
            title: row.title,
            description: row.description,
            artist_id: row.artist_id,
            medium: row.medium.parse().map_err(|e| CoreError::Storage(format!("artwork {}: {}", row.id, e)))?,
            category: row.category,
            dimensions,
            year: row.year,
            price_cents: row.price_cents,
            sale_price_cents: row.sale_price_cents,
            currency: row.currency,
            stock: row.stock,
            status: row.status.parse().map_err(|e| CoreError::Storage(format!("artwork {}: {}", row.id, e)))?,
            featured: row.featured,
            image_ids: row.image_ids,
            tags: row.tags,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

fn rows_to_artworks(rows: Vec<ArtworkRow>) -> CoreResult<Vec<Artwork>> {
    rows.into_iter().map(Artwork::try_from).collect()
}

/// Append the WHERE clause for `query` to `qb`.
fn push_artwork_filters(qb: &mut QueryBuilder<'_, Postgres>, query: &ArtworkQuery) {
    qb.push(" WHERE TRUE");
    if let Some(status) = query.status {
        qb.push(" AND status = ").push_bind(status.as_str());
    }
    if let Some(artist_id) = query.artist_id {
        qb.push(" AND artist_id = ").push_bind(artist_id);
    }
    if let Some(medium) = query.medium {
        qb.push(" AND medium = ").push_bind(medium.as_str());
    }
    if let Some(category) = query.category.as_deref().map(str::trim).filter(|c| !c.is_empty()) {
        qb.push(" AND LOWER(category) = LOWER(").push_bind(category.to_string()).push(")");
    }
    if let Some(tag) = query.tag.as_deref().map(str::trim).filter(|t| !t.is_empty()) {
        qb.push(" AND EXISTS (SELECT 1 FROM UNNEST(tags) t WHERE LOWER(t) = LOWER(")
            .push_bind(tag.to_string())
            .push("))");
    }
    if let Some(min) = query.min_price_cents {
        qb.push(" AND COALESCE(sale_price_cents, price_cents) >= ").push_bind(min);
    }
    if let Some(max) = query.max_price_cents {
        qb.push(" AND COALESCE(sale_price_cents, price_cents) <= ").push_bind(max);
    }
    if let Some(featured) = query.featured {
        qb.push(" AND featured = ").push_bind(featured);
    }
    match query.on_sale {
        Some(true) => {
            qb.push(" AND sale_price_cents IS NOT NULL");
        }
        Some(false) => {
            qb.push(" AND sale_price_cents IS NULL");
        }
        None => {}
    }
    match query.in_stock {
        Some(true) => {
            qb.push(" AND stock > 0");
        }
        Some(false) => {
            qb.push(" AND stock = 0");
        }
        None => {}
    }
    if let Some(text) = query.text() {
        let pattern = format!("%{}%", text.replace('\\', "\\\\").replace('%', "\\%").replace('_', "\\_"));
        qb.push(" AND (title ILIKE ")
            .push_bind(pattern.clone())
            .push(" OR description ILIKE ")
            .push_bind(pattern.clone())
            .push(" OR array_to_string(tags, ' ') ILIKE ")
            .push_bind(pattern)
            .push(")");
    }
}

fn order_clause(sort: ArtworkSort) -> &'static str {
    match sort {
        ArtworkSort::Newest => " ORDER BY created_at DESC, id",
        ArtworkSort::Oldest => " ORDER BY created_at ASC, id",
        ArtworkSort::PriceAsc => " ORDER BY COALESCE(sale_price_cents, price_cents) ASC, id",
        ArtworkSort::PriceDesc => " ORDER BY COALESCE(sale_price_cents, price_cents) DESC, id",
        ArtworkSort::Title => " ORDER BY LOWER(title) ASC, id",
    }
}

#[async_trait]
impl ArtworkRepository for PgArtworkRepository {
    async fn create(&self, mut artwork: Artwork) -> CoreResult<Artwork> {
        artwork.slug = self.free_slug(&artwork.slug, artwork.id).await?;
        let dims = artwork.dimensions;

        sqlx::query(
            r#"
            INSERT INTO artworks (id, slug, title, description, artist_id, medium, category, width_cm, height_cm, depth_cm,
                                  year, price_cents, sale_price_cents, currency, stock, status, featured, image_ids, tags,
                                  created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18, $19, $20, $21)
            "#,
        )
        .bind(artwork.id)
        .bind(&artwork.slug)
        .bind(&artwork.title)
        .bind(&artwork.description)
        .bind(artwork.artist_id)
        .bind(artwork.medium.as_str())
        .bind(&artwork.category)
        .bind(dims.map(|d| d.width_cm))
        .bind(dims.map(|d| d.height_cm))
        .bind(dims.and_then(|d| d.depth_cm))
        .bind(artwork.year)
        .bind(artwork.price_cents)
        .bind(artwork.sale_price_cents)
        .bind(&artwork.currency)
        .bind(artwork.stock)
        .bind(artwork.status.as_str())
        .bind(artwork.featured)
        .bind(&artwork.image_ids)
        .bind(&artwork.tags)
        .bind(artwork.created_at)
        .bind(artwork.updated_at)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        Ok(artwork)
    }

    async fn get(&self, id: Uuid) -> CoreResult<Option<Artwork>> {
        let row = sqlx::query_as::<_, ArtworkRow>(&format!("SELECT {} FROM artworks WHERE id = $1", ARTWORK_COLUMNS))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;
        row.map(Artwork::try_from).transpose()
    }

    async fn get_by_slug(&self, slug: &str) -> CoreResult<Option<Artwork>> {
        let row = sqlx::query_as::<_, ArtworkRow>(&format!("SELECT {} FROM artworks WHERE slug = $1", ARTWORK_COLUMNS))
            .bind(slug)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;
        row.map(Artwork::try_from).transpose()
    }

    async fn get_many(&self, ids: &[Uuid]) -> CoreResult<Vec<Artwork>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let rows = sqlx::query_as::<_, ArtworkRow>(&format!("SELECT {} FROM artworks WHERE id = ANY($1)", ARTWORK_COLUMNS))
            .bind(ids)
            .fetch_all(&self.pool)
            .await
            .map_err(db_err)?;
        rows_to_artworks(rows)
    }

    async fn update(&self, mut artwork: Artwork) -> CoreResult<Artwork> {
        artwork.slug = self.free_slug(&artwork.slug, artwork.id).await?;
        let dims = artwork.dimensions;

        // Stock moves only through checkout, cancellation and `set_stock`.
        let stock: Option<i32> = sqlx::query_scalar(
            r#"
            UPDATE artworks SET slug = $2, title = $3, description = $4, artist_id = $5, medium = $6, category = $7,
                   width_cm = $8, height_cm = $9, depth_cm = $10, year = $11, price_cents = $12, sale_price_cents = $13,
                   currency = $14, status = $15, featured = $16, image_ids = $17, tags = $18, updated_at = $19
            WHERE id = $1
            RETURNING stock
            "#,
        )
        .bind(artwork.id)
        .bind(&artwork.slug)
        .bind(&artwork.title)
        .bind(&artwork.description)
        .bind(artwork.artist_id)
        .bind(artwork.medium.as_str())
        .bind(&artwork.category)
        .bind(dims.map(|d| d.width_cm))
        .bind(dims.map(|d| d.height_cm))
        .bind(dims.and_then(|d| d.depth_cm))
        .bind(artwork.year)
        .bind(artwork.price_cents)
        .bind(artwork.sale_price_cents)
        .bind(&artwork.currency)
        .bind(artwork.status.as_str())
        .bind(artwork.featured)
        .bind(&artwork.image_ids)
        .bind(&artwork.tags)
        .bind(artwork.updated_at)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;

        artwork.stock = stock.ok_or_else(|| CoreError::NotFound(format!("artwork {}", artwork.id)))?;
        Ok(artwork)
    }

    async fn set_stock(&self, id: Uuid, stock: i32) -> CoreResult<Artwork> {
        let row = sqlx::query_as::<_, ArtworkRow>(&format!(
            "UPDATE artworks SET stock = $2, updated_at = NOW() WHERE id = $1 RETURNING {}",
            ARTWORK_COLUMNS
        ))
        .bind(id)
        .bind(stock.max(0))
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;
        row.map(Artwork::try_from)
            .transpose()?
            .ok_or_else(|| CoreError::NotFound(format!("artwork {}", id)))
    }

    async fn search(&self, query: &ArtworkQuery) -> CoreResult<Page<Artwork>> {
        let mut count_qb = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM artworks");
        push_artwork_filters(&mut count_qb, query);
        let total: i64 = count_qb.build_query_scalar().fetch_one(&self.pool).await.map_err(db_err)?;

        let mut qb = QueryBuilder::<Postgres>::new(format!("SELECT {} FROM artworks", ARTWORK_COLUMNS));
        push_artwork_filters(&mut qb, query);
        qb.push(order_clause(query.sort()));
        qb.push(" LIMIT ").push_bind(i64::from(query.per_page()));
        qb.push(" OFFSET ").push_bind(query.offset() as i64);
        let rows: Vec<ArtworkRow> = qb.build_query_as().fetch_all(&self.pool).await.map_err(db_err)?;

        Ok(Page::new(rows_to_artworks(rows)?, total as u64, query.page(), query.per_page()))
    }

    async fn low_stock(&self, threshold: i32) -> CoreResult<Vec<Artwork>> {
        let rows = sqlx::query_as::<_, ArtworkRow>(&format!(
            "SELECT {} FROM artworks WHERE stock <= $1 AND status IN ('PUBLISHED', 'DRAFT') ORDER BY stock ASC, title ASC",
            ARTWORK_COLUMNS
        ))
        .bind(threshold)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;
        rows_to_artworks(rows)
    }

    async fn count_by_artist(&self, artist_id: Uuid) -> CoreResult<u64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM artworks WHERE artist_id = $1 AND status <> 'ARCHIVED'")
            .bind(artist_id)
            .fetch_one(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(count as u64)
    }

    async fn detach_media(&self, media_id: Uuid) -> CoreResult<()> {
        sqlx::query("UPDATE artworks SET image_ids = array_remove(image_ids, $1), updated_at = NOW() WHERE $1 = ANY(image_ids)")
            .bind(media_id)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(())
    }
}

// ============================================================================
// Artists
// ============================================================================

pub struct PgArtistRepository {
    pool: PgPool,
}

impl PgArtistRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn free_slug(&self, base: &str, id: Uuid) -> CoreResult<String> {
        let taken: HashSet<String> = sqlx::query_scalar::<_, String>(
            "SELECT slug FROM artists WHERE (slug = $1 OR slug LIKE $1 || '-%') AND id <> $2",
        )
        .bind(base)
        .bind(id)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?
        .into_iter()
        .collect();
        Ok(unique_slug(base, |s| taken.contains(s)))
    }
}

#[derive(sqlx::FromRow)]
struct ArtistRow {
    id: Uuid,
    slug: String,
    name: String,
    bio: Option<String>,
    nationality: Option<String>,
    birth_year: Option<i32>,
    website: Option<String>,
    avatar_media_id: Option<Uuid>,
    featured: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<ArtistRow> for Artist {
    fn from(row: ArtistRow) -> Self {
        Artist {
            id: row.id,
            slug: row.slug,
            name: row.name,
            bio: row.bio,
            nationality: row.nationality,
            birth_year: row.birth_year,
            website: row.website,
            avatar_media_id: row.avatar_media_id,
            featured: row.featured,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

const ARTIST_COLUMNS: &str =
    "id, slug, name, bio, nationality, birth_year, website, avatar_media_id, featured, created_at, updated_at";

fn push_artist_filters(qb: &mut QueryBuilder<'_, Postgres>, query: &ArtistQuery) {
    qb.push(" WHERE TRUE");
    if let Some(featured) = query.featured {
        qb.push(" AND featured = ").push_bind(featured);
    }
    if let Some(q) = query.q.as_deref().map(str::trim).filter(|q| !q.is_empty()) {
        let pattern = format!("%{}%", q.replace('\\', "\\\\").replace('%', "\\%").replace('_', "\\_"));
        qb.push(" AND name ILIKE ").push_bind(pattern);
    }
}

#[async_trait]
impl ArtistRepository for PgArtistRepository {
    async fn create(&self, mut artist: Artist) -> CoreResult<Artist> {
        artist.slug = self.free_slug(&artist.slug, artist.id).await?;
        sqlx::query(
            r#"
            INSERT INTO artists (id, slug, name, bio, nationality, birth_year, website, avatar_media_id, featured, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            "#,
        )
        .bind(artist.id)
        .bind(&artist.slug)
        .bind(&artist.name)
        .bind(&artist.bio)
        .bind(&artist.nationality)
        .bind(artist.birth_year)
        .bind(&artist.website)
        .bind(artist.avatar_media_id)
        .bind(artist.featured)
        .bind(artist.created_at)
        .bind(artist.updated_at)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(artist)
    }

    async fn get(&self, id: Uuid) -> CoreResult<Option<Artist>> {
        let row = sqlx::query_as::<_, ArtistRow>(&format!("SELECT {} FROM artists WHERE id = $1", ARTIST_COLUMNS))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(row.map(Artist::from))
    }

    async fn get_by_slug(&self, slug: &str) -> CoreResult<Option<Artist>> {
        let row = sqlx::query_as::<_, ArtistRow>(&format!("SELECT {} FROM artists WHERE slug = $1", ARTIST_COLUMNS))
            .bind(slug)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(row.map(Artist::from))
    }

    async fn get_many(&self, ids: &[Uuid]) -> CoreResult<Vec<Artist>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let rows = sqlx::query_as::<_, ArtistRow>(&format!("SELECT {} FROM artists WHERE id = ANY($1)", ARTIST_COLUMNS))
            .bind(ids)
            .fetch_all(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(rows.into_iter().map(Artist::from).collect())
    }

    async fn update(&self, mut artist: Artist) -> CoreResult<Artist> {
        artist.slug = self.free_slug(&artist.slug, artist.id).await?;
        let result = sqlx::query(
            r#"
            UPDATE artists SET slug = $2, name = $3, bio = $4, nationality = $5, birth_year = $6, website = $7,
                   avatar_media_id = $8, featured = $9, updated_at = $10
            WHERE id = $1
            "#,
        )
        .bind(artist.id)
        .bind(&artist.slug)
        .bind(&artist.name)
        .bind(&artist.bio)
        .bind(&artist.nationality)
        .bind(artist.birth_year)
        .bind(&artist.website)
        .bind(artist.avatar_media_id)
        .bind(artist.featured)
        .bind(artist.updated_at)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        if result.rows_affected() == 0 {
            return Err(CoreError::NotFound(format!("artist {}", artist.id)));
        }
        Ok(artist)
    }

    async fn delete(&self, id: Uuid) -> CoreResult<bool> {
        let result = sqlx::query("DELETE FROM artists WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(result.rows_affected() > 0)
    }

    async fn list(&self, query: &ArtistQuery) -> CoreResult<Page<Artist>> {
        let mut count_qb = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM artists");
        push_artist_filters(&mut count_qb, query);
        let total: i64 = count_qb.build_query_scalar().fetch_one(&self.pool).await.map_err(db_err)?;

        let mut qb = QueryBuilder::<Postgres>::new(format!("SELECT {} FROM artists", ARTIST_COLUMNS));
        push_artist_filters(&mut qb, query);
        qb.push(" ORDER BY LOWER(name) ASC, id");
        qb.push(" LIMIT ").push_bind(i64::from(query.per_page()));
        qb.push(" OFFSET ").push_bind(query.offset() as i64);
        let rows: Vec<ArtistRow> = qb.build_query_as().fetch_all(&self.pool).await.map_err(db_err)?;

        Ok(Page::new(
            rows.into_iter().map(Artist::from).collect(),
            total as u64,
            query.page(),
            query.per_page(),
        ))
    }
}
