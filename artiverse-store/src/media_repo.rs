use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use artiverse_catalog::Page;
use artiverse_core::repository::MediaRepository;
use artiverse_core::CoreResult;
use artiverse_media::MediaAsset;

use crate::db_err;

pub struct PgMediaRepository {
    pool: PgPool,
}

impl PgMediaRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct MediaRow {
    id: Uuid,
    filename: String,
    content_type: String,
    size_bytes: i64,
    width: i32,
    height: i32,
    storage_key: String,
    alt_text: Option<String>,
    uploaded_by: Option<Uuid>,
    created_at: DateTime<Utc>,
}

impl From<MediaRow> for MediaAsset {
    fn from(row: MediaRow) -> Self {
        MediaAsset {
            id: row.id,
            filename: row.filename,
            content_type: row.content_type,
            size_bytes: row.size_bytes,
            width: row.width.max(0) as u32,
            height: row.height.max(0) as u32,
            storage_key: row.storage_key,
            alt_text: row.alt_text,
            uploaded_by: row.uploaded_by,
            created_at: row.created_at,
        }
    }
}

const MEDIA_COLUMNS: &str =
    "id, filename, content_type, size_bytes, width, height, storage_key, alt_text, uploaded_by, created_at";

#[async_trait]
impl MediaRepository for PgMediaRepository {
    async fn create(&self, asset: &MediaAsset) -> CoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO media_assets (id, filename, content_type, size_bytes, width, height, storage_key, alt_text, uploaded_by, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(asset.id)
        .bind(&asset.filename)
        .bind(&asset.content_type)
        .bind(asset.size_bytes)
        .bind(asset.width as i32)
        .bind(asset.height as i32)
        .bind(&asset.storage_key)
        .bind(&asset.alt_text)
        .bind(asset.uploaded_by)
        .bind(asset.created_at)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    async fn get(&self, id: Uuid) -> CoreResult<Option<MediaAsset>> {
        let row = sqlx::query_as::<_, MediaRow>(&format!("SELECT {} FROM media_assets WHERE id = $1", MEDIA_COLUMNS))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(row.map(MediaAsset::from))
    }

    async fn list(&self, page: u32, per_page: u32) -> CoreResult<Page<MediaAsset>> {
        let (page, per_page) = (page.max(1), per_page.clamp(1, 100));
        let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM media_assets")
            .fetch_one(&self.pool)
            .await
            .map_err(db_err)?;
        let rows = sqlx::query_as::<_, MediaRow>(&format!(
            "SELECT {} FROM media_assets ORDER BY created_at DESC, id LIMIT $1 OFFSET $2",
            MEDIA_COLUMNS
        ))
        .bind(i64::from(per_page))
        .bind(i64::from(page - 1) * i64::from(per_page))
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        Ok(Page::new(rows.into_iter().map(MediaAsset::from).collect(), total as u64, page, per_page))
    }

    async fn delete(&self, id: Uuid) -> CoreResult<bool> {
        let result = sqlx::query("DELETE FROM media_assets WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(result.rows_affected() > 0)
    }
}
