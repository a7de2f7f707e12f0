use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use artiverse_core::analytics::{EventStats, TopArtwork};
use artiverse_core::repository::AnalyticsRepository;
use artiverse_core::CoreResult;
use artiverse_shared::{AnalyticsEvent, EventKind};

use crate::db_err;

pub struct PgAnalyticsRepository {
    pool: PgPool,
}

impl PgAnalyticsRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AnalyticsRepository for PgAnalyticsRepository {
    async fn record(&self, event: &AnalyticsEvent) -> CoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO analytics_events (id, kind, session_id, user_id, path, artwork_id, referrer, user_agent, metadata, occurred_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(event.id)
        .bind(event.kind.as_str())
        .bind(&event.session_id)
        .bind(event.user_id)
        .bind(&event.path)
        .bind(event.artwork_id)
        .bind(&event.referrer)
        .bind(&event.user_agent)
        .bind(&event.metadata)
        .bind(event.occurred_at)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    async fn stats_since(&self, since: DateTime<Utc>, top: usize) -> CoreResult<EventStats> {
        let counts: Vec<(String, i64)> =
            sqlx::query_as("SELECT kind, COUNT(*) FROM analytics_events WHERE occurred_at >= $1 GROUP BY kind")
                .bind(since)
                .fetch_all(&self.pool)
                .await
                .map_err(db_err)?;

        let (sessions, purchasing): (i64, i64) = sqlx::query_as(
            "SELECT COUNT(DISTINCT session_id), COUNT(DISTINCT session_id) FILTER (WHERE kind = $2) \
             FROM analytics_events WHERE occurred_at >= $1",
        )
        .bind(since)
        .bind(EventKind::Purchase.as_str())
        .fetch_one(&self.pool)
        .await
        .map_err(db_err)?;

        let top_rows: Vec<(Uuid, i64)> = sqlx::query_as(
            "SELECT artwork_id, COUNT(*) AS views FROM analytics_events \
             WHERE occurred_at >= $1 AND kind = $2 AND artwork_id IS NOT NULL \
             GROUP BY artwork_id ORDER BY views DESC, artwork_id LIMIT $3",
        )
        .bind(since)
        .bind(EventKind::ArtworkView.as_str())
        .bind(top as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        let counts: BTreeMap<String, u64> = counts.into_iter().map(|(kind, n)| (kind, n.max(0) as u64)).collect();
        Ok(EventStats {
            total_events: counts.values().sum(),
            counts,
            unique_sessions: sessions.max(0) as u64,
            purchasing_sessions: purchasing.max(0) as u64,
            top_artworks: top_rows
                .into_iter()
                .map(|(artwork_id, views)| TopArtwork { artwork_id, title: None, views: views.max(0) as u64 })
                .collect(),
        })
    }
}
