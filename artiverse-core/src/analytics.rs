use std::collections::{BTreeMap, HashMap, HashSet};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use artiverse_order::SalesReport;
use artiverse_shared::{AnalyticsEvent, EventKind};

use crate::{CoreError, CoreResult};

pub const DEFAULT_SUMMARY_DAYS: u32 = 30;
pub const MAX_SUMMARY_DAYS: u32 = 365;
pub const TOP_ARTWORKS: usize = 10;
const MAX_METADATA_BYTES: usize = 4096;

/// Event body as posted by the storefront
#[derive(Debug, Clone, Deserialize)]
pub struct TrackEvent {
    #[serde(rename = "type")]
    pub kind: String,
    pub session_id: String,
    pub path: Option<String>,
    pub artwork_id: Option<Uuid>,
    pub referrer: Option<String>,
    #[serde(default)]
    pub metadata: serde_json::Value,
}

impl TrackEvent {
    pub fn into_event(self, user_id: Option<Uuid>, user_agent: Option<String>) -> CoreResult<AnalyticsEvent> {
        let kind = EventKind::parse(&self.kind)
            .ok_or_else(|| CoreError::Validation(format!("unknown event type '{}'", self.kind)))?;

        let session_id = self.session_id.trim().to_string();
        if session_id.is_empty() || session_id.len() > 128 {
            return Err(CoreError::Validation("session_id must be 1-128 characters".into()));
        }
        if kind == EventKind::ArtworkView && self.artwork_id.is_none() {
            return Err(CoreError::Validation("artwork_view requires artwork_id".into()));
        }

        let metadata = match self.metadata {
            serde_json::Value::Null => serde_json::json!({}),
            v @ serde_json::Value::Object(_) => v,
            _ => return Err(CoreError::Validation("metadata must be an object".into())),
        };
        if serde_json::to_vec(&metadata)?.len() > MAX_METADATA_BYTES {
            return Err(CoreError::Validation("metadata is too large".into()));
        }

        Ok(AnalyticsEvent {
            id: Uuid::new_v4(),
            kind,
            session_id,
            user_id,
            path: clip(self.path, 2048),
            artwork_id: self.artwork_id,
            referrer: clip(self.referrer, 2048),
            user_agent: clip(user_agent, 512),
            metadata,
            occurred_at: Utc::now(),
        })
    }
}

fn clip(value: Option<String>, max: usize) -> Option<String> {
    value
        .map(|v| v.trim().chars().take(max).collect::<String>())
        .filter(|v| !v.is_empty())
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TopArtwork {
    pub artwork_id: Uuid,
    pub title: Option<String>,
    pub views: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalyticsSummary {
    pub since: DateTime<Utc>,
    pub days: u32,
    pub total_events: u64,
    pub counts: BTreeMap<String, u64>,
    pub unique_sessions: u64,
    pub top_artworks: Vec<TopArtwork>,
    /// Share of sessions that reached a purchase, 0.0..=1.0
    pub conversion_rate: f64,
    pub sales: SalesReport,
}

/// Clamp the requested window to 1..=365 days.
pub fn summary_window(days: Option<u32>, now: DateTime<Utc>) -> (u32, DateTime<Utc>) {
    let days = days.unwrap_or(DEFAULT_SUMMARY_DAYS).clamp(1, MAX_SUMMARY_DAYS);
    (days, now - Duration::days(i64::from(days)))
}

/// Event figures over a window, as aggregated by the analytics store
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EventStats {
    pub total_events: u64,
    pub counts: BTreeMap<String, u64>,
    pub unique_sessions: u64,
    pub purchasing_sessions: u64,
    /// Most viewed first, at most the requested number
    pub top_artworks: Vec<TopArtwork>,
}

impl EventStats {
    /// In-process aggregation for stores without a query engine.
    pub fn from_events<'a>(
        events: impl IntoIterator<Item = &'a AnalyticsEvent>,
        since: DateTime<Utc>,
        top: usize,
    ) -> Self {
        let mut stats = EventStats::default();
        let mut sessions: HashSet<&str> = HashSet::new();
        let mut purchasing: HashSet<&str> = HashSet::new();
        let mut views: HashMap<Uuid, u64> = HashMap::new();

        for event in events.into_iter().filter(|e| e.occurred_at >= since) {
            stats.total_events += 1;
            *stats.counts.entry(event.kind.as_str().to_string()).or_insert(0) += 1;
            sessions.insert(event.session_id.as_str());
            match event.kind {
                EventKind::Purchase => {
                    purchasing.insert(event.session_id.as_str());
                }
                EventKind::ArtworkView => {
                    if let Some(id) = event.artwork_id {
                        *views.entry(id).or_insert(0) += 1;
                    }
                }
                _ => {}
            }
        }

        let mut ranked: Vec<TopArtwork> = views
            .into_iter()
            .map(|(artwork_id, views)| TopArtwork { artwork_id, title: None, views })
            .collect();
        ranked.sort_by(|a, b| b.views.cmp(&a.views).then(a.artwork_id.cmp(&b.artwork_id)));
        ranked.truncate(top);

        stats.unique_sessions = sessions.len() as u64;
        stats.purchasing_sessions = purchasing.len() as u64;
        stats.top_artworks = ranked;
        stats
    }
}

pub fn summarize(stats: EventStats, sales: SalesReport, days: u32, since: DateTime<Utc>) -> AnalyticsSummary {
    let mut counts: BTreeMap<String, u64> = EventKind::ALL.iter().map(|k| (k.as_str().to_string(), 0)).collect();
    counts.extend(stats.counts);

    let conversion_rate = if stats.unique_sessions == 0 {
        0.0
    } else {
        stats.purchasing_sessions as f64 / stats.unique_sessions as f64
    };

    AnalyticsSummary {
        since,
        days,
        total_events: stats.total_events,
        counts,
        unique_sessions: stats.unique_sessions,
        top_artworks: stats.top_artworks,
        conversion_rate,
        sales,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn event(kind: EventKind, session: &str, artwork: Option<Uuid>) -> AnalyticsEvent {
        AnalyticsEvent {
            id: Uuid::new_v4(),
            kind,
            session_id: session.to_string(),
            user_id: None,
            path: None,
            artwork_id: artwork,
            referrer: None,
            user_agent: None,
            metadata: json!({}),
            occurred_at: Utc::now(),
        }
    }

    #[test]
    fn test_track_event_validation() {
        let raw = TrackEvent {
            kind: "page_view".into(),
            session_id: " s1 ".into(),
            path: Some("/artworks".into()),
            artwork_id: None,
            referrer: Some("  ".into()),
            metadata: serde_json::Value::Null,
        };
        let e = raw.clone().into_event(None, Some("curl/8".into())).unwrap();
        assert_eq!(e.kind, EventKind::PageView);
        assert_eq!(e.session_id, "s1");
        assert!(e.referrer.is_none());
        assert_eq!(e.metadata, json!({}));

        let unknown = TrackEvent { kind: "hover".into(), ..raw.clone() };
        assert!(matches!(unknown.into_event(None, None), Err(CoreError::Validation(_))));

        let view_without_artwork = TrackEvent { kind: "artwork_view".into(), ..raw.clone() };
        assert!(view_without_artwork.into_event(None, None).is_err());

        let bad_meta = TrackEvent { metadata: json!([1, 2]), ..raw.clone() };
        assert!(bad_meta.into_event(None, None).is_err());

        let huge = TrackEvent { metadata: json!({ "blob": "x".repeat(5000) }), ..raw };
        assert!(huge.into_event(None, None).is_err());
    }

    #[test]
    fn test_summarize() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let events = vec![
            event(EventKind::PageView, "s1", None),
            event(EventKind::ArtworkView, "s1", Some(a)),
            event(EventKind::ArtworkView, "s2", Some(a)),
            event(EventKind::ArtworkView, "s2", Some(b)),
            event(EventKind::Purchase, "s2", None),
            event(EventKind::PageView, "s3", None),
        ];
        let (days, since) = summary_window(None, Utc::now());
        let stats = EventStats::from_events(&events, since, TOP_ARTWORKS);
        assert_eq!(stats.purchasing_sessions, 1);
        let summary = summarize(stats, SalesReport::default(), days, since);

        assert_eq!(days, 30);
        assert_eq!(summary.total_events, 6);
        assert_eq!(summary.counts["artwork_view"], 3);
        assert_eq!(summary.counts["search"], 0);
        assert_eq!(summary.unique_sessions, 3);
        assert_eq!(summary.top_artworks[0].artwork_id, a);
        assert_eq!(summary.top_artworks[0].views, 2);
        assert!((summary.conversion_rate - 1.0 / 3.0).abs() < 1e-9);
        assert_eq!(summary.sales.order_count, 0);
    }

    #[test]
    fn test_stats_respect_window_and_limit() {
        let (_, since) = summary_window(Some(1), Utc::now());
        let mut old = event(EventKind::PageView, "s0", None);
        old.occurred_at = since - Duration::hours(1);
        let mut events = vec![old];
        events.extend((0..3).map(|_| event(EventKind::ArtworkView, "s1", Some(Uuid::new_v4()))));

        let stats = EventStats::from_events(&events, since, 2);
        assert_eq!(stats.total_events, 3);
        assert_eq!(stats.unique_sessions, 1);
        assert_eq!(stats.top_artworks.len(), 2);
        assert!(!stats.counts.contains_key("page_view"));
    }

    #[test]
    fn test_summary_window_clamps() {
        let now = Utc::now();
        assert_eq!(summary_window(Some(0), now).0, 1);
        assert_eq!(summary_window(Some(9999), now).0, 365);
        assert_eq!(summary_window(Some(7), now).1, now - Duration::days(7));
    }
}
